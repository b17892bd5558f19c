//! Email validation
//!
//! Pages routinely carry third-party addresses: analytics vendors, site
//! builder support desks, tracking pixels with generated local parts. The
//! validator is deliberately strict; a rejected real address costs one
//! contact, an accepted fake poisons the output file.

use lazy_static::lazy_static;
use regex::Regex;

use crate::url::Domain;

lazy_static! {
    /// Full-match email syntax check, applied last
    static ref EMAIL_SYNTAX: Regex =
        Regex::new(r"^(?i)[a-zA-Z0-9._%+-]{1,64}@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();

    /// Generic French business prefixes; these get relaxed local-part rules
    static ref FRENCH_BUSINESS: Regex = Regex::new(
        r"^(?i)(?:contact|info|commercial|vente|ventes|direction|accueil|secretariat|administration|rh|ressources-humaines|communication|marketing|service-client|support|technique|comptabilite|finance|juridique)@"
    ).unwrap();

    static ref LOCAL_HEX_RUN: Regex = Regex::new(r"^[a-f0-9]{16,}$").unwrap();
    static ref LOCAL_LONG_ALNUM: Regex = Regex::new(r"^[0-9a-z]{20,}$").unwrap();
    static ref LOCAL_UUID: Regex = Regex::new(r"^[a-fA-F0-9]{30,}$").unwrap();
    static ref TEN_DIGIT_RUN: Regex = Regex::new(r"[0-9]{10,}").unwrap();
    static ref FIVE_DIGIT_RUN: Regex = Regex::new(r"[0-9]{5,}").unwrap();

    /// ".com" glued to trailing letters, e.g. "acme.comatelier" from
    /// concatenated page text
    static ref GLUED_COM: Regex = Regex::new(r"\.com[a-z]").unwrap();

    static ref SENTRY_WIX: Regex = Regex::new(r"^sentry.*\.wix").unwrap();
    static ref FRAGEL_WIX: Regex = Regex::new(r"^fragel.*\.wix").unwrap();

    static ref IP_DOMAIN: Regex = Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+$").unwrap();

    /// File extensions that show up as "TLDs" when an image filename sits
    /// next to an @ in the page text
    static ref FILE_EXT_TLD: Regex =
        Regex::new(r"\.(png|jpg|jpeg|gif|svg|pdf|doc|txt|css|js)$").unwrap();
}

/// Placeholder and platform domains that never hold business contacts
const INVALID_DOMAINS: &[&str] = &[
    "sentry.io",
    "wixpress.com",
    "sentry-next.wixpress.com",
    "test.com",
    "localhost",
    "test.fr",
    "test.net",
    "example.com",
    "fragel.wixpress.com",
    "fragel.io",
];

/// TLDs that cannot be real mail domains
const INVALID_TLDS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "bmp", "ico", "webp", "pdf", "doc", "docx", "txt", "csv",
    "tmp", "test", "localhost", "internal", "local",
];

/// Automated-mail local-part prefixes
const AUTOMATED_PREFIXES: &[&str] = &["postmaster", "webmaster"];

/// Validates a candidate email against syntax, anti-spam and
/// domain-affinity rules.
///
/// `company_domain`, when known, turns on the affinity check: the email's
/// host must equal the company's domain or be a subdomain of it. Socket
/// authorities (`host:port`, bare IPs) cannot receive mail under that name,
/// so affinity is skipped for them.
///
/// French business prefixes (`contact@`, `info@`, `direction@`, ...) are
/// exempt from the local-part heuristics but never from the hard blacklists.
pub fn is_valid(email: &str, company_domain: Option<&Domain>) -> bool {
    let email = email.trim().to_lowercase();

    if email.matches('@').count() != 1 {
        return false;
    }
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return false,
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }

    // Domain affinity is the single strongest anti-false-positive rule.
    if let Some(company) = company_domain {
        if !company.is_socket_authority() {
            let own = company.as_str();
            if domain != own && !domain.ends_with(&format!(".{}", own)) {
                return false;
            }
        }
    }

    let is_french_business = FRENCH_BUSINESS.is_match(&email);

    // Hard blacklists apply regardless of business prefix.
    if SENTRY_WIX.is_match(domain)
        || FRAGEL_WIX.is_match(domain)
        || domain.ends_with(".wixpress.com")
        || domain.starts_with("fragel.")
    {
        return false;
    }
    if LOCAL_HEX_RUN.is_match(local) || LOCAL_LONG_ALNUM.is_match(local) {
        return false;
    }
    if TEN_DIGIT_RUN.is_match(local) {
        return false;
    }
    if GLUED_COM.is_match(domain) {
        return false;
    }
    if email.contains("noreply") || email.contains("no-reply") || email.contains("ne-pas-repondre")
    {
        return false;
    }
    if email.contains("mailer-daemon") {
        return false;
    }
    if AUTOMATED_PREFIXES.iter().any(|p| local.starts_with(p)) {
        return false;
    }
    if domain.starts_with("test.") || domain.starts_with("localhost") {
        return false;
    }
    if FILE_EXT_TLD.is_match(domain) {
        return false;
    }
    if local.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    if INVALID_DOMAINS.contains(&domain) {
        return false;
    }
    let tld = domain.rsplit('.').next().unwrap_or("");
    if INVALID_TLDS.contains(&tld) {
        return false;
    }

    if domain.contains("..") || domain.ends_with('.') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    if labels
        .last()
        .map(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(true)
    {
        return false;
    }

    if LOCAL_UUID.is_match(local) {
        return false;
    }

    if !is_french_business {
        if local.len() > 30 {
            return false;
        }
        let digits = local.chars().filter(|c| c.is_ascii_digit()).count();
        if digits as f64 > local.len() as f64 * 0.6 {
            return false;
        }
        if local.chars().take(3).filter(|c| c.is_ascii_digit()).count() == 3 {
            return false;
        }
        if IP_DOMAIN.is_match(domain) {
            return false;
        }
    }

    if !EMAIL_SYNTAX.is_match(&email) {
        return false;
    }

    if local.len() > 64 || local.len() < 2 {
        return false;
    }
    if domain.len() > 253 {
        return false;
    }

    if !is_french_business {
        if local.matches('.').count() > 3 {
            return false;
        }
        if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
            return false;
        }
        if FIVE_DIGIT_RUN.is_match(local) {
            return false;
        }
    }

    true
}
