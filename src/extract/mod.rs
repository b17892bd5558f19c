//! Email extraction pipeline
//!
//! Layered, deliberately redundant passes over one fetched page: regex
//! matchers on the decoded text, Base64 probing, and a DOM pass. Extraction
//! itself never rejects a candidate; filtering belongs to the validator.
//! Every pass reports how much it contributed through the stats map.

mod decode;
mod dom;
pub mod patterns;

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::url::Domain;
use crate::validate::is_valid;
use decode::decode_obfuscated;
use patterns::{
    BASE64_TOKEN, EMAIL_MAIN, EMAIL_SPACED, ENTITY_AT, JS_CONCAT, JS_QUOTES, MAILTO, TLD_GARBAGE,
    TRAILING_DIGITS, TRAILING_JUNK_WORDS, VALID_AFTER_TLD,
};

/// Base64 tokens decoded per page; beyond this the cost outweighs the yield
const MAX_BASE64_TOKENS: usize = 10;

fn bump(stats: &mut HashMap<String, u64>, key: &str, by: u64) {
    *stats.entry(key.to_string()).or_insert(0) += by;
}

/// Extracts validated emails from one page.
///
/// `company_domain` drives the affinity rule during final validation; pass
/// `None` when no domain is known (sitemap pages still know it, so in
/// practice this is only `None` in tests).
///
/// Returns the sorted, deduplicated emails plus the per-source stats map.
pub fn extract_emails(
    html: &str,
    company_domain: Option<&Domain>,
) -> (Vec<String>, HashMap<String, u64>) {
    let mut stats = HashMap::new();
    if html.is_empty() {
        return (Vec::new(), stats);
    }

    let mut candidates: HashSet<String> = HashSet::new();

    let decoded = decode_obfuscated(html);
    bump(
        &mut stats,
        "content_decoded",
        if decoded != html { 1 } else { 0 },
    );

    // Pass 1: regex matchers over the decoded text.
    let mut count = 0;
    for m in EMAIL_MAIN.find_iter(&decoded) {
        candidates.insert(m.as_str().to_lowercase());
        count += 1;
    }
    if count > 0 {
        bump(&mut stats, "pattern_main", count);
    }

    count = 0;
    for caps in EMAIL_SPACED.captures_iter(&decoded) {
        candidates.insert(format!("{}@{}", &caps[1], &caps[2]).to_lowercase());
        count += 1;
    }
    if count > 0 {
        bump(&mut stats, "pattern_spaced", count);
    }

    count = 0;
    for caps in JS_CONCAT.captures_iter(&decoded) {
        candidates.insert(format!("{}@{}", &caps[1], &caps[2]).to_lowercase());
        count += 1;
    }
    if count > 0 {
        bump(&mut stats, "pattern_js_concat", count);
    }

    count = 0;
    for caps in JS_QUOTES.captures_iter(&decoded) {
        candidates.insert(caps[1].to_lowercase());
        count += 1;
    }
    if count > 0 {
        bump(&mut stats, "pattern_js_quotes", count);
    }

    count = 0;
    for caps in MAILTO.captures_iter(&decoded) {
        candidates.insert(caps[1].to_lowercase());
        count += 1;
    }
    if count > 0 {
        bump(&mut stats, "pattern_mailto", count);
    }

    // Entity-encoded @ only survives in the raw markup.
    count = 0;
    for caps in ENTITY_AT.captures_iter(html) {
        candidates.insert(format!("{}@{}", &caps[1], &caps[2]).to_lowercase());
        count += 1;
    }
    if count > 0 {
        bump(&mut stats, "pattern_entity", count);
    }

    // Pass 2: Base64 probing.
    let tokens: Vec<&str> = BASE64_TOKEN
        .find_iter(&decoded)
        .map(|m| m.as_str())
        .take(MAX_BASE64_TOKENS)
        .collect();
    bump(&mut stats, "base64_found", tokens.len() as u64);
    for token in tokens {
        let trimmed = token.trim_end_matches('=');
        if let Ok(bytes) = STANDARD_NO_PAD.decode(trimmed) {
            let text = String::from_utf8_lossy(&bytes);
            if text.contains('@') && text.contains('.') {
                let mut found = false;
                for m in EMAIL_MAIN.find_iter(&text) {
                    candidates.insert(m.as_str().to_lowercase());
                    found = true;
                }
                if found {
                    bump(&mut stats, "base64_decoded", 1);
                }
            }
        }
    }

    // Pass 3: DOM sources.
    dom::collect_dom_candidates(html, &mut candidates, &mut stats);

    // Clean and validate.
    let raw_count = candidates.len() as u64;
    bump(&mut stats, "raw_emails_found", raw_count);

    let cleaned = clean_candidates(candidates);
    bump(&mut stats, "after_cleaning", cleaned.len() as u64);

    let mut valid: Vec<String> = cleaned
        .into_iter()
        .filter(|email| is_valid(email, company_domain))
        .collect();
    valid.sort();
    valid.dedup();

    bump(&mut stats, "final_valid", valid.len() as u64);
    bump(
        &mut stats,
        "filtered_out",
        raw_count.saturating_sub(valid.len() as u64),
    );

    (valid, stats)
}

/// Repairs concatenation damage on raw candidates: words or digits glued to
/// the end of the domain by text-flow, and garbage letters after a valid
/// TLD. Candidates that still fail basic validation afterwards are dropped.
fn clean_candidates(candidates: HashSet<String>) -> Vec<String> {
    let mut cleaned: HashSet<String> = HashSet::new();

    for raw in candidates {
        let mut email = raw.trim().to_lowercase();
        if email.is_empty() {
            continue;
        }

        for word in TRAILING_JUNK_WORDS {
            if let Some(stripped) = email.strip_suffix(word) {
                email = stripped.to_string();
            }
        }
        email = TRAILING_DIGITS.replace(&email, "").into_owned();

        if let Some(caps) = TLD_GARBAGE.captures(&email) {
            let after_tld = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            if !VALID_AFTER_TLD.contains(&after_tld) && after_tld.len() > 4 {
                let cut = caps.get(2).map(|m| m.start()).unwrap_or(email.len());
                email.truncate(cut);
            }
        }

        if is_valid(&email, None) {
            cleaned.insert(email);
        }
    }

    cleaned.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::clean_website;

    #[test]
    fn test_plain_text_email() {
        let html = "<html><body><p>Contact: contact@acme.fr</p></body></html>";
        let (emails, stats) = extract_emails(html, None);
        assert_eq!(emails, vec!["contact@acme.fr"]);
        assert!(stats.get("pattern_main").copied().unwrap_or(0) >= 1);
        assert_eq!(stats.get("final_valid"), Some(&1));
    }

    #[test]
    fn test_spaced_email() {
        let html = "<html><body>ecrivez a contact @ acme.fr</body></html>";
        let (emails, _) = extract_emails(html, None);
        assert_eq!(emails, vec!["contact@acme.fr"]);
    }

    #[test]
    fn test_js_concatenation() {
        let html = r#"<html><body><script>var e = "info" + "@" + "acme.fr";</script></body></html>"#;
        let (emails, stats) = extract_emails(html, None);
        assert!(emails.contains(&"info@acme.fr".to_string()));
        assert!(stats.get("pattern_js_concat").copied().unwrap_or(0) >= 1);
    }

    #[test]
    fn test_entity_encoded_at() {
        let html = "<html><body>contact&#64;acme.fr</body></html>";
        let (emails, _) = extract_emails(html, None);
        assert!(emails.contains(&"contact@acme.fr".to_string()));
    }

    #[test]
    fn test_base64_payload() {
        use base64::engine::general_purpose::STANDARD;
        let encoded = STANDARD.encode("mail: direction@acme.fr ok");
        let html = format!("<html><body><div data-blob=\"{}\"></div></body></html>", encoded);
        let (emails, stats) = extract_emails(&html, None);
        assert!(emails.contains(&"direction@acme.fr".to_string()));
        assert!(stats.get("base64_decoded").copied().unwrap_or(0) >= 1);
    }

    #[test]
    fn test_affinity_filters_third_party() {
        let domain = clean_website("acme.fr").unwrap();
        let html = "<html><body>contact@acme.fr support@platformhost.io</body></html>";
        let (emails, stats) = extract_emails(html, Some(&domain));
        assert_eq!(emails, vec!["contact@acme.fr"]);
        assert!(stats.get("filtered_out").copied().unwrap_or(0) >= 1);
    }

    #[test]
    fn test_candidates_deduplicated_across_passes() {
        let html = r#"<html><body><a href="mailto:info@acme.fr">info@acme.fr</a></body></html>"#;
        let (emails, _) = extract_emails(html, None);
        assert_eq!(emails, vec!["info@acme.fr"]);
    }

    #[test]
    fn test_glued_junk_trimmed() {
        let html = "<html><body>ecrivez contact@acme.frfacebook</body></html>";
        let (emails, _) = extract_emails(html, None);
        assert_eq!(emails, vec!["contact@acme.fr"]);
    }

    #[test]
    fn test_empty_content() {
        let (emails, stats) = extract_emails("", None);
        assert!(emails.is_empty());
        assert!(stats.is_empty());
    }

    #[test]
    fn test_spam_local_part_rejected() {
        let html = "<html><body>a1b2c3d4e5f60789@acme.com</body></html>";
        let (emails, _) = extract_emails(html, None);
        assert!(emails.is_empty());
    }
}
