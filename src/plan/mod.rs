//! Crawl planning: candidate URL generation and sitemap-URL prioritization
//!
//! The planner trades recall for throughput: a fixed, ordered candidate
//! list per domain, walked sequentially with early exit, instead of any
//! form of link-graph traversal.

use crate::url::Domain;

/// Category of a planned URL, in descending likelihood of holding contacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlCategory {
    Main,
    ContactHigh,
    ContactMedium,
    About,
    Team,
    Legal,
}

/// One candidate URL for a domain, never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlTarget {
    pub protocol: &'static str,
    pub host: String,
    pub path: String,
    pub category: UrlCategory,
}

impl CrawlTarget {
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.host, self.path)
    }
}

const CONTACT_HIGH_PATHS: &[&str] = &["/contact", "/nous-contacter", "/contactez-nous", "/contact-us"];
const CONTACT_MEDIUM_PATHS: &[&str] = &["/contact.html", "/contact.php", "/nous-contacter.html"];
const ABOUT_PATHS: &[&str] = &["/about", "/a-propos", "/qui-sommes-nous", "/about-us"];
const TEAM_PATHS: &[&str] = &["/team", "/equipe", "/notre-equipe", "/staff"];
const LEGAL_PATHS: &[&str] = &["/legal", "/mentions-legales", "/politique-confidentialite"];

/// High-value keywords for sitemap-URL scoring (+10)
const HIGH_KEYWORDS: &[&str] = &[
    "contact",
    "nous-contacter",
    "contactez-nous",
    "contact-us",
    "coordonnees",
    "nous-joindre",
];

/// Medium-value keywords (+5)
const MEDIUM_KEYWORDS: &[&str] = &[
    "about",
    "about-us",
    "a-propos",
    "qui-sommes-nous",
    "team",
    "equipe",
    "notre-equipe",
    "staff",
    "direction",
];

/// Low-value keywords (+2)
const LOW_KEYWORDS: &[&str] = &[
    "services",
    "prestations",
    "offres",
    "legal",
    "mentions",
    "politique",
    "privacy",
];

/// Maximum prioritized sitemap URLs handed to the fetch fan-out
pub const MAX_PRIORITY_URLS: usize = 8;

/// Builds the ordered candidate list for a domain.
///
/// Main pages first across scheme and `www.` variants, then the keyword
/// paths over https only. Socket authorities (mock servers, LAN hosts) get
/// their own scheme and no `www.` variant, since that name only resolves
/// as written.
pub fn plan(domain: &Domain) -> Vec<CrawlTarget> {
    let host = domain.as_str();
    let scheme = domain.preferred_scheme();

    let mut hosts = vec![host.to_string()];
    if !domain.is_socket_authority() && !host.starts_with("www.") {
        hosts.push(format!("www.{}", host));
    }

    let mut targets = Vec::new();

    if domain.is_socket_authority() {
        targets.push(CrawlTarget {
            protocol: scheme,
            host: host.to_string(),
            path: "/".to_string(),
            category: UrlCategory::Main,
        });
    } else {
        for scheme in ["https", "http"] {
            for host in &hosts {
                targets.push(CrawlTarget {
                    protocol: scheme,
                    host: host.clone(),
                    path: "/".to_string(),
                    category: UrlCategory::Main,
                });
            }
        }
    }

    let path_groups: &[(&[&str], UrlCategory)] = &[
        (CONTACT_HIGH_PATHS, UrlCategory::ContactHigh),
        (CONTACT_MEDIUM_PATHS, UrlCategory::ContactMedium),
        (ABOUT_PATHS, UrlCategory::About),
        (TEAM_PATHS, UrlCategory::Team),
        (LEGAL_PATHS, UrlCategory::Legal),
    ];

    for (paths, category) in path_groups {
        for path in *paths {
            for host in &hosts {
                targets.push(CrawlTarget {
                    protocol: scheme,
                    host: host.clone(),
                    path: path.to_string(),
                    category: *category,
                });
            }
        }
    }

    targets
}

/// Early-exit policy: stop the sequential walk once anything was found.
pub fn should_stop(found_emails: &[String], exhaustive: bool) -> bool {
    !exhaustive && !found_emails.is_empty()
}

/// Deterministic keyword score for one sitemap URL.
///
/// High keyword +10, medium +5, low +2 (first matching tier only); short
/// URLs (<= 4 slash-separated pieces) +1; query strings longer than 50
/// characters -2.
pub fn score_url(url: &str) -> (i32, &'static str) {
    let url_lower = url.to_lowercase();
    let mut score = 0;
    let mut category = "other";

    if HIGH_KEYWORDS.iter().any(|kw| url_lower.contains(kw)) {
        score += 10;
        category = "high";
    } else if MEDIUM_KEYWORDS.iter().any(|kw| url_lower.contains(kw)) {
        score += 5;
        category = "medium";
    } else if LOW_KEYWORDS.iter().any(|kw| url_lower.contains(kw)) {
        score += 2;
        category = "low";
    }

    if url.split('/').count() <= 4 {
        score += 1;
    }

    if let Some((_, query)) = url.split_once('?') {
        if query.len() > 50 {
            score -= 2;
        }
    }

    (score, category)
}

/// Ranks sitemap URLs by score and applies per-category caps.
///
/// The sort is stable, so equal scores keep their discovery order. Caps:
/// 3 high, 2 medium, 2 low, 1 other, at most [`MAX_PRIORITY_URLS`] total.
pub fn prioritize_sitemap_urls(urls: &[String]) -> Vec<String> {
    let mut scored: Vec<(usize, i32, &'static str)> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let (score, category) = score_url(url);
            (i, score, category)
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let mut high = 0usize;
    let mut medium = 0usize;
    let mut low = 0usize;
    let mut other = 0usize;
    let mut prioritized = Vec::new();

    for (idx, _, category) in scored {
        let counter = match category {
            "high" => &mut high,
            "medium" => &mut medium,
            "low" => &mut low,
            _ => &mut other,
        };
        let cap = match category {
            "high" => 3,
            "medium" | "low" => 2,
            _ => 1,
        };
        if *counter < cap {
            prioritized.push(urls[idx].clone());
            *counter += 1;
        }
        if prioritized.len() >= MAX_PRIORITY_URLS {
            break;
        }
    }

    prioritized
}
