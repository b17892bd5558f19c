//! DOM-level extraction pass
//!
//! Complements the regex passes with what only a parsed tree can reach:
//! mailto hrefs, contact-section elements and their attributes, structured
//! data blocks, microdata and HTML comments.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};

use super::patterns::EMAIL_MAIN;

/// Contact-bearing selector groups, most specific first. The stats key for
/// each group is derived from its first selector.
const CONTACT_SELECTORS: &[&str] = &[
    ".contact-email, .email, #email, [data-email]",
    ".contact-info, .contact-details, .contact-widget",
    ".footer-email, .email-address, footer",
    ".contact-form, form",
    "header, .nav, .navbar, .navigation",
    ".top-bar, .header-info, .site-header",
    ".widget-contact, .contact-section",
    r#"[itemprop*="email"], [itemtype*="ContactPoint"]"#,
];

/// Keyword groups matched against class/id of sectioning elements; legal
/// pages are included because French sites put contact details in their
/// mentions légales.
const SECTION_KEYWORDS: &[&[&str]] = &[
    &["contact", "coordonnees", "nous-contacter", "contactez"],
    &["equipe", "team", "staff", "direction"],
    &["legal", "mentions", "politique"],
];

const SECTION_TAGS: &[&str] = &["div", "section", "footer", "aside"];

lazy_static! {
    static ref MAILTO_ANCHOR: Selector = Selector::parse(r#"a[href^="mailto:"]"#).unwrap();
    static ref JSON_LD: Selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    static ref MICRODATA: Selector =
        Selector::parse(r#"[itemprop*="email"], [itemprop*="contact"]"#).unwrap();
}

fn bump(stats: &mut HashMap<String, u64>, key: &str, by: u64) {
    *stats.entry(key.to_string()).or_insert(0) += by;
}

fn scan_into(text: &str, emails: &mut HashSet<String>) -> u64 {
    let mut found = 0;
    for m in EMAIL_MAIN.find_iter(text) {
        emails.insert(m.as_str().to_lowercase());
        found += 1;
    }
    found
}

/// Text content of an element with script/style subtrees excluded, since
/// those hold analytics snippets full of fake address-shaped tokens.
fn visible_text(element: ElementRef) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        if let Some(text) = node.value().as_text() {
            let noisy = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| matches!(e.name(), "script" | "style"))
                    .unwrap_or(false)
            });
            if !noisy {
                out.push_str(text);
            }
        }
    }
    out
}

/// Runs every DOM extraction source over `html`, accumulating lower-cased
/// candidates into `emails` and per-source counts into `stats`.
pub fn collect_dom_candidates(
    html: &str,
    emails: &mut HashSet<String>,
    stats: &mut HashMap<String, u64>,
) {
    let document = Html::parse_document(html);

    // mailto anchors; the href may carry ?subject= or &body= suffixes.
    let mut mailto_links = 0;
    for anchor in document.select(&MAILTO_ANCHOR) {
        if let Some(href) = anchor.value().attr("href") {
            let address = href
                .trim_start_matches("mailto:")
                .split(['?', '&'])
                .next()
                .unwrap_or("")
                .trim();
            if !address.is_empty() {
                emails.insert(address.to_lowercase());
                mailto_links += 1;
            }
        }
    }
    if mailto_links > 0 {
        bump(stats, "mailto_links", mailto_links);
    }

    for group in CONTACT_SELECTORS {
        let selector = match Selector::parse(group) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let stat_key = format!(
            "selector_{}",
            group
                .split(',')
                .next()
                .unwrap_or(group)
                .replace(['.', '#'], "")
        );
        let mut matched = 0;
        for element in document.select(&selector) {
            matched += 1;
            let text = visible_text(element);
            if text.contains('@') {
                scan_into(&text, emails);
            }
            for (_, value) in element.value().attrs() {
                if value.contains('@') {
                    scan_into(value, emails);
                }
            }
        }
        if matched > 0 {
            bump(stats, &stat_key, matched);
        }
    }

    // JSON-LD blocks; only well-formed JSON is scanned.
    let mut json_ld_scripts = 0;
    let mut json_ld_emails = 0;
    for script in document.select(&JSON_LD) {
        json_ld_scripts += 1;
        let raw: String = script.text().collect();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
            json_ld_emails += scan_into(&value.to_string(), emails);
        }
    }
    if json_ld_scripts > 0 {
        bump(stats, "json_ld_scripts", json_ld_scripts);
        if json_ld_emails > 0 {
            bump(stats, "json_ld_emails", json_ld_emails);
        }
    }

    let mut microdata_elements = 0;
    for element in document.select(&MICRODATA) {
        microdata_elements += 1;
        let text = visible_text(element);
        if text.contains('@') {
            scan_into(&text, emails);
        }
    }
    if microdata_elements > 0 {
        bump(stats, "microdata_elements", microdata_elements);
    }

    // Emails are sometimes left in commented-out markup.
    let mut comment_emails = 0;
    for node in document.tree.nodes() {
        if let Some(comment) = node.value().as_comment() {
            if comment.contains('@') {
                comment_emails += scan_into(comment, emails);
            }
        }
    }
    if comment_emails > 0 {
        bump(stats, "comment_emails", comment_emails);
    }

    // French contact/team/legal sections located by class or id keyword.
    for element in document.root_element().descendants() {
        let el = match ElementRef::wrap(element) {
            Some(el) => el,
            None => continue,
        };
        if !SECTION_TAGS.contains(&el.value().name()) {
            continue;
        }
        let mut haystack = el.value().classes().collect::<Vec<_>>().join(" ");
        if let Some(id) = el.value().id() {
            haystack.push(' ');
            haystack.push_str(id);
        }
        let haystack = haystack.to_lowercase();
        let keyword_hit = SECTION_KEYWORDS
            .iter()
            .any(|group| group.iter().any(|kw| haystack.contains(kw)));
        if keyword_hit {
            let text = visible_text(el);
            if text.contains('@') {
                scan_into(&text, emails);
            }
        }
    }
}
