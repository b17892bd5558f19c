//! Compiled pattern table shared by the extraction passes

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// General `local@domain.tld` matcher with word boundaries
    pub static ref EMAIL_MAIN: Regex =
        Regex::new(r"(?i)\b[a-zA-Z0-9._%+-]{1,64}@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b").unwrap();

    /// Whitespace tolerated around the `@` ("contact @ acme.fr")
    pub static ref EMAIL_SPACED: Regex =
        Regex::new(r"(?i)([a-zA-Z0-9._%+-]+)\s*@\s*([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})").unwrap();

    /// JavaScript string concatenation: "contact" + "@" + "acme.fr"
    pub static ref JS_CONCAT: Regex = Regex::new(
        r#"(?i)["']([a-zA-Z0-9._%+-]+)["']\s*\+\s*["']@["']\s*\+\s*["']([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})["']"#
    )
    .unwrap();

    /// Whole email inside a JS string literal
    pub static ref JS_QUOTES: Regex = Regex::new(
        r#"(?i)["']([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})["']"#
    )
    .unwrap();

    /// mailto: href or inline text
    pub static ref MAILTO: Regex = Regex::new(
        r#"(?i)mailto:\s*["']?([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})["']?"#
    )
    .unwrap();

    /// `@` hidden behind its HTML entity, matched on the raw markup before
    /// entity decoding collapses it
    pub static ref ENTITY_AT: Regex = Regex::new(
        r"(?i)([a-zA-Z0-9._%+-]+)&#0*64;([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})"
    )
    .unwrap();

    /// Base64-looking runs worth a decode attempt
    pub static ref BASE64_TOKEN: Regex = Regex::new(r"[A-Za-z0-9+/]{20,}={0,2}").unwrap();

    pub static ref HEX_ESCAPE: Regex = Regex::new(r"\\x([0-9a-fA-F]{2})").unwrap();
    pub static ref UNICODE_ESCAPE: Regex = Regex::new(r"\\u([0-9a-fA-F]{4})").unwrap();

    /// Valid-looking TLD immediately followed by more letters, the classic
    /// symptom of an email glued to the following word in page text
    pub static ref TLD_GARBAGE: Regex = Regex::new(r"(\.[a-z]{2,4})([a-z]+)$").unwrap();

    pub static ref TRAILING_DIGITS: Regex = Regex::new(r"[0-9]+$").unwrap();
}

/// Words that commonly end up glued to the tail of an extracted address
pub const TRAILING_JUNK_WORDS: &[&str] = &["facebook", "atelier", "contact"];

/// Second-level labels that legitimately follow a dot-TLD-looking prefix
/// (`acme.com.fr` style); these must survive the glue-trimming pass
pub const VALID_AFTER_TLD: &[&str] = &["com", "org", "net", "edu", "gov"];
