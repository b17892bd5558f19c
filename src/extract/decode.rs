//! Obfuscation decoding applied before the regex passes

use unicode_normalization::UnicodeNormalization;

use super::patterns::{HEX_ESCAPE, UNICODE_ESCAPE};

/// Decodes the common obfuscation layers found on contact pages: HTML
/// entities (`&#64;`), Unicode lookalike characters (normalized via NFKD),
/// and `\xHH` / `\uHHHH` escape sequences left in inline JavaScript.
///
/// Undecodable escapes are left as-is; this stage must never lose content.
pub fn decode_obfuscated(content: &str) -> String {
    let unescaped = html_escape::decode_html_entities(content);
    let mut decoded: String = unescaped.nfkd().collect();

    if decoded.contains("\\x") {
        decoded = HEX_ESCAPE
            .replace_all(&decoded, |caps: &regex::Captures| {
                u8::from_str_radix(&caps[1], 16)
                    .ok()
                    .filter(|b| b.is_ascii())
                    .map(|b| (b as char).to_string())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
    }

    if decoded.contains("\\u") {
        decoded = UNICODE_ESCAPE
            .replace_all(&decoded, |caps: &regex::Captures| {
                u32::from_str_radix(&caps[1], 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
    }

    decoded
}
