//! Company input records
//!
//! Source files come from several scraping pipelines that disagree on column
//! names, so every logical field is resolved through an ordered alias table.

use serde_json::Value;

/// Aliases consulted, in priority order, for each logical field
pub const NAME_ALIASES: &[&str] = &["name", "company_name", "raw_name", "business_name"];
pub const WEBSITE_ALIASES: &[&str] = &["website", "domain", "url", "website_url", "site_web"];
pub const CITY_ALIASES: &[&str] = &["city", "ville", "address", "location", "adresse"];
pub const INDUSTRY_ALIASES: &[&str] = &[
    "industry",
    "secteur",
    "main_category",
    "categories",
    "category",
    "business_type",
];

/// One company to process
///
/// Identity for deduplication and checkpoint lookups is `name`; `row` carries
/// the source line number for logging only (two distinct companies sharing a
/// name still collide, which matches the checkpoint file contract).
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRecord {
    pub name: String,
    pub website: Option<String>,
    pub city: String,
    pub industry: String,
    pub row: usize,
}

impl CompanyRecord {
    /// Builds a record from a parsed JSON object, resolving field aliases.
    ///
    /// Returns `None` when no alias yields a usable company name; such rows
    /// are skipped by the loader.
    pub fn from_json(value: &Value, row: usize) -> Option<Self> {
        let name = field_value(value, NAME_ALIASES)?;
        let website = field_value(value, WEBSITE_ALIASES);
        let mut city = field_value(value, CITY_ALIASES).unwrap_or_default();
        let industry = field_value(value, INDUSTRY_ALIASES).unwrap_or_default();

        // Some exports nest the city under a detailed_address object.
        if city.is_empty() {
            if let Some(nested) = value.get("detailed_address").and_then(|a| a.get("city")) {
                city = scalar_to_string(nested).unwrap_or_default();
            }
        }

        Some(Self {
            name,
            website,
            city,
            industry,
            row,
        })
    }
}

/// Returns the first usable value among the aliased fields.
///
/// Blank strings and the spreadsheet null spellings ("nan", "null", "none")
/// count as absent.
pub fn field_value(record: &Value, aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        if let Some(raw) = record.get(*alias) {
            if let Some(text) = scalar_to_string(raw) {
                return Some(text);
            }
        }
    }
    None
}

fn scalar_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    if matches!(text.to_lowercase().as_str(), "nan" | "null" | "none") {
        return None;
    }
    Some(text)
}
