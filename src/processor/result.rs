use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which crawl strategy produced a company's emails, or why none were found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    WebMain,
    WebContact,
    WebAbout,
    WebOther,
    Sitemap,
    NotFound,
    NoDomain,
    Error,
}

impl DiscoveryMethod {
    /// Stable string form used in checkpoint and report files
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::WebMain => "web_main",
            DiscoveryMethod::WebContact => "web_contact",
            DiscoveryMethod::WebAbout => "web_about",
            DiscoveryMethod::WebOther => "web_other",
            DiscoveryMethod::Sitemap => "sitemap",
            DiscoveryMethod::NotFound => "not_found",
            DiscoveryMethod::NoDomain => "no_domain",
            DiscoveryMethod::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "web_main" => Some(DiscoveryMethod::WebMain),
            "web_contact" => Some(DiscoveryMethod::WebContact),
            "web_about" => Some(DiscoveryMethod::WebAbout),
            "web_other" => Some(DiscoveryMethod::WebOther),
            "sitemap" => Some(DiscoveryMethod::Sitemap),
            "not_found" => Some(DiscoveryMethod::NotFound),
            "no_domain" => Some(DiscoveryMethod::NoDomain),
            "error" => Some(DiscoveryMethod::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final, immutable outcome of processing one company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub company_name: String,
    pub domain: Option<String>,
    pub website: Option<String>,
    pub city: String,
    pub industry: String,
    /// Deduplicated, validated, sorted
    pub emails: Vec<String>,
    pub discovery_method: DiscoveryMethod,
    /// Always equals `!emails.is_empty()`
    pub success: bool,
    /// URLs that returned a usable text response
    pub pages_accessed: Vec<String>,
    pub processing_time_seconds: f64,
    pub extraction_stats: HashMap<String, u64>,
}
