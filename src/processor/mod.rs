//! Per-company orchestration
//!
//! Drives planner, connection manager, extraction and validation for one
//! company and condenses everything into a [`ProcessingResult`]. Network
//! failures never escape this module; they end up as `error_*` counters in
//! the extraction stats.

mod result;

pub use result::{DiscoveryMethod, ProcessingResult};

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::debug;

use crate::company::CompanyRecord;
use crate::config::EngineConfig;
use crate::extract::extract_emails;
use crate::fetch::Fetcher;
use crate::plan::{plan, should_stop, UrlCategory};
use crate::sitemap;
use crate::url::{clean_website, Domain};

fn bump(stats: &mut HashMap<String, u64>, key: &str, by: u64) {
    *stats.entry(key.to_string()).or_insert(0) += by;
}

/// Processes one company end to end.
///
/// Terminal states: `no_domain` (zero network calls), `sitemap`/`web_*` on
/// success, `not_found` after the walk and the sitemap fallback both come
/// up empty.
pub async fn process_company(
    fetcher: &Fetcher,
    config: &EngineConfig,
    record: &CompanyRecord,
) -> ProcessingResult {
    let start = Instant::now();

    let domain = record.website.as_deref().and_then(clean_website);
    let Some(domain) = domain else {
        debug!(company = %record.name, website = ?record.website, "no usable domain");
        return ProcessingResult {
            company_name: record.name.clone(),
            domain: None,
            website: record.website.clone(),
            city: record.city.clone(),
            industry: record.industry.clone(),
            emails: Vec::new(),
            discovery_method: DiscoveryMethod::NoDomain,
            success: false,
            pages_accessed: Vec::new(),
            processing_time_seconds: start.elapsed().as_secs_f64(),
            extraction_stats: HashMap::new(),
        };
    };

    let discovery = discover_for_domain(fetcher, config, &domain).await;

    if !discovery.emails.is_empty() {
        debug!(
            company = %record.name,
            domain = %domain,
            count = discovery.emails.len(),
            method = %discovery.method,
            "emails found"
        );
    }

    ProcessingResult {
        company_name: record.name.clone(),
        domain: Some(domain.as_str().to_string()),
        website: record.website.clone(),
        city: record.city.clone(),
        industry: record.industry.clone(),
        success: !discovery.emails.is_empty(),
        emails: discovery.emails,
        discovery_method: discovery.method,
        pages_accessed: discovery.pages,
        processing_time_seconds: start.elapsed().as_secs_f64(),
        extraction_stats: discovery.stats,
    }
}

struct Discovery {
    emails: Vec<String>,
    method: DiscoveryMethod,
    pages: Vec<String>,
    stats: HashMap<String, u64>,
}

/// Sequential candidate walk with early exit, then the sitemap fallback.
async fn discover_for_domain(
    fetcher: &Fetcher,
    config: &EngineConfig,
    domain: &Domain,
) -> Discovery {
    let mut emails: Vec<String> = Vec::new();
    let mut pages: Vec<String> = Vec::new();
    let mut stats: HashMap<String, u64> = HashMap::new();
    let mut categories: HashSet<UrlCategory> = HashSet::new();

    for target in plan(domain) {
        if should_stop(&emails, config.exhaustive) {
            break;
        }

        let url = target.url();
        let outcome = fetcher.fetch(&url, config.fetch_retries).await;
        for tag in &outcome.errors {
            bump(&mut stats, &format!("error_{}", tag), 1);
        }

        let Some(content) = outcome.content else {
            continue;
        };

        let (page_emails, extraction_stats) = extract_emails(&content, Some(domain));
        if page_emails.is_empty() {
            continue;
        }

        for (key, value) in extraction_stats {
            bump(&mut stats, &format!("extraction_{}", key), value);
        }
        pages.push(url);
        categories.insert(target.category);
        emails.extend(page_emails);
    }

    if emails.is_empty() {
        let fallback = sitemap::discover(fetcher, domain).await;
        for (key, value) in fallback.stats {
            bump(&mut stats, &format!("sitemap_{}", key), value);
        }
        pages.extend(fallback.pages);
        if !fallback.emails.is_empty() {
            return Discovery {
                emails: fallback.emails,
                method: DiscoveryMethod::Sitemap,
                pages,
                stats,
            };
        }
    }

    emails.sort();
    emails.dedup();

    let method = if emails.is_empty() {
        DiscoveryMethod::NotFound
    } else if categories.contains(&UrlCategory::Main) {
        DiscoveryMethod::WebMain
    } else if categories.contains(&UrlCategory::ContactHigh)
        || categories.contains(&UrlCategory::ContactMedium)
    {
        DiscoveryMethod::WebContact
    } else if categories.contains(&UrlCategory::About) {
        DiscoveryMethod::WebAbout
    } else {
        DiscoveryMethod::WebOther
    };

    Discovery {
        emails,
        method,
        pages,
        stats,
    }
}
