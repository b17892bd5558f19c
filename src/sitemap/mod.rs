//! Sitemap fallback discovery
//!
//! Runs only when the sequential crawl found nothing: locate a sitemap via
//! robots.txt or conventional paths, rank its URLs by contact likelihood,
//! and fetch a small prioritized subset. `<loc>` entries are pulled with a
//! regex rather than a full XML parse; real-world sitemaps are full of
//! encoding junk that a strict parser chokes on.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::extract::extract_emails;
use crate::fetch::Fetcher;
use crate::plan::prioritize_sitemap_urls;
use crate::url::Domain;

lazy_static! {
    static ref LOC: Regex = Regex::new(r"(?i)<loc>\s*([^<]+?)\s*</loc>").unwrap();
}

const CONVENTIONAL_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemaps.xml",
    "/sitemap/sitemap.xml",
];

/// At most this many sitemap files are consulted per domain
const MAX_SITEMAPS: usize = 2;
/// URL caps mirroring the prioritizer's expectations
const MAX_URLS_PER_SITEMAP: usize = 15;
const MAX_URLS_PER_NESTED: usize = 5;
/// Concurrent page fetches during the final fan-out
const FANOUT: usize = 4;

/// Outcome of the sitemap fallback for one domain
#[derive(Debug, Default)]
pub struct SitemapDiscovery {
    pub emails: Vec<String>,
    pub pages: Vec<String>,
    pub stats: HashMap<String, u64>,
}

fn bump(stats: &mut HashMap<String, u64>, key: &str, by: u64) {
    *stats.entry(key.to_string()).or_insert(0) += by;
}

/// Full sitemap fallback: locate, parse, prioritize, fetch, extract.
pub async fn discover(fetcher: &Fetcher, domain: &Domain) -> SitemapDiscovery {
    let mut result = SitemapDiscovery::default();
    let base = format!("{}://{}", domain.preferred_scheme(), domain.as_str());

    let sitemap_urls = locate_sitemaps(fetcher, &base).await;
    bump(&mut result.stats, "sitemaps_found", sitemap_urls.len() as u64);
    if sitemap_urls.is_empty() {
        return result;
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut all_urls: Vec<String> = Vec::new();
    for sitemap_url in &sitemap_urls {
        let urls = load_sitemap(fetcher, sitemap_url).await;
        bump(&mut result.stats, "sitemap_urls_found", urls.len() as u64);
        for url in urls {
            if seen.insert(url.clone()) {
                all_urls.push(url);
            }
        }
    }

    let priority_urls = prioritize_sitemap_urls(&all_urls);
    bump(&mut result.stats, "priority_urls", priority_urls.len() as u64);
    debug!(domain = %domain, candidates = priority_urls.len(), "sitemap fallback fan-out");

    let mut email_set: HashSet<String> = HashSet::new();
    let mut fetches = stream::iter(priority_urls.into_iter().map(|url| async move {
        let outcome = fetcher.fetch(&url, 1).await;
        (url, outcome)
    }))
    .buffer_unordered(FANOUT);

    while let Some((url, outcome)) = fetches.next().await {
        let Some(content) = outcome.content else {
            continue;
        };
        result.pages.push(url);
        let (emails, extraction_stats) = extract_emails(&content, Some(domain));
        if !emails.is_empty() {
            bump(&mut result.stats, "successful_pages", 1);
            bump(&mut result.stats, "emails_from_sitemap", emails.len() as u64);
            for (key, value) in extraction_stats {
                bump(&mut result.stats, &format!("extraction_{}", key), value);
            }
            email_set.extend(emails);
        }
    }

    result.emails = email_set.into_iter().collect();
    result.emails.sort();
    result
}

/// Finds up to [`MAX_SITEMAPS`] sitemap URLs: robots.txt directives first,
/// then a parallel probe of conventional locations, first hit wins.
async fn locate_sitemaps(fetcher: &Fetcher, base: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    if let Some(robots) = fetcher
        .get_text(&format!("{}/robots.txt", base), Duration::from_secs(3))
        .await
    {
        for line in robots.lines() {
            if line.to_lowercase().contains("sitemap:") {
                if let Some(url) = line.splitn(2, ':').nth(1) {
                    let url = url.trim();
                    if !url.is_empty() && !found.iter().any(|f| f == url) {
                        found.push(url.to_string());
                    }
                }
            }
        }
    }

    if found.is_empty() {
        let candidates: Vec<String> = CONVENTIONAL_PATHS
            .iter()
            .map(|path| format!("{}{}", base, path))
            .collect();
        let mut probes = stream::iter(candidates.into_iter().map(|url| async move {
            let hit = fetcher.probe(&url).await;
            (hit, url)
        }))
        .buffer_unordered(FANOUT);

        while let Some((hit, url)) = probes.next().await {
            if hit {
                found.push(url);
                break;
            }
        }
    }

    found.truncate(MAX_SITEMAPS);
    found
}

/// Loads one sitemap file, following a single level of sitemap-index
/// nesting, and returns its page URLs under the per-sitemap caps.
async fn load_sitemap(fetcher: &Fetcher, sitemap_url: &str) -> Vec<String> {
    let Some(content) = fetcher
        .get_text(sitemap_url, Duration::from_secs(5))
        .await
    else {
        return Vec::new();
    };

    let mut urls: Vec<String> = Vec::new();
    if content.contains("<sitemapindex") {
        for caps in LOC.captures_iter(&content) {
            if urls.len() >= MAX_URLS_PER_SITEMAP {
                break;
            }
            let nested_url = caps[1].trim().to_string();
            if let Some(nested) = fetcher.get_text(&nested_url, Duration::from_secs(5)).await {
                if !nested.contains("<sitemapindex") {
                    urls.extend(
                        LOC.captures_iter(&nested)
                            .take(MAX_URLS_PER_NESTED)
                            .map(|c| c[1].trim().to_string()),
                    );
                }
            }
        }
    } else {
        urls.extend(LOC.captures_iter(&content).map(|c| c[1].trim().to_string()));
    }

    urls.truncate(MAX_URLS_PER_SITEMAP);
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn xml(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_string(body.to_string())
            .insert_header("content-type", "application/xml")
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_string(body.to_string())
            .insert_header("content-type", "text/html")
    }

    #[tokio::test]
    async fn test_robots_directive_used() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "User-agent: *\nDisallow: /admin\nSitemap: {}/sitemap.xml\n",
                base
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(xml(&format!(
                "<urlset><url><loc>{}/contact</loc></url></urlset>",
                base
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contact"))
            .respond_with(html("<html><p>direction@acme.fr</p></html>"))
            .mount(&server)
            .await;

        let authority = base.trim_start_matches("http://").to_string();
        let domain = Domain::from_raw(authority);
        let fetcher = Fetcher::new().unwrap();
        let result = discover(&fetcher, &domain).await;

        assert_eq!(result.emails, vec!["direction@acme.fr"]);
        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.stats.get("sitemaps_found"), Some(&1));
        assert_eq!(result.stats.get("emails_from_sitemap"), Some(&1));
    }

    #[tokio::test]
    async fn test_conventional_probe_fallback() {
        let server = MockServer::start().await;
        let base = server.uri();

        // No robots.txt mock: it 404s, forcing the probe path.
        Mock::given(method("HEAD"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(xml(&format!(
                "<urlset><url><loc>{}/nous-contacter</loc></url></urlset>",
                base
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nous-contacter"))
            .respond_with(html("<html>accueil@acme.fr</html>"))
            .mount(&server)
            .await;

        let domain = Domain::from_raw(base.trim_start_matches("http://").to_string());
        let fetcher = Fetcher::new().unwrap();
        let result = discover(&fetcher, &domain).await;

        assert_eq!(result.emails, vec!["accueil@acme.fr"]);
    }

    #[tokio::test]
    async fn test_sitemap_index_nesting() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("HEAD"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(xml(&format!(
                "<sitemapindex><sitemap><loc>{}/pages.xml</loc></sitemap></sitemapindex>",
                base
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pages.xml"))
            .respond_with(xml(&format!(
                "<urlset><url><loc>{}/contact</loc></url><url><loc>{}/blog</loc></url></urlset>",
                base, base
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contact"))
            .respond_with(html("<html>contact@acme.fr</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blog"))
            .respond_with(html("<html>no address here</html>"))
            .mount(&server)
            .await;

        let domain = Domain::from_raw(base.trim_start_matches("http://").to_string());
        let fetcher = Fetcher::new().unwrap();
        let result = discover(&fetcher, &domain).await;

        assert_eq!(result.emails, vec!["contact@acme.fr"]);
        assert_eq!(result.stats.get("sitemap_urls_found"), Some(&2));
    }

    #[tokio::test]
    async fn test_no_sitemap_anywhere() {
        let server = MockServer::start().await;
        let domain = Domain::from_raw(server.uri().trim_start_matches("http://").to_string());
        let fetcher = Fetcher::new().unwrap();
        let result = discover(&fetcher, &domain).await;

        assert!(result.emails.is_empty());
        assert!(result.pages.is_empty());
        assert_eq!(result.stats.get("sitemaps_found"), Some(&0));
    }
}
