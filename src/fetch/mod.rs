//! Connection manager
//!
//! One pooled `reqwest` client shared by every worker. Ordinary network
//! failures are values, not errors: each attempt folds its failure mode
//! into a short tag on the [`FetchOutcome`], and the caller always gets an
//! outcome back. Redirects are followed manually with an explicit hop
//! bound, and TLS failures get exactly one plain-HTTP fallback.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use tracing::{debug, trace};
use url::Url;

/// Rotated per request; 403/429 responses get a fresh pick on retry
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Reject responses announcing more than this up front
const MAX_CONTENT_LENGTH: u64 = 10 * 1024 * 1024;
/// Stop accumulating body bytes past this, keeping what was read
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
/// Manual redirect hop bound
const MAX_REDIRECT_HOPS: usize = 3;

/// Result of fetching one URL, including every error tag accumulated
/// across retries
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub url: String,
    pub content: Option<String>,
    pub errors: Vec<String>,
    pub ok: bool,
}

impl FetchOutcome {
    fn failure(url: String, errors: Vec<String>) -> Self {
        Self {
            url,
            content: None,
            errors,
            ok: false,
        }
    }
}

/// What a single attempt concluded, before retry policy is applied
enum Attempt {
    Success(String),
    /// Retry may help (timeout, connection error, 5xx, rate limit)
    Retry,
    /// No retry will help (content too large, wrong content type on a page
    /// that answered fine)
    Fatal,
}

/// Pooled HTTP client with the retry/redirect/TLS-fallback policy
///
/// `rewrites` maps a domain to a replacement base URL; any planned URL for
/// that domain is sent to the replacement instead, preserving path and
/// query. This is how integration tests point real-looking domains at a
/// local mock server.
pub struct Fetcher {
    client: reqwest::Client,
    rewrites: HashMap<String, String>,
}

impl Fetcher {
    pub fn new() -> crate::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        // No client-level timeout: each request carries its own escalating
        // one. Small-business sites are full of broken certificates, hence
        // the invalid-cert acceptance.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(20)
            .redirect(Policy::none())
            .danger_accept_invalid_certs(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            rewrites: HashMap::new(),
        })
    }

    /// Redirects every URL whose host resolves to `domain` (ignoring a
    /// leading `www.`) to `base` instead, keeping path and query.
    pub fn with_rewrite(mut self, domain: &str, base: &str) -> Self {
        self.rewrites
            .insert(domain.to_string(), base.trim_end_matches('/').to_string());
        self
    }

    fn apply_rewrite(&self, url: &str) -> String {
        if self.rewrites.is_empty() {
            return url.to_string();
        }
        let parsed = match Url::parse(url) {
            Ok(p) => p,
            Err(_) => return url.to_string(),
        };
        let host = match parsed.host_str() {
            Some(h) => h.trim_start_matches("www.").to_string(),
            None => return url.to_string(),
        };
        match self.rewrites.get(&host) {
            Some(base) => {
                let mut rewritten = format!("{}{}", base, parsed.path());
                if let Some(query) = parsed.query() {
                    rewritten.push('?');
                    rewritten.push_str(query);
                }
                rewritten
            }
            None => url.to_string(),
        }
    }

    /// Fetches one URL with up to `max_retries` additional attempts.
    ///
    /// Timeouts escalate with the attempt index; retries are preceded by a
    /// jittered delay so parallel workers hitting the same slow host do not
    /// align their retries.
    pub async fn fetch(&self, url: &str, max_retries: usize) -> FetchOutcome {
        let target = self.apply_rewrite(url);
        let mut errors = Vec::new();

        for attempt in 0..=max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(jitter_ms(attempt))).await;
            }
            let timeout = Duration::from_millis(2000 + 500 * attempt as u64);

            match self.attempt(&target, timeout, &mut errors).await {
                Attempt::Success(content) => {
                    return FetchOutcome {
                        url: url.to_string(),
                        content: Some(content),
                        errors,
                        ok: true,
                    };
                }
                Attempt::Fatal => break,
                Attempt::Retry => {
                    // 403/429 get a short pause before the rotated retry.
                    let rate_limited = errors
                        .last()
                        .map(|e| e.as_str() == "http_403" || e.as_str() == "http_429")
                        .unwrap_or(false);
                    if rate_limited
                        && attempt < max_retries
                    {
                        tokio::time::sleep(Duration::from_millis(rate_limit_pause_ms())).await;
                    }
                }
            }
        }

        trace!(url, ?errors, "fetch failed");
        FetchOutcome::failure(url.to_string(), errors)
    }

    /// One attempt: a bounded manual-redirect loop around a single logical
    /// request.
    async fn attempt(&self, url: &str, timeout: Duration, errors: &mut Vec<String>) -> Attempt {
        let mut current = url.to_string();
        let mut visited: HashSet<String> = HashSet::new();

        for _hop in 0..=MAX_REDIRECT_HOPS {
            visited.insert(current.clone());

            let response = self
                .client
                .get(&current)
                .header(USER_AGENT, pick_user_agent())
                .timeout(timeout)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    if e.is_timeout() {
                        errors.push("timeout".to_string());
                        return Attempt::Retry;
                    }
                    if is_tls_error(&e) {
                        errors.push("ssl_error".to_string());
                        return self.https_fallback(&current, timeout, errors).await;
                    }
                    if e.is_connect() {
                        errors.push("connection_error".to_string());
                        return Attempt::Retry;
                    }
                    errors.push("request_error".to_string());
                    return Attempt::Retry;
                }
            };

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match location {
                    Some(location) => {
                        let next = resolve_location(&current, &location);
                        if visited.contains(&next) {
                            errors.push("redirect_loop".to_string());
                            return Attempt::Fatal;
                        }
                        debug!(from = %current, to = %next, "following redirect");
                        current = next;
                        continue;
                    }
                    None => {
                        errors.push(format!("http_{}", status.as_u16()));
                        return Attempt::Retry;
                    }
                }
            }

            if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
                errors.push(format!("http_{}", status.as_u16()));
                return Attempt::Retry;
            }

            if !status.is_success() {
                errors.push(format!("http_{}", status.as_u16()));
                return Attempt::Retry;
            }

            if let Some(length) = response.content_length() {
                if length > MAX_CONTENT_LENGTH {
                    errors.push(format!("content_too_large_{}", length));
                    return Attempt::Fatal;
                }
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_lowercase();

            let body = match self.read_capped(response, errors).await {
                Some(body) => body,
                None => return Attempt::Retry,
            };

            if acceptable_content(&content_type, &body) {
                return Attempt::Success(body);
            }
            errors.push("invalid_content_type".to_string());
            return Attempt::Fatal;
        }

        errors.push("redirect_loop".to_string());
        Attempt::Fatal
    }

    /// Streams the body with a hard byte cap; past the cap the tag is
    /// recorded and the truncated body kept.
    async fn read_capped(
        &self,
        mut response: reqwest::Response,
        errors: &mut Vec<String>,
    ) -> Option<String> {
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    bytes.extend_from_slice(&chunk);
                    if bytes.len() > MAX_BODY_BYTES {
                        errors.push("content_size_exceeded".to_string());
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    errors.push("request_error".to_string());
                    return None;
                }
            }
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// One plain-HTTP fallback after a TLS failure on the same URL. The
    /// body goes through the same size caps and content-type acceptance as
    /// the regular path.
    async fn https_fallback(
        &self,
        url: &str,
        timeout: Duration,
        errors: &mut Vec<String>,
    ) -> Attempt {
        let Some(stripped) = url.strip_prefix("https://") else {
            return Attempt::Retry;
        };
        let http_url = format!("http://{}", stripped);
        let response = self
            .client
            .get(&http_url)
            .header(USER_AGENT, pick_user_agent())
            .timeout(timeout)
            .send()
            .await;
        let Ok(response) = response else {
            return Attempt::Retry;
        };
        if !response.status().is_success() {
            return Attempt::Retry;
        }
        if let Some(length) = response.content_length() {
            if length > MAX_CONTENT_LENGTH {
                errors.push(format!("content_too_large_{}", length));
                return Attempt::Fatal;
            }
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let Some(body) = self.read_capped(response, errors).await else {
            return Attempt::Retry;
        };
        if acceptable_content(&content_type, &body) {
            Attempt::Success(body)
        } else {
            errors.push("invalid_content_type".to_string());
            Attempt::Fatal
        }
    }

    /// Simple bounded GET used for robots.txt and sitemap files.
    pub async fn get_text(&self, url: &str, timeout: Duration) -> Option<String> {
        let target = self.apply_rewrite(url);
        let response = self
            .client
            .get(&target)
            .header(USER_AGENT, pick_user_agent())
            .timeout(timeout)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }

    /// HEAD probe for conventional sitemap locations.
    pub async fn probe(&self, url: &str) -> bool {
        let target = self.apply_rewrite(url);
        self.client
            .head(&target)
            .header(USER_AGENT, pick_user_agent())
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

fn pick_user_agent() -> &'static str {
    USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())]
}

/// 100-300 ms scaled by attempt index
fn jitter_ms(attempt: usize) -> u64 {
    rand::thread_rng().gen_range(100..=300) * attempt as u64
}

/// 500-1000 ms pause before retrying a rate-limited host
fn rate_limit_pause_ms() -> u64 {
    rand::thread_rng().gen_range(500..=1000)
}

/// Whether a 2xx body is worth extracting from. An absent content type is
/// accepted only when the body itself looks like HTML.
fn acceptable_content(content_type: &str, body: &str) -> bool {
    if content_type.is_empty() {
        let head = body.to_lowercase();
        head.contains("<html") || head.contains("<!doctype")
    } else {
        content_type.contains("text/html")
            || content_type.contains("text/plain")
            || content_type.contains("application/xhtml")
            || content_type.contains("text/")
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let description = format!("{:?}", error).to_lowercase();
    description.contains("certificate") || description.contains("tls") || description.contains("ssl")
}

fn resolve_location(current: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }
    match Url::parse(current).and_then(|base| base.join(location)) {
        Ok(joined) => joined.to_string(),
        Err(_) => location.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html>contact@acme.fr</html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let outcome = fetcher.fetch(&format!("{}/", server.uri()), 1).await;
        assert!(outcome.ok);
        assert!(outcome.content.unwrap().contains("contact@acme.fr"));
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_404_tagged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let outcome = fetcher.fetch(&format!("{}/missing", server.uri()), 1).await;
        assert!(!outcome.ok);
        assert!(outcome.content.is_none());
        assert!(outcome.errors.contains(&"http_404".to_string()));
    }

    #[tokio::test]
    async fn test_redirect_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html>moved fine</html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let outcome = fetcher.fetch(&format!("{}/old", server.uri()), 0).await;
        assert!(outcome.ok);
        assert!(outcome.content.unwrap().contains("moved fine"));
    }

    #[tokio::test]
    async fn test_redirect_loop_detected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let outcome = fetcher.fetch(&format!("{}/a", server.uri()), 0).await;
        assert!(!outcome.ok);
        assert!(outcome.errors.contains(&"redirect_loop".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_content_type_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("PDF-1.4 garbage", "application/pdf"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let outcome = fetcher.fetch(&format!("{}/brochure", server.uri()), 1).await;
        assert!(!outcome.ok);
        assert!(outcome.errors.contains(&"invalid_content_type".to_string()));
    }

    #[tokio::test]
    async fn test_missing_content_type_html_sniff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<!DOCTYPE html><p>ok</p>"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let outcome = fetcher.fetch(&format!("{}/", server.uri()), 0).await;
        // wiremock sets a text/plain content type for string bodies, which
        // is accepted either way.
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn test_oversized_content_length_rejected() {
        let server = MockServer::start().await;
        // 11 MB announced and served; the up-front check must refuse it
        // without tagging anything else.
        let body = vec![b'a'; 11 * 1024 * 1024];
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let outcome = fetcher.fetch(&format!("{}/heavy", server.uri()), 0).await;
        assert!(!outcome.ok);
        assert!(outcome.content.is_none());
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.starts_with("content_too_large_")));
    }

    #[tokio::test]
    async fn test_body_capped_but_kept() {
        let server = MockServer::start().await;
        // 6 MB passes the length check but exceeds the accumulation cap;
        // the truncated body is kept and tagged.
        let mut body = String::from("<html>contact@acme.fr ");
        body.push_str(&"a".repeat(6 * 1024 * 1024));
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let outcome = fetcher.fetch(&format!("{}/", server.uri()), 0).await;
        assert!(outcome.ok);
        assert!(outcome
            .errors
            .contains(&"content_size_exceeded".to_string()));
        let content = outcome.content.unwrap();
        assert!(content.contains("contact@acme.fr"));
        assert!(content.len() < 6 * 1024 * 1024);
    }

    #[test]
    fn test_acceptable_content() {
        assert!(acceptable_content("text/html; charset=utf-8", ""));
        assert!(acceptable_content("text/plain", "contact@acme.fr"));
        assert!(acceptable_content("", "<!DOCTYPE html><p>x</p>"));
        assert!(!acceptable_content("application/pdf", "%PDF-1.4"));
        assert!(!acceptable_content("", "binary junk"));
    }

    #[tokio::test]
    async fn test_rewrite_preserves_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html>bonjour</html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new()
            .unwrap()
            .with_rewrite("acme.fr", &server.uri());
        let outcome = fetcher.fetch("https://www.acme.fr/contact", 0).await;
        assert!(outcome.ok);
        // The outcome reports the logical URL, not the rewritten one.
        assert_eq!(outcome.url, "https://www.acme.fr/contact");
    }

    #[tokio::test]
    async fn test_probe() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        assert!(fetcher.probe(&format!("{}/sitemap.xml", server.uri())).await);
        assert!(!fetcher.probe(&format!("{}/nothing.xml", server.uri())).await);
    }
}
