use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref DOMAIN_SYNTAX: Regex = Regex::new(r"^[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    static ref BARE_IPV4: Regex = Regex::new(r"^\d+\.\d+\.\d+\.\d+$").unwrap();
    static ref PORT_SUFFIX: Regex = Regex::new(r":\d+$").unwrap();
}

/// Social media hosts that are never a company's own website
const SOCIAL_MEDIA_DOMAINS: &[&str] = &[
    "facebook.com",
    "fb.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "snapchat.com",
    "pinterest.com",
    "whatsapp.com",
    "telegram.org",
    "discord.com",
    "reddit.com",
    "tumblr.com",
    "flickr.com",
    "vimeo.com",
    "dailymotion.com",
];

/// A validated, normalized hostname derived from a raw website string
///
/// Lower-cased, stripped of `www.`, port and query string. Guaranteed to
/// match domain syntax, not be a social-media host, not carry more than 3
/// subdomain labels and not be a bare IP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain(String);

impl Domain {
    /// Wraps an authority string without normalization or validation.
    ///
    /// Intended for callers that already hold a known-good host, including
    /// mock-server authorities like `127.0.0.1:8080` in tests. Regular input
    /// goes through [`clean_website`].
    pub fn from_raw(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the host is an explicit socket authority (IP or `host:port`)
    /// rather than a public DNS name. Such hosts cannot receive mail, so the
    /// domain-affinity check does not apply to them.
    pub fn is_socket_authority(&self) -> bool {
        self.0.contains(':') || BARE_IPV4.is_match(&self.0)
    }

    /// Returns the scheme to try first when building URLs for this host.
    ///
    /// Socket authorities (test servers, LAN boxes) do not serve TLS under
    /// their numeric name, so they get plain HTTP.
    pub fn preferred_scheme(&self) -> &'static str {
        if self.is_socket_authority() {
            "http"
        } else {
            "https"
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalizes a raw website string into a validated [`Domain`]
///
/// # Normalization steps
///
/// 1. Trim; reject anything shorter than 4 characters
/// 2. Drop the query string
/// 3. Strip stray `www.` / `http.` / `https.` prefixes that are not protocols
/// 4. Prepend `https://` when the protocol is missing and the value looks
///    like a host
/// 5. Parse; take the host (falling back to the first path segment when the
///    value parsed without an authority)
/// 6. Lower-case, strip `www.` and any port
/// 7. Reject social-media hosts, syntactically invalid hosts, hosts with
///    more than 3 dots, hosts longer than 253 characters, and bare IPs
///
/// Returns `None` when no usable domain can be derived; the caller records
/// a terminal `no_domain` result and never issues a request.
pub fn clean_website(raw: &str) -> Option<Domain> {
    let mut value = raw.trim().to_string();
    if value.len() < 4 {
        return None;
    }

    if let Some(idx) = value.find('?') {
        value.truncate(idx);
    }

    for prefix in ["www.", "http.", "https."] {
        if value.starts_with(prefix) && !value.starts_with("http://") && !value.starts_with("https://") {
            value = value[prefix.len()..].to_string();
        }
    }

    if !value.starts_with("http://") && !value.starts_with("https://") {
        if value.contains('.') && !value.starts_with('/') {
            value = format!("https://{}", value);
        } else {
            return None;
        }
    }

    let parsed = Url::parse(&value).ok()?;
    let host = match parsed.host_str() {
        Some(h) => h.to_string(),
        // "https://acme.com" typed as "https:/acme.com/contact" parses with
        // an empty authority; salvage the first path segment when it looks
        // like a host.
        None => {
            let first = parsed.path().trim_start_matches('/').split('/').next()?;
            if first.contains('.') {
                first.to_string()
            } else {
                return None;
            }
        }
    };

    let mut domain = host.to_lowercase();
    if let Some(stripped) = domain.strip_prefix("www.") {
        domain = stripped.to_string();
    }
    domain = PORT_SUFFIX.replace(&domain, "").into_owned();

    if SOCIAL_MEDIA_DOMAINS.contains(&domain.as_str()) {
        return None;
    }
    if !DOMAIN_SYNTAX.is_match(&domain) {
        return None;
    }
    if domain.matches('.').count() > 3 {
        return None;
    }
    if domain.len() > 253 {
        return None;
    }
    if BARE_IPV4.is_match(&domain) {
        return None;
    }

    Some(Domain(domain))
}
