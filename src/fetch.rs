//! Remote image download with retry and anti-hotlinking headers.

use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::{Client, StatusCode, Url};

use crate::error::GatewayError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/618.1.15 (KHTML, like Gecko) Version/17.4 Safari/618.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.2550.0",
];

const IMAGE_ACCEPT: &str = "image/png,image/jpeg,image/jpg,image/webp;q=0.9,image/gif;q=0.8,\
                            image/bmp;q=0.7,image/*;q=0.6,*/*;q=0.5";

/// Subdomain prefixes whose referer is the parent domain.
const MEDIA_PREFIXES: &[&str] = &["img.", "image.", "media.", "assets.", "static.", "cdn."];

/// Hosts that reject requests without a matching referer.
struct SiteRule {
    domain: &'static str,
    referer: &'static str,
    origin: &'static str,
    /// Use `https://www.pixiv.net/artworks/<id>` when the path holds an id.
    artwork_referer: bool,
}

const SITE_RULES: &[SiteRule] = &[
    SiteRule { domain: "pixiv.net", referer: "https://www.pixiv.net/", origin: "https://www.pixiv.net", artwork_referer: true },
    SiteRule { domain: "pximg.net", referer: "https://www.pixiv.net/", origin: "https://www.pixiv.net", artwork_referer: true },
    SiteRule { domain: "pinimg.com", referer: "https://www.pinterest.com/", origin: "https://www.pinterest.com", artwork_referer: false },
    SiteRule { domain: "twimg.com", referer: "https://twitter.com/", origin: "https://twitter.com", artwork_referer: false },
    SiteRule { domain: "cdninstagram.com", referer: "https://www.instagram.com/", origin: "https://www.instagram.com", artwork_referer: false },
    SiteRule { domain: "sinaimg.cn", referer: "https://weibo.com/", origin: "https://weibo.com", artwork_referer: false },
    SiteRule { domain: "zhimg.com", referer: "https://www.zhihu.com/", origin: "https://www.zhihu.com", artwork_referer: false },
];

/// How the `Referer` header is chosen for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefererMode {
    /// Site rule or smart referer.
    Derived,
    /// The image URL itself.
    SelfUrl,
    /// No referer at all.
    Omit,
}

/// A downloaded body with the extension its temp file should carry.
#[derive(Debug, Clone)]
pub struct Downloaded {
    /// Response body, never empty.
    pub bytes: Vec<u8>,
    /// Extension with the dot, e.g. `".png"`.
    pub extension: String,
}

/// Downloads images from arbitrary URLs.
pub struct Fetcher {
    client: Client,
    attempts: u32,
    initial_backoff: Duration,
}

impl Fetcher {
    /// Create a fetcher using `client` (which carries the per-attempt timeout).
    #[must_use]
    pub fn new(client: Client, attempts: u32, initial_backoff: Duration) -> Self {
        Self { client, attempts: attempts.max(1), initial_backoff }
    }

    /// Download `url`, retrying transient failures with exponential backoff.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidArgument`] if `url` cannot be parsed
    /// - [`GatewayError::Download`] when every attempt fails, on a non-retryable
    ///   HTTP status, or when the body is not recognizable as an image
    pub async fn download(&self, url: &str) -> Result<Downloaded, GatewayError> {
        let parsed =
            Url::parse(url).map_err(|e| GatewayError::InvalidArgument(format!("invalid URL: {e}")))?;

        let mut delay = self.initial_backoff;
        let mut mode = RefererMode::Derived;
        let mut last_error = String::from("no attempt made");

        for attempt in 0..self.attempts {
            if attempt > 0 {
                log::info!("retrying download ({attempt}/{}): {url}", self.attempts);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }

            let mut request = self.client.get(parsed.clone());
            for (name, value) in request_headers(&parsed, mode) {
                request = request.header(name, value);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = if e.is_timeout() {
                        "timed out downloading image".to_string()
                    } else {
                        format!("cannot reach image URL: {e}")
                    };
                    log::warn!("{last_error}, will retry: {url}");
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
                last_error = format!("HTTP error: {}", status.as_u16());
                log::warn!("access denied ({status}), adjusting referer: {url}");
                mode = if attempt == 0 { RefererMode::SelfUrl } else { RefererMode::Omit };
                continue;
            }
            if !status.is_success() {
                return Err(GatewayError::Download(format!("HTTP error: {}", status.as_u16())));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match response.bytes().await {
                Ok(bytes) if !bytes.is_empty() => {
                    log::info!("downloaded {} bytes from {url}", bytes.len());
                    let extension = resolve_extension(&parsed, content_type.as_deref(), &bytes)
                        .ok_or_else(|| {
                            GatewayError::Download("the link does not point to an image".into())
                        })?;
                    return Ok(Downloaded { bytes: bytes.to_vec(), extension });
                }
                Ok(_) => last_error = "downloaded image is empty".to_string(),
                Err(e) => last_error = format!("failed to read image body: {e}"),
            }
            log::warn!("{last_error}, will retry: {url}");
        }

        Err(GatewayError::Download(last_error))
    }
}

/// Headers for one download attempt.
fn request_headers(url: &Url, mode: RefererMode) -> Vec<(&'static str, String)> {
    let user_agent = USER_AGENTS.choose(&mut rand::rng()).copied().unwrap_or(USER_AGENTS[0]);
    let mut headers = vec![
        ("User-Agent", user_agent.to_string()),
        ("Accept", IMAGE_ACCEPT.to_string()),
        ("Cache-Control", "no-cache".to_string()),
        ("Pragma", "no-cache".to_string()),
        ("Sec-Fetch-Dest", "image".to_string()),
        ("Sec-Fetch-Mode", "no-cors".to_string()),
    ];

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let rule = SITE_RULES.iter().find(|rule| host.contains(rule.domain));

    match rule {
        Some(rule) => {
            headers.push(("Origin", rule.origin.to_string()));
            headers.push(("Sec-Fetch-Site", "same-site".to_string()));
        }
        None => headers.push(("Sec-Fetch-Site", "cross-site".to_string())),
    }

    let referer = match mode {
        RefererMode::Derived => Some(rule.map_or_else(|| smart_referer(url), |r| site_referer(r, url))),
        RefererMode::SelfUrl => Some(url.to_string()),
        RefererMode::Omit => None,
    };
    if let Some(referer) = referer {
        headers.push(("Referer", referer));
    }
    headers
}

/// The URL's own origin, or its parent domain for media subdomains.
fn smart_referer(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if MEDIA_PREFIXES.iter().any(|p| host.starts_with(p)) {
        return format!("{}://{}/", url.scheme(), base_domain(&host));
    }
    match url.port() {
        Some(port) => format!("{}://{host}:{port}/", url.scheme()),
        None => format!("{}://{host}/", url.scheme()),
    }
}

fn site_referer(rule: &SiteRule, url: &Url) -> String {
    if rule.artwork_referer {
        if let Some(id) = first_numeric_segment(url.path()) {
            return format!("https://www.pixiv.net/artworks/{id}");
        }
    }
    rule.referer.to_string()
}

/// Last two labels of a host name.
fn base_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return host.to_string();
    }
    labels[labels.len() - 2..].join(".")
}

/// First run of digits directly after a `/`.
fn first_numeric_segment(path: &str) -> Option<&str> {
    path.match_indices('/').find_map(|(i, _)| {
        let rest = &path[i + 1..];
        let len = rest.bytes().take_while(u8::is_ascii_digit).count();
        (len > 0).then(|| &rest[..len])
    })
}

/// Temp-file extension: `Content-Type`, then the URL, then magic bytes.
fn resolve_extension(url: &Url, content_type: Option<&str>, bytes: &[u8]) -> Option<String> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if let Some(subtype) = mime.strip_prefix("image/") {
        let ext = match subtype {
            "png" => ".png",
            "gif" => ".gif",
            "webp" => ".webp",
            "bmp" => ".bmp",
            _ => ".jpg",
        };
        return Some(ext.to_string());
    }

    let from_url = std::path::Path::new(url.path())
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| crate::validate::ALLOWED_EXTENSIONS.contains(&e.as_str()));
    if let Some(ext) = from_url {
        return Some(format!(".{ext}"));
    }

    sniff_extension(bytes).map(str::to_string)
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(".jpg")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(".png")
    } else if bytes.starts_with(b"GIF8") {
        Some(".gif")
    } else if bytes.starts_with(b"RIFF") {
        Some(".webp")
    } else if bytes.starts_with(b"BM") {
        Some(".bmp")
    } else {
        None
    }
}
