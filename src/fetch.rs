//! HTTP page fetching with a hard timeout and anti-bot block detection.
//!
//! Every network access in the crate goes through [`PageFetcher`], so the
//! harvesters, the resolver and the aggregator adapter classify failures the
//! same way. The trait also lets tests swap the network for canned pages.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Desktop browser User-Agent; several outlets serve empty shells to bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Head fragments that identify a challenge or block page served with 200.
const BLOCK_MARKERS: &[&str] = &[
    "<title>just a moment...</title>",
    "attention required! | cloudflare",
    "cf-browser-verification",
    "<title>access denied</title>",
    "request unsuccessful. incapsula",
];

/// Captcha widgets. Article pages embed them too (comment forms, newsletter
/// boxes), so they only count on a page too small to be an article.
const CHALLENGE_WIDGETS: &[&str] = &["g-recaptcha", "h-captcha", "cf-turnstile"];

/// Largest body still treated as a bare challenge page.
const CHALLENGE_PAGE_MAX_BYTES: usize = 16 * 1024;

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeout, DNS or connection failure.
    #[error("network failure fetching {url}: {message}")]
    Network { url: String, message: String },
    /// HTTP 403/429 or a known block page.
    #[error("blocked fetching {url}: {reason}")]
    Blocked { url: String, reason: String },
    /// Any other non-success status.
    #[error("unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(String),
}

impl FetchError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Blocked { .. })
    }
}

/// Something that can fetch a page by URL.
///
/// Implementations make exactly one attempt per call; retry policy, if any,
/// belongs to the caller.
pub trait PageFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError>;
}

/// [`PageFetcher`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(network)?;
        let status = response.status();
        let final_url = response.url().to_string();

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            warn!(%url, status = status.as_u16(), "Request blocked by status");
            return Err(FetchError::Blocked {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(network)?;
        if let Some(marker) = block_marker(&body) {
            warn!(%url, marker, "Block page detected");
            return Err(FetchError::Blocked {
                url: url.to_string(),
                reason: format!("block page marker {marker:?}"),
            });
        }

        debug!(%url, bytes = body.len(), "Fetched page");
        Ok(Page {
            url: final_url,
            body,
        })
    }
}

/// Return the first block-page marker found near the top of `body`.
///
/// Only the head of large documents is scanned, so an article that merely
/// talks about a captcha in its text is not flagged. Captcha widgets count
/// only on challenge-sized pages.
pub fn block_marker(body: &str) -> Option<&'static str> {
    let mut end = body.len().min(4096);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let head = body[..end].to_lowercase();
    if let Some(marker) = BLOCK_MARKERS.iter().copied().find(|m| head.contains(m)) {
        return Some(marker);
    }
    if body.len() > CHALLENGE_PAGE_MAX_BYTES {
        return None;
    }
    let page = body.to_lowercase();
    CHALLENGE_WIDGETS.iter().copied().find(|w| page.contains(w))
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`PageFetcher`] for tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub enum Canned {
        Html(String),
        Blocked,
        Timeout,
        Status(u16),
    }

    /// Serves canned responses; unknown URLs get a 404.
    #[derive(Debug, Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, Canned>,
        failing_hosts: Vec<String>,
        pub hits: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), Canned::Html(html.into()));
            self
        }

        pub fn canned(mut self, url: &str, canned: Canned) -> Self {
            self.pages.insert(url.to_string(), canned);
            self
        }

        /// Every URL on `host` times out.
        pub fn timeout_host(mut self, host: &str) -> Self {
            self.failing_hosts.push(host.to_string());
            self
        }

        pub fn hit_count(&self, url: &str) -> usize {
            self.hits.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
            self.hits.lock().unwrap().push(url.to_string());
            let host = url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default();
            if self.failing_hosts.iter().any(|h| *h == host) {
                return Err(FetchError::Network {
                    url: url.to_string(),
                    message: "operation timed out".into(),
                });
            }
            match self.pages.get(url) {
                Some(Canned::Html(body)) => match block_marker(body) {
                    Some(marker) => Err(FetchError::Blocked {
                        url: url.to_string(),
                        reason: marker.to_string(),
                    }),
                    None => Ok(Page {
                        url: url.to_string(),
                        body: body.clone(),
                    }),
                },
                Some(Canned::Blocked) => Err(FetchError::Blocked {
                    url: url.to_string(),
                    reason: "HTTP 403".into(),
                }),
                Some(Canned::Timeout) => Err(FetchError::Network {
                    url: url.to_string(),
                    message: "operation timed out".into(),
                }),
                Some(Canned::Status(status)) => Err(FetchError::Status {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }
}
