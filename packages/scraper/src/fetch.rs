//! Page fetchers.
//!
//! [`HttpFetcher`] issues real GET requests with a browser-like
//! `User-Agent`, a per-request timeout, and a bounded retry loop for
//! transient failures (connection errors, timeouts, HTTP 429, HTTP 5xx).
//! [`StaticFetcher`] serves canned pages keyed by URL and never touches the
//! network.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;

use crate::{FetchError, PageFetcher};

/// `User-Agent` sent with every request. Some station pages reject
/// non-browser agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of retries after the first attempt for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl FetchConfig {
    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the `User-Agent` header value.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        user_agent.clone_into(&mut self.user_agent);
        self
    }

    /// Sets the number of retries for transient failures.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Fetches station pages over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl HttpFetcher {
    /// Builds a fetcher from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built
    /// (for example, an invalid `User-Agent` value).
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout,
            max_retries: config.max_retries,
        })
    }

    fn classify(&self, url: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                url: url.to_owned(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Http(error)
        }
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                log::warn!("  retry {attempt}/{} for {url} in {delay:?}...", self.max_retries);
                tokio::time::sleep(delay).await;
            }
            let can_retry = attempt < self.max_retries;
            attempt += 1;

            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(e) if is_transient(&e) && can_retry => {
                    log::warn!("  transient error fetching {url}: {e}");
                    continue;
                }
                Err(e) => return Err(self.classify(url, e)),
            };

            let status = response.status();
            if is_retryable_status(status) && can_retry {
                log::warn!("  HTTP {status} from {url}");
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_owned(),
                    status,
                });
            }

            return response.text().await.map_err(|e| self.classify(url, e));
        }
    }
}

/// Returns the wait before retry number `attempt` (1-based): 1s, 2s, 4s, ...
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(6))
}

/// Returns `true` for statuses worth retrying (429 and 5xx).
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

/// A scripted response for [`StaticFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CannedPage {
    /// Serve this body.
    Html(String),
    /// Fail as if the request timed out.
    Timeout,
    /// Fail with this HTTP status.
    Status(u16),
}

/// In-memory [`PageFetcher`] that serves canned pages by URL.
///
/// URLs without a canned page fail with HTTP 404.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    pages: BTreeMap<String, CannedPage>,
}

impl StaticFetcher {
    /// Creates a fetcher with no pages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the response for `url`.
    #[must_use]
    pub fn with_page(mut self, url: &str, page: CannedPage) -> Self {
        self.pages.insert(url.to_owned(), page);
        self
    }
}

impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match self.pages.get(url) {
            Some(CannedPage::Html(body)) => Ok(body.clone()),
            Some(CannedPage::Timeout) => Err(FetchError::Timeout {
                url: url.to_owned(),
                timeout: DEFAULT_TIMEOUT,
            }),
            Some(CannedPage::Status(code)) => Err(FetchError::Status {
                url: url.to_owned(),
                status: StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            }),
            None => Err(FetchError::Status {
                url: url.to_owned(),
                status: StatusCode::NOT_FOUND,
            }),
        }
    }
}
