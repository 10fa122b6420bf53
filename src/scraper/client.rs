//! Content fetching: the [`Fetcher`] trait, the blocking HTTP implementation with
//! optional politeness delay, and an in-memory fetcher for fixtures.

use super::document::Document;
use super::error::FetchError;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Raw response of a successful request.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    pub body: Vec<u8>,
}

impl Page {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_document(self) -> Document {
        let text = self.text();
        Document::parse(&text, self.url)
    }
}

/// Single-request network primitive. One call is one request: no retries.
///
/// Implementations are shared by the chapter workers of a run and must be `Sync`.
pub trait Fetcher: Sync {
    fn get(&self, url: &Url) -> Result<Page, FetchError>;

    fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> Result<Page, FetchError>;

    /// GET and parse as HTML. Relative links resolve against the final URL.
    fn fetch(&self, url: &Url) -> Result<Document, FetchError> {
        self.get(url).map(Page::into_document)
    }

    fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.get(url).map(|p| p.body)
    }
}

/// Blocking HTTP fetcher that can space out request starts.
#[derive(Debug)]
pub struct HttpFetcher {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn builder() -> HttpFetcherBuilder {
        HttpFetcherBuilder::default()
    }

    /// Sleep until the configured delay has passed since the previous request started.
    /// The slot is reserved under the lock so concurrent workers queue up behind each other.
    fn wait_delay(&self) {
        if self.delay.is_zero() {
            return;
        }
        let wait = {
            let mut last = match self.last_request.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            let start = match *last {
                Some(prev) if prev + self.delay > now => prev + self.delay,
                _ => now,
            };
            *last = Some(start);
            start.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }

    fn read(
        &self,
        url: &Url,
        result: Result<reqwest::blocking::Response, reqwest::Error>,
    ) -> Result<Page, FetchError> {
        let response = result.map_err(|e| transport_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let final_url = response.url().clone();
        let body = response.bytes().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::BodyRead {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;
        Ok(Page {
            url: final_url,
            body: body.to_vec(),
        })
    }
}

fn transport_error(url: &Url, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            source: e,
        }
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &Url) -> Result<Page, FetchError> {
        self.wait_delay();
        tracing::debug!(%url, "GET");
        let result = self.inner.get(url.clone()).send();
        self.read(url, result)
    }

    fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> Result<Page, FetchError> {
        self.wait_delay();
        tracing::debug!(%url, "POST form");
        let result = self.inner.post(url.clone()).form(form).send();
        self.read(url, result)
    }
}

/// Builder for [`HttpFetcher`].
#[derive(Debug)]
pub struct HttpFetcherBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
    delay_ms: u64,
}

impl Default for HttpFetcherBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            delay_ms: 0,
        }
    }
}

impl HttpFetcherBuilder {
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Per-request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    /// Minimum spacing between request starts in milliseconds. Default 0.
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn build(self) -> Result<HttpFetcher, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpFetcher {
            inner,
            delay: Duration::from_millis(self.delay_ms),
            last_request: Mutex::new(None),
        })
    }
}

/// Offline fetcher serving canned responses. Unknown URLs answer HTTP 404.
///
/// Every request is recorded so callers can assert on what was fetched.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, Vec<u8>>,
    statuses: HashMap<String, u16>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for GET or POST requests to `url`.
    pub fn with_page(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(normalize_key(url), body.into());
        self
    }

    /// Answer requests to `url` with HTTP `status`.
    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(normalize_key(url), status);
        self
    }

    /// URLs requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        match self.requests.lock() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn serve(&self, url: &Url) -> Result<Page, FetchError> {
        let key = normalize_key(url.as_str());
        match self.requests.lock() {
            Ok(mut r) => r.push(key.clone()),
            Err(poisoned) => poisoned.into_inner().push(key.clone()),
        }
        if let Some(status) = self.statuses.get(&key) {
            return Err(FetchError::HttpStatus {
                status: *status,
                url: key,
            });
        }
        match self.pages.get(&key) {
            Some(body) => Ok(Page {
                url: url.clone(),
                body: body.clone(),
            }),
            None => Err(FetchError::HttpStatus {
                status: 404,
                url: key,
            }),
        }
    }
}

fn normalize_key(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl Fetcher for StaticFetcher {
    fn get(&self, url: &Url) -> Result<Page, FetchError> {
        self.serve(url)
    }

    fn post_form(&self, url: &Url, _form: &[(&str, &str)]) -> Result<Page, FetchError> {
        self.serve(url)
    }
}
