use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};

use crate::domain::{Slug, Stage};
use crate::error::OwidError;

pub const DEFAULT_BASE_URL: &str = "https://ourworldindata.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const GRAPHER_QUERY: &str = "v=1&csvType=full&useColumnShortNames=true";

/// Status-driven retry schedule. Transport errors (connect, timeout) are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
    pub statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_factor: Duration::from_millis(100),
            max_backoff: Duration::from_secs(120),
            statuses: vec![502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }

    /// Delay before the `retry`-th retry (1-based). The first retry is immediate.
    pub fn backoff(&self, retry: usize) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let exponent = u32::try_from(retry - 1).unwrap_or(u32::MAX);
        let multiplier = 2u32.saturating_pow(exponent);
        self.backoff_factor
            .saturating_mul(multiplier)
            .min(self.max_backoff)
    }

    /// Delay before the `retry`-th retry, honouring a server `Retry-After` when it asks for longer.
    pub fn delay(&self, retry: usize, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(retry);
        match retry_after {
            Some(requested) => backoff.max(requested).min(self.max_backoff),
            None => backoff,
        }
    }
}

/// Reads a `Retry-After` value given either in seconds or as an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

/// Decodes a response body, refusing anything that is not UTF-8.
pub fn decode_body(slug: &Slug, stage: Stage, bytes: Vec<u8>) -> Result<String, OwidError> {
    String::from_utf8(bytes).map_err(|err| OwidError::Parse {
        slug: slug.to_string(),
        stage,
        message: format!("response body is not valid UTF-8: {}", err.utf8_error()),
    })
}

pub trait GrapherClient: Send + Sync {
    /// Full CSV export of a chart.
    fn fetch_csv(&self, slug: &Slug) -> Result<String, OwidError>;
    /// Metadata JSON document of a chart.
    fn fetch_metadata(&self, slug: &Slug) -> Result<String, OwidError>;
}

#[derive(Clone)]
pub struct GrapherHttpClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GrapherHttpClient {
    pub fn new() -> Result<Self, OwidError> {
        Self::with_settings(DEFAULT_BASE_URL, RetryPolicy::default(), DEFAULT_TIMEOUT)
    }

    pub fn with_settings(
        base_url: &str,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, OwidError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("owid-cy/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| OwidError::Client(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| OwidError::Client(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn csv_url(&self, slug: &Slug) -> String {
        format!("{}/grapher/{}.csv?{GRAPHER_QUERY}", self.base_url, slug.as_str())
    }

    pub fn metadata_url(&self, slug: &Slug) -> String {
        format!(
            "{}/grapher/{}.metadata.json?{GRAPHER_QUERY}",
            self.base_url,
            slug.as_str()
        )
    }

    fn handle_status(slug: &Slug, stage: Stage, response: Response) -> Result<Response, OwidError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .ok()
            .map(|body| body.chars().take(200).collect::<String>())
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| "grapher request failed".to_string());
        Err(OwidError::Status {
            slug: slug.to_string(),
            stage,
            status,
            message,
        })
    }

    fn send_with_retries(&self, slug: &Slug, stage: Stage, url: &str) -> Result<Response, OwidError> {
        let mut retry = 0usize;
        loop {
            tracing::debug!(%slug, url, attempt = retry + 1, "GET");
            let response = self
                .client
                .get(url)
                .send()
                .map_err(|err| OwidError::Http {
                    slug: slug.to_string(),
                    stage,
                    message: err.to_string(),
                })?;
            let status = response.status().as_u16();
            if retry < self.retry.max_retries && self.retry.is_retryable(status) {
                retry += 1;
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after);
                let delay = self.retry.delay(retry, retry_after);
                tracing::warn!(%slug, status, retry, ?delay, "retrying grapher request");
                thread::sleep(delay);
                continue;
            }
            return Ok(response);
        }
    }

    fn get_text(&self, slug: &Slug, stage: Stage, url: &str) -> Result<String, OwidError> {
        let response = self.send_with_retries(slug, stage, url)?;
        let response = Self::handle_status(slug, stage, response)?;
        let bytes = response.bytes().map_err(|err| OwidError::Http {
            slug: slug.to_string(),
            stage,
            message: err.to_string(),
        })?;
        let parse_stage = match stage {
            Stage::Fetch => Stage::Parse,
            other => other,
        };
        decode_body(slug, parse_stage, bytes.to_vec())
    }
}

impl GrapherClient for GrapherHttpClient {
    fn fetch_csv(&self, slug: &Slug) -> Result<String, OwidError> {
        let url = self.csv_url(slug);
        self.get_text(slug, Stage::Fetch, &url)
    }

    fn fetch_metadata(&self, slug: &Slug) -> Result<String, OwidError> {
        let url = self.metadata_url(slug);
        self.get_text(slug, Stage::Metadata, &url)
    }
}
