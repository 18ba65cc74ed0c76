use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ArenaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Raw GET. Implementations must not retry on their own.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, ArenaError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn get(&self, url: &str) -> Result<HttpResponse, ArenaError> {
        (**self).get(url)
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ArenaError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("arena-tracker/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ArenaError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ArenaError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, ArenaError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ArenaError::Http(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(600),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        self.initial_delay.saturating_mul(factor)
    }
}

/// Wraps a transport with the throttling retry budget. Anything that is not
/// a throttle fails on the first attempt.
pub struct RateLimitedFetcher<T: HttpTransport, S: Sleeper> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
}

impl<T: HttpTransport, S: Sleeper> RateLimitedFetcher<T, S> {
    pub fn new(transport: T, sleeper: S, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn request(&self, url: &str) -> Result<HttpResponse, ArenaError> {
        let mut retry = 0u32;
        loop {
            let response = self.transport.get(url)?;
            if response.is_success() {
                return Ok(response);
            }
            if is_throttled(response.status, &response.body) && retry < self.policy.max_retries {
                let delay = self.policy.delay_for(retry);
                warn!(
                    url,
                    status = response.status,
                    retry = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    "throttled, backing off"
                );
                self.sleeper.sleep(delay);
                retry += 1;
                continue;
            }
            debug!(url, status = response.status, "request failed");
            return Err(ArenaError::RequestFailed {
                status: response.status,
                body: response.body,
            });
        }
    }

    pub fn request_json(&self, url: &str) -> Result<Value, ArenaError> {
        let response = self.request(url)?;
        serde_json::from_str(&response.body).map_err(|err| ArenaError::Decode(err.to_string()))
    }
}

fn throttle_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"(?i)(riot\s*429|rate limit exceeded)").expect("static throttle regex")
    })
}

/// HTTP 429, or a proxy error body that carries the upstream throttle marker.
pub fn is_throttled(status: u16, body: &str) -> bool {
    status == 429 || throttle_marker().is_match(body)
}
