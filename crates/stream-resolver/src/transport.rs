//! Retrying HTTP transport shared by every resolution step.
//!
//! Wraps one pooled `reqwest::Client` with default headers (user agent and
//! referer), a per-request timeout and a bounded retry loop with linear
//! backoff. Cloning a [`Transport`] shares the underlying connection pool.

use crate::error::{ResolveError, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use shared::Config;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Header sent by the site's own AJAX calls.
pub const XHR_HEADER: (&str, &str) = ("X-Requested-With", "XMLHttpRequest");

/// Settings for constructing a [`Transport`]
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub user_agent: String,
    /// Default `Referer` header value
    pub referer: String,
    pub timeout: Duration,
    /// Additional attempts after the first failed one
    pub max_retries: u32,
    /// Linear backoff step
    pub retry_delay: Duration,
}

impl TransportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_agent: config.site.user_agent.clone(),
            referer: format!("{}/", config.site.base_url.trim_end_matches('/')),
            timeout: Duration::from_secs(config.transport.timeout_secs),
            max_retries: config.transport.max_retries,
            retry_delay: Duration::from_millis(config.transport.retry_delay_ms),
        }
    }
}

/// Successful HTTP response with its body fully read
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ResolveError> {
        serde_json::from_str(&self.body).map_err(|e| ResolveError::UpstreamFormat {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}

/// HTTP client with default headers and retry logic
#[derive(Debug, Clone)]
pub struct Transport {
    /// Pooled HTTP client
    client: Client,
    /// Headers applied to every request unless overridden
    defaults: HeaderMap,
    /// Maximum retries for failed requests
    max_retries: u32,
    /// Backoff step (attempt n waits n × retry_delay)
    retry_delay: Duration,
}

impl Transport {
    /// Create a new transport
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .gzip(true)
            .build()
            .map_err(TransportError::Client)?;

        let mut defaults = HeaderMap::new();
        defaults.insert(USER_AGENT, header_value(&settings.user_agent)?);
        defaults.insert(REFERER, header_value(&settings.referer)?);

        Ok(Self {
            client,
            defaults,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        })
    }

    /// Create a transport from the workspace configuration
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Self::new(TransportSettings::from_config(config))
    }

    /// GET with default headers; only 200 counts as success
    pub async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.get_with_headers(url, &[]).await
    }

    /// GET with caller headers merged over the defaults
    pub async fn get_with_headers(
        &self,
        url: &str,
        extra: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        self.execute(Method::GET, url, extra, None, |status| status == StatusCode::OK)
            .await
    }

    /// GET and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        extra: &[(&str, &str)],
    ) -> Result<T, ResolveError> {
        self.get_with_headers(url, extra).await?.json()
    }

    /// POST with default headers; any 2xx counts as success
    pub async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<HttpResponse, TransportError> {
        self.post_with_headers(url, body, content_type, &[]).await
    }

    /// POST with caller headers merged over the defaults
    pub async fn post_with_headers(
        &self,
        url: &str,
        body: Vec<u8>,
        content_type: &str,
        extra: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let mut headers: Vec<(&str, &str)> = Vec::with_capacity(extra.len() + 1);
        if !content_type.is_empty() {
            headers.push((CONTENT_TYPE.as_str(), content_type));
        }
        headers.extend_from_slice(extra);

        self.execute(Method::POST, url, &headers, Some(body), |status| {
            status.is_success()
        })
        .await
    }

    fn merged_headers(&self, extra: &[(&str, &str)]) -> Result<HeaderMap, TransportError> {
        let mut headers = self.defaults.clone();
        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
            headers.insert(name, header_value(value)?);
        }
        Ok(headers)
    }

    /// Send a request, retrying network errors and rejected statuses
    async fn execute(
        &self,
        method: Method,
        url: &str,
        extra: &[(&str, &str)],
        body: Option<Vec<u8>>,
        accept: impl Fn(StatusCode) -> bool,
    ) -> Result<HttpResponse, TransportError> {
        let headers = self.merged_headers(extra)?;
        let attempts = self.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(url = %url, method = %method, attempt, "Making request");

            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(headers.clone());
            if let Some(body) = &body {
                request = request.body(body.clone());
            }

            let failure = match request.send().await {
                Ok(response) if accept(response.status()) => {
                    let status = response.status();
                    let response_headers = response.headers().clone();
                    match response.text().await {
                        Ok(text) => {
                            debug!(url = %url, status = status.as_u16(), "Request successful");
                            return Ok(HttpResponse {
                                url: url.to_string(),
                                status,
                                headers: response_headers,
                                body: text,
                            });
                        }
                        Err(e) => Err(e),
                    }
                }
                Ok(response) => {
                    // Dropping the response returns its connection to the pool.
                    let status = response.status();
                    drop(response);
                    Ok(status)
                }
                Err(e) => Err(e),
            };

            if attempt >= attempts {
                return Err(match failure {
                    Err(source) => TransportError::Request {
                        url: url.to_string(),
                        attempts: attempt,
                        source,
                    },
                    Ok(status) => TransportError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                        attempts: attempt,
                    },
                });
            }

            let delay = backoff(self.retry_delay, attempt);
            match &failure {
                Err(e) => warn!(url = %url, attempt, error = %e, "Request error, retrying"),
                Ok(status) => warn!(url = %url, attempt, status = status.as_u16(), "Request failed, retrying"),
            }
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }
}

/// Delay after failed attempt `attempt`; saturates instead of overflowing
fn backoff(step: Duration, attempt: u32) -> Duration {
    step.saturating_mul(attempt)
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader(value.to_string()))
}
