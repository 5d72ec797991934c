// src/http/client.rs
//
// reqwest client pre-loaded with the API credential headers

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::ClientBuilder;
use std::time::Duration;
use tracing::debug;

use crate::config::Credentials;
use crate::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, ENV_API_BASE_URL, HEADER_AUTH_EMAIL,
    HEADER_AUTH_KEY,
};
use crate::error::ApiError;

/// HTTP client configuration for the log API
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// API base URL, without trailing slash
    pub base_url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout. `None` leaves long log downloads unbounded.
    pub request_timeout: Option<Duration>,
    /// TCP keepalive settings
    pub tcp_keepalive: Option<Duration>,
    /// Pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: api_base_url(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: None,
            tcp_keepalive: Some(Duration::from_secs(60)),
            pool_idle_timeout: Some(Duration::from_secs(90)),
        }
    }
}

impl HttpClientConfig {
    /// Default settings against an explicit base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}

/// Resolves the API base URL, honouring `LOGSHARE_API_URL`.
pub fn api_base_url() -> String {
    std::env::var(ENV_API_BASE_URL)
        .ok()
        .filter(|u| !u.is_empty())
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
}

/// Authenticated HTTP client. Cloning is cheap (reqwest pools internally).
#[derive(Debug, Clone)]
pub struct ApiHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiHttpClient {
    /// Build a client that sends `X-Auth-Key` / `X-Auth-Email` on every request.
    ///
    /// Fails when a credential is not a valid header value or when the TLS
    /// backend cannot be initialised.
    pub fn new(config: HttpClientConfig, credentials: &Credentials) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&credentials.api_key)?;
        key.set_sensitive(true);
        headers.insert(HEADER_AUTH_KEY, key);
        headers.insert(HEADER_AUTH_EMAIL, HeaderValue::from_str(&credentials.api_email)?);

        let mut builder = ClientBuilder::new()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .use_rustls_tls();

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(keepalive) = config.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }
        if let Some(idle_timeout) = config.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle_timeout);
        }

        let client = builder.build().map_err(ApiError::Transport)?;
        debug!("API client ready for {}", config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// Absolute URL for a path below the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Issue a GET and turn non-2xx answers into [`ApiError::Status`].
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body: body.trim().to_string(),
            });
        }
        Ok(response)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
