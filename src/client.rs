// src/client.rs
//
// Log Share API client: field enumeration and time-range fetches, with the
// response body streamed into the configured sink.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Instant;
use tracing::debug;

use crate::config::{Count, Credentials, FetchConfig, TimestampFormat};
use crate::error::ApiError;
use crate::http::{ApiHttpClient, HttpClientConfig};
use crate::sink::{shared, SharedSink, StdoutSink};

/// Metadata about one completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub status_code: u16,
    /// Wall time of the request, including the body download, in milliseconds.
    pub duration_ms: u64,
    pub url: String,
    /// Number of newline-delimited records received.
    pub count: u64,
}

/// The two fetch operations the dispatcher chooses between.
#[async_trait]
pub trait LogFetcher: Send + Sync {
    async fn fetch_field_names(&self, zone_id: &str) -> Result<Meta, ApiError>;

    async fn get_from_timestamp(
        &self,
        zone_id: &str,
        start: i64,
        end: i64,
        count: Count,
    ) -> Result<Meta, ApiError>;
}

/// Options applied to every request made by a [`LogShareClient`].
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// Fields to request; empty means the API default set.
    pub fields: Vec<String>,
    /// Output sink. `None` writes to stdout.
    pub dest: Option<SharedSink>,
    /// Sampling rate, 0 for none.
    pub sample: f64,
    pub timestamp_format: TimestampFormat,
    pub http: Option<HttpClientConfig>,
}

impl ClientOptions {
    /// Options taken from the run configuration and an optional sink.
    pub fn from_config(config: &FetchConfig, dest: Option<SharedSink>) -> Self {
        Self {
            fields: config.fields.clone(),
            dest,
            sample: config.sample,
            timestamp_format: config.timestamp_format,
            http: None,
        }
    }
}

/// Client for the Enterprise Log Share API.
pub struct LogShareClient {
    http: ApiHttpClient,
    fields: Vec<String>,
    dest: SharedSink,
    sample: f64,
    timestamp_format: TimestampFormat,
}

impl LogShareClient {
    /// Build a client. Transport errors (bad credential characters, TLS init)
    /// are returned as they come from the HTTP layer.
    pub fn new(api_key: &str, api_email: &str, options: ClientOptions) -> Result<Self, ApiError> {
        let credentials = Credentials {
            api_key: api_key.to_string(),
            api_email: api_email.to_string(),
        };
        let http = ApiHttpClient::new(options.http.unwrap_or_default(), &credentials)?;
        Ok(Self {
            http,
            fields: options.fields,
            dest: options.dest.unwrap_or_else(|| shared(StdoutSink::new())),
            sample: options.sample,
            timestamp_format: options.timestamp_format,
        })
    }

    /// Logs are always queried by arrival time (the `received` endpoints).
    fn logs_path(&self, zone_id: &str) -> String {
        format!("zones/{}/logs/received", zone_id)
    }

    /// URL for a time-range fetch. Query values are percent-encoded.
    pub fn timestamp_url(
        &self,
        zone_id: &str,
        start: i64,
        end: i64,
        count: Count,
    ) -> Result<String, ApiError> {
        let mut params = vec![("start", start.to_string()), ("end", end.to_string())];
        if let Count::Limit(n) = count {
            params.push(("count", n.to_string()));
        }
        if self.sample != 0.0 {
            params.push(("sample", self.sample.to_string()));
        }
        if !self.fields.is_empty() {
            params.push(("fields", self.fields.join(",")));
        }
        params.push(("timestamps", self.timestamp_format.to_string()));

        let base = self.http.url(&self.logs_path(zone_id));
        reqwest::Url::parse_with_params(&base, &params)
            .map(String::from)
            .map_err(|e| ApiError::InvalidUrl {
                url: base,
                reason: e.to_string(),
            })
    }

    /// URL for field enumeration.
    pub fn fields_url(&self, zone_id: &str) -> String {
        format!("{}/fields", self.http.url(&self.logs_path(zone_id)))
    }

    /// GET `url` and stream the body into the sink, counting records.
    async fn request(&self, url: String) -> Result<Meta, ApiError> {
        let started = Instant::now();
        let response = self.http.get(&url).await?;
        let status_code = response.status().as_u16();

        let mut dest = self.dest.lock().await;
        let mut stream = response.bytes_stream();
        let mut count = 0u64;
        let mut last_byte = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| ApiError::Request {
                url: url.clone(),
                source,
            })?;
            if chunk.is_empty() {
                continue;
            }
            count += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
            last_byte = chunk.last().copied();
            dest.write_chunk(&chunk).await.map_err(ApiError::Output)?;
        }
        dest.flush().await.map_err(ApiError::Output)?;
        // A final record without a trailing newline still counts.
        if matches!(last_byte, Some(b) if b != b'\n') {
            count += 1;
        }
        debug!("{} bytes written to {}", dest.bytes_written(), dest.describe());

        Ok(Meta {
            status_code,
            duration_ms: started.elapsed().as_millis() as u64,
            url,
            count,
        })
    }
}

#[async_trait]
impl LogFetcher for LogShareClient {
    async fn fetch_field_names(&self, zone_id: &str) -> Result<Meta, ApiError> {
        self.request(self.fields_url(zone_id)).await
    }

    async fn get_from_timestamp(
        &self,
        zone_id: &str,
        start: i64,
        end: i64,
        count: Count,
    ) -> Result<Meta, ApiError> {
        self.request(self.timestamp_url(zone_id, start, end, count)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn client(options: ClientOptions) -> LogShareClient {
        let options = ClientOptions {
            http: Some(HttpClientConfig::with_base_url("http://api.test/client/v4")),
            ..options
        };
        LogShareClient::new("key", "ops@example.com", options).unwrap()
    }

    #[test]
    fn test_timestamp_url_minimal() {
        let c = client(ClientOptions {
            dest: Some(shared(MemorySink::new())),
            ..Default::default()
        });
        assert_eq!(
            c.timestamp_url("z1", 1000, 2000, Count::All).unwrap(),
            "http://api.test/client/v4/zones/z1/logs/received?start=1000&end=2000&timestamps=unixnano"
        );
    }

    #[test]
    fn test_timestamp_url_all_options() {
        let c = client(ClientOptions {
            fields: vec!["RayID".into(), "ClientIP".into()],
            sample: 0.5,
            timestamp_format: TimestampFormat::Rfc3339,
            ..Default::default()
        });
        assert_eq!(
            c.timestamp_url("z1", 1, 2, Count::Limit(5)).unwrap(),
            "http://api.test/client/v4/zones/z1/logs/received?start=1&end=2&count=5&sample=0.5&fields=RayID%2CClientIP&timestamps=rfc3339"
        );
    }

    #[test]
    fn test_timestamp_url_encodes_field_names() {
        let c = client(ClientOptions {
            fields: vec!["Edge Status".into(), "a&timestamps=unix".into()],
            ..Default::default()
        });
        let url = c.timestamp_url("z1", 1, 2, Count::All).unwrap();
        assert!(
            url.ends_with("&fields=Edge+Status%2Ca%26timestamps%3Dunix&timestamps=unixnano"),
            "{}",
            url
        );
        let parsed = reqwest::Url::parse(&url).unwrap();
        let timestamps: Vec<_> = parsed
            .query_pairs()
            .filter(|(k, _)| k == "timestamps")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(timestamps, vec!["unixnano"]);
    }

    #[test]
    fn test_default_options_query_received_endpoint() {
        let c = client(ClientOptions::default());
        assert!(c
            .timestamp_url("z1", 1, 2, Count::Limit(1))
            .unwrap()
            .contains("/zones/z1/logs/received?"));
        assert_eq!(
            c.fields_url("abc"),
            "http://api.test/client/v4/zones/abc/logs/received/fields"
        );
    }

    #[test]
    fn test_options_from_config() {
        let config = FetchConfig {
            fields: vec!["RayID".into()],
            sample: 0.3,
            timestamp_format: TimestampFormat::Unix,
            ..Default::default()
        };
        let opts = ClientOptions::from_config(&config, None);
        assert!(opts.dest.is_none());
        assert_eq!(opts.fields, vec!["RayID"]);
        assert_eq!(opts.sample, 0.3);
        assert_eq!(opts.timestamp_format, TimestampFormat::Unix);
    }

    #[test]
    fn test_invalid_credentials_surface_verbatim() {
        let result = LogShareClient::new("key\r\n", "e", ClientOptions::default());
        assert!(matches!(result, Err(ApiError::InvalidCredentials(_))));
    }
}
