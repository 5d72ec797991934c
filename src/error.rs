// src/error.rs
//
// Error type shared by the HTTP-backed API clients (log fetch and zone lookup).

use reqwest::header::InvalidHeaderValue;
use thiserror::Error;

/// Failures talking to the remote API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credential strings that cannot be sent as HTTP header values.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(#[from] InvalidHeaderValue),

    #[error("failed to build HTTP client: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP status {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("cannot build request URL from {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("zone '{0}' could not be found")]
    ZoneNotFound(String),

    #[error("failed to write logs to output: {0:#}")]
    Output(anyhow::Error),
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Request { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = ApiError::Status {
            status: 403,
            url: "https://api.example/zones".into(),
            body: "forbidden".into(),
        };
        assert_eq!(err.status(), Some(403));
        assert_eq!(
            err.to_string(),
            "HTTP status 403 from https://api.example/zones: forbidden"
        );
    }

    #[test]
    fn test_invalid_header_value_converts() {
        let bad = reqwest::header::HeaderValue::from_str("line\nbreak").unwrap_err();
        let err: ApiError = bad.into();
        assert!(err.to_string().starts_with("invalid credentials"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_output_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("disk full").context("GCS chunk upload failed");
        let err = ApiError::Output(inner);
        assert_eq!(
            err.to_string(),
            "failed to write logs to output: GCS chunk upload failed: disk full"
        );
    }
}
