// src/config.rs
//
// Runtime configuration shared by every stage of a fetch: credentials, zone
// selector, time window, field selection and the optional GCS destination.

use clap::ValueEnum;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};

/// Timestamp format requested from the log API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum TimestampFormat {
    Unix,
    #[default]
    #[value(name = "unixnano")]
    UnixNano,
    Rfc3339,
}

impl TimestampFormat {
    /// Value sent in the `timestamps=` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampFormat::Unix => "unix",
            TimestampFormat::UnixNano => "unixnano",
            TimestampFormat::Rfc3339 => "rfc3339",
        }
    }
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checkpoint kind accepted by `loop`. Parsed and reported, not applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Checkpoint {
    #[default]
    Timestamp,
    RayId,
}

/// Number of records to request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Count {
    /// Every record in the window (`-1` on the command line).
    All,
    Limit(u64),
}

impl Default for Count {
    fn default() -> Self {
        Count::Limit(1)
    }
}

impl FromStr for Count {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: i64 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid count '{}': {}", s, e))?;
        match n {
            -1 => Ok(Count::All),
            n if n >= 1 => Ok(Count::Limit(n as u64)),
            _ => Err(format!("count must be a positive number or -1 for all, got {}", n)),
        }
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Count::All => f.write_str("-1"),
            Count::Limit(n) => write!(f, "{}", n),
        }
    }
}

/// API key + account email. Both are opaque to us.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_email: String,
}

// Keep the key out of debug logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_email", &self.api_email)
            .finish()
    }
}

/// Google Cloud Storage destination. Raw strings so that the pairing rule
/// can be checked; see [`FetchConfig::storage_destination`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageDestination {
    pub bucket: String,
    pub project_id: String,
}

/// Configuration violations, reported before any network access.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("must provide both api-key and api-email")]
    MissingCredentials,

    #[error("zone-name OR zone-id must be set")]
    MissingZone,

    #[error("sample must be between 0.1 and 0.9, got {0}")]
    SampleOutOfRange(f64),

    #[error("both google-storage-bucket and google-project-id must be provided to upload to Google Storage")]
    IncompleteStorage,
}

/// Everything one invocation needs. Built once from the command line; only
/// `zone_id` is ever written after that (by zone resolution).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchConfig {
    pub credentials: Credentials,
    pub zone_id: String,
    pub zone_name: String,
    pub start_time: i64,
    pub end_time: i64,
    pub count: Count,
    pub sample: f64,
    pub fields: Vec<String>,
    pub list_fields: bool,
    pub storage: StorageDestination,
    pub timestamp_format: TimestampFormat,
}

impl FetchConfig {
    /// Check the configuration invariants in order and return the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.api_key.is_empty() || self.credentials.api_email.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        if self.zone_id.is_empty() && self.zone_name.is_empty() {
            return Err(ConfigError::MissingZone);
        }

        if self.sample != 0.0 && !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample) {
            return Err(ConfigError::SampleOutOfRange(self.sample));
        }

        if self.storage.bucket.is_empty() != self.storage.project_id.is_empty() {
            return Err(ConfigError::IncompleteStorage);
        }

        Ok(())
    }

    /// The GCS destination, if one is configured.
    pub fn storage_destination(&self) -> Option<&StorageDestination> {
        if self.storage.bucket.is_empty() {
            None
        } else {
            Some(&self.storage)
        }
    }
}

/// Split a `--fields` value into names, dropping blanks.
pub fn parse_fields(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}
