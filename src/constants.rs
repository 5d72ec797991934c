// src/constants.rs
//
// Centralized constants for logshare to avoid hardcoded values throughout the codebase

/// Default Cloudflare API v4 base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Environment variable overriding the API base URL (proxies, local mocks)
pub const ENV_API_BASE_URL: &str = "LOGSHARE_API_URL";

/// Environment variables for the credentials, read by the CLI
pub const ENV_API_KEY: &str = "CF_API_KEY";
pub const ENV_API_EMAIL: &str = "CF_API_EMAIL";

/// Custom GCS endpoint (e.g. fake-gcs-server)
pub const ENV_GCS_ENDPOINT_URL: &str = "GCS_ENDPOINT_URL";

/// GCS emulator convention: host:port, http:// is prepended if missing
pub const ENV_STORAGE_EMULATOR_HOST: &str = "STORAGE_EMULATOR_HOST";

/// Header carrying the API key
pub const HEADER_AUTH_KEY: &str = "X-Auth-Key";

/// Header carrying the account email
pub const HEADER_AUTH_EMAIL: &str = "X-Auth-Email";

/// Prefix for objects written to Google Cloud Storage
pub const OBJECT_NAME_PREFIX: &str = "cloudflare_els_";

/// Suffix for objects written to Google Cloud Storage
pub const OBJECT_NAME_SUFFIX: &str = ".json";

/// Default seconds between loop iterations
pub const DEFAULT_LOOP_WAIT_SECS: u64 = 60;

/// Default start of the fetch window, relative to now (30 minutes back)
pub const DEFAULT_START_OFFSET_SECS: i64 = 30 * 60;

/// Default end of the fetch window, relative to now (20 minutes back)
pub const DEFAULT_END_OFFSET_SECS: i64 = 20 * 60;

/// Lowest accepted non-zero sampling rate
pub const MIN_SAMPLE_RATE: f64 = 0.1;

/// Highest accepted sampling rate
pub const MAX_SAMPLE_RATE: f64 = 0.9;

/// GCS resumable uploads need chunks in multiples of 256 KiB
pub const GCS_CHUNK_ALIGNMENT: usize = 256 * 1024;

/// Chunk size for resumable GCS uploads (8 MiB)
pub const DEFAULT_GCS_UPLOAD_CHUNK_SIZE: usize = 32 * GCS_CHUNK_ALIGNMENT;

/// Default connect timeout for API requests (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
