// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: public modules plus re-exports used by the CLI.

pub mod constants;
pub mod config;
pub mod clock;
pub mod error;
pub mod logging;
pub mod http;

// Capabilities and their live backends
pub mod zone;
pub mod client;
pub mod sink;
pub mod gcs_client;

// Orchestration
pub mod dispatch;
pub mod sleeper;
pub mod looper;
pub mod session;

pub use config::{Checkpoint, ConfigError, Count, Credentials, FetchConfig, StorageDestination, TimestampFormat};
pub use client::{ClientOptions, LogFetcher, LogShareClient, Meta};
pub use error::ApiError;
pub use sink::{LogSink, ObjectStorage, SharedSink, StorageError};
pub use session::{open_session, run_forever, run_once, run_once_until, Backends, LiveBackends, ResourceGuard, Session};
pub use zone::{resolve_zone, ZoneLookup};
