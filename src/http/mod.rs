// src/http/mod.rs
//
// HTTP plumbing shared by the log and zone API clients

pub mod client;

pub use client::{api_base_url, ApiHttpClient, HttpClientConfig};
