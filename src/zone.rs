// src/zone.rs
//
// Zone resolution: turn a zone name into the zone identifier the log API needs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{Credentials, FetchConfig};
use crate::error::ApiError;
use crate::http::{ApiHttpClient, HttpClientConfig};

/// Looks up a zone identifier by its name.
#[async_trait]
pub trait ZoneLookup: Send + Sync {
    async fn zone_id_by_name(&self, zone_name: &str) -> Result<String, ApiError>;
}

/// Make sure `config.zone_id` is populated and return it.
///
/// An explicit zone id is used as-is without touching the network. Otherwise
/// the zone name is looked up once and the result is stored in the config.
pub async fn resolve_zone(config: &mut FetchConfig, lookup: &dyn ZoneLookup) -> Result<String> {
    if !config.zone_id.is_empty() {
        debug!("Using explicit zone id {}", config.zone_id);
        return Ok(config.zone_id.clone());
    }

    let id = lookup
        .zone_id_by_name(&config.zone_name)
        .await
        .context("could not find a zone for the given name/ID")?;
    info!("Resolved zone {} to {}", config.zone_name, id);

    config.zone_id = id.clone();
    Ok(id)
}

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<Vec<ZoneRecord>>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ZoneRecord {
    id: String,
    name: String,
}

/// Zone lookup against `GET /zones?name=<name>`.
#[derive(Debug, Clone)]
pub struct ApiZoneLookup {
    http: ApiHttpClient,
}

impl ApiZoneLookup {
    pub fn new(credentials: &Credentials) -> Result<Self, ApiError> {
        Self::with_config(HttpClientConfig::default(), credentials)
    }

    pub fn with_config(config: HttpClientConfig, credentials: &Credentials) -> Result<Self, ApiError> {
        Ok(Self {
            http: ApiHttpClient::new(config, credentials)?,
        })
    }
}

#[async_trait]
impl ZoneLookup for ApiZoneLookup {
    async fn zone_id_by_name(&self, zone_name: &str) -> Result<String, ApiError> {
        let base = self.http.url("zones");
        let url = reqwest::Url::parse_with_params(&base, &[("name", zone_name)])
            .map_err(|e| ApiError::InvalidUrl {
                url: base.clone(),
                reason: e.to_string(),
            })?
            .to_string();
        let response = self.http.get(&url).await?;
        let body: ZonesResponse = response.json().await.map_err(|e| ApiError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        pick_zone(body, zone_name, &url)
    }
}

fn pick_zone(body: ZonesResponse, zone_name: &str, url: &str) -> Result<String, ApiError> {
    if !body.success {
        let reason = body
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ApiError::Decode {
            url: url.to_string(),
            reason: if reason.is_empty() {
                "request was not successful".to_string()
            } else {
                reason
            },
        });
    }

    body.result
        .unwrap_or_default()
        .into_iter()
        .find(|z| z.name == zone_name)
        .map(|z| z.id)
        .ok_or_else(|| ApiError::ZoneNotFound(zone_name.to_string()))
}
