// src/dispatch.rs
//
// One fetch per call: field enumeration or time-range retrieval, chosen by
// the configuration.

use anyhow::{Context, Result};
use tracing::info;

use crate::client::{LogFetcher, Meta};
use crate::config::FetchConfig;

/// Run exactly one fetch against `client`. No retries.
pub async fn dispatch(config: &FetchConfig, client: &dyn LogFetcher) -> Result<Meta> {
    if config.list_fields {
        client
            .fetch_field_names(&config.zone_id)
            .await
            .context("failed to fetch field names")
    } else {
        client
            .get_from_timestamp(
                &config.zone_id,
                config.start_time,
                config.end_time,
                config.count,
            )
            .await
            .context("failed to fetch via timestamp")
    }
}

/// Log the metadata of a completed fetch.
pub fn report(meta: &Meta) {
    info!(
        "HTTP status {} | {}ms | {}",
        meta.status_code, meta.duration_ms, meta.url
    );
    info!("Retrieved {} logs", meta.count);
}
