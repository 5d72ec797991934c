// src/session.rs
//
// Top-level orchestration: validate, resolve the zone, pick the sink, build
// the client, then fetch once or loop. Every acquired output stream is
// released on every exit path.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::client::{ClientOptions, LogFetcher, LogShareClient, Meta};
use crate::clock::{Clock, SystemClock};
use crate::config::{Credentials, FetchConfig};
use crate::dispatch::{dispatch, report};
use crate::gcs_client::GcsStorage;
use crate::looper::run_loop;
use crate::sink::{create_output_sink, ObjectStorage, SharedSink};
use crate::sleeper::Sleeper;
use crate::zone::{resolve_zone, ApiZoneLookup, ZoneLookup};

/// Constructors for the external collaborators of a session.
#[async_trait]
pub trait Backends: Send + Sync {
    fn zone_lookup(&self, credentials: &Credentials) -> Result<Box<dyn ZoneLookup>>;

    /// Only called when a storage destination is configured.
    async fn object_storage(&self) -> Result<Box<dyn ObjectStorage>>;

    fn log_client(&self, config: &FetchConfig, sink: Option<SharedSink>) -> Result<Box<dyn LogFetcher>>;

    fn clock(&self) -> &dyn Clock;
}

/// Real API, GCS and wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveBackends {
    clock: SystemClock,
}

#[async_trait]
impl Backends for LiveBackends {
    fn zone_lookup(&self, credentials: &Credentials) -> Result<Box<dyn ZoneLookup>> {
        Ok(Box::new(ApiZoneLookup::new(credentials)?))
    }

    async fn object_storage(&self) -> Result<Box<dyn ObjectStorage>> {
        Ok(Box::new(GcsStorage::new().await?))
    }

    fn log_client(&self, config: &FetchConfig, sink: Option<SharedSink>) -> Result<Box<dyn LogFetcher>> {
        let client = LogShareClient::new(
            &config.credentials.api_key,
            &config.credentials.api_email,
            ClientOptions::from_config(config, sink),
        )?;
        Ok(Box::new(client))
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }
}

/// Release list for output streams. Sinks are pushed as they are acquired;
/// `release_all` finalizes every one of them even if some fail.
#[derive(Default)]
pub struct ResourceGuard {
    sinks: Vec<SharedSink>,
}

impl ResourceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: SharedSink) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Finalize and forget every held sink. Returns the first failure.
    pub async fn release_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for sink in self.sinks.drain(..) {
            let mut sink = sink.lock().await;
            let target = sink.describe();
            match sink.finalize().await {
                Ok(()) => debug!("Released {}", target),
                Err(e) => {
                    warn!("Failed to release {}: {:#}", target, e);
                    first_err.get_or_insert(e.context(format!("failed to close {}", target)));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if !self.sinks.is_empty() {
            warn!("{} output stream(s) dropped without being released", self.sinks.len());
        }
    }
}

/// A ready-to-fetch configuration and client.
pub struct Session {
    pub config: FetchConfig,
    pub client: Box<dyn LogFetcher>,
}

/// Validate, resolve the zone, open the sink and build the client.
///
/// Any sink opened here is pushed onto `guard` before anything else can fail.
pub async fn open_session(
    mut config: FetchConfig,
    backends: &dyn Backends,
    guard: &mut ResourceGuard,
) -> Result<Session> {
    config.validate().context("invalid configuration")?;

    let lookup = backends.zone_lookup(&config.credentials)?;
    let zone_id = resolve_zone(&mut config, lookup.as_ref()).await?;

    let sink = match config.storage_destination() {
        Some(_) => {
            let storage = backends
                .object_storage()
                .await
                .context("failed to set up Google Cloud Storage")?;
            create_output_sink(&config, &zone_id, storage.as_ref(), backends.clock()).await?
        }
        None => None,
    };
    if let Some(sink) = &sink {
        guard.push(sink.clone());
    }

    let client = backends.log_client(&config, sink)?;
    Ok(Session { config, client })
}

/// Single-shot mode: one fetch, one report.
pub async fn run_once(config: FetchConfig, backends: &dyn Backends) -> Result<Meta> {
    run_once_until(config, backends, std::future::pending()).await
}

/// Single-shot mode with a shutdown request.
///
/// A shutdown that arrives while the fetch is running does not cut it short:
/// the fetch completes, then the output is released as usual.
pub async fn run_once_until<F>(config: FetchConfig, backends: &dyn Backends, shutdown: F) -> Result<Meta>
where
    F: Future<Output = ()>,
{
    let mut guard = ResourceGuard::new();
    let result = {
        let fetch = async {
            let session = open_session(config, backends, &mut guard).await?;
            let meta = dispatch(&session.config, session.client.as_ref()).await?;
            report(&meta);
            Ok::<_, anyhow::Error>(meta)
        }
        .instrument(info_span!("run"));
        tokio::pin!(fetch);
        tokio::pin!(shutdown);

        tokio::select! {
            result = &mut fetch => result,
            _ = &mut shutdown => {
                info!("Shutdown requested, finishing the current fetch");
                fetch.await
            }
        }
    };

    finish(result, guard.release_all().await)
}

/// Loop mode. Runs until `shutdown` resolves, then releases the output.
///
/// Shutdown is honoured between iterations only, see [`run_loop`].
pub async fn run_forever<F>(
    config: FetchConfig,
    backends: &dyn Backends,
    interval_secs: u64,
    sleeper: &dyn Sleeper,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut guard = ResourceGuard::new();
    let session = match open_session(config, backends, &mut guard).await {
        Ok(session) => session,
        Err(e) => return finish(Err(e), guard.release_all().await),
    };

    let fetches = run_loop(
        &session.config,
        session.client.as_ref(),
        interval_secs,
        sleeper,
        shutdown,
    )
    .await;
    info!("Shutdown requested after {} fetch(es), closing output", fetches);

    guard.release_all().await
}

/// Combine the run outcome with the release outcome. A run error wins; a
/// release error after a failed run is only logged (it already was).
fn finish<T>(result: Result<T>, released: Result<()>) -> Result<T> {
    match (result, released) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(v), Ok(())) => Ok(v),
    }
}
