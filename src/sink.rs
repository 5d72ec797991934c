// src/sink.rs
//
// Output routing for retrieved logs: stdout by default, or a write stream on
// a durable object store when a bucket is configured.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::{info, info_span, Instrument};

use crate::clock::Clock;
use crate::config::{FetchConfig, StorageDestination};
use crate::constants::{OBJECT_NAME_PREFIX, OBJECT_NAME_SUFFIX};

/// Destination for raw log bytes.
///
/// `finalize` flushes whatever is buffered and commits the output. It must be
/// safe to call more than once; writes after finalization fail.
#[async_trait]
pub trait LogSink: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;

    /// Push buffered bytes to the destination without committing it. Called
    /// after every fetch.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()>;

    fn bytes_written(&self) -> u64;

    /// Short human-readable location, used in log lines.
    fn describe(&self) -> String;
}

/// A sink shared between the log client (writer) and the release list (closer).
pub type SharedSink = Arc<Mutex<Box<dyn LogSink>>>;

/// Wrap a sink for sharing.
pub fn shared(sink: impl LogSink + 'static) -> SharedSink {
    Arc::new(Mutex::new(Box::new(sink)))
}

/// Process standard output.
#[derive(Debug)]
pub struct StdoutSink {
    out: Stdout,
    bytes_written: u64,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: tokio::io::stdout(),
            bytes_written: 0,
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSink for StdoutSink {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.out.write_all(chunk).await?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.out.flush().await?;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.flush().await
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn describe(&self) -> String {
        "stdout".to_string()
    }
}

/// In-memory sink. The buffer handle stays readable after the sink has been
/// moved into a client.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    buf: Arc<StdMutex<Vec<u8>>>,
    finalized: Arc<StdMutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.lock().map(|f| *f).unwrap_or(false)
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.is_finalized() {
            bail!("Cannot write to finalized sink");
        }
        self.buf
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))?
            .extend_from_slice(chunk);
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        *self
            .finalized
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))? = true;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.buf.lock().map(|b| b.len() as u64).unwrap_or(0)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Bucket creation outcomes the sink factory cares about.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The bucket is already there (HTTP 409 on GCS). Not a failure for us.
    #[error("bucket {0} already exists")]
    AlreadyExists(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The object-store capabilities needed to persist logs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create `bucket` under `project_id`.
    async fn create_bucket(&self, project_id: &str, bucket: &str) -> Result<(), StorageError>;

    /// Open a write stream to `bucket/object`. Nothing is visible until the
    /// returned sink is finalized.
    async fn open_writer(&self, bucket: &str, object: &str) -> Result<Box<dyn LogSink>>;
}

/// Object name for one invocation: `cloudflare_els_<zone>_<unix>.json`.
pub fn object_name(zone_id: &str, unix_seconds: i64) -> String {
    format!(
        "{}{}_{}{}",
        OBJECT_NAME_PREFIX, zone_id, unix_seconds, OBJECT_NAME_SUFFIX
    )
}

/// Pick the output sink for this invocation.
///
/// Returns `None` when no bucket is configured; the log client then writes to
/// stdout. Otherwise ensures the bucket exists and opens a stream to a fresh
/// object. The caller owns releasing that stream.
pub async fn create_output_sink(
    config: &FetchConfig,
    zone_id: &str,
    storage: &dyn ObjectStorage,
    clock: &dyn Clock,
) -> Result<Option<SharedSink>> {
    let Some(dest) = config.storage_destination() else {
        return Ok(None);
    };

    let span = info_span!("sink", bucket = %dest.bucket);
    let sink = open_object_sink(dest, zone_id, storage, clock)
        .instrument(span)
        .await?;
    Ok(Some(sink))
}

async fn open_object_sink(
    dest: &StorageDestination,
    zone_id: &str,
    storage: &dyn ObjectStorage,
    clock: &dyn Clock,
) -> Result<SharedSink> {
    let name = object_name(zone_id, clock.now_unix());

    match storage.create_bucket(&dest.project_id, &dest.bucket).await {
        Ok(()) => info!("Created bucket {}", dest.bucket),
        Err(StorageError::AlreadyExists(_)) => info!("Bucket {} already exists.", dest.bucket),
        Err(StorageError::Other(e)) => {
            return Err(e.context(format!("failed to create bucket {}", dest.bucket)));
        }
    }

    let writer = storage
        .open_writer(&dest.bucket, &name)
        .await
        .with_context(|| format!("failed to open gs://{}/{}", dest.bucket, name))?;
    info!("Writing logs to {}", writer.describe());

    Ok(Arc::new(Mutex::new(writer)))
}
