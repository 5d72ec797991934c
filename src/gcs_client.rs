// src/gcs_client.rs
//
// Google Cloud Storage backend for log output, using the gcloud-storage crate.
// Authentication uses Application Default Credentials (ADC).

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use gcloud_storage::client::{Client, ClientConfig};
use gcloud_storage::http::buckets::insert::{InsertBucketParam, InsertBucketRequest};
use gcloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use gcloud_storage::http::objects::Object;
use gcloud_storage::http::resumable_upload_client::{ChunkSize, ResumableUploadClient};
use gcloud_storage::http::Error as GcsHttpError;
use tracing::{debug, info};

use crate::constants::{
    DEFAULT_GCS_UPLOAD_CHUNK_SIZE, ENV_GCS_ENDPOINT_URL, ENV_STORAGE_EMULATOR_HOST,
    GCS_CHUNK_ALIGNMENT,
};
use crate::sink::{LogSink, ObjectStorage, StorageError};

/// GCS answers bucket inserts for an existing name with 409 Conflict.
const HTTP_CONFLICT: u16 = 409;

/// GCS-backed [`ObjectStorage`].
///
/// Authentication follows the standard ADC chain:
/// 1. GOOGLE_APPLICATION_CREDENTIALS environment variable (service account JSON)
/// 2. GCE/GKE metadata server (automatic for Google Cloud workloads)
/// 3. gcloud CLI credentials (~/.config/gcloud/application_default_credentials.json)
///
/// `GCS_ENDPOINT_URL` or `STORAGE_EMULATOR_HOST` switch to a custom endpoint
/// with anonymous access, for fake-gcs-server and similar emulators.
#[derive(Clone)]
pub struct GcsStorage {
    client: Client,
    chunk_size: usize,
}

impl GcsStorage {
    pub async fn new() -> Result<Self> {
        let config = match resolve_gcs_endpoint() {
            Some(endpoint) => {
                info!("Using custom GCS endpoint: {}", endpoint);
                ClientConfig {
                    storage_endpoint: endpoint,
                    ..ClientConfig::default()
                }
                .anonymous()
            }
            None => {
                debug!("Initializing GCS client with Application Default Credentials");
                ClientConfig::default()
                    .with_auth()
                    .await
                    .map_err(|e| anyhow!("Failed to initialize GCS authentication: {}", e))?
            }
        };

        Ok(Self {
            client: Client::new(config),
            chunk_size: DEFAULT_GCS_UPLOAD_CHUNK_SIZE,
        })
    }

    /// Override the resumable upload chunk size. Rounded down to a multiple
    /// of 256 KiB, never below one unit.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = aligned_chunk_size(chunk_size);
        self
    }
}

#[async_trait]
impl ObjectStorage for GcsStorage {
    async fn create_bucket(&self, project_id: &str, bucket: &str) -> Result<(), StorageError> {
        debug!("GCS CREATE BUCKET: bucket={}, project={}", bucket, project_id);

        let request = InsertBucketRequest {
            name: bucket.to_string(),
            param: InsertBucketParam {
                project: project_id.to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        match self.client.insert_bucket(&request).await {
            Ok(_) => {
                debug!("GCS CREATE BUCKET success");
                Ok(())
            }
            Err(GcsHttpError::Response(resp)) if resp.code == HTTP_CONFLICT => {
                Err(StorageError::AlreadyExists(bucket.to_string()))
            }
            Err(e) => Err(anyhow!("GCS CREATE BUCKET failed for {}: {}", bucket, e).into()),
        }
    }

    async fn open_writer(&self, bucket: &str, object: &str) -> Result<Box<dyn LogSink>> {
        debug!("GCS OPEN WRITER: gs://{}/{}", bucket, object);
        Ok(Box::new(GcsObjectWriter::new(
            self.client.clone(),
            bucket,
            object,
            self.chunk_size,
        )))
    }
}

/// Byte range of one resumable upload request. `total` is set only on the
/// request that completes the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub first: u64,
    pub last: u64,
    pub total: Option<u64>,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    fn to_chunk_size(self) -> ChunkSize {
        ChunkSize::new(self.first, self.last, self.total)
    }
}

/// Full chunks that can be sent with `buffered` bytes pending after
/// `uploaded` bytes went out. At least one byte is always held back so the
/// completing request is never empty.
pub fn plan_chunks(uploaded: u64, buffered: usize, chunk_size: usize) -> Vec<ChunkRange> {
    let count = if buffered > chunk_size {
        (buffered - 1) / chunk_size
    } else {
        0
    };
    let step = chunk_size as u64;
    (0..count as u64)
        .map(|i| {
            let first = uploaded + i * step;
            ChunkRange {
                first,
                last: first + step - 1,
                total: None,
            }
        })
        .collect()
}

/// How the object gets committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// No session was opened: the whole object (possibly empty) goes up in
    /// one simple upload.
    Simple { len: u64 },
    /// The buffered tail closes the resumable session.
    LastChunk(ChunkRange),
}

/// Decide how to commit `tail` buffered bytes.
pub fn plan_completion(session_open: bool, uploaded: u64, tail: usize) -> Result<Completion> {
    if !session_open {
        return Ok(Completion::Simple { len: tail as u64 });
    }
    if tail == 0 {
        bail!("resumable upload has no bytes left to complete it ({} sent)", uploaded);
    }
    let total = uploaded + tail as u64;
    Ok(Completion::LastChunk(ChunkRange {
        first: uploaded,
        last: total - 1,
        total: Some(total),
    }))
}

/// Streaming writer for one GCS object.
///
/// Bytes are buffered until a full chunk is available, then sent through a
/// resumable upload session opened on the first full chunk. `finalize` sends
/// the tail and closes the session. Objects that never fill a chunk go up as
/// a single simple upload. Bytes leave the buffer only once their chunk has
/// been accepted.
pub struct GcsObjectWriter {
    client: Client,
    bucket: String,
    object: String,
    chunk_size: usize,
    buffer: BytesMut,
    session: Option<ResumableUploadClient>,
    uploaded: u64,
    bytes_written: u64,
    finalized: bool,
}

impl GcsObjectWriter {
    fn new(client: Client, bucket: &str, object: &str, chunk_size: usize) -> Self {
        let chunk_size = aligned_chunk_size(chunk_size);
        Self {
            client,
            bucket: bucket.to_string(),
            object: object.to_string(),
            chunk_size,
            buffer: BytesMut::with_capacity(chunk_size),
            session: None,
            uploaded: 0,
            bytes_written: 0,
            finalized: false,
        }
    }

    fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.object)
    }

    async fn session(&mut self) -> Result<&ResumableUploadClient> {
        if self.session.is_none() {
            let upload_type = UploadType::Multipart(Box::new(Object {
                name: self.object.clone(),
                content_type: Some("application/json".to_string()),
                ..Default::default()
            }));
            let session = self
                .client
                .prepare_resumable_upload(
                    &UploadObjectRequest {
                        bucket: self.bucket.clone(),
                        ..Default::default()
                    },
                    &upload_type,
                )
                .await
                .map_err(|e| anyhow!("GCS resumable upload init failed for {}: {}", self.uri(), e))?;
            debug!("GCS resumable session opened for {}", self.uri());
            self.session = Some(session);
        }
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("GCS upload session missing for {}", self.uri()))
    }

    /// Send the first `range.len()` buffered bytes, then drop them from the buffer.
    async fn send_chunk(&mut self, range: ChunkRange) -> Result<()> {
        let len = range.len() as usize;
        let chunk = Bytes::copy_from_slice(&self.buffer[..len]);
        let uri = self.uri();
        self.session()
            .await?
            .upload_multiple_chunk(chunk, &range.to_chunk_size())
            .await
            .map_err(|e| anyhow!("GCS chunk upload failed for {} at offset {}: {}", uri, range.first, e))?;
        self.buffer.advance(len);
        self.uploaded = range.last + 1;
        debug!("GCS chunk uploaded: {} bytes total for {}", self.uploaded, uri);
        Ok(())
    }
}

#[async_trait]
impl LogSink for GcsObjectWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.finalized {
            bail!("Cannot write to finalized writer for {}", self.uri());
        }
        self.buffer.extend_from_slice(chunk);
        self.bytes_written += chunk.len() as u64;

        for range in plan_chunks(self.uploaded, self.buffer.len(), self.chunk_size) {
            self.send_chunk(range).await?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        // A failed commit is not retried.
        self.finalized = true;

        match plan_completion(self.session.is_some(), self.uploaded, self.buffer.len())? {
            Completion::Simple { .. } => {
                let upload_type = UploadType::Simple(Media::new(self.object.clone()));
                self.client
                    .upload_object(
                        &UploadObjectRequest {
                            bucket: self.bucket.clone(),
                            ..Default::default()
                        },
                        self.buffer.split().freeze(),
                        &upload_type,
                    )
                    .await
                    .map_err(|e| anyhow!("GCS PUT failed for {}: {}", self.uri(), e))?;
            }
            Completion::LastChunk(range) => self.send_chunk(range).await?,
        }

        info!("Committed {} ({} bytes)", self.uri(), self.bytes_written);
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn describe(&self) -> String {
        self.uri()
    }
}

/// Round down to a multiple of the GCS chunk alignment, never below one unit.
pub fn aligned_chunk_size(requested: usize) -> usize {
    (requested / GCS_CHUNK_ALIGNMENT).max(1) * GCS_CHUNK_ALIGNMENT
}

/// Resolves the GCS storage endpoint based on environment variables.
///
/// Returns a custom endpoint URL if `GCS_ENDPOINT_URL` or `STORAGE_EMULATOR_HOST`
/// is set, otherwise returns `None` (indicating default GCS endpoint should be used).
pub fn resolve_gcs_endpoint() -> Option<String> {
    std::env::var(ENV_GCS_ENDPOINT_URL).ok().or_else(|| {
        // GCS emulator convention: STORAGE_EMULATOR_HOST=host:port
        std::env::var(ENV_STORAGE_EMULATOR_HOST).ok().map(|host| {
            if host.starts_with("http://") || host.starts_with("https://") {
                host
            } else {
                format!("http://{}", host)
            }
        })
    })
}
