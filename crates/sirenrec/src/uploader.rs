//! Chunk uploader.
//!
//! Moves one finished segment file into durable storage: read, transform,
//! push under a deterministic key with bounded retries, record the chunk
//! against its alert, then delete the local copy. Failures never reach the
//! recording session; they are logged and reported as `false`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::alert::{self, AlertId, Chunk, NewChunk};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::identity::IdentityProvider;
use crate::object_store::ObjectStore;
use crate::storage::MetadataStore;
use crate::transform::{ChunkTransform, Passthrough};

/// Bounded retry for object store pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total push attempts, including the first.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Build the policy from the upload configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.upload.max_attempts,
            delay: config.retry_delay(),
        }
    }
}

/// Per-session chunk sequence counter.
///
/// Clones share the counter. Indices are handed out in upload order, so a
/// chunk that is dropped before its push leaves no gap, and one dropped
/// after retries leaves exactly one.
#[derive(Debug, Clone, Default)]
pub struct ChunkSequence(Arc<AtomicU32>);

impl ChunkSequence {
    /// A counter starting at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next index.
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    /// The index the next call to [`ChunkSequence::next`] will return.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A finished segment waiting to be uploaded.
///
/// Carries the alert and sequence of the session that produced it, so an
/// upload that outlives its session still lands on the right alert.
#[derive(Debug, Clone)]
pub struct ChunkJob {
    /// Local segment file.
    pub path: PathBuf,
    /// Owning alert.
    pub alert_id: AlertId,
    /// Sequence counter of the owning session.
    pub sequence: ChunkSequence,
}

impl ChunkJob {
    /// Create a job for `path`.
    #[must_use]
    pub fn new(path: PathBuf, alert_id: AlertId, sequence: ChunkSequence) -> Self {
        Self {
            path,
            alert_id,
            sequence,
        }
    }
}

/// Uploads finished segments.
pub struct ChunkUploader {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    identity: Arc<dyn IdentityProvider>,
    transform: Arc<dyn ChunkTransform>,
    retry: RetryPolicy,
    key_prefix: String,
    extension: String,
    content_type: String,
}

impl std::fmt::Debug for ChunkUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkUploader")
            .field("transform", &self.transform.name())
            .field("retry", &self.retry)
            .field("key_prefix", &self.key_prefix)
            .field("extension", &self.extension)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl ChunkUploader {
    /// Create an uploader with the configured key layout and retry policy
    /// and a passthrough transform.
    #[must_use]
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        identity: Arc<dyn IdentityProvider>,
        config: &Config,
    ) -> Self {
        Self {
            objects,
            metadata,
            identity,
            transform: Arc::new(Passthrough),
            retry: RetryPolicy::from_config(config),
            key_prefix: config.upload.key_prefix.clone(),
            extension: config.recording.file_extension.clone(),
            content_type: config.recording.content_type.clone(),
        }
    }

    /// Replace the payload transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn ChunkTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Upload a segment, logging any failure.
    ///
    /// Returns whether a chunk record was written.
    pub async fn upload(&self, job: &ChunkJob) -> bool {
        match self.try_upload(job).await {
            Ok(chunk) => {
                info!(
                    alert_id = %chunk.alert_id,
                    sequence = chunk.sequence_index,
                    key = %chunk.remote_key,
                    bytes = chunk.size_bytes,
                    "Chunk uploaded"
                );
                true
            }
            Err(e) => {
                error!(
                    alert_id = %job.alert_id,
                    path = %job.path.display(),
                    error = %e,
                    "Chunk upload failed"
                );
                false
            }
        }
    }

    /// Upload a segment and return its chunk record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChunkMissing`] for an absent or empty file,
    /// [`Error::NotAuthenticated`] with no signed-in user,
    /// [`Error::UploadExhausted`] once transient push failures use up the
    /// retry budget, and the underlying error for anything else. The local
    /// file is kept on every failure.
    pub async fn try_upload(&self, job: &ChunkJob) -> Result<Chunk> {
        ensure_segment(&job.path).await?;

        let raw = tokio::fs::read(&job.path).await?;
        let payload = self.transform.apply(raw)?;

        let owner = self
            .identity
            .current_user()
            .await
            .ok_or(Error::NotAuthenticated)?;

        let sequence_index = job.sequence.next();
        let key = alert::remote_key(
            &self.key_prefix,
            &owner,
            &job.alert_id,
            sequence_index,
            Utc::now(),
            &self.extension,
        );

        self.put_with_retry(&key, &payload).await?;

        let record = NewChunk::for_payload(sequence_index, key.clone(), &payload, &self.content_type);
        let chunk = match self.metadata.add_chunk(&job.alert_id, record).await {
            Ok(chunk) => chunk,
            Err(e) => {
                error!(
                    alert_id = %job.alert_id,
                    sequence = sequence_index,
                    key = %key,
                    error = %e,
                    "Chunk record not written, stored object is orphaned"
                );
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::remove_file(&job.path).await {
            warn!(path = %job.path.display(), error = %e, "Failed to delete uploaded segment");
        }

        Ok(chunk)
    }

    async fn put_with_retry(&self, key: &str, payload: &[u8]) -> Result<()> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.objects.put(key, payload, &self.content_type).await {
                Ok(()) => {
                    debug!(key, attempt, "Push succeeded");
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    warn!(key, attempt, error = %e, "Push failed, giving up");
                    return Err(Error::UploadExhausted {
                        key: key.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(key, attempt, error = %e, "Push failed, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        }
    }
}

async fn ensure_segment(path: &Path) -> Result<()> {
    let missing = || Error::ChunkMissing {
        path: path.to_path_buf(),
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(missing()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(missing()),
        Err(e) => Err(e.into()),
    }
}
