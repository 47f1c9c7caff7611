//! Durable object storage for chunk payloads.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result};

/// A store that durably keeps uploaded chunk payloads.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `payload` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectStoreTransient`] for failures worth retrying and
    /// any other error for failures that are not.
    async fn put(&self, key: &str, payload: &[u8], content_type: &str) -> Result<()>;
}

/// Object store rooted at a local directory, e.g. a mounted sync folder.
///
/// Objects are written to a temporary sibling and renamed into place so a
/// reader never sees a partial object.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` below the root, rejecting keys that would escape it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidObjectKey`] unless every `/`-separated segment
    /// is non-empty and neither `.` nor `..`. Backslashes are rejected too.
    pub fn object_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.contains('\\')
            && key
                .split('/')
                .all(|segment| !matches!(segment, "" | "." | ".."));
        if !valid {
            return Err(Error::InvalidObjectKey {
                key: key.to_string(),
            });
        }
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, payload: &[u8], content_type: &str) -> Result<()> {
        let path = self.object_path(key)?;
        let transient = |e: std::io::Error| Error::object_store_transient(key, e.to_string());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(transient)?;
        }

        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, payload).await.map_err(transient)?;
        tokio::fs::rename(&partial, &path).await.map_err(transient)?;

        debug!(key, content_type, bytes = payload.len(), "Stored object");
        Ok(())
    }
}
