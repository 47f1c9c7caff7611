//! Chunk payload transform.
//!
//! The uploader passes every payload through a [`ChunkTransform`] before it
//! leaves the device. This is where an encryption step plugs in; the default
//! leaves the bytes untouched.

use crate::error::Result;

/// Rewrites a chunk payload before upload.
pub trait ChunkTransform: Send + Sync {
    /// Name of the transform (for logging).
    fn name(&self) -> &'static str;

    /// Transform `payload` into the bytes that will be uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transform`] if the payload cannot be processed.
    fn apply(&self, payload: Vec<u8>) -> Result<Vec<u8>>;
}

/// Uploads payloads unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl ChunkTransform for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn apply(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        Ok(payload)
    }
}
