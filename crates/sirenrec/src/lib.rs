//! `sirenrec` - A panic-alert recorder that uploads audio while it records
//!
//! A session records microphone audio into short local segments. Every
//! rotation hands the finished segment to a background uploader that pushes
//! it to durable storage and records it against the session's alert, so
//! audio captured before the device is lost or destroyed is already safe.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alert;
pub mod cli;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod identity;
pub mod logging;
pub mod object_store;
pub mod scheduler;
pub mod segmenter;
pub mod storage;
pub mod transform;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use alert::{Alert, AlertId, AlertStatus, AlertUpdate, Chunk, NewChunk, UserId};
pub use config::Config;
pub use controller::{AlertController, Collaborators, SessionSettings, StoppedSession};
pub use device::{CaptureDevice, CommandDevice};
pub use error::{Error, Result};
pub use identity::{IdentityProvider, PermissionProvider, StaticIdentity, StaticPermission};
pub use logging::init_logging;
pub use object_store::{FsObjectStore, ObjectStore};
pub use storage::{MetadataStore, SqliteMetadataStore, StoreStats};
pub use transform::{ChunkTransform, Passthrough};
pub use uploader::{ChunkJob, ChunkSequence, ChunkUploader, RetryPolicy};
