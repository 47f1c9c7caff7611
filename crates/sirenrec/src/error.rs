//! Error types for sirenrec.
//!
//! This module defines all error types used throughout the sirenrec crate.
//! Only a handful of them ever reach the caller of `start`/`stop`; everything
//! on the upload path is logged and absorbed by the uploader.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for sirenrec operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Session Errors ===
    /// No authenticated user is available.
    #[error("no authenticated user")]
    NotAuthenticated,

    /// Required capture permission was not granted.
    #[error("missing permission: {permission}. {instructions}")]
    PermissionDenied {
        /// Name of the required permission.
        permission: String,
        /// Instructions for granting the permission.
        instructions: String,
    },

    /// A session is already recording.
    #[error("a session is already recording alert {alert_id}")]
    AlreadyRecording {
        /// The alert owned by the running session.
        alert_id: String,
    },

    // === Capture Errors ===
    /// The capture device failed to open a segment file.
    #[error("failed to start capture into {path}: {message}")]
    CaptureOpen {
        /// Segment file the device was asked to write.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// The capture device failed to stop cleanly.
    #[error("failed to stop capture: {message}")]
    CaptureClose {
        /// Description of what went wrong.
        message: String,
    },

    /// A segment is already open on this capture handle.
    #[error("capture already open on {path}")]
    CaptureBusy {
        /// The segment that is still open.
        path: PathBuf,
    },

    // === Upload Errors ===
    /// The segment file to upload is missing or empty.
    #[error("chunk file missing or empty: {path}")]
    ChunkMissing {
        /// Local path of the segment.
        path: PathBuf,
    },

    /// The payload transform (encryption hook) failed.
    #[error("chunk transform failed: {message}")]
    Transform {
        /// Description of what went wrong.
        message: String,
    },

    /// The object store failed in a way that may succeed on retry.
    #[error("object store unavailable for {key}: {message}")]
    ObjectStoreTransient {
        /// Remote key being written.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The object store refused the object; retrying will not help.
    #[error("object store rejected {key}: {message}")]
    ObjectStoreRejected {
        /// Remote key being written.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The remote key is not acceptable to the object store.
    #[error("invalid object key: {key}")]
    InvalidObjectKey {
        /// The offending key.
        key: String,
    },

    /// Every upload attempt for a chunk failed.
    #[error("upload of {key} failed after {attempts} attempts")]
    UploadExhausted {
        /// Remote key that could not be written.
        key: String,
        /// How many attempts were made.
        attempts: u32,
    },

    // === Metadata Errors ===
    /// The alert does not exist in the metadata store.
    #[error("alert not found: {id}")]
    AlertNotFound {
        /// The missing alert id.
        id: String,
    },

    /// An update tried to move a completed alert back to recording.
    #[error("alert {id} is already completed")]
    StatusRegression {
        /// The alert id.
        id: String,
    },

    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for sirenrec operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a permission denied error with instructions.
    #[must_use]
    pub fn permission_denied(
        permission: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self::PermissionDenied {
            permission: permission.into(),
            instructions: instructions.into(),
        }
    }

    /// Create a capture open error.
    #[must_use]
    pub fn capture_open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CaptureOpen {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a capture close error.
    #[must_use]
    pub fn capture_close(message: impl Into<String>) -> Self {
        Self::CaptureClose {
            message: message.into(),
        }
    }

    /// Create a transient object store error.
    #[must_use]
    pub fn object_store_transient(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ObjectStoreTransient {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a permanent object store error.
    #[must_use]
    pub fn object_store_rejected(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ObjectStoreRejected {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Check if retrying the failed operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ObjectStoreTransient { .. })
    }

    /// Check if this error is an authentication issue.
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }

    /// Check if this error is a permission issue.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Check if this error came from the capture device.
    #[must_use]
    pub fn is_capture_error(&self) -> bool {
        matches!(
            self,
            Self::CaptureOpen { .. } | Self::CaptureClose { .. } | Self::CaptureBusy { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::NotAuthenticated.to_string(), "no authenticated user");

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_is_auth_error() {
        assert!(Error::NotAuthenticated.is_auth_error());
        assert!(!Error::internal("x").is_auth_error());
    }

    #[test]
    fn test_is_permission_error() {
        let err = Error::permission_denied("Microphone", "Allow microphone access");
        assert!(err.is_permission_error());
        assert!(!Error::NotAuthenticated.is_permission_error());
    }

    #[test]
    fn test_permission_error_display() {
        let err = Error::permission_denied(
            "Microphone",
            "Set capture.microphone_permission = true in the config",
        );
        let msg = err.to_string();
        assert!(msg.contains("Microphone"));
        assert!(msg.contains("microphone_permission"));
    }

    #[test]
    fn test_only_transient_store_errors_retry() {
        assert!(Error::object_store_transient("k", "timeout").is_retryable());
        assert!(!Error::object_store_rejected("k", "quota").is_retryable());
        assert!(!Error::NotAuthenticated.is_retryable());
        assert!(!Error::ChunkMissing {
            path: PathBuf::from("/tmp/none.m4a")
        }
        .is_retryable());
    }

    #[test]
    fn test_capture_errors_classified() {
        assert!(Error::capture_open("/tmp/a.m4a", "no device").is_capture_error());
        assert!(Error::capture_close("hung").is_capture_error());
        assert!(Error::CaptureBusy {
            path: PathBuf::from("/tmp/a.m4a")
        }
        .is_capture_error());
        assert!(!Error::NotAuthenticated.is_capture_error());
    }

    #[test]
    fn test_capture_open_display() {
        let msg = Error::capture_open("/tmp/seg.m4a", "device busy").to_string();
        assert!(msg.contains("/tmp/seg.m4a"));
        assert!(msg.contains("device busy"));
    }

    #[test]
    fn test_upload_exhausted_display() {
        let err = Error::UploadExhausted {
            key: "alerts/u/a/0_1.m4a".to_string(),
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("alerts/u/a/0_1.m4a"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_already_recording_display() {
        let err = Error::AlreadyRecording {
            alert_id: "abc123".to_string(),
        };
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }

    #[test]
    fn test_database_open_error_display() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/alerts.db",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err = Error::DatabaseOpen {
                path: PathBuf::from("/nonexistent/path/alerts.db"),
                source: sqlite_err,
            };
            assert!(err.to_string().contains("/nonexistent/path/alerts.db"));
        }
    }
}
