//! Configuration management for sirenrec.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "sirenrec";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "alerts.db";

/// Placeholder in capture arguments replaced by the segment path.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SIRENREC_`, sections split on `__`,
///    e.g. `SIRENREC_UPLOAD__MAX_ATTEMPTS`)
/// 2. TOML config file at `~/.config/sirenrec/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Segment rotation and local file settings.
    pub recording: RecordingConfig,
    /// Chunk upload settings.
    pub upload: UploadConfig,
    /// Metadata and object store locations.
    pub storage: StorageConfig,
    /// External recorder settings.
    pub capture: CaptureConfig,
    /// Who is recording.
    pub identity: IdentityConfig,
}

/// Segment rotation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Seconds between segment rotations.
    pub chunk_interval_secs: u64,
    /// Directory segment files are written to.
    /// Defaults to `~/.local/share/sirenrec/sirens`
    pub working_dir: Option<PathBuf>,
    /// Extension of segment files and uploaded objects.
    pub file_extension: String,
    /// Content type sent to the object store.
    pub content_type: String,
}

/// Upload configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Total push attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Fixed delay between push attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// First segment of every remote key.
    pub key_prefix: String,
}

/// Storage locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the alert metadata database.
    /// Defaults to `~/.local/share/sirenrec/alerts.db`
    pub database_path: Option<PathBuf>,
    /// Root directory of the file-backed object store.
    /// Defaults to `~/.local/share/sirenrec/objects`
    pub object_store_dir: Option<PathBuf>,
}

/// External recorder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Recorder program to spawn for each segment.
    pub program: String,
    /// Program arguments; `{path}` is replaced by the segment path.
    pub args: Vec<String>,
    /// Bytes written to the recorder's stdin to ask it to finish the file.
    pub stop_input: String,
    /// How long to wait for the recorder to exit before killing it.
    pub stop_timeout_ms: u64,
    /// Whether microphone access has been granted to the recorder.
    pub microphone_permission: bool,
}

/// Identity configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Authenticated user id. Recording is refused while unset.
    pub user_id: Option<String>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            chunk_interval_secs: 15,
            working_dir: None, // Will be resolved to default at runtime
            file_extension: "m4a".to_string(),
            content_type: "audio/m4a".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1_000,
            key_prefix: "alerts".to_string(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            args: default_capture_args(),
            stop_input: "q".to_string(),
            stop_timeout_ms: 5_000,
            microphone_permission: true,
        }
    }
}

/// Default ffmpeg arguments: default PulseAudio source to AAC.
fn default_capture_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "pulse",
        "-i",
        "default",
        "-c:a",
        "aac",
        "-y",
        PATH_PLACEHOLDER,
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SIRENREC_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.recording.chunk_interval_secs == 0 {
            return Err(invalid("chunk_interval_secs must be greater than 0"));
        }

        if self.recording.file_extension.trim().is_empty() {
            return Err(invalid("file_extension must not be empty"));
        }

        if self.upload.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }

        if self.upload.key_prefix.trim_matches('/').is_empty() {
            return Err(invalid("key_prefix must not be empty"));
        }

        if self.capture.program.trim().is_empty() {
            return Err(invalid("capture program must not be empty"));
        }

        if !self
            .capture
            .args
            .iter()
            .any(|arg| arg.contains(PATH_PLACEHOLDER))
        {
            return Err(invalid(format!(
                "capture args must contain the {PATH_PLACEHOLDER} placeholder"
            )));
        }

        Ok(())
    }

    /// Get the segment working directory, resolving defaults if not set.
    #[must_use]
    pub fn working_dir(&self) -> PathBuf {
        self.recording
            .working_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("sirens"))
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the object store root, resolving defaults if not set.
    #[must_use]
    pub fn object_store_dir(&self) -> PathBuf {
        self.storage
            .object_store_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("objects"))
    }

    /// Get the rotation interval as a Duration.
    #[must_use]
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_secs(self.recording.chunk_interval_secs)
    }

    /// Get the delay between upload attempts as a Duration.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.upload.retry_delay_ms)
    }

    /// Get the recorder stop timeout as a Duration.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.capture.stop_timeout_ms)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.recording.chunk_interval_secs, 15);
        assert_eq!(config.recording.file_extension, "m4a");
        assert_eq!(config.recording.content_type, "audio/m4a");
        assert_eq!(config.upload.max_attempts, 3);
        assert_eq!(config.upload.retry_delay_ms, 1_000);
        assert_eq!(config.upload.key_prefix, "alerts");
        assert!(config.capture.microphone_permission);
        assert!(config.identity.user_id.is_none());
    }

    #[test]
    fn test_default_capture_args_have_placeholder() {
        let capture = CaptureConfig::default();
        assert_eq!(capture.program, "ffmpeg");
        assert_eq!(capture.args.last().map(String::as_str), Some(PATH_PLACEHOLDER));
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.recording.chunk_interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("chunk_interval_secs"));
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut config = Config::default();
        config.upload.max_attempts = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_attempts"));
    }

    #[test]
    fn test_validate_empty_extension() {
        let mut config = Config::default();
        config.recording.file_extension = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("file_extension"));
    }

    #[test]
    fn test_validate_slash_only_prefix() {
        let mut config = Config::default();
        config.upload.key_prefix = "/".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("key_prefix"));
    }

    #[test]
    fn test_validate_args_without_placeholder() {
        let mut config = Config::default();
        config.capture.args = vec!["-i".to_string(), "default".to_string()];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("{path}"));
    }

    #[test]
    fn test_working_dir_default() {
        let config = Config::default();
        let path = config.working_dir();
        assert!(path.ends_with("sirenrec/sirens"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/alerts.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/alerts.sqlite")
        );
    }

    #[test]
    fn test_object_store_dir_default() {
        let config = Config::default();
        assert!(config.object_store_dir().ends_with("sirenrec/objects"));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.chunk_interval(), Duration::from_secs(15));
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.stop_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("sirenrec"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "sirenrec_config_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[recording]\nchunk_interval_secs = 30\n\n[identity]\nuser_id = \"u-42\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.recording.chunk_interval_secs, 30);
        assert_eq!(config.identity.user_id.as_deref(), Some("u-42"));
        assert_eq!(config.upload.max_attempts, 3);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = std::env::temp_dir().join(format!(
            "sirenrec_config_invalid_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[recording]\nchunk_interval_secs = 0\n").unwrap();

        let err = Config::load_from(Some(path.clone())).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_upload_config_deserialize() {
        let json = r#"{"max_attempts": 5}"#;
        let upload: UploadConfig = serde_json::from_str(json).unwrap();
        assert_eq!(upload.max_attempts, 5);
        assert_eq!(upload.retry_delay_ms, 1_000);
    }
}
