//! Capture device abstraction.
//!
//! A [`CaptureDevice`] records audio into one file at a time. The segmenter
//! drives it; platform or process specifics stay behind this trait.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::{CaptureConfig, PATH_PLACEHOLDER};
use crate::error::{Error, Result};

/// How long a freshly spawned recorder must stay alive to count as started.
const STARTUP_CHECK: Duration = Duration::from_millis(100);

/// A recorder that captures audio into a named file.
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// The name of this device (for logging).
    fn name(&self) -> &'static str;

    /// Begin capturing into a new file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a capture error if the device is unavailable or already
    /// capturing.
    async fn open(&mut self, path: &Path) -> Result<()>;

    /// Stop capturing and finalize the open file.
    ///
    /// Calling this with nothing open is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a capture error if the recorder could not be stopped cleanly.
    async fn close(&mut self) -> Result<()>;
}

/// Captures by spawning an external recorder process per segment.
///
/// The configured arguments have `{path}` replaced by the segment path. On
/// close the stop input is written to the recorder's stdin (ffmpeg finishes
/// the container on `q`); a recorder that does not exit within the stop
/// timeout is killed. A recorder that exits within [`STARTUP_CHECK`] of
/// being spawned (bad arguments, no input device) fails the open.
#[derive(Debug)]
pub struct CommandDevice {
    program: String,
    args: Vec<String>,
    stop_input: Vec<u8>,
    stop_timeout: Duration,
    child: Option<Child>,
}

impl CommandDevice {
    /// Create a device from the capture configuration.
    #[must_use]
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            stop_input: config.stop_input.clone().into_bytes(),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
            child: None,
        }
    }

    /// Arguments for capturing into `path`.
    fn args_for(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect()
    }
}

#[async_trait::async_trait]
impl CaptureDevice for CommandDevice {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn open(&mut self, path: &Path) -> Result<()> {
        if self.child.is_some() {
            return Err(Error::CaptureBusy {
                path: PathBuf::from(path),
            });
        }

        debug!(program = %self.program, path = %path.display(), "Spawning recorder");
        let mut child = Command::new(&self.program)
            .args(self.args_for(path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::capture_open(path, format!("failed to spawn {}: {e}", self.program)))?;

        tokio::time::sleep(STARTUP_CHECK).await;
        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                return Err(Error::capture_open(
                    path,
                    format!("{} exited at startup with {status}", self.program),
                ));
            }
            Err(e) => {
                return Err(Error::capture_open(
                    path,
                    format!("failed to poll {}: {e}", self.program),
                ));
            }
        }

        self.child = Some(child);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&self.stop_input).await {
                debug!(error = %e, "Recorder stdin closed before stop input");
            }
            // Dropping stdin sends EOF as well
        }

        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(Error::capture_close(format!(
                "{} exited with {status}",
                self.program
            ))),
            Ok(Err(e)) => Err(Error::capture_close(e.to_string())),
            Err(_) => {
                warn!(
                    program = %self.program,
                    timeout_ms = self.stop_timeout.as_millis(),
                    "Recorder did not stop in time, killing"
                );
                child
                    .kill()
                    .await
                    .map_err(|e| Error::capture_close(e.to_string()))
            }
        }
    }
}
