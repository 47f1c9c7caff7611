//! Session/alert controller.
//!
//! The controller is the recorder's state machine. `start` creates the alert,
//! opens the first segment and arms the rotation scheduler; `stop` disarms
//! it, flushes the last segment through the uploader and completes the
//! alert. Rotation uploads run in the background and never fail a session.

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::alert::{AlertId, AlertUpdate};
use crate::config::Config;
use crate::device::CaptureDevice;
use crate::error::{Error, Result};
use crate::identity::{IdentityProvider, PermissionProvider, MICROPHONE_INSTRUCTIONS};
use crate::scheduler::{RotationHandle, RotationScheduler};
use crate::segmenter::{segment_path, Segmenter};
use crate::storage::MetadataStore;
use crate::uploader::{ChunkJob, ChunkSequence, ChunkUploader};

/// Where and how often segments are cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Directory that holds segments until they are uploaded.
    pub working_dir: PathBuf,
    /// Segment file extension.
    pub extension: String,
    /// Rotation period.
    pub chunk_interval: Duration,
}

impl SessionSettings {
    /// Build the settings from the recording configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            working_dir: config.working_dir(),
            extension: config.recording.file_extension.clone(),
            chunk_interval: config.chunk_interval(),
        }
    }
}

/// Outcome of stopping a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoppedSession {
    /// The alert that was recording.
    pub alert_id: AlertId,
    /// Whether the final segment produced a chunk record.
    pub final_chunk_uploaded: bool,
}

/// State of the one session a controller can run.
#[derive(Debug)]
struct SessionState {
    segmenter: Segmenter,
    alert_id: Option<AlertId>,
    sequence: ChunkSequence,
    segment_index: u32,
    rotation: Option<RotationHandle>,
}

impl SessionState {
    fn new(segmenter: Segmenter) -> Self {
        Self {
            segmenter,
            alert_id: None,
            sequence: ChunkSequence::new(),
            segment_index: 0,
            rotation: None,
        }
    }
}

/// Counts background uploads so a host can drain them before exit.
#[derive(Debug)]
struct UploadTracker {
    in_flight: watch::Sender<usize>,
}

impl UploadTracker {
    fn new() -> Self {
        Self {
            in_flight: watch::channel(0).0,
        }
    }

    fn begin(self: &Arc<Self>) -> UploadGuard {
        self.in_flight.send_modify(|n| *n += 1);
        UploadGuard {
            tracker: Arc::clone(self),
        }
    }

    fn count(&self) -> usize {
        *self.in_flight.borrow()
    }

    async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

struct UploadGuard {
    tracker: Arc<UploadTracker>,
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        self.tracker
            .in_flight
            .send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// The recorder's services.
pub struct Collaborators {
    /// Records audio into files.
    pub device: Box<dyn CaptureDevice>,
    /// Alert and chunk records.
    pub metadata: Arc<dyn MetadataStore>,
    /// Signed-in user.
    pub identity: Arc<dyn IdentityProvider>,
    /// Microphone access.
    pub permission: Arc<dyn PermissionProvider>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("device", &self.device.name())
            .finish_non_exhaustive()
    }
}

struct Inner {
    metadata: Arc<dyn MetadataStore>,
    identity: Arc<dyn IdentityProvider>,
    permission: Arc<dyn PermissionProvider>,
    uploader: Arc<ChunkUploader>,
    settings: SessionSettings,
    session: Mutex<SessionState>,
    uploads: Arc<UploadTracker>,
}

/// Starts and stops alert recordings.
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct AlertController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AlertController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertController")
            .field("settings", &self.inner.settings)
            .field("uploader", &self.inner.uploader)
            .finish_non_exhaustive()
    }
}

impl AlertController {
    /// Create an idle controller.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        uploader: ChunkUploader,
        settings: SessionSettings,
    ) -> Self {
        let Collaborators {
            device,
            metadata,
            identity,
            permission,
        } = collaborators;

        Self {
            inner: Arc::new(Inner {
                metadata,
                identity,
                permission,
                uploader: Arc::new(uploader),
                settings,
                session: Mutex::new(SessionState::new(Segmenter::new(device))),
                uploads: Arc::new(UploadTracker::new()),
            }),
        }
    }

    /// Start recording a new alert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRecording`] while a session runs,
    /// [`Error::NotAuthenticated`] with nobody signed in,
    /// [`Error::PermissionDenied`] without microphone access, and the capture
    /// error if the first segment cannot be opened. Nothing is left running
    /// on error.
    pub async fn start(&self) -> Result<AlertId> {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;

        if let Some(alert_id) = &session.alert_id {
            warn!(alert_id = %alert_id, "Start requested while recording");
            return Err(Error::AlreadyRecording {
                alert_id: alert_id.to_string(),
            });
        }

        let owner = inner
            .identity
            .current_user()
            .await
            .ok_or(Error::NotAuthenticated)?;

        if !inner.permission.request_microphone_permission().await {
            return Err(Error::permission_denied("microphone", MICROPHONE_INSTRUCTIONS));
        }

        let dir = &inner.settings.working_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| Error::DirectoryCreate {
                path: dir.clone(),
                source,
            })?;

        let alert = inner.metadata.create_alert(&owner).await?;

        session.sequence = ChunkSequence::new();
        session.segment_index = 0;
        let first = segment_path(dir, &alert.id, 0, Utc::now(), &inner.settings.extension);

        if let Err(e) = session.segmenter.open(first).await {
            error!(alert_id = %alert.id, error = %e, "Could not open first segment");
            if let Err(update_err) = inner
                .metadata
                .update_alert(&alert.id, AlertUpdate::completed())
                .await
            {
                warn!(alert_id = %alert.id, error = %update_err, "Failed to close abandoned alert");
            }
            return Err(e);
        }

        session.alert_id = Some(alert.id.clone());
        session.rotation = Some(self.arm_scheduler(alert.id.clone()));

        info!(alert_id = %alert.id, owner = %owner, "Recording started");
        Ok(alert.id)
    }

    /// Stop the running session.
    ///
    /// The final segment is uploaded before this returns and the alert is
    /// marked completed whatever that upload's outcome. Background uploads
    /// from earlier rotations are not awaited; see
    /// [`AlertController::wait_for_uploads`]. Returns `None` when idle.
    pub async fn stop(&self) -> Option<StoppedSession> {
        let inner = &self.inner;

        let (alert_id, final_job, rotation) = {
            let mut session = inner.session.lock().await;
            let alert_id = session.alert_id.take()?;

            let rotation = session.rotation.take();
            if let Some(rotation) = &rotation {
                rotation.cancel();
            }

            let final_job = session
                .segmenter
                .close()
                .await
                .map(|path| ChunkJob::new(path, alert_id.clone(), session.sequence.clone()));
            (alert_id, final_job, rotation)
        };

        // A tick blocked on the session lock sees the cleared alert and returns
        if let Some(rotation) = rotation {
            rotation.join().await;
        }

        let final_chunk_uploaded = match final_job {
            Some(job) => {
                let _guard = inner.uploads.begin();
                inner.uploader.upload(&job).await
            }
            None => false,
        };

        match inner
            .metadata
            .update_alert(&alert_id, AlertUpdate::completed())
            .await
        {
            Ok(_) => info!(alert_id = %alert_id, final_chunk_uploaded, "Recording stopped"),
            Err(e) => error!(alert_id = %alert_id, error = %e, "Failed to complete alert"),
        }

        Some(StoppedSession {
            alert_id,
            final_chunk_uploaded,
        })
    }

    /// Cut the current segment now and queue it for upload.
    ///
    /// Returns `Ok(false)` when idle.
    ///
    /// # Errors
    ///
    /// Returns the capture error if the next segment cannot be opened. The
    /// session keeps running and the following rotation tries again.
    pub async fn rotate(&self) -> Result<bool> {
        let mut session = self.inner.session.lock().await;
        self.rotate_locked(&mut session, None).await
    }

    async fn rotate_alert(&self, alert_id: &AlertId) -> Result<bool> {
        let mut session = self.inner.session.lock().await;
        self.rotate_locked(&mut session, Some(alert_id)).await
    }

    async fn rotate_locked(
        &self,
        session: &mut SessionState,
        expected: Option<&AlertId>,
    ) -> Result<bool> {
        let Some(alert_id) = session.alert_id.clone() else {
            return Ok(false);
        };
        if expected.is_some_and(|expected| *expected != alert_id) {
            return Ok(false);
        }

        if let Some(path) = session.segmenter.close().await {
            self.spawn_upload(ChunkJob::new(path, alert_id.clone(), session.sequence.clone()));
        }

        session.segment_index += 1;
        let next = segment_path(
            &self.inner.settings.working_dir,
            &alert_id,
            session.segment_index,
            Utc::now(),
            &self.inner.settings.extension,
        );
        session.segmenter.open(next).await?;

        debug!(alert_id = %alert_id, segment = session.segment_index, "Segment rotated");
        Ok(true)
    }

    fn spawn_upload(&self, job: ChunkJob) {
        let guard = self.inner.uploads.begin();
        let uploader = Arc::clone(&self.inner.uploader);
        tokio::spawn(async move {
            let _guard = guard;
            uploader.upload(&job).await;
        });
    }

    fn arm_scheduler(&self, alert_id: AlertId) -> RotationHandle {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        RotationScheduler::new(self.inner.settings.chunk_interval).spawn(move || {
            let weak = weak.clone();
            let alert_id = alert_id.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let controller = AlertController { inner };
                if let Err(e) = controller.rotate_alert(&alert_id).await {
                    warn!(alert_id = %alert_id, error = %e, "Rotation failed, will retry next tick");
                }
            }
        })
    }

    /// Check if a session is running.
    pub async fn is_recording(&self) -> bool {
        self.inner.session.lock().await.alert_id.is_some()
    }

    /// The alert being recorded, if any.
    pub async fn current_alert(&self) -> Option<AlertId> {
        self.inner.session.lock().await.alert_id.clone()
    }

    /// Number of uploads still running.
    #[must_use]
    pub fn uploads_in_flight(&self) -> usize {
        self.inner.uploads.count()
    }

    /// Wait until no upload is running.
    pub async fn wait_for_uploads(&self) {
        self.inner.uploads.wait_idle().await;
    }
}
