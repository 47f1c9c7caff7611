//! Local recording segmenter.
//!
//! Owns the capture device and the path of the segment currently being
//! written. Closing hands the finished path back to the caller; the file
//! stays on disk until the uploader removes it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::alert::AlertId;
use crate::device::CaptureDevice;
use crate::error::{Error, Result};

/// Drives a [`CaptureDevice`] one segment file at a time.
pub struct Segmenter {
    device: Box<dyn CaptureDevice>,
    current: Option<PathBuf>,
}

impl std::fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter")
            .field("device", &self.device.name())
            .field("current", &self.current)
            .finish()
    }
}

impl Segmenter {
    /// Create a segmenter around a capture device.
    #[must_use]
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device,
            current: None,
        }
    }

    /// Begin capturing into `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureBusy`] if a segment is still open, or the
    /// device's error if capture could not start.
    pub async fn open(&mut self, path: PathBuf) -> Result<()> {
        if let Some(current) = &self.current {
            return Err(Error::CaptureBusy {
                path: current.clone(),
            });
        }

        self.device.open(&path).await?;
        debug!(path = %path.display(), "Segment opened");
        self.current = Some(path);
        Ok(())
    }

    /// Stop capturing and return the finished segment's path.
    ///
    /// Returns `None` when nothing was open, so racing callers can both call
    /// this safely. A device that fails to stop cleanly is logged; the path
    /// is still returned since the file may hold usable audio.
    pub async fn close(&mut self) -> Option<PathBuf> {
        let path = self.current.take()?;

        if let Err(e) = self.device.close().await {
            warn!(error = %e, path = %path.display(), "Capture did not stop cleanly");
        }
        debug!(path = %path.display(), "Segment closed");
        Some(path)
    }
}

/// Path of a new segment file for `alert_id`.
///
/// Layout: `{dir}/{alert}_{segment:04}_{timestamp_ms}.{ext}`. The segment
/// number keeps names unique even when two rotations share a millisecond.
#[must_use]
pub fn segment_path(
    dir: &Path,
    alert_id: &AlertId,
    segment: u32,
    at: DateTime<Utc>,
    extension: &str,
) -> PathBuf {
    dir.join(format!(
        "{alert_id}_{segment:04}_{}.{extension}",
        at.timestamp_millis()
    ))
}

/// A segment file left in the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeftoverSegment {
    /// Location of the file.
    pub path: PathBuf,
    /// Alert the segment was recorded for, parsed from the file name.
    pub alert_id: Option<AlertId>,
    /// Size of the file.
    pub size_bytes: u64,
}

/// List segment files still present in `dir`.
///
/// These are segments whose upload was dropped or that belong to an
/// interrupted session. A missing directory yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn leftover_segments(dir: &Path, extension: &str) -> Result<Vec<LeftoverSegment>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut leftovers = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let alert_id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(parse_alert_id);

        leftovers.push(LeftoverSegment {
            path,
            alert_id,
            size_bytes: metadata.len(),
        });
    }

    leftovers.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(leftovers)
}

/// Extract the alert id from a `{alert}_{segment}_{timestamp}` file stem.
fn parse_alert_id(stem: &str) -> Option<AlertId> {
    let mut parts = stem.rsplitn(3, '_');
    let timestamp = parts.next()?;
    let segment = parts.next()?;
    let alert = parts.next()?;

    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if alert.is_empty() || !numeric(segment) || !numeric(timestamp) {
        return None;
    }
    Some(AlertId::new(alert))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scratch_dir, FakeDevice};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_open_then_close_returns_path() {
        let dir = scratch_dir("segmenter_open_close");
        let device = FakeDevice::new();
        let mut segmenter = Segmenter::new(Box::new(device.clone()));

        let path = dir.join("a_0000_1.m4a");
        segmenter.open(path.clone()).await.unwrap();
        assert!(segmenter.current.is_some());
        assert_eq!(segmenter.current.as_deref(), Some(path.as_path()));

        assert_eq!(segmenter.close().await, Some(path.clone()));
        assert!(segmenter.current.is_none());
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_close_twice_is_noop() {
        let dir = scratch_dir("segmenter_close_twice");
        let device = FakeDevice::new();
        let mut segmenter = Segmenter::new(Box::new(device.clone()));

        segmenter.open(dir.join("a_0000_1.m4a")).await.unwrap();
        assert!(segmenter.close().await.is_some());
        assert!(segmenter.close().await.is_none());
        assert!(segmenter.close().await.is_none());

        assert_eq!(device.closes(), 1);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_open_while_open_is_busy() {
        let dir = scratch_dir("segmenter_busy");
        let mut segmenter = Segmenter::new(Box::new(FakeDevice::new()));

        segmenter.open(dir.join("a_0000_1.m4a")).await.unwrap();
        let err = segmenter.open(dir.join("a_0001_2.m4a")).await.unwrap_err();
        assert!(matches!(err, Error::CaptureBusy { .. }));
        assert!(!dir.join("a_0001_2.m4a").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_failed_open_leaves_segmenter_closed() {
        let dir = scratch_dir("segmenter_failed_open");
        let device = FakeDevice::new();
        device.fail_next_opens(1);
        let mut segmenter = Segmenter::new(Box::new(device.clone()));

        let err = segmenter.open(dir.join("a_0000_1.m4a")).await.unwrap_err();
        assert!(err.is_capture_error());
        assert!(segmenter.current.is_none());

        segmenter.open(dir.join("a_0001_2.m4a")).await.unwrap();
        assert!(segmenter.current.is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_segment_path_layout() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let path = segment_path(Path::new("/data/sirens"), &AlertId::new("f00d"), 3, at, "m4a");
        assert_eq!(path, PathBuf::from("/data/sirens/f00d_0003_1700000000000.m4a"));
    }

    #[test]
    fn test_parse_alert_id() {
        assert_eq!(parse_alert_id("f00d_0003_1700"), Some(AlertId::new("f00d")));
        assert_eq!(parse_alert_id("my_alert_0001_99"), Some(AlertId::new("my_alert")));
        assert_eq!(parse_alert_id("notes"), None);
        assert_eq!(parse_alert_id("a_b_c"), None);
    }

    #[test]
    fn test_leftover_segments() {
        let dir = scratch_dir("segmenter_leftovers");
        std::fs::write(dir.join("f00d_0000_10.m4a"), b"abc").unwrap();
        std::fs::write(dir.join("stray.m4a"), b"x").unwrap();
        std::fs::write(dir.join("f00d_0001_20.txt"), b"ignored").unwrap();

        let leftovers = leftover_segments(&dir, "m4a").unwrap();
        assert_eq!(leftovers.len(), 2);
        assert_eq!(leftovers[0].alert_id, Some(AlertId::new("f00d")));
        assert_eq!(leftovers[0].size_bytes, 3);
        assert_eq!(leftovers[1].alert_id, None);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_leftover_segments_missing_dir() {
        let dir = std::env::temp_dir().join("sirenrec_no_such_dir_for_leftovers");
        assert!(leftover_segments(&dir, "m4a").unwrap().is_empty());
    }
}
