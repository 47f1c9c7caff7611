//! In-process fakes for the recorder's collaborators.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::CaptureDevice;
use crate::error::{Error, Result};
use crate::object_store::ObjectStore;

/// Bytes a [`FakeDevice`] writes into every segment.
pub const FAKE_AUDIO: &[u8] = b"fake-audio";

#[derive(Debug, Default)]
struct DeviceState {
    current: Option<PathBuf>,
    fail_opens: usize,
    opens: usize,
    closes: usize,
}

/// Capture device that writes [`FAKE_AUDIO`] into each opened file.
///
/// Clones share state, so a test keeps one clone to inspect what the
/// segmenter did with the other.
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` opens fail with a capture error.
    pub fn fail_next_opens(&self, n: usize) {
        self.state.lock().unwrap().fail_opens = n;
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait::async_trait]
impl CaptureDevice for FakeDevice {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn open(&mut self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(Error::capture_open(path, "device unavailable"));
        }
        if let Some(current) = &state.current {
            return Err(Error::CaptureBusy {
                path: current.clone(),
            });
        }
        std::fs::write(path, FAKE_AUDIO)?;
        state.current = Some(path.to_path_buf());
        state.opens += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.current.take().is_some() {
            state.closes += 1;
        }
        Ok(())
    }
}

/// Object store that fails on demand and keeps what it stores in memory.
#[derive(Debug, Default)]
pub struct FlakyObjectStore {
    failures: Mutex<VecDeque<Error>>,
    attempts: AtomicUsize,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl FlakyObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose first `n` puts fail transiently.
    pub fn failing(n: usize) -> Self {
        let store = Self::new();
        for _ in 0..n {
            store.fail_next_with(Error::object_store_transient("fake", "connection reset"));
        }
        store
    }

    /// Queue an error for an upcoming put.
    pub fn fail_next_with(&self, error: Error) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn put_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl ObjectStore for FlakyObjectStore {
    async fn put(&self, key: &str, payload: &[u8], _content_type: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), payload.to_vec());
        Ok(())
    }
}

/// Fresh scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sirenrec_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
