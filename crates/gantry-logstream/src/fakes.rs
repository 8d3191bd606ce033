//! In-memory fakes for the log client trait (testing only)
//!
//! `RecordingClient` satisfies [`LogClient`] without any I/O and records
//! every interaction for assertions. Failure knobs let tests exercise the
//! open/upload error paths.

use crate::client::LogClient;
use crate::error::{LogStreamError, Result};
use async_trait::async_trait;
use gantry_api::RemoteLine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Recorded {
    opens: Vec<String>,
    writes: HashMap<String, Vec<RemoteLine>>,
    uploads: HashMap<String, Vec<Vec<RemoteLine>>>,
    raw_uploads: HashMap<String, Vec<Vec<u8>>>,
    closes: HashMap<String, usize>,
}

/// In-memory log client that records every call.
#[derive(Debug, Default)]
pub struct RecordingClient {
    recorded: Mutex<Recorded>,
    fail_open: AtomicBool,
    fail_write: AtomicBool,
    fail_upload: AtomicBool,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail with a 503.
    pub fn fail_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    /// Make subsequent `write` calls fail with a 503.
    pub fn fail_write(&self) {
        self.fail_write.store(true, Ordering::SeqCst);
    }

    /// Make subsequent `upload` calls fail with a 503.
    pub fn fail_upload(&self) {
        self.fail_upload.store(true, Ordering::SeqCst);
    }

    fn unavailable() -> LogStreamError {
        LogStreamError::Service {
            status: 503,
            message: "fake unavailable".to_string(),
        }
    }

    /// All lines shipped through `write` for `key`, flattened in order.
    pub fn written(&self, key: &str) -> Vec<RemoteLine> {
        self.recorded
            .lock()
            .unwrap()
            .writes
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// The most recent `upload` batch for `key`.
    pub fn uploaded(&self, key: &str) -> Vec<RemoteLine> {
        self.recorded
            .lock()
            .unwrap()
            .uploads
            .get(key)
            .and_then(|batches| batches.last().cloned())
            .unwrap_or_default()
    }

    pub fn open_count(&self, key: &str) -> usize {
        self.recorded
            .lock()
            .unwrap()
            .opens
            .iter()
            .filter(|k| k.as_str() == key)
            .count()
    }

    pub fn upload_count(&self, key: &str) -> usize {
        self.recorded
            .lock()
            .unwrap()
            .uploads
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn close_count(&self, key: &str) -> usize {
        self.recorded
            .lock()
            .unwrap()
            .closes
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl LogClient for RecordingClient {
    async fn open(&self, key: &str) -> Result<()> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.recorded.lock().unwrap().opens.push(key.to_string());
        Ok(())
    }

    async fn write(&self, key: &str, lines: &[RemoteLine]) -> Result<()> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.recorded
            .lock()
            .unwrap()
            .writes
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(lines);
        Ok(())
    }

    async fn upload(&self, key: &str, lines: &[RemoteLine]) -> Result<()> {
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.recorded
            .lock()
            .unwrap()
            .uploads
            .entry(key.to_string())
            .or_default()
            .push(lines.to_vec());
        Ok(())
    }

    async fn upload_raw(&self, key: &str, body: Vec<u8>) -> Result<()> {
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.recorded
            .lock()
            .unwrap()
            .raw_uploads
            .entry(key.to_string())
            .or_default()
            .push(body);
        Ok(())
    }

    async fn close(&self, key: &str) -> Result<()> {
        *self
            .recorded
            .lock()
            .unwrap()
            .closes
            .entry(key.to_string())
            .or_default() += 1;
        Ok(())
    }
}
