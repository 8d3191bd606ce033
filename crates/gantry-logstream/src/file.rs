//! Local file backend
//!
//! One file per stream key under a shared directory. Used on nodes without a
//! reachable log service and in tests. Writes are fsynced so a crashing VM
//! keeps the lines already acknowledged.

use crate::client::{encode_ndjson, LogClient};
use crate::error::{LogStreamError, Result};
use async_trait::async_trait;
use gantry_api::RemoteLine;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Log backend writing each stream to `<root>/<sanitized key>.log`.
pub struct FileLogClient {
    root: PathBuf,
    open_streams: Mutex<HashMap<String, File>>,
}

impl FileLogClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileLogClient {
            root: root.into(),
            open_streams: Mutex::new(HashMap::new()),
        }
    }

    /// Path for a stream key. Key separators become `_` so nested pipeline
    /// keys stay one file each.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.root.join(format!("{name}.log"))
    }
}

#[async_trait]
impl LogClient for FileLogClient {
    async fn open(&self, key: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(key))
            .await?;
        self.open_streams.lock().await.insert(key.to_string(), file);
        debug!(key, root = %self.root.display(), "file log stream opened");
        Ok(())
    }

    async fn write(&self, key: &str, lines: &[RemoteLine]) -> Result<()> {
        let body = encode_ndjson(lines)?;
        let mut streams = self.open_streams.lock().await;
        let file = streams
            .get_mut(key)
            .ok_or_else(|| LogStreamError::NotOpen(key.to_string()))?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn upload(&self, key: &str, lines: &[RemoteLine]) -> Result<()> {
        let body = encode_ndjson(lines)?;
        self.upload_raw(key, body).await
    }

    async fn upload_raw(&self, key: &str, body: Vec<u8>) -> Result<()> {
        // The blob is the authoritative full history: replace, don't append.
        tokio::fs::create_dir_all(&self.root).await?;
        let mut file = File::create(self.path_for(key)).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn close(&self, key: &str) -> Result<()> {
        if let Some(mut file) = self.open_streams.lock().await.remove(key) {
            file.flush().await?;
            file.sync_all().await?;
        }
        debug!(key, "file log stream closed");
        Ok(())
    }
}

/// Read a stream file back as parsed lines. Test and inspection helper.
pub async fn read_lines(path: &Path) -> Result<Vec<RemoteLine>> {
    let text = tokio::fs::read_to_string(path).await?;
    let mut lines = Vec::new();
    for row in text.lines() {
        if row.trim().is_empty() {
            continue;
        }
        lines.push(serde_json::from_str(row)?);
    }
    Ok(lines)
}
