//! Log backend abstraction
//!
//! The writer only ever talks to this trait. Implementations (HTTP service,
//! local files, in-memory fakes) must conform to it.

use crate::Result;
use async_trait::async_trait;
use gantry_api::RemoteLine;

/// A log stream backend keyed by stream identifier.
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Open the stream for `key`. Must be called before `write`.
    async fn open(&self, key: &str) -> Result<()>;

    /// Append a batch of lines to the live stream.
    async fn write(&self, key: &str, lines: &[RemoteLine]) -> Result<()>;

    /// Upload the full line history as the stream's final blob.
    async fn upload(&self, key: &str, lines: &[RemoteLine]) -> Result<()>;

    /// Upload raw bytes as the stream's final blob.
    async fn upload_raw(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Close the stream. Single attempt; errors are reported, not retried.
    async fn close(&self, key: &str) -> Result<()>;
}

/// Encode a line batch as newline-delimited JSON, the blob upload format.
pub fn encode_ndjson(lines: &[RemoteLine]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    for line in lines {
        serde_json::to_writer(&mut body, line)?;
        body.push(b'\n');
    }
    Ok(body)
}
