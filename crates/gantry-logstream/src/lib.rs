//! Gantry Logstream - live log pipeline
//!
//! Write-oriented streaming for step logs:
//! - [`LogClient`] abstracts the log backend (HTTP service or local files)
//! - [`HttpLogClient`] streams lines and uploads blobs with retry budgets
//! - [`FileLogClient`] persists streams under a local directory
//! - [`LiveLogWriter`] buffers, line-splits, ring-trims, flushes periodically
//!   and scans closing output for [`Nudge`] hints
//!
//! Secret masking sits in front of the writer: every buffer is passed through
//! the step's `Masker` before line splitting, while write byte counts keep
//! reporting the caller's original length.

pub mod client;
pub mod error;
pub mod fakes;
pub mod file;
pub mod http;
pub mod nudge;
pub mod retry;
pub mod writer;

pub use client::LogClient;
pub use error::{LogStreamError, Result};
pub use file::FileLogClient;
pub use http::HttpLogClient;
pub use nudge::Nudge;
pub use retry::Backoff;
pub use writer::{LiveLogWriter, WriterConfig};
