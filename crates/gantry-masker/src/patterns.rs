//! Regex pattern rules loaded from a line-delimited payload
//!
//! The payload arrives either base64-encoded inside a setup request or as a
//! local file. Loading happens at most once per handle: the node may
//! hibernate and replay its setup, so a second load must be a no-op.

use crate::error::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::bytes::Regex;
use std::path::Path;
use tracing::{info, warn};

/// A compiled, load-once set of masking patterns.
#[derive(Debug, Default)]
pub struct PatternSet {
    compiled: Vec<Regex>,
    loaded: bool,
}

impl PatternSet {
    /// An empty, not-yet-loaded set.
    pub fn new() -> Self {
        PatternSet::default()
    }

    /// Whether a payload has been applied to this set.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The compiled patterns, in payload order.
    pub fn compiled(&self) -> &[Regex] {
        &self.compiled
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Load patterns from a line-delimited payload.
    ///
    /// Blank lines and `#` comments are ignored; invalid patterns are logged
    /// and skipped. Empty payloads do not flip the loaded flag, so a real
    /// payload arriving later still applies. Returns the number of patterns
    /// active after the call; a second load is a no-op.
    pub fn load_from_payload(&mut self, payload: &str) -> usize {
        if self.loaded {
            return self.compiled.len();
        }
        if payload.trim().is_empty() {
            return 0;
        }

        let mut skipped = 0usize;
        for line in payload.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match Regex::new(line) {
                Ok(re) => self.compiled.push(re),
                Err(err) => {
                    skipped += 1;
                    warn!(pattern = line, error = %err, "skipping invalid mask pattern");
                }
            }
        }

        self.loaded = true;
        info!(
            loaded = self.compiled.len(),
            skipped, "mask pattern payload applied"
        );
        self.compiled.len()
    }

    /// Load patterns from a base64-encoded payload.
    pub fn load_from_base64(&mut self, encoded: &str) -> Result<usize> {
        if self.loaded {
            return Ok(self.compiled.len());
        }
        let decoded = STANDARD.decode(encoded.trim().as_bytes())?;
        let payload = String::from_utf8(decoded)?;
        Ok(self.load_from_payload(&payload))
    }

    /// Load patterns from a local file.
    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        if self.loaded {
            return Ok(self.compiled.len());
        }
        let payload = std::fs::read_to_string(path)?;
        Ok(self.load_from_payload(&payload))
    }
}
