//! Readback of step exchange files
//!
//! Steps hand values back through `KEY=VALUE` files. The newer reader
//! (selected by `CI_NEW_VERSION_GODOTENV`) decodes values carrying the
//! `__B64__` prefix; the legacy reader only strips surrounding quotes.

use super::capture::B64_PREFIX;
use crate::error::{EngineError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use gantry_api::envvars;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Cap on a single `KEY=VALUE` line. Longer lines abort the readback.
pub const MAX_ENV_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Whether the newer base64-decoding reader is selected.
pub fn use_new_reader() -> bool {
    envvars::flag_enabled(envvars::NEW_ENV_READER)
}

/// Parse a `KEY=VALUE` exchange file.
///
/// Blank lines are skipped; a line without `=` is skipped with a warning.
/// Returns [`EngineError::OutputTooLong`] when a line exceeds the scanner
/// cap.
pub async fn read_env_file(path: &Path, decode_b64: bool) -> Result<HashMap<String, String>> {
    let raw = tokio::fs::read_to_string(path).await?;
    parse_env(&raw, decode_b64)
}

/// Like [`read_env_file`] but a missing file is an empty map. Used for
/// files a step may legitimately never write, e.g. the exported env.
pub async fn read_env_file_optional(
    path: &Path,
    decode_b64: bool,
) -> Result<HashMap<String, String>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(HashMap::new());
    }
    read_env_file(path, decode_b64).await
}

fn parse_env(raw: &str, decode_b64: bool) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for line in raw.lines() {
        if line.len() > MAX_ENV_LINE_BYTES {
            return Err(EngineError::OutputTooLong(MAX_ENV_LINE_BYTES));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            let prefix: String = line.chars().take(32).collect();
            warn!(line_prefix = %prefix, "skipping malformed env line");
            continue;
        };
        let key = key.trim().to_string();
        let value = if decode_b64 {
            decode_value(value)
        } else {
            strip_quotes(value).to_string()
        };
        out.insert(key, value);
    }
    Ok(out)
}

/// Decode the `__B64__` wrapping; undecodable payloads keep the raw value.
fn decode_value(value: &str) -> String {
    let Some(encoded) = value.strip_prefix(B64_PREFIX) else {
        return strip_quotes(value).to_string();
    };
    match STANDARD.decode(encoded.trim().as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            warn!(error = %err, "undecodable base64 output value, keeping raw");
            value.to_string()
        }
    }
}

fn strip_quotes(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Read the step artifact file; missing files are empty artifacts.
pub async fn read_artifact(path: &Path) -> Vec<u8> {
    tokio::fs::read(path).await.unwrap_or_default()
}
