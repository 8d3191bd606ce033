//! Log-service line schema
//!
//! The remote line layout is fixed by the log service: `level`, `pos`,
//! `out`, `time`, `args`. Do not rename fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single log line as shipped to the log service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLine {
    /// Severity label, defaults to "info".
    pub level: String,

    /// Ordinal of the line within its stream, strictly increasing.
    pub pos: u64,

    /// Line content. Capped at [`MAX_LINE_BYTES`] with a truncation marker.
    pub out: String,

    /// Wall-clock timestamp the line was produced.
    pub time: DateTime<Utc>,

    /// Auxiliary key/value context. Carries `elapsed` seconds since the
    /// stream opened.
    pub args: HashMap<String, String>,
}

/// Maximum byte length of a line message before truncation.
pub const MAX_LINE_BYTES: usize = 2048;

/// Suffix appended to messages that exceeded [`MAX_LINE_BYTES`].
pub const TRUNCATION_SUFFIX: &str = "... (log line truncated)";

impl RemoteLine {
    /// Build an info-level line, truncating `message` to the wire cap.
    pub fn info(pos: u64, message: &str, time: DateTime<Utc>, elapsed_secs: f64) -> Self {
        let mut args = HashMap::new();
        args.insert("elapsed".to_string(), format!("{elapsed_secs:.3}"));
        RemoteLine {
            level: "info".to_string(),
            pos,
            out: truncate_message(message),
            time,
            args,
        }
    }

    /// Serialized JSON size of this line, used for byte budgeting.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// Truncate a message to [`MAX_LINE_BYTES`], appending the marker suffix.
///
/// The cut lands on a char boundary so the result stays valid UTF-8.
pub fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_LINE_BYTES {
        return message.to_string();
    }
    let mut cut = MAX_LINE_BYTES;
    while cut > 0 && !message.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = message[..cut].to_string();
    out.push_str(TRUNCATION_SUFFIX);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_untouched() {
        assert_eq!(truncate_message("hello"), "hello");
    }

    #[test]
    fn test_long_message_truncated_with_marker() {
        let long = "x".repeat(MAX_LINE_BYTES + 100);
        let out = truncate_message(&long);
        assert!(out.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(out.len(), MAX_LINE_BYTES + TRUNCATION_SUFFIX.len());
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // Fill up to the cap minus one byte, then place a multi-byte char
        // straddling the boundary.
        let mut msg = "a".repeat(MAX_LINE_BYTES - 1);
        msg.push('é');
        msg.push_str(&"b".repeat(64));
        let out = truncate_message(&msg);
        assert!(out.ends_with(TRUNCATION_SUFFIX));
        // Must not panic and must remain valid UTF-8 (guaranteed by String).
        assert!(out.len() <= MAX_LINE_BYTES + TRUNCATION_SUFFIX.len());
    }

    #[test]
    fn test_wire_field_names_are_fixed() {
        let line = RemoteLine::info(3, "hi", Utc::now(), 0.5);
        let json = serde_json::to_value(&line).unwrap();
        for key in ["level", "pos", "out", "time", "args"] {
            assert!(json.get(key).is_some(), "missing wire field {key}");
        }
        assert_eq!(json["pos"], 3);
        assert_eq!(json["out"], "hi");
    }
}
