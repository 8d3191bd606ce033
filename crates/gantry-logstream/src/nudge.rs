//! Pattern-triggered diagnostic hints
//!
//! A nudge pairs a regex with a human resolution. At stream close the writer
//! scans the tail of its history; a match appends a formatted entry to the
//! writer's error list so the terminal step error points at the likely cause.

use gantry_api::RemoteLine;
use regex::Regex;
use tracing::warn;

/// Number of trailing history lines scanned at close.
pub const SCAN_WINDOW: usize = 10;

/// A diagnostic hint: when `pattern` matches a closing log line, surface
/// `resolution` alongside the underlying `error`.
#[derive(Debug, Clone)]
pub struct Nudge {
    pub pattern: String,
    pub resolution: String,
    pub error: String,
}

impl Nudge {
    pub fn new(pattern: &str, resolution: &str, error: &str) -> Self {
        Nudge {
            pattern: pattern.to_string(),
            resolution: resolution.to_string(),
            error: error.to_string(),
        }
    }
}

/// Format the error entry for a fired nudge.
fn format_hit(line: &RemoteLine, nudge: &Nudge) -> String {
    format!(
        "found possible error on line {}.\n Line contents: {}\n {}: {}",
        line.pos, line.out, nudge.error, nudge.resolution
    )
}

/// Scan the last [`SCAN_WINDOW`] lines of `history` against every nudge.
///
/// Returns one formatted entry per fired nudge (first matching line wins).
/// Invalid patterns are logged and skipped.
pub fn scan(history: &[RemoteLine], nudges: &[Nudge]) -> Vec<String> {
    let tail_start = history.len().saturating_sub(SCAN_WINDOW);
    let tail = &history[tail_start..];

    let mut hits = Vec::new();
    for nudge in nudges {
        let re = match Regex::new(&nudge.pattern) {
            Ok(re) => re,
            Err(err) => {
                warn!(pattern = %nudge.pattern, error = %err, "skipping invalid nudge pattern");
                continue;
            }
        };
        if let Some(line) = tail.iter().find(|l| re.is_match(&l.out)) {
            hits.push(format_hit(line, nudge));
        }
    }
    hits
}
