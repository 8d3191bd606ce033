//! Gantry Masker - secret and pattern masking for step logs
//!
//! Every byte written to a step log passes through a [`Masker`] before it
//! reaches the log backend. Two rule sources feed it:
//! - the step's explicit secret list, optionally expanded with derived
//!   variants (quote-stripped, JSON-compacted, shell-stripped, URL-encoded)
//! - regex patterns compiled once per [`PatternSet`] handle from a
//!   line-delimited payload
//!
//! Matches collapse to a fixed-width token so masked output never reveals
//! the secret length.

pub mod error;
pub mod patterns;
pub mod variants;

pub use error::{MaskerError, Result};
pub use patterns::PatternSet;

use regex::bytes::Regex;
use tracing::debug;

/// Replacement token for every masked match. Fixed width: the mask must not
/// depend on the secret length.
pub const MASK: &str = "**************";

/// Minimum rule length; anything shorter would mask ordinary text.
const MIN_RULE_LEN: usize = 2;

enum Rule {
    Literal(Vec<u8>),
    Pattern(Regex),
}

/// Compiled masking rules for one log stream.
///
/// Construction is cheap relative to the write path: rules are compiled once
/// and applied in registration order on every write.
pub struct Masker {
    rules: Vec<Rule>,
}

impl Masker {
    /// Build a masker from explicit secrets and a shared pattern set.
    ///
    /// When `expand_variants` is set, each secret also registers its derived
    /// variants (see [`variants::expand`]). Variants shorter than two bytes
    /// are discarded and duplicates collapse to one rule.
    pub fn new(secrets: &[String], patterns: &PatternSet, expand_variants: bool) -> Self {
        let mut rules = Vec::new();
        let mut seen: Vec<Vec<u8>> = Vec::new();

        for secret in secrets {
            let mut candidates = vec![secret.clone()];
            if expand_variants {
                candidates.extend(variants::expand(secret));
            }
            for candidate in candidates {
                if candidate.len() < MIN_RULE_LEN {
                    continue;
                }
                let bytes = candidate.into_bytes();
                if seen.contains(&bytes) {
                    continue;
                }
                seen.push(bytes.clone());
                rules.push(Rule::Literal(bytes));
            }
        }

        for pattern in patterns.compiled() {
            rules.push(Rule::Pattern(pattern.clone()));
        }

        debug!(rule_count = rules.len(), "masker compiled");
        Masker { rules }
    }

    /// A masker with no rules; passes bytes through unchanged.
    pub fn empty() -> Self {
        Masker { rules: Vec::new() }
    }

    /// Number of active rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Replace every match of every rule with [`MASK`], in registration
    /// order.
    ///
    /// Callers report the length of the *input* buffer to their own callers;
    /// the masked buffer may be shorter or longer.
    pub fn mask(&self, input: &[u8]) -> Vec<u8> {
        if input.is_empty() {
            return Vec::new();
        }
        let mut out = input.to_vec();
        for rule in &self.rules {
            out = match rule {
                Rule::Literal(needle) => replace_literal(&out, needle, MASK.as_bytes()),
                Rule::Pattern(re) => re.replace_all(&out, MASK.as_bytes()).into_owned(),
            };
        }
        out
    }
}

/// Replace every non-overlapping occurrence of `needle` in `hay`.
fn replace_literal(hay: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() || needle.len() > hay.len() {
        return hay.to_vec();
    }
    let mut out = Vec::with_capacity(hay.len());
    let mut i = 0;
    while i < hay.len() {
        if hay.len() - i >= needle.len() && &hay[i..i + needle.len()] == needle {
            out.extend_from_slice(replacement);
            i += needle.len();
        } else {
            out.push(hay[i]);
            i += 1;
        }
    }
    out
}
