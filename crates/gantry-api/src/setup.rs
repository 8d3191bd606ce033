//! Node setup schema
//!
//! Sent once when the node is handed to a stage: seeds the pipeline-level
//! secret list, service configs, stage environment and the mask pattern
//! payload. The node may hibernate and replay setup, so everything here is
//! safe to apply twice.

use crate::config::{LogConfig, TiConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One-shot node configuration for a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupRequest {
    /// Pipeline-level secrets masked out of every step log.
    #[serde(default)]
    pub secrets: Vec<String>,

    /// Environment seeded into the stage scope before any step runs.
    #[serde(default)]
    pub envs: HashMap<String, String>,

    #[serde(default)]
    pub log_config: LogConfig,

    #[serde(default)]
    pub ti_config: TiConfig,

    /// Base64-encoded line-delimited regex payload for the masker.
    #[serde(default)]
    pub mask_patterns: String,

    /// Local file alternative to `mask_patterns`; used when the payload is
    /// baked into the node image.
    #[serde(default)]
    pub mask_patterns_path: String,
}
