//! Service configuration carried inside step requests
//!
//! Both configs are supplied by the caller per request and cached on the
//! shared pipeline state for the lifetime of the stage.

use serde::{Deserialize, Serialize};

/// Log-service connection settings.
///
/// When `url` is empty the engine falls back to the local file backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Endpoint root of the log service, e.g. `https://logs.example.com`.
    #[serde(default)]
    pub url: String,

    /// Account identifier sent as the `accountID` query parameter.
    #[serde(default)]
    pub account_id: String,

    /// Auth token sent in the `X-Harness-Token` header.
    #[serde(default)]
    pub token: String,

    /// When true, blobs POST directly to `/blob`; otherwise a signed
    /// upload link is requested first.
    #[serde(default)]
    pub indirect_upload: bool,

    /// Skip server certificate verification.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Base64-encoded PEM client certificate for mTLS.
    #[serde(default)]
    pub client_cert: String,

    /// Base64-encoded PEM client key for mTLS.
    #[serde(default)]
    pub client_key: String,

    /// Mirror every log line to the engine's stdout.
    #[serde(default)]
    pub stdout_echo: bool,
}

impl LogConfig {
    /// Whether the remote HTTP backend should be used.
    pub fn is_remote(&self) -> bool {
        !self.url.is_empty()
    }
}

/// Test-intelligence service settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TiConfig {
    /// Endpoint root of the TI service.
    #[serde(default)]
    pub url: String,

    /// Auth token for the TI service.
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub account_id: String,

    #[serde(default)]
    pub org_id: String,

    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub pipeline_id: String,

    #[serde(default)]
    pub build_id: String,

    #[serde(default)]
    pub stage_id: String,

    /// Repository the build runs against.
    #[serde(default)]
    pub repo: String,

    /// Commit SHA under test.
    #[serde(default)]
    pub sha: String,

    /// Source branch of the change.
    #[serde(default)]
    pub commit_branch: String,

    /// Target branch for PR builds.
    #[serde(default)]
    pub target_branch: String,
}

impl TiConfig {
    /// Whether test intelligence is configured at all.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_backend_selection() {
        let mut cfg = LogConfig::default();
        assert!(!cfg.is_remote());
        cfg.url = "https://logs.example.com".to_string();
        assert!(cfg.is_remote());
    }

    #[test]
    fn test_log_config_defaults_from_empty_json() {
        let cfg: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, LogConfig::default());
        assert!(!cfg.indirect_upload);
    }

    #[test]
    fn test_ti_config_is_configured() {
        let mut cfg = TiConfig::default();
        assert!(!cfg.is_configured());
        cfg.url = "https://ti.example.com".to_string();
        assert!(cfg.is_configured());
    }
}
