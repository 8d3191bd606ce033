//! Node setup application
//!
//! Applies a [`SetupRequest`] to the pipeline context: secrets and service
//! configs replace wholesale, stage env seeds merge in, and the mask
//! pattern payload loads once (replayed setups after a VM hibernate/resume
//! are no-ops on the pattern set).

use crate::error::Result;
use crate::state::PipelineContext;
use gantry_api::SetupRequest;
use std::path::Path;
use tracing::info;

/// Configure the node for a stage.
pub fn apply_setup(ctx: &PipelineContext, req: &SetupRequest) -> Result<()> {
    ctx.set_secrets(req.secrets.clone());
    ctx.set_log_config(req.log_config.clone());
    ctx.set_ti_config(req.ti_config.clone());
    ctx.stage_env().export(&req.envs);

    let loaded = if !req.mask_patterns.is_empty() {
        ctx.load_mask_patterns_base64(&req.mask_patterns)?
    } else if !req.mask_patterns_path.is_empty() {
        ctx.load_mask_patterns_file(Path::new(&req.mask_patterns_path))?
    } else {
        0
    };

    info!(
        secrets = req.secrets.len(),
        stage_envs = req.envs.len(),
        mask_patterns = loaded,
        remote_logs = req.log_config.is_remote(),
        "node setup applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use gantry_api::LogConfig;

    #[test]
    fn test_setup_replaces_state_wholesale() {
        let ctx = PipelineContext::builder()
            .secrets(vec!["old".to_string()])
            .build();

        let req = SetupRequest {
            secrets: vec!["new-secret".to_string()],
            log_config: LogConfig {
                url: "https://logs.example.com".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        apply_setup(&ctx, &req).unwrap();

        assert_eq!(ctx.secrets(), vec!["new-secret"]);
    }

    #[test]
    fn test_setup_seeds_stage_env() {
        let ctx = PipelineContext::builder().build();
        let req = SetupRequest {
            envs: std::collections::HashMap::from([(
                "PIPELINE_ID".to_string(),
                "p1".to_string(),
            )]),
            ..Default::default()
        };
        apply_setup(&ctx, &req).unwrap();
        assert_eq!(
            ctx.stage_env().snapshot().get("PIPELINE_ID"),
            Some(&"p1".to_string())
        );
    }

    #[test]
    fn test_replayed_setup_does_not_reload_patterns() {
        let ctx = PipelineContext::builder().build();
        let req = SetupRequest {
            mask_patterns: STANDARD.encode("tok_[a-z]+\n"),
            ..Default::default()
        };
        apply_setup(&ctx, &req).unwrap();

        // Same request replayed after a hibernate/resume cycle.
        let replay = SetupRequest {
            mask_patterns: STANDARD.encode("other_[a-z]+\nmore_[a-z]+\n"),
            ..req
        };
        apply_setup(&ctx, &replay).unwrap();

        let masker = ctx.masker_for(&[]);
        assert_eq!(masker.rule_count(), 1, "pattern set loads exactly once");
    }

    #[test]
    fn test_invalid_pattern_payload_surfaces_error() {
        let ctx = PipelineContext::builder().build();
        let req = SetupRequest {
            mask_patterns: "!!! not base64".to_string(),
            ..Default::default()
        };
        assert!(apply_setup(&ctx, &req).is_err());
    }
}
