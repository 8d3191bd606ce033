//! Canonical step exchange paths and engine environment injection

use gantry_api::envvars::step as stepenv;
use gantry_api::{StartStepRequest, TiConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Filesystem locations a step exchanges data through.
#[derive(Debug, Clone)]
pub struct StepPaths {
    pub export_env: PathBuf,
    pub output: PathBuf,
    pub output_secrets: PathBuf,
    pub artifact: PathBuf,
    pub scratch: PathBuf,

    /// The caller supplied an explicit output path; the capture suffix must
    /// not be appended.
    pub output_overridden: bool,

    /// Which other paths were caller-supplied; overridden files belong to
    /// the caller and are not cleaned up.
    pub export_env_overridden: bool,
    pub artifact_overridden: bool,
}

/// Resolve exchange paths for a step under the shared volume root,
/// honoring explicit override paths from the request.
pub fn resolve(req: &StartStepRequest, root: &Path) -> StepPaths {
    let id = &req.id;
    let overrides = &req.files;

    let pick = |explicit: &Option<String>, default: PathBuf| -> PathBuf {
        explicit.as_ref().map(PathBuf::from).unwrap_or(default)
    };

    StepPaths {
        export_env: pick(&overrides.export_env, root.join(format!("{id}-export.env"))),
        output: pick(&overrides.output, root.join(format!("{id}-output.env"))),
        output_secrets: pick(
            &overrides.output_secrets,
            root.join(format!("{id}-output-secrets.env")),
        ),
        artifact: pick(&overrides.artifact, root.join(format!("{id}-artifact"))),
        scratch: root.join("scratch").join(id),
        output_overridden: overrides.output.is_some(),
        export_env_overridden: overrides.export_env.is_some(),
        artifact_overridden: overrides.artifact.is_some(),
    }
}

/// Inject the engine environment into a step's env map.
pub fn inject_env(envs: &mut HashMap<String, String>, paths: &StepPaths, ti: &TiConfig) {
    let set = |envs: &mut HashMap<String, String>, key: &str, value: String| {
        envs.insert(key.to_string(), value);
    };

    set(envs, stepenv::DRONE_ENV, paths.export_env.display().to_string());
    set(envs, stepenv::DRONE_OUTPUT, paths.output.display().to_string());
    set(envs, stepenv::OUTPUT_FILE, paths.output.display().to_string());
    set(
        envs,
        stepenv::OUTPUT_SECRET_FILE,
        paths.output_secrets.display().to_string(),
    );
    set(
        envs,
        stepenv::ARTIFACT_FILE,
        paths.artifact.display().to_string(),
    );
    set(envs, stepenv::SCRATCH_DIR, paths.scratch.display().to_string());

    if ti.is_configured() {
        set(envs, "HARNESS_TI_SERVICE_ENDPOINT", ti.url.clone());
        set(envs, "HARNESS_TI_SERVICE_TOKEN", ti.token.clone());
        set(envs, "HARNESS_ACCOUNT_ID", ti.account_id.clone());
        set(envs, "HARNESS_ORG_ID", ti.org_id.clone());
        set(envs, "HARNESS_PROJECT_ID", ti.project_id.clone());
        set(envs, "HARNESS_PIPELINE_ID", ti.pipeline_id.clone());
        set(envs, "HARNESS_BUILD_ID", ti.build_id.clone());
        set(envs, "HARNESS_STAGE_ID", ti.stage_id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_api::step::FileOverrides;

    #[test]
    fn test_default_paths_under_root() {
        let req = StartStepRequest {
            id: "step1".to_string(),
            ..Default::default()
        };
        let paths = resolve(&req, Path::new("/tmp/engine"));
        assert_eq!(paths.export_env, Path::new("/tmp/engine/step1-export.env"));
        assert_eq!(paths.output, Path::new("/tmp/engine/step1-output.env"));
        assert_eq!(
            paths.output_secrets,
            Path::new("/tmp/engine/step1-output-secrets.env")
        );
        assert_eq!(paths.artifact, Path::new("/tmp/engine/step1-artifact"));
        assert!(!paths.output_overridden);
    }

    #[test]
    fn test_explicit_overrides_win() {
        let req = StartStepRequest {
            id: "step1".to_string(),
            files: FileOverrides {
                output: Some("/custom/out.env".to_string()),
                artifact: Some("/custom/artifact.bin".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let paths = resolve(&req, Path::new("/tmp/engine"));
        assert_eq!(paths.output, Path::new("/custom/out.env"));
        assert_eq!(paths.artifact, Path::new("/custom/artifact.bin"));
        assert!(paths.output_overridden);
        // Non-overridden paths still synthesized.
        assert_eq!(paths.export_env, Path::new("/tmp/engine/step1-export.env"));
    }

    #[test]
    fn test_env_injection_sets_engine_variables() {
        let req = StartStepRequest {
            id: "s".to_string(),
            ..Default::default()
        };
        let paths = resolve(&req, Path::new("/tmp/engine"));
        let mut envs = HashMap::new();
        inject_env(&mut envs, &paths, &TiConfig::default());

        assert_eq!(envs["DRONE_ENV"], "/tmp/engine/s-export.env");
        assert_eq!(envs["HARNESS_OUTPUT_FILE"], "/tmp/engine/s-output.env");
        assert_eq!(
            envs["HARNESS_OUTPUT_SECRET_FILE"],
            "/tmp/engine/s-output-secrets.env"
        );
        assert_eq!(envs["PLUGIN_ARTIFACT_FILE"], "/tmp/engine/s-artifact");
        assert!(envs.contains_key("HARNESS_SCRATCH_DIR"));
        assert!(!envs.contains_key("HARNESS_TI_SERVICE_ENDPOINT"));
    }

    #[test]
    fn test_ti_env_injected_when_configured() {
        let req = StartStepRequest {
            id: "s".to_string(),
            ..Default::default()
        };
        let paths = resolve(&req, Path::new("/tmp/engine"));
        let ti = TiConfig {
            url: "https://ti.example.com".to_string(),
            token: "ti-token".to_string(),
            build_id: "42".to_string(),
            ..Default::default()
        };
        let mut envs = HashMap::new();
        inject_env(&mut envs, &paths, &ti);
        assert_eq!(envs["HARNESS_TI_SERVICE_ENDPOINT"], "https://ti.example.com");
        assert_eq!(envs["HARNESS_BUILD_ID"], "42");
    }
}
