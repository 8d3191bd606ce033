//! Shared pipeline state
//!
//! One [`PipelineContext`] per engine process, built explicitly and passed
//! down - there are no process globals. It carries the current secret list,
//! service configs, the load-once mask pattern set, a memoized log client
//! and the stage-scoped exported environment.

use crate::error::Result;
use gantry_api::envvars;
use gantry_api::{LogConfig, TiConfig};
use gantry_logstream::{FileLogClient, HttpLogClient, LogClient};
use gantry_masker::{Masker, PatternSet};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stage-scoped exported environment. Outputs of a completed step propagate
/// to every later step of the same stage.
#[derive(Debug, Default)]
pub struct StageEnv {
    map: Mutex<HashMap<String, String>>,
}

impl StageEnv {
    /// Merge a completed step's exports in, replacing existing keys.
    pub fn export(&self, envs: &HashMap<String, String>) {
        lock(&self.map).extend(envs.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Current exported environment.
    pub fn snapshot(&self) -> HashMap<String, String> {
        lock(&self.map).clone()
    }
}

struct PipelineState {
    secrets: Vec<String>,
    log_config: LogConfig,
    ti_config: TiConfig,
    client: Option<Arc<dyn LogClient>>,
}

/// Process-wide engine state handle.
pub struct PipelineContext {
    state: Mutex<PipelineState>,
    patterns: Mutex<PatternSet>,
    stage_env: StageEnv,
    workdir_root: PathBuf,
    expand_secret_variants: bool,
}

impl PipelineContext {
    pub fn builder() -> PipelineContextBuilder {
        PipelineContextBuilder::default()
    }

    /// Replace the pipeline-level secret list wholesale.
    pub fn set_secrets(&self, secrets: Vec<String>) {
        lock(&self.state).secrets = secrets;
    }

    pub fn secrets(&self) -> Vec<String> {
        lock(&self.state).secrets.clone()
    }

    /// Replace the cached log config; invalidates the memoized client.
    pub fn set_log_config(&self, config: LogConfig) {
        let mut state = lock(&self.state);
        if state.log_config != config {
            state.client = None;
        }
        state.log_config = config;
    }

    pub fn set_ti_config(&self, config: TiConfig) {
        lock(&self.state).ti_config = config;
    }

    pub fn ti_config(&self) -> TiConfig {
        lock(&self.state).ti_config.clone()
    }

    /// Log client for `config`, memoized while the config is unchanged.
    ///
    /// HTTP when a service URL is set, otherwise files under
    /// `<workdir>/logs`.
    pub fn log_client(&self, config: &LogConfig) -> Result<Arc<dyn LogClient>> {
        let mut state = lock(&self.state);
        if state.log_config == *config {
            if let Some(client) = &state.client {
                return Ok(Arc::clone(client));
            }
        }
        let client: Arc<dyn LogClient> = if config.is_remote() {
            Arc::new(HttpLogClient::new(config)?)
        } else {
            Arc::new(FileLogClient::new(self.workdir_root.join("logs")))
        };
        state.log_config = config.clone();
        state.client = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Masker over the pipeline secrets plus `step_secrets`.
    pub fn masker_for(&self, step_secrets: &[String]) -> Arc<Masker> {
        let mut secrets = self.secrets();
        secrets.extend(step_secrets.iter().cloned());
        let patterns = lock(&self.patterns);
        Arc::new(Masker::new(&secrets, &patterns, self.expand_secret_variants))
    }

    /// Apply a base64-carried mask pattern payload. Idempotent: the first
    /// non-empty payload wins, later loads are no-ops.
    pub fn load_mask_patterns_base64(&self, encoded: &str) -> Result<usize> {
        Ok(lock(&self.patterns).load_from_base64(encoded)?)
    }

    /// Apply a mask pattern payload from a local file. Idempotent.
    pub fn load_mask_patterns_file(&self, path: &Path) -> Result<usize> {
        Ok(lock(&self.patterns).load_from_file(path)?)
    }

    pub fn stage_env(&self) -> &StageEnv {
        &self.stage_env
    }

    /// Shared-volume root for step exchange files.
    pub fn workdir_root(&self) -> &Path {
        &self.workdir_root
    }
}

/// Builder for [`PipelineContext`].
#[derive(Default)]
pub struct PipelineContextBuilder {
    secrets: Vec<String>,
    log_config: LogConfig,
    ti_config: TiConfig,
    workdir_root: Option<PathBuf>,
    expand_secret_variants: Option<bool>,
}

impl PipelineContextBuilder {
    pub fn secrets(mut self, secrets: Vec<String>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    pub fn ti_config(mut self, config: TiConfig) -> Self {
        self.ti_config = config;
        self
    }

    pub fn workdir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workdir_root = Some(root.into());
        self
    }

    pub fn expand_secret_variants(mut self, enabled: bool) -> Self {
        self.expand_secret_variants = Some(enabled);
        self
    }

    pub fn build(self) -> Arc<PipelineContext> {
        let workdir_root = self.workdir_root.unwrap_or_else(|| {
            std::env::var(envvars::WORKDIR_OVERRIDE)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(envvars::DEFAULT_WORKDIR))
        });
        let expand_secret_variants = self
            .expand_secret_variants
            .unwrap_or_else(|| envvars::flag_enabled(envvars::ENABLE_EXTRA_SECRET_VARIANTS));

        Arc::new(PipelineContext {
            state: Mutex::new(PipelineState {
                secrets: self.secrets,
                log_config: self.log_config,
                ti_config: self.ti_config,
                client: None,
            }),
            patterns: Mutex::new(PatternSet::new()),
            stage_env: StageEnv::default(),
            workdir_root,
            expand_secret_variants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_env_export_and_snapshot() {
        let env = StageEnv::default();
        env.export(&HashMap::from([("A".to_string(), "1".to_string())]));
        env.export(&HashMap::from([("A".to_string(), "2".to_string())]));
        let snap = env.snapshot();
        assert_eq!(snap.get("A"), Some(&"2".to_string()));
    }

    #[test]
    fn test_log_client_memoized_per_config() {
        let ctx = PipelineContext::builder().workdir_root("/tmp/gantry-test").build();
        let cfg = LogConfig::default();
        let a = ctx.log_client(&cfg).unwrap();
        let b = ctx.log_client(&cfg).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_log_client_rebuilt_on_config_change() {
        let ctx = PipelineContext::builder().workdir_root("/tmp/gantry-test").build();
        let a = ctx.log_client(&LogConfig::default()).unwrap();
        let changed = LogConfig {
            account_id: "other".to_string(),
            ..Default::default()
        };
        let b = ctx.log_client(&changed).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_pattern_load_is_idempotent_through_context() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        let ctx = PipelineContext::builder().build();
        let payload = STANDARD.encode("tok_[a-z]+\n");
        assert_eq!(ctx.load_mask_patterns_base64(&payload).unwrap(), 1);
        let other = STANDARD.encode("other_[a-z]+\nmore_[a-z]+\n");
        assert_eq!(ctx.load_mask_patterns_base64(&other).unwrap(), 1);
    }

    #[test]
    fn test_masker_combines_pipeline_and_step_secrets() {
        let ctx = PipelineContext::builder()
            .secrets(vec!["pipeline-secret".to_string()])
            .expand_secret_variants(false)
            .build();
        let masker = ctx.masker_for(&["step-secret".to_string()]);
        let out = masker.mask(b"pipeline-secret step-secret");
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("pipeline-secret"));
        assert!(!text.contains("step-secret"));
    }
}
