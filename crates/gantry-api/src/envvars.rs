//! Environment variables recognized by the engine
//!
//! These names are part of the external contract: pipeline authors and the
//! hosting infrastructure set them on the engine process.

/// Enables derived-variant expansion when masking explicit secrets.
pub const ENABLE_EXTRA_SECRET_VARIANTS: &str = "CI_ENABLE_EXTRA_CHARACTERS_SECRETS_MASKING";

/// Overrides the shared-volume root used for step exchange files.
pub const WORKDIR_OVERRIDE: &str = "HARNESS_WORKDIR";

/// Selects the newer env-file reader with `__B64__` value decoding.
pub const NEW_ENV_READER: &str = "CI_NEW_VERSION_GODOTENV";

/// Overrides the exit code when every failed test is quarantined.
pub const QUARANTINED_TEST_SKIP: &str = "CI_ENABLE_QUARANTINED_TEST_SKIP";

/// Default shared-volume root when [`WORKDIR_OVERRIDE`] is unset.
pub const DEFAULT_WORKDIR: &str = "/tmp/engine";

/// Engine variables injected into every step environment.
pub mod step {
    /// Path of the exported-env capture file.
    pub const DRONE_ENV: &str = "DRONE_ENV";

    /// Path of the output-variable capture file (legacy name).
    pub const DRONE_OUTPUT: &str = "DRONE_OUTPUT";

    /// Path of the output-variable capture file.
    pub const OUTPUT_FILE: &str = "HARNESS_OUTPUT_FILE";

    /// Path of the secret-typed output capture file.
    pub const OUTPUT_SECRET_FILE: &str = "HARNESS_OUTPUT_SECRET_FILE";

    /// Path of the artifact capture file.
    pub const ARTIFACT_FILE: &str = "PLUGIN_ARTIFACT_FILE";

    /// Scratch directory private to the step.
    pub const SCRATCH_DIR: &str = "HARNESS_SCRATCH_DIR";
}

/// Whether a boolean-ish environment flag is enabled.
///
/// Accepts `true`/`1`/`yes` in any case; everything else is off.
pub fn flag_enabled(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => false,
    }
}
