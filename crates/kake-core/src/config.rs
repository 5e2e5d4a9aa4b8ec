//! Engine configuration. Plain, `Deserialize`-able data — loading it from
//! TOML/JSON/env is the host's job, the way `OpenclawConfig` in the teacher
//! codebase is pure serde structs with loading left to the caller.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub project_root: PathBuf,
    pub genfiles_prefix: String,
    pub worker_count: usize,
    pub default_timeout_secs: Option<u64>,
    pub computed_inputs_max_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            genfiles_prefix: "genfiles".to_string(),
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            default_timeout_secs: None,
            computed_inputs_max_iterations: 32,
        }
    }
}

impl EngineConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Default::default()
        }
    }

    pub fn with_genfiles_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.genfiles_prefix = prefix.into();
        self
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.default_timeout_secs = Some(secs);
        self
    }
}
