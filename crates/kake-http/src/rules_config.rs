//! Loads `kake.toml`: engine settings plus a declarative rule list, so the
//! `kake` binary has something to build against without embedding rules in
//! Rust source. Layered the way the teacher's gateway layers env vars over
//! `GatewayConfig`: file values first, a handful of env overrides after.

use kake_core::{Capability, Engine, EngineConfig};
use kake_rules::{CachedFile, CreateSymlink, ShellCompile};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    engine: EngineSection,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleSection>,
}

#[derive(Deserialize, Default)]
struct EngineSection {
    genfiles_prefix: Option<String>,
    worker_count: Option<usize>,
    default_timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RuleSection {
    Shell {
        label: String,
        output: String,
        #[serde(default)]
        inputs: Vec<String>,
        argv: Vec<String>,
        #[serde(default = "default_version")]
        version: i64,
    },
    Symlink {
        label: String,
        output: String,
        source: String,
    },
    CachedFile {
        label: String,
        output: String,
        inputs: Vec<String>,
    },
}

fn default_version() -> i64 {
    1
}

/// Build an `Engine` rooted at `project_root`, loading `kake.toml` from
/// that directory if present. Environment variables
/// `KAKE_WORKER_COUNT`/`KAKE_TIMEOUT_SECS` override the file when set.
pub fn load_engine(project_root: &Path) -> anyhow::Result<Engine> {
    let toml_path = project_root.join("kake.toml");
    let file_config: FileConfig = if toml_path.exists() {
        let text = std::fs::read_to_string(&toml_path)?;
        toml::from_str(&text)?
    } else {
        FileConfig::default()
    };

    let mut config = EngineConfig::new(project_root);
    if let Some(prefix) = file_config.engine.genfiles_prefix {
        config = config.with_genfiles_prefix(prefix);
    }
    let worker_count = std::env::var("KAKE_WORKER_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .or(file_config.engine.worker_count);
    if let Some(count) = worker_count {
        config = config.with_worker_count(count);
    }
    let timeout_secs = std::env::var("KAKE_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .or(file_config.engine.default_timeout_secs);
    if let Some(secs) = timeout_secs {
        config = config.with_timeout_secs(secs);
    }

    let engine = Engine::new(config);
    for rule in file_config.rules {
        register_rule(&engine, rule)?;
    }
    Ok(engine)
}

fn register_rule(engine: &Engine, rule: RuleSection) -> anyhow::Result<()> {
    let (label, output, inputs, capability): (String, String, Vec<String>, Arc<dyn Capability>) = match rule {
        RuleSection::Shell {
            label,
            output,
            inputs,
            argv,
            version,
        } => (label.clone(), output, inputs, Arc::new(ShellCompile::new(label, argv, version))),
        RuleSection::Symlink { label, output, source } => {
            (label, output, Vec::new(), Arc::new(CreateSymlink::new(source)))
        }
        RuleSection::CachedFile { label, output, inputs } => {
            (label, output, inputs, Arc::new(CachedFile))
        }
    };
    let input_refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
    engine
        .register_compile(label, output, &input_refs, capability)
        .map_err(anyhow::Error::from)
}
