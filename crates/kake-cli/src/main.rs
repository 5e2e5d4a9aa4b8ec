//! `kake` — build one or more targets against the `kake.toml` in a project
//! directory and exit.

mod rules_config;

use clap::Parser;
use kake_core::{BuildContext, TargetPath};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kake", about = "In-process dependency engine — build target files on demand")]
struct Cli {
    /// Target paths to build, relative to the project root.
    targets: Vec<String>,

    /// Project root containing kake.toml (default: current directory).
    #[arg(short = 'C', long)]
    project_root: Option<PathBuf>,

    /// Context key=value pairs, repeatable, passed through to capabilities.
    #[arg(long = "context", value_parser = parse_context_pair)]
    context: Vec<(String, String)>,
}

fn parse_context_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kake=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if cli.targets.is_empty() {
        eprintln!("Error: at least one target is required");
        std::process::exit(1);
    }

    let project_root = cli
        .project_root
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let engine = rules_config::load_engine(&project_root)?;

    let mut context = BuildContext::new();
    for (key, value) in cli.context {
        context = context.with(key, value);
    }

    let targets: Vec<TargetPath> = cli.targets.iter().map(TargetPath::new).collect();
    if let Err(err) = engine.build_many(&targets, &context).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }

    for target in &targets {
        println!("built {target}");
    }
    Ok(())
}
