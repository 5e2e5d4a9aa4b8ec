//! `kake-http` — serve a project's generated files over HTTP, building each
//! one on first request.

mod rules_config;
mod server;

use clap::Parser;
use server::HttpState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kake-http", about = "Serve a Kake project's generated files over HTTP")]
struct Cli {
    /// Project root containing kake.toml (default: current directory).
    #[arg(short = 'C', long)]
    project_root: Option<PathBuf>,

    /// Port to bind.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// URL path prefix that maps to the project's genfiles tree.
    #[arg(long, default_value = "")]
    mount: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kake_http=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let project_root = cli
        .project_root
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let engine = rules_config::load_engine(&project_root)?;

    let state = Arc::new(HttpState {
        engine,
        mount_prefix: cli.mount,
    });
    let app = server::router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], cli.port).into();
    info!("kake-http listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
