//! Analysis API server: runs the lab pipeline for HTTP clients.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use codelab::io::config::{DEFAULT_CONFIG_FILE, LabConfig, load_config};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::{AppState, LiveBackend};

/// Round limit when neither the flag nor a config file sets one.
const DEFAULT_MAX_ROUNDS: u32 = 5;

#[derive(Parser)]
#[command(name = "codelab-server")]
#[command(about = "HTTP API for the run/debug/clean/test agent pipeline")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Directory holding one session directory per request
    #[arg(long, default_value = "./sessions")]
    data_dir: PathBuf,

    /// TOML config file (defaults apply when missing)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Round limit for every repair loop; overrides the config file
    #[arg(long)]
    max_rounds: Option<u32>,
}

/// Load the config, then apply the round limit: the flag wins, then the
/// config file, then [`DEFAULT_MAX_ROUNDS`].
fn load_server_config(path: &Path, max_rounds: Option<u32>) -> anyhow::Result<LabConfig> {
    let mut config = load_config(path)?;
    match max_rounds {
        Some(max_rounds) => config.max_rounds = max_rounds,
        None if !path.exists() => config.max_rounds = DEFAULT_MAX_ROUNDS,
        None => {}
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codelab_server=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = load_server_config(&args.config, args.max_rounds)?;
    std::fs::create_dir_all(&args.data_dir)?;
    let data_dir = args.data_dir.canonicalize().unwrap_or(args.data_dir);
    info!(
        data_dir = %data_dir.display(),
        max_rounds = config.max_rounds,
        "starting codelab-server"
    );

    let state = AppState::new(config, data_dir, Arc::new(LiveBackend));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
