// crates/server/src/main.rs
//! Voxscribe server binary.
//!
//! Wires the orchestration engine to the CLI-based ASR collaborator and
//! serves the HTTP API. All configuration comes from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use voxscribe_core::EngineConfig;
use voxscribe_engine::Dispatcher;
use voxscribe_server::asr::{CommandTranscriber, JobWorkspace};
use voxscribe_server::{create_app, AppState};

/// Default port for the server.
const DEFAULT_PORT: u16 = 47310;

/// Default ASR binary on PATH.
const DEFAULT_ASR_BIN: &str = "whisper-cli";

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("VOXSCRIBE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Get the ASR binary to invoke per job.
fn get_asr_bin() -> String {
    std::env::var("VOXSCRIBE_ASR_BIN").unwrap_or_else(|_| DEFAULT_ASR_BIN.to_string())
}

/// Get the root for per-job scratch directories.
fn get_work_dir() -> PathBuf {
    std::env::var("VOXSCRIBE_WORK_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("voxscribe"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    eprintln!("\n\u{1f399} voxscribe v{}\n", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::from_env();
    let work_dir = get_work_dir();
    std::fs::create_dir_all(&work_dir)?;

    let transcriber = Arc::new(CommandTranscriber::new(get_asr_bin()));
    let cleanup = Arc::new(JobWorkspace::new(&work_dir));
    let dispatcher = Dispatcher::new(config, transcriber, cleanup);

    let state = AppState::new(Arc::clone(&dispatcher));
    let app = create_app(state);

    let port = get_port();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    eprintln!("  \u{2713} Ready \u{2014} work dir {}", work_dir.display());
    eprintln!("  \u{2192} http://localhost:{}\n", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            dispatcher.shutdown();
        })
        .await?;

    Ok(())
}
