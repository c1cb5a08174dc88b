use anyhow::{Context, Result};
use clap::Parser;
use speech_pulse::{create_router, AppState, Config};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "speech-pulse", about = "Real-time speech metrics pipeline")]
struct Args {
    /// Path to the config file (without extension)
    #[arg(long, default_value = "config/speech-pulse")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut cfg = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Could not load config {} ({}), using defaults", args.config, e);
            Config::default()
        }
    };
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} starting", cfg.service.name);
    info!("Analyzer endpoint: {}", cfg.analyzer.endpoint);
    info!("Recordings path: {}", cfg.storage.recordings_path);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg).context("Failed to initialize application state")?;
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
