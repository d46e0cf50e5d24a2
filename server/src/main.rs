use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use tts_core::{backend, BackendMode};
use server::{build_router, config::ServerConfig, AppState};

/// HTTP text-to-speech server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Backend to run: KANI, KITTEN or ESPEAK (case-insensitive).
    /// Falls back to TTS_BACKEND, then to auto-detection.
    backend: Option<BackendMode>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    async_main(cli).await
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    info!("Starting TTS server...");

    let config = ServerConfig::from_env();
    let selection = backend::select(cli.backend, config.backend.as_deref(), &config.engine);
    info!(mode = %selection.mode, source = %selection.source, "TTS backend selected");

    info!("Initializing TTS models...");
    let backend = tts_core::initialize(selection.mode, &config.engine).await;
    match &backend {
        Some(b) if b.is_ready() => info!("TTS models initialized successfully"),
        Some(_) => warn!("TTS backend loaded without an audio player, /tts will answer 503"),
        None => error!("TTS models not initialized, /tts will answer 503"),
    }

    if let Some(b) = &backend {
        let native = b.native_sample_rate();
        let output = config.output_sample_rate.resolve(native);
        if output != native {
            warn!(
                native,
                output,
                "backend sample rate differs from WAV output rate, audio will play at the wrong speed; set TTS_OUTPUT_SAMPLE_RATE=native to match"
            );
        } else {
            info!(sample_rate = output, "WAV output sample rate");
        }
    }

    let addr = config.bind_address();
    let app = build_router(AppState::new(config, backend));

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
