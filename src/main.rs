//! chat-relay: streaming chat relay and leaderboard gateway.
//!
//! Relays chat prompts to an OpenAI-compatible provider and streams the
//! generated text back as plain chunked output. Leaderboard submissions are
//! stored in Supabase and answered with the ranked window around the score.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use chat_relay::config::{Cli, Config};
use chat_relay::leaderboard;
use chat_relay::provider::openai::OpenAiProvider;
use chat_relay::server::api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "chat_relay=debug,tower_http=debug"
    } else {
        "chat_relay=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("chat-relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration, then overlay secrets from the environment.
    let mut config = Config::load(&cli.config)?;
    config.apply_env();
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    info!(
        api_base = config.provider.api_base,
        default_model = config.provider.default_model,
        stream_buffer = config.server.stream_buffer,
        leaderboard = config.leaderboard.credentials().is_some(),
        "Configuration loaded"
    );

    if config.provider.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; chat requests will be rejected by the provider");
    }

    // External clients are built once and shared by every request.
    let provider = Arc::new(OpenAiProvider::new(&config.provider)?);
    let store = leaderboard::connect(&config.leaderboard)?;

    let state = Arc::new(AppState::new(provider, store, &config));
    let app = build_router(state);

    let listen_addr = config.server.listen.clone();
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
