//! Voice gateway server entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_gateway_config::Settings;
use voice_gateway_llm::ScriptedBackend;
use voice_gateway_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("VOICE_GATEWAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/gateway.toml"));
    let config = Settings::load(Some(&config_path))?;

    init_tracing(&config);
    tracing::info!("starting voice gateway v{}", env!("CARGO_PKG_VERSION"));

    let metrics = if config.observability.metrics_enabled {
        init_metrics()
    } else {
        None
    };

    // The LLM integration is a collaborator injected here; the bundled
    // scripted backend keeps the gateway conversational offline.
    let backend = Arc::new(ScriptedBackend::with_reply(
        "I heard you. This gateway is running without a language model attached.",
    ));

    let state = AppState::new(config.clone(), backend);

    let cleanup_shutdown = state.calls.start_cleanup_task();
    let app = create_router(state, metrics);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = cleanup_shutdown.send(true);
    tracing::info!("server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

/// Initialize tracing with an env filter and optional JSON output.
fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("voice_gateway={},tower_http=info", config.observability.log_level).into()
    });

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
