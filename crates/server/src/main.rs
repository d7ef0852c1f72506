//! Voicebot Server Entry Point

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voicebot_config::{load_settings, Settings};
use voicebot_server::{create_router, init_metrics, AppState};
use voicebot_services::Services;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.* > config/default.* > defaults
    let env = std::env::var("VOICEBOT_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        },
    };

    init_tracing(&config);

    tracing::info!("Starting Voicebot Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config_env = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let services = Services::openai(&config.services)?;
    if services.tts.sample_rate() != config.transport.audio_out_sample_rate {
        tracing::warn!(
            tts = services.tts.sample_rate(),
            configured = config.transport.audio_out_sample_rate,
            "Synthesized audio rate differs from transport.audio_out_sample_rate, sending at synthesis rate"
        );
    }

    let mut state = AppState::new(config.clone(), services);
    if config.observability.metrics_enabled {
        state = state.with_metrics(init_metrics()?);
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let app = create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(ws_path = %config.server.ws_path, "Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_state.begin_shutdown();
        })
        .await?;

    if state.drain_sessions(config.pipeline.drain_timeout()).await {
        tracing::info!("Server shutdown complete");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!(
            "voicebot={level},voicebot_server={level},voicebot_pipeline={level},voicebot_services={level},tower_http=debug"
        )
        .into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    subscriber.with(fmt_layer).init();
}
