use anyhow::Context;
use clap::Parser; // for cli
use std::sync::Arc;
use tracing::info;

use koby_gateway::config::Args;
use koby_gateway::rate_limit::spawn_sweeper;
use koby_gateway::state::AppState;
use koby_gateway::store::RecordStore;
use koby_gateway::{build_router, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    telemetry::init_tracing(&args.log_level, args.log_json);

    // one client for every upstream, each call bounded by the timeout
    let client = reqwest::Client::builder()
        .timeout(args.upstream_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let store = RecordStore::connect(&args.database_url)
        .await
        .context("failed to open record store")?;

    // creating shared state
    let state = Arc::new(AppState::from_args(&args, client, store.clone()));

    // spawn the background sweeper
    let sweeper = spawn_sweeper(state.limiter.clone(), args.sweep_interval());

    let origins = args.origins();
    let app = build_router(state.clone(), &origins);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "gateway listening");
    info!(
        gemini = state.gemini.is_some(),
        elevenlabs = state.elevenlabs.is_some(),
        webhooks = state.webhook_secret.is_some(),
        tools = state.tool_secret.is_some(),
        "upstream configuration"
    );
    info!(
        limit = args.rate_limit,
        window_secs = args.rate_window,
        sweep_secs = args.sweep_interval,
        "rate limit"
    );
    info!(origins = ?origins, "cors");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    store.close().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}
