//! Modelgate - main application entry point
//!
//! Starts the HTTP API server with the background worker pool and the
//! retention sweep.

use tokio::signal;
use tokio_util::sync::CancellationToken;

use modelgate::{create_app, init_tracing, Config};
use modelgate_core::config::Validate;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: failed to load .env file: {e}");
        }
    }

    let config = Config::load()?;
    config.validate()?;
    init_tracing(&config.logging)?;

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        workers = config.jobs.max_concurrent,
        "Starting modelgate server"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = create_app(config)?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal(app.shutdown_token))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, cancelling background workers first.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}
