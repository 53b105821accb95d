//! `flockline-server` binary.

use flockline::InMemoryDocumentStore;
use flockline_postgres::PostgresDocumentStore;
use flockline_server::telemetry::init_logging;
use flockline_server::{router, AppState, Backend, ServerConfig, TokenIssuer};
use std::process::ExitCode;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "[server.main] server stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let backend = match &config.database_url {
        Some(url) => {
            let store = PostgresDocumentStore::with_config(url.as_str(), config.postgres.clone()).await?;
            store.migrate().await?;
            Backend::from(store)
        }
        None => {
            warn!("[server.main] DATABASE_URL not set, using the in-memory store");
            Backend::from(InMemoryDocumentStore::new())
        }
    };
    info!(backend = backend.name(), "[server.main] store ready");

    let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl);
    let app = router(AppState::new(backend, config.retry.clone(), tokens));

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "[server.main] listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("[server.main] shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "[server.main] could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
