use clap::Parser;
use roomchat::{AppState, backend::SqliteBackend, config::Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("roomchat=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();

    let backend = SqliteBackend::connect(&config.database_url, config.max_connections).await?;
    let app = roomchat::app(
        AppState {
            backend: backend.clone(),
        },
        config.session_idle(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    backend.close().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {err}");
    }
}
