use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use schat_core::AppState;
use std::path::Path;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let (mut config, notices) = config::Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    init_logging(config.logging.json);
    for notice in &notices {
        notice.log();
    }
    tracing::info!("Loaded configuration from '{}'", args.config);

    ensure_data_dir(&config.database.url);

    let engine: schat_db::DatabaseEngine = config.database.engine.into();
    let db = schat_db::create_pool_with_engine(
        &config.database.url,
        config.database.max_connections,
        Some(engine),
    )
    .await
    .context("failed to open database")?;
    schat_db::run_migrations_for_engine(&db, engine)
        .await
        .context("failed to run migrations")?;

    let state = AppState::new(db, config.app_config());

    let app: Router = schat_api::build_router()
        .merge(schat_ws::gateway_router())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;
    tracing::info!(
        bind_address = %config.server.bind_address,
        engine = engine.as_str(),
        "Schat server listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("schat=info,tower_http=debug"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Create the parent directory of a file-backed SQLite database.
fn ensure_data_dir(database_url: &str) {
    let Some(rest) = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
    else {
        return;
    };
    let file = rest.split('?').next().unwrap_or_default();
    if file.is_empty() || file.starts_with(":memory:") {
        return;
    }
    if let Some(parent) = Path::new(file).parent() {
        if parent.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create data directory {:?}: {}", parent, e);
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down (ctrl-c)..."),
        Err(e) => {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
