//! # dossier-server
//!
//! Webhook binary for the Dossier engine.
//!
//! This binary provides:
//! - **REST API** (axum) that receives normalized transport updates and
//!   a health check
//! - **HTTP delivery adapter client** that posts outbound template
//!   payloads to the rendering/delivery service
//! - Env-driven configuration with working defaults for local runs

mod api;
mod config;
mod transport;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use dossier_engine::{Engine, EngineConfig};
use dossier_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::transport::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dossier_server=debug")),
        )
        .init();

    info!("Starting Dossier server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let db = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::open_default()?,
    };

    let transport = Arc::new(HttpTransport::new(&config.delivery_url)?);
    let engine = Engine::new(
        db,
        transport,
        EngineConfig {
            owner: config.owner_id,
            public_open: config.public_open,
            default_lang: config.default_lang,
        },
    )?;

    let app_state = AppState {
        engine: Arc::new(engine),
    };
    let http_addr = config.http_addr;

    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
