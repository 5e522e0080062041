use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use dossier_engine::{Engine, InboundUpdate};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/updates", post(receive_update))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Accept one normalized update and handle it on its own task.
///
/// The response only acknowledges receipt; all outcomes travel through
/// the delivery adapter.  One slow or failing update never blocks the
/// webhook.
async fn receive_update(
    State(state): State<AppState>,
    Json(update): Json<InboundUpdate>,
) -> StatusCode {
    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.handle_update(update).await {
            tracing::error!(error = %e, "update handling failed");
        }
    });
    StatusCode::ACCEPTED
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dossier_engine::reply::{MessageRef, Outbound, Transport, TransportError};
    use dossier_engine::EngineConfig;
    use dossier_shared::{ActorId, Lang, PlatformMessageId};
    use dossier_store::Database;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, outbound: Outbound) -> Result<MessageRef, TransportError> {
            Ok(MessageRef {
                chat_id: outbound.chat_id,
                message_id: PlatformMessageId(1),
            })
        }
    }

    #[tokio::test]
    async fn update_payloads_deserialize_into_the_engine_contract() {
        let engine = Engine::new(
            Database::open_in_memory().unwrap(),
            Arc::new(NullTransport),
            EngineConfig {
                owner: ActorId(1),
                public_open: false,
                default_lang: Lang::Ru,
            },
        )
        .unwrap();

        let body = serde_json::json!({
            "type": "private_message",
            "actor": { "id": 50 },
            "chat_id": 50,
            "message_id": 1,
            "text": "/start",
        });
        let update: InboundUpdate = serde_json::from_value(body).unwrap();
        engine.handle_update(update).await.unwrap();
    }
}
