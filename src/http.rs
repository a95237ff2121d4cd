//! HTTP surface: webhook intake, conversation REST endpoints, WebSocket
//! event stream.
//!
//! The webhook is the channel provider's entry point; the `/api` routes serve
//! agent tooling; `/ws/{tenant}` streams [`ConversationEvent`]s for that
//! tenant to connected clients.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message as WsFrame, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, Error};
use crate::intake::{IngestOutcome, IntakeGateway};
use crate::messaging::outbound::OutboundMessenger;
use crate::notify::{BroadcastNotifier, ConversationEvent};
use crate::referral::ReferralCoordinator;
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub gateway: Arc<IntakeGateway>,
    pub coordinator: Arc<ReferralCoordinator>,
    pub messenger: Arc<OutboundMessenger>,
    pub events: BroadcastNotifier,
}

/// Build the Axum router with webhook, REST and WebSocket routes.
pub fn intake_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook/{tenant}", post(webhook))
        .route(
            "/api/conversations/{tenant}/{conversation}/messages",
            get(list_messages).post(send_message),
        )
        .route(
            "/api/conversations/{tenant}/{conversation}/request-consent",
            post(request_consent),
        )
        .route("/api/audit/{tenant}/{entity}", get(list_audit))
        .route("/ws/{tenant}", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(err: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Database(DatabaseError::NotFound { .. }) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "intake-core"
    }))
}

// ── Webhook ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    from: String,
    content: String,
    provider_message_id: Option<String>,
}

async fn webhook(
    State(state): State<AppState>,
    Path(tenant): Path<Uuid>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    let outcome = state
        .gateway
        .ingest(
            tenant,
            &payload.from,
            &payload.content,
            payload.provider_message_id.as_deref(),
        )
        .await;

    match outcome {
        Ok(IngestOutcome::Duplicate) => (
            StatusCode::OK,
            Json(serde_json::json!({ "accepted": false, "reason": "duplicate" })),
        ),
        Ok(IngestOutcome::Accepted {
            message,
            urgency_updated,
            urgency,
        }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "accepted": true,
                "message_id": message.id,
                "conversation_id": message.conversation_id,
                "urgency": urgency,
                "urgency_updated": urgency_updated,
            })),
        ),
        Err(e) => error_response(e),
    }
}

// ── Conversation REST ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    content: String,
    actor_id: Option<Uuid>,
}

async fn send_message(
    State(state): State<AppState>,
    Path((tenant, conversation)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SendMessagePayload>,
) -> impl IntoResponse {
    match state
        .messenger
        .send(tenant, conversation, &payload.content, payload.actor_id)
        .await
    {
        Ok(message) => (StatusCode::OK, Json(serde_json::json!(message))),
        Err(e) => error_response(e),
    }
}

async fn list_messages(
    State(state): State<AppState>,
    Path((tenant, conversation)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    match state.db.list_messages(tenant, conversation, 100).await {
        Ok(messages) => (StatusCode::OK, Json(serde_json::json!(messages))),
        Err(e) => error_response(e.into()),
    }
}

async fn request_consent(
    State(state): State<AppState>,
    Path((tenant, conversation)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    match state.coordinator.request_consent(tenant, conversation).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Err(e) => error_response(e),
    }
}

async fn list_audit(
    State(state): State<AppState>,
    Path((tenant, entity)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    match state.db.list_audit_events(tenant, entity).await {
        Ok(events) => (StatusCode::OK, Json(serde_json::json!(events))),
        Err(e) => error_response(e.into()),
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(tenant): Path<Uuid>,
) -> impl IntoResponse {
    info!(tenant = %tenant, "WebSocket client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, state.events, tenant))
}

async fn handle_socket(mut socket: WebSocket, events: BroadcastNotifier, tenant: Uuid) {
    info!(tenant = %tenant, "WebSocket client connected");

    let mut rx = events.subscribe();

    loop {
        tokio::select! {
            // Forward this tenant's events to the client
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !event_visible(&event, tenant) {
                            continue;
                        }
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(WsFrame::Text(json.into())).await.is_err() {
                                debug!("Client disconnected during send");
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(WsFrame::Ping(data))) => {
                        if socket.send(WsFrame::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsFrame::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(tenant = %tenant, "WebSocket connection closed");
}

fn event_visible(event: &ConversationEvent, tenant: Uuid) -> bool {
    event.tenant_id() == tenant
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_filtered_per_tenant() {
        let tenant = Uuid::new_v4();
        let event = ConversationEvent::MessageReceived {
            tenant_id: tenant,
            conversation_id: Uuid::new_v4(),
            message_id: Uuid::new_v4(),
            content: "oi".to_string(),
        };
        assert!(event_visible(&event, tenant));
        assert!(!event_visible(&event, Uuid::new_v4()));
    }
}
