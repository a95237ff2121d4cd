//! Integration tests for the WebSocket event stream.
//!
//! Each test spins up an Axum server on a random port, connects via
//! tokio-tungstenite, and drives the intake stack to produce events.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use intake_core::audit::AuditLog;
use intake_core::config::IntakeConfig;
use intake_core::gamification::PointsLedger;
use intake_core::http::{AppState, intake_routes};
use intake_core::intake::IntakeGateway;
use intake_core::intake::escalation::UrgencyEscalator;
use intake_core::intake::identity::IdentityResolver;
use intake_core::messaging::outbound::OutboundMessenger;
use intake_core::messaging::{NullChannelClient, NullPartnerNotifier};
use intake_core::notify::{BroadcastNotifier, Notifier};
use intake_core::referral::ReferralCoordinator;
use intake_core::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start an Axum server on a random port, return (port, gateway).
async fn start_server() -> (u16, Arc<IntakeGateway>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let events = BroadcastNotifier::new();
    let notifier: Arc<dyn Notifier> = Arc::new(events.clone());
    let audit = AuditLog::new(Arc::clone(&db));

    let messenger = Arc::new(OutboundMessenger::new(
        Arc::clone(&db),
        audit.clone(),
        Arc::clone(&notifier),
        Arc::new(NullChannelClient),
        Arc::new(PointsLedger::new(Arc::clone(&db))),
    ));
    let coordinator = Arc::new(ReferralCoordinator::new(
        Arc::clone(&db),
        Arc::clone(&messenger),
        audit.clone(),
        Arc::new(NullPartnerNotifier),
        IntakeConfig::default(),
    ));
    let gateway = Arc::new(IntakeGateway::new(
        Arc::clone(&db),
        IdentityResolver::new(Arc::clone(&db)),
        UrgencyEscalator::new(Arc::clone(&db), audit.clone(), Arc::clone(&notifier)),
        Arc::clone(&coordinator),
        audit,
        notifier,
    ));

    let app = intake_routes(AppState {
        db,
        gateway: Arc::clone(&gateway),
        coordinator,
        messenger,
        events,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, gateway)
}

/// Wait for the server-side socket task to subscribe to the broadcast.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn ws_receives_message_received_event() {
    timeout(TEST_TIMEOUT, async {
        let (port, gateway) = start_server().await;
        let tenant = Uuid::new_v4();

        let (mut ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws/{tenant}"))
            .await
            .expect("WS connect failed");
        settle().await;

        gateway
            .ingest(tenant, "+5511987654321", "Bom dia", None)
            .await
            .unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);

        assert_eq!(json["type"], "message_received");
        assert_eq!(json["tenant_id"], tenant.to_string());
        assert_eq!(json["content"], "Bom dia");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_receives_urgency_change_before_message() {
    timeout(TEST_TIMEOUT, async {
        let (port, gateway) = start_server().await;
        let tenant = Uuid::new_v4();

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/{tenant}"))
            .await
            .unwrap();
        settle().await;

        gateway
            .ingest(tenant, "+5511911", "Preciso de uma liminar urgente", None)
            .await
            .unwrap();

        // Escalation fires before the message is persisted, so the urgency
        // event arrives first.
        let first = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(first["type"], "urgency_changed");
        assert_eq!(first["urgency"], "PLANTAO");

        let second = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(second["type"], "message_received");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_filters_other_tenants_events() {
    timeout(TEST_TIMEOUT, async {
        let (port, gateway) = start_server().await;
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/{watched}"))
            .await
            .unwrap();
        settle().await;

        // An event for another tenant must not reach this socket.
        gateway
            .ingest(other, "+5511922", "mensagem alheia", None)
            .await
            .unwrap();
        gateway
            .ingest(watched, "+5511933", "mensagem minha", None)
            .await
            .unwrap();

        let msg = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(msg["tenant_id"], watched.to_string());
        assert_eq!(msg["content"], "mensagem minha");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn two_clients_both_receive_broadcast() {
    timeout(TEST_TIMEOUT, async {
        let (port, gateway) = start_server().await;
        let tenant = Uuid::new_v4();

        let (mut ws_a, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/{tenant}"))
            .await
            .unwrap();
        let (mut ws_b, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/{tenant}"))
            .await
            .unwrap();
        settle().await;

        gateway
            .ingest(tenant, "+5511944", "para todos", None)
            .await
            .unwrap();

        for ws in [&mut ws_a, &mut ws_b] {
            let msg = parse_ws_json(&ws.next().await.unwrap().unwrap());
            assert_eq!(msg["type"], "message_received");
            assert_eq!(msg["content"], "para todos");
        }
    })
    .await
    .expect("test timed out");
}
