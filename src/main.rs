use std::sync::Arc;

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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let port: u16 = std::env::var("INTAKE_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let db_path =
        std::env::var("INTAKE_DB_PATH").unwrap_or_else(|_| "./data/intake.db".to_string());

    eprintln!("📨 Intake Core v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook/{{tenant}}", port);
    eprintln!("   Events:  ws://0.0.0.0:{}/ws/{{tenant}}", port);
    eprintln!("   API:     http://0.0.0.0:{}/api", port);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path_ref = std::path::Path::new(&db_path);
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(db_path_ref)
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );

    eprintln!("   Database: {}", db_path);

    // ── Wiring ───────────────────────────────────────────────────────────
    let config = IntakeConfig::from_env();
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
        config,
    ));

    let gateway = Arc::new(IntakeGateway::new(
        Arc::clone(&db),
        IdentityResolver::new(Arc::clone(&db)),
        UrgencyEscalator::new(Arc::clone(&db), audit.clone(), Arc::clone(&notifier)),
        Arc::clone(&coordinator),
        audit,
        notifier,
    ));

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = intake_routes(AppState {
        db,
        gateway,
        coordinator,
        messenger,
        events,
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!(port = port, "Intake server started");
    axum::serve(listener, app).await?;

    Ok(())
}
