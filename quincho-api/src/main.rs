use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quincho_api::{app, state::{AppState, AuthSettings}};
use quincho_store::{
    AuditStore, BlockedDateStore, DbClient, Mailer, ProfileStore, ReservationStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quincho_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = quincho_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Quincho API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");
    let db = Arc::new(db);

    let reservations = Arc::new(ReservationStore::new(db.pool.clone()));
    let blocks = Arc::new(BlockedDateStore::new(db.pool.clone()));
    let audits = Arc::new(AuditStore::new(db.pool.clone()));
    let profiles = Arc::new(ProfileStore::new(
        db.pool.clone(),
        Duration::from_millis(config.auth.profile_lookup_timeout_ms),
    ));
    let mailer = Arc::new(Mailer::new(config.mailer.clone()));

    // SSE Broadcast Channel
    let (change_tx, _) = tokio::sync::broadcast::channel(100);

    let app_state = AppState {
        db,
        reservations: reservations.clone(),
        blocks,
        audits,
        profiles,
        mailer,
        change_tx,
        auth: AuthSettings {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    tokio::spawn(quincho_api::worker::start_expiry_sweep(
        reservations,
        Duration::from_secs(config.sweep.interval_seconds),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
