use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use quincho_domain::repository::ReservationRepository;

/// Periodic sweep deleting unconfirmed pending reservations whose 24h
/// confirmation window elapsed. Until the sweep runs, such rows still hold
/// their slot; that is deliberate, so parallel submitters cannot race for an
/// interval during the confirmation window.
pub async fn start_expiry_sweep(
    reservations: Arc<dyn ReservationRepository>,
    interval: Duration,
) {
    info!("Expiry sweep started, interval {:?}", interval);
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately; skip it so startup is quiet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match reservations.delete_expired_unconfirmed(Utc::now()).await {
            Ok(0) => {}
            Ok(n) => info!("Expiry sweep removed {} unconfirmed reservations", n),
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}
