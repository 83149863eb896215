use std::sync::Arc;
use tokio::sync::broadcast;

use quincho_domain::events::ChangeEvent;
use quincho_domain::repository::{
    AuditRepository, BlockedDateRepository, ReservationRepository,
};
use quincho_store::{DbClient, Mailer, ProfileStore};

#[derive(Clone)]
pub struct AuthSettings {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbClient>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub blocks: Arc<dyn BlockedDateRepository>,
    pub audits: Arc<dyn AuditRepository>,
    pub profiles: Arc<ProfileStore>,
    pub mailer: Arc<Mailer>,
    pub change_tx: broadcast::Sender<ChangeEvent>,
    pub auth: AuthSettings,
}

impl AppState {
    /// Change broadcasting is best-effort: no subscriber just means no one
    /// is watching the stream right now.
    pub fn broadcast(&self, event: ChangeEvent) {
        let _ = self.change_tx.send(event);
    }
}
