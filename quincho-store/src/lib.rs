pub mod app_config;
pub mod audit_repo;
pub mod block_repo;
pub mod database;
pub mod mailer;
pub mod profile_repo;
pub mod reservation_repo;

pub use audit_repo::AuditStore;
pub use block_repo::BlockedDateStore;
pub use database::DbClient;
pub use mailer::{Mailer, Notification};
pub use profile_repo::ProfileStore;
pub use reservation_repo::ReservationStore;
