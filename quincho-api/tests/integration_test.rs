//! End-to-end repository tests against a live PostgreSQL.
//!
//! These run against the database at `DATABASE_URL` (migrations are applied
//! on first connect) and are `#[ignore]`d so plain `cargo test` stays green
//! without infrastructure:
//!
//!     DATABASE_URL=postgres://... cargo test -- --ignored
//!
//! Every test uses its own calendar date; the no-overlap constraint is
//! global, so sharing a date across tests would make them interfere.

use chrono::{NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use quincho_domain::block::BlockEntry;
use quincho_domain::repository::{
    AuditRepository, BlockedDateRepository, RepoError, ReservationRepository,
};
use quincho_domain::reservation::{NewReservation, ReservationStatus};
use quincho_store::{AuditStore, BlockedDateStore, ProfileStore, ReservationStore};

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Make the date reusable across test runs against a persistent database.
async fn reset_date(pool: &PgPool, fecha: NaiveDate) {
    sqlx::query(
        "DELETE FROM cancellation_audits WHERE reservation_id IN \
         (SELECT id FROM reservations WHERE fecha = $1)",
    )
    .bind(fecha)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("DELETE FROM reservations WHERE fecha = $1")
        .bind(fecha)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM blocked_dates WHERE fecha = $1")
        .bind(fecha)
        .execute(pool)
        .await
        .unwrap();
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn request(fecha: NaiveDate, inicio: NaiveTime, fin: NaiveTime) -> NewReservation {
    NewReservation {
        responsable: "Test User".to_string(),
        email: "test@example.com".to_string(),
        motivo: "Test booking".to_string(),
        fecha,
        inicio,
        fin,
        personas: 4,
        affiliation: None,
    }
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_double_booking_race_exactly_one_wins() {
    let pool = test_pool().await;
    let store = Arc::new(ReservationStore::new(pool.clone()));
    let fecha = NaiveDate::from_ymd_opt(2025, 7, 4).unwrap();
    reset_date(&pool, fecha).await;

    let req_a = request(fecha, t(14, 0), t(15, 0));
    let req_b = request(fecha, t(14, 0), t(15, 0));

    let (a, b) = tokio::join!(store.create(&req_a, None), store.create(&req_b, None));

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent insert must win");

    let loser = if a.is_err() { a } else { b };
    assert!(matches!(loser.unwrap_err(), RepoError::SlotTaken));

    let active = store.list_by_date(fecha, true).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].status, ReservationStatus::Pending);
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_unconfirmed_reservation_still_blocks_slot() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let fecha = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    reset_date(&pool, fecha).await;

    let first = store
        .create(&request(fecha, t(10, 0), t(11, 0)), None)
        .await
        .unwrap();
    assert!(!first.confirmed);

    // Overlapping interval must lose even though the first is unconfirmed.
    let second = store.create(&request(fecha, t(10, 30), t(11, 30)), None).await;
    assert!(matches!(second.unwrap_err(), RepoError::SlotTaken));
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_cancel_reopens_interval() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let fecha = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
    reset_date(&pool, fecha).await;

    let first = store
        .create(&request(fecha, t(10, 0), t(11, 0)), None)
        .await
        .unwrap();
    store.cancel(first.id, Some("admin-1"), Some("test")).await.unwrap();

    // Identical interval becomes bookable again.
    let second = store.create(&request(fecha, t(10, 0), t(11, 0)), None).await;
    assert!(second.is_ok());
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_back_to_back_reservations_are_allowed() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let fecha = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
    reset_date(&pool, fecha).await;

    store.create(&request(fecha, t(10, 0), t(11, 0)), None).await.unwrap();
    let second = store.create(&request(fecha, t(11, 0), t(12, 0)), None).await;
    assert!(second.is_ok(), "half-open intervals must not collide at the boundary");
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_cancellation_is_idempotent_and_single_audited() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let audits = AuditStore::new(pool.clone());
    let fecha = NaiveDate::from_ymd_opt(2025, 6, 4).unwrap();
    reset_date(&pool, fecha).await;

    let reservation = store
        .create(&request(fecha, t(9, 0), t(10, 0)), None)
        .await
        .unwrap();

    let outcome = store
        .cancel(reservation.id, Some("admin-1"), Some("double-cancel test"))
        .await
        .unwrap();
    audits
        .append(&outcome.snapshot, Some("admin-1"), Some("double-cancel test"))
        .await
        .unwrap();

    // Second cancel is rejected before any audit write can happen.
    let again = store.cancel(reservation.id, Some("admin-1"), None).await;
    assert!(matches!(again.unwrap_err(), RepoError::AlreadyClosed));

    let rows = audits.list_for_reservation(reservation.id).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_block_cascade_cancels_overlapping_and_audits() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let blocks = BlockedDateStore::new(pool.clone());
    let audits = AuditStore::new(pool.clone());
    let profiles = ProfileStore::new(pool.clone(), std::time::Duration::from_secs(3));
    let fecha = NaiveDate::from_ymd_opt(2025, 8, 10).unwrap();
    reset_date(&pool, fecha).await;

    let admin = format!("admin-{}", Uuid::new_v4());
    profiles.upsert(&admin, "admin@example.com", true).await.unwrap();

    // Approved reservation inside the block window.
    let inside = store
        .create(&request(fecha, t(9, 0), t(10, 0)), None)
        .await
        .unwrap();
    store.approve(inside.id, &admin, None).await.unwrap();

    // Active reservation outside the window must survive.
    let outside = store
        .create(&request(fecha, t(14, 0), t(15, 0)), None)
        .await
        .unwrap();

    // The admin's own placeholder booking is exempt from the cascade.
    let placeholder = store
        .create(&request(fecha, t(10, 0), t(11, 0)), Some(&admin))
        .await
        .unwrap();

    let outcome = blocks
        .create_group(
            "maintenance",
            &[BlockEntry {
                fecha,
                start_time: Some(t(8, 0)),
                end_time: Some(t(12, 0)),
            }],
            &admin,
        )
        .await
        .unwrap();

    assert_eq!(outcome.blocks.len(), 1);
    assert_eq!(outcome.cancelled.len(), 1);
    assert_eq!(outcome.cancelled[0].id, inside.id);

    let cancelled = store.find(inside.id).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert!(cancelled.admin_notes.unwrap().contains("maintenance"));

    let audit_rows = audits.list_for_reservation(inside.id).await.unwrap();
    assert_eq!(audit_rows.len(), 1);
    assert_eq!(audit_rows[0].previous_status, ReservationStatus::Approved);
    assert!(audit_rows[0].cancelled_by.is_none(), "cascade is a system action");

    let untouched = store.find(outside.id).await.unwrap();
    assert_eq!(untouched.status, ReservationStatus::Pending);

    let spared = store.find(placeholder.id).await.unwrap();
    assert_eq!(spared.status, ReservationStatus::Pending);
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_whole_day_block_cancels_everything_active() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let blocks = BlockedDateStore::new(pool.clone());
    let profiles = ProfileStore::new(pool.clone(), std::time::Duration::from_secs(3));
    let fecha = NaiveDate::from_ymd_opt(2025, 8, 11).unwrap();
    reset_date(&pool, fecha).await;

    let admin = format!("admin-{}", Uuid::new_v4());
    profiles.upsert(&admin, "admin@example.com", true).await.unwrap();

    store.create(&request(fecha, t(9, 0), t(10, 0)), None).await.unwrap();
    store.create(&request(fecha, t(15, 0), t(16, 0)), None).await.unwrap();

    let outcome = blocks
        .create_group(
            "evento privado",
            &[BlockEntry { fecha, start_time: None, end_time: None }],
            &admin,
        )
        .await
        .unwrap();

    assert_eq!(outcome.cancelled.len(), 2);
    let active = store.list_by_date(fecha, true).await.unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_unblock_group_deletes_all_entries() {
    let pool = test_pool().await;
    let blocks = BlockedDateStore::new(pool.clone());
    let profiles = ProfileStore::new(pool.clone(), std::time::Duration::from_secs(3));

    let admin = format!("admin-{}", Uuid::new_v4());
    profiles.upsert(&admin, "admin@example.com", true).await.unwrap();
    reset_date(&pool, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()).await;
    reset_date(&pool, NaiveDate::from_ymd_opt(2025, 9, 2).unwrap()).await;

    let outcome = blocks
        .create_group(
            "pintura",
            &[
                BlockEntry {
                    fecha: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
                    start_time: None,
                    end_time: None,
                },
                BlockEntry {
                    fecha: NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
                    start_time: None,
                    end_time: None,
                },
            ],
            &admin,
        )
        .await
        .unwrap();

    let group_id = outcome.blocks[0].group_id;
    assert!(outcome.blocks.iter().all(|b| b.group_id == group_id));

    let deleted = blocks.delete_group(group_id).await.unwrap();
    assert_eq!(deleted.len(), 2);

    assert!(matches!(
        blocks.delete_group(group_id).await.unwrap_err(),
        RepoError::NotFound
    ));
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_confirmation_token_flows() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let fecha = NaiveDate::from_ymd_opt(2025, 6, 5).unwrap();
    reset_date(&pool, fecha).await;

    let reservation = store
        .create(&request(fecha, t(10, 0), t(11, 0)), None)
        .await
        .unwrap();
    let token = reservation.confirmation_token.unwrap();

    // Confirmation flips the flag, keeps status, consumes the token.
    let confirmed = store.confirm(token).await.unwrap();
    assert!(confirmed.confirmed);
    assert_eq!(confirmed.status, ReservationStatus::Pending);

    // Consumed token now reads as invalid, not expired.
    assert!(matches!(store.confirm(token).await.unwrap_err(), RepoError::TokenInvalid));

    // Unknown token is invalid.
    assert!(matches!(
        store.confirm(Uuid::new_v4()).await.unwrap_err(),
        RepoError::TokenInvalid
    ));

    // Force-expire a second reservation's token: distinguishable outcome.
    let other = store
        .create(&request(fecha, t(12, 0), t(13, 0)), None)
        .await
        .unwrap();
    sqlx::query("UPDATE reservations SET token_expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(other.id)
        .execute(&pool)
        .await
        .unwrap();
    assert!(matches!(
        store.confirm(other.confirmation_token.unwrap()).await.unwrap_err(),
        RepoError::TokenExpired
    ));
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_expiry_sweep_removes_only_expired_unconfirmed() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let fecha = NaiveDate::from_ymd_opt(2025, 6, 6).unwrap();
    reset_date(&pool, fecha).await;

    let stale = store
        .create(&request(fecha, t(10, 0), t(11, 0)), None)
        .await
        .unwrap();
    let fresh = store
        .create(&request(fecha, t(12, 0), t(13, 0)), None)
        .await
        .unwrap();

    sqlx::query("UPDATE reservations SET token_expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(stale.id)
        .execute(&pool)
        .await
        .unwrap();

    let removed = store.delete_expired_unconfirmed(Utc::now()).await.unwrap();
    assert!(removed >= 1);

    assert!(matches!(store.find(stale.id).await.unwrap_err(), RepoError::NotFound));
    assert!(store.find(fresh.id).await.is_ok());
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_approve_rejects_non_pending() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let fecha = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
    reset_date(&pool, fecha).await;

    let reservation = store
        .create(&request(fecha, t(10, 0), t(11, 0)), None)
        .await
        .unwrap();
    store.approve(reservation.id, "admin-1", None).await.unwrap();

    // Approving an approved reservation is rejected, as is rejecting it.
    assert!(matches!(
        store.approve(reservation.id, "admin-1", None).await.unwrap_err(),
        RepoError::AlreadyClosed
    ));
    assert!(matches!(
        store.reject(reservation.id, "admin-1", Some("late")).await.unwrap_err(),
        RepoError::AlreadyClosed
    ));
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_create_on_blocked_interval_is_rejected() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let blocks = BlockedDateStore::new(pool.clone());
    let profiles = ProfileStore::new(pool.clone(), std::time::Duration::from_secs(3));
    let fecha = NaiveDate::from_ymd_opt(2025, 8, 12).unwrap();
    reset_date(&pool, fecha).await;

    let admin = format!("admin-{}", Uuid::new_v4());
    profiles.upsert(&admin, "admin@example.com", true).await.unwrap();

    blocks
        .create_group(
            "obras",
            &[BlockEntry {
                fecha,
                start_time: Some(t(9, 0)),
                end_time: Some(t(12, 0)),
            }],
            &admin,
        )
        .await
        .unwrap();

    // The store itself refuses the blocked interval, so a submission that
    // never saw the block (or raced its commit) still loses with SlotTaken.
    let inside = store.create(&request(fecha, t(10, 0), t(11, 0)), None).await;
    assert!(matches!(inside.unwrap_err(), RepoError::SlotTaken));

    let straddling = store.create(&request(fecha, t(11, 0), t(13, 0)), None).await;
    assert!(matches!(straddling.unwrap_err(), RepoError::SlotTaken));

    // An edge-touching slot on the same date stays bookable.
    let after = store.create(&request(fecha, t(12, 0), t(13, 0)), None).await;
    assert!(after.is_ok());
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_create_on_whole_day_block_is_rejected() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let blocks = BlockedDateStore::new(pool.clone());
    let profiles = ProfileStore::new(pool.clone(), std::time::Duration::from_secs(3));
    let fecha = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
    reset_date(&pool, fecha).await;

    let admin = format!("admin-{}", Uuid::new_v4());
    profiles.upsert(&admin, "admin@example.com", true).await.unwrap();

    blocks
        .create_group(
            "evento privado",
            &[BlockEntry { fecha, start_time: None, end_time: None }],
            &admin,
        )
        .await
        .unwrap();

    let morning = store.create(&request(fecha, t(8, 0), t(9, 0)), None).await;
    assert!(matches!(morning.unwrap_err(), RepoError::SlotTaken));
    let evening = store.create(&request(fecha, t(20, 0), t(21, 0)), None).await;
    assert!(matches!(evening.unwrap_err(), RepoError::SlotTaken));

    // Unblocking the date reopens it.
    let block = blocks
        .list(Some(fecha))
        .await
        .unwrap()
        .into_iter()
        .find(|b| b.fecha == fecha)
        .unwrap();
    blocks.delete(block.id).await.unwrap();
    let reopened = store.create(&request(fecha, t(8, 0), t(9, 0)), None).await;
    assert!(reopened.is_ok());
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL at DATABASE_URL"]
async fn test_cancel_returns_cancelled_view_and_snapshot() {
    let pool = test_pool().await;
    let store = ReservationStore::new(pool.clone());
    let fecha = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
    reset_date(&pool, fecha).await;

    let reservation = store
        .create(&request(fecha, t(10, 0), t(11, 0)), None)
        .await
        .unwrap();
    store.approve(reservation.id, "admin-1", None).await.unwrap();

    let outcome = store
        .cancel(reservation.id, Some("admin-1"), Some("no show"))
        .await
        .unwrap();

    // The snapshot carries the pre-flip state for the audit trail; the
    // cancelled view is what the caller shows.
    assert_eq!(outcome.snapshot.status, ReservationStatus::Approved);
    assert_eq!(outcome.cancelled.status, ReservationStatus::Cancelled);
    assert!(outcome.cancelled.admin_notes.unwrap().contains("no show"));
    assert_eq!(outcome.cancelled.updated_by.as_deref(), Some("admin-1"));
}
