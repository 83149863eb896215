use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quincho_domain::events::{ChangeAction, ChangeEvent, ChangeTable};
use quincho_domain::reservation::{NewReservation, Reservation};
use quincho_store::Notification;

use crate::auth::maybe_claims;
use crate::error::AppError;
use crate::state::AppState;

/// Public view of a reservation; the confirmation token never leaves the
/// backend except inside the email link.
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub id: Uuid,
    pub responsable: String,
    pub email: String,
    pub motivo: String,
    pub fecha: NaiveDate,
    pub inicio: NaiveTime,
    pub fin: NaiveTime,
    pub personas: i32,
    pub affiliation: Option<String>,
    pub status: String,
    pub admin_notes: Option<String>,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            responsable: r.responsable,
            email: r.email,
            motivo: r.motivo,
            fecha: r.fecha,
            inicio: r.inicio,
            fin: r.fin,
            personas: r.personas,
            affiliation: r.affiliation,
            status: r.status.to_string(),
            admin_notes: r.admin_notes,
            confirmed: r.confirmed,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub fecha: NaiveDate,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct BlockedListQuery {
    pub from: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct ConfirmResponse {
    id: Uuid,
    confirmed: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation).get(list_reservations))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/confirm/{token}", post(confirm_reservation))
        .route("/v1/blocked-dates", get(list_blocked_dates))
}

async fn create_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewReservation>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    req.validate()?;

    let slot = req.slot();

    // Optimistic pre-check for fast feedback. This races against concurrent
    // submitters by design; the store's in-transaction checks (the exclusion
    // constraint plus the locked blocked-date lookup) are the authority.
    let active = state.reservations.list_by_date(req.fecha, true).await?;
    if active.iter().any(|r| r.slot().overlaps(&slot)) {
        return Err(AppError::SlotTaken);
    }

    let blocks = state.blocks.list(Some(req.fecha)).await?;
    if blocks.iter().any(|b| b.fecha == req.fecha && b.covers(&slot)) {
        return Err(AppError::SlotTaken);
    }

    // An authenticated caller (an admin booking a placeholder, typically)
    // gets stamped as creator; anonymous submissions stay anonymous.
    let created_by = maybe_claims(&headers, &state.auth.secret).map(|c| c.sub);

    let reservation = state
        .reservations
        .create(&req, created_by.as_deref())
        .await?;

    if let Some(token) = reservation.confirmation_token {
        state
            .mailer
            .spawn_send(&reservation, Notification::Received { token });
    }

    state.broadcast(ChangeEvent {
        table: ChangeTable::Reservations,
        action: ChangeAction::Created,
        id: reservation.id,
        fecha: reservation.fecha,
    });

    Ok((StatusCode::CREATED, Json(reservation.into())))
}

async fn list_reservations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ReservationResponse>>, AppError> {
    let reservations = state
        .reservations
        .list_by_date(query.fecha, query.active_only)
        .await?;

    Ok(Json(reservations.into_iter().map(Into::into).collect()))
}

async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state.reservations.find(id).await?;
    Ok(Json(reservation.into()))
}

/// Single-use confirmation inside the 24h window. Expired and unknown tokens
/// return distinct codes so the UI can say "book again" vs "already handled".
async fn confirm_reservation(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let reservation = state.reservations.confirm(token).await?;

    state.broadcast(ChangeEvent {
        table: ChangeTable::Reservations,
        action: ChangeAction::Updated,
        id: reservation.id,
        fecha: reservation.fecha,
    });

    Ok(Json(ConfirmResponse {
        id: reservation.id,
        confirmed: reservation.confirmed,
    }))
}

async fn list_blocked_dates(
    State(state): State<AppState>,
    Query(query): Query<BlockedListQuery>,
) -> Result<Json<Vec<quincho_domain::block::BlockedDate>>, AppError> {
    let blocks = state.blocks.list(query.from).await?;
    Ok(Json(blocks))
}
