use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use quincho_domain::audit::CancellationAudit;
use quincho_domain::block::{BlockEntry, BlockedDate};
use quincho_domain::events::{ChangeAction, ChangeEvent, ChangeTable};
use quincho_store::Notification;

use crate::auth::{admin_auth_middleware, AdminActor};
use crate::error::AppError;
use crate::reservations::ReservationResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateBlockRequest {
    motivo: String,
    entries: Vec<BlockEntry>,
}

#[derive(Debug, Serialize)]
struct BlockResponse {
    blocks: Vec<BlockedDate>,
    cancelled_reservations: usize,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/admin/reservations/{id}/approve", post(approve_reservation))
        .route("/v1/admin/reservations/{id}/reject", post(reject_reservation))
        .route("/v1/admin/reservations/{id}/cancel", post(cancel_reservation))
        .route("/v1/admin/reservations/{id}/audits", get(list_audits))
        .route("/v1/admin/blocked-dates", post(create_blocked_dates))
        .route("/v1/admin/blocked-dates/{id}", delete(delete_blocked_date))
        .route("/v1/admin/blocked-dates/group/{group_id}", delete(delete_block_group))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}

async fn approve_reservation(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state
        .reservations
        .approve(id, &actor, req.notes.as_deref())
        .await?;

    state.mailer.spawn_send(&reservation, Notification::Approved);
    state.broadcast(ChangeEvent {
        table: ChangeTable::Reservations,
        action: ChangeAction::Updated,
        id: reservation.id,
        fecha: reservation.fecha,
    });

    Ok(Json(reservation.into()))
}

async fn reject_reservation(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state
        .reservations
        .reject(id, &actor, req.notes.as_deref())
        .await?;

    state
        .mailer
        .spawn_send(&reservation, Notification::Rejected { notes: req.notes });
    state.broadcast(ChangeEvent {
        table: ChangeTable::Reservations,
        action: ChangeAction::Updated,
        id: reservation.id,
        fecha: reservation.fecha,
    });

    Ok(Json(reservation.into()))
}

/// Soft cancellation. The status flip is the durable operation; the audit
/// append afterwards is a side channel whose failure is logged, never
/// propagated back into the response.
async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<ReservationResponse>, AppError> {
    let outcome = state
        .reservations
        .cancel(id, Some(&actor), req.reason.as_deref())
        .await?;

    if let Err(e) = state
        .audits
        .append(&outcome.snapshot, Some(&actor), req.reason.as_deref())
        .await
    {
        error!("Audit append failed for cancelled reservation {}: {}", id, e);
    }

    state
        .mailer
        .spawn_send(&outcome.cancelled, Notification::Cancelled { reason: req.reason });
    state.broadcast(ChangeEvent {
        table: ChangeTable::Reservations,
        action: ChangeAction::Cancelled,
        id: outcome.cancelled.id,
        fecha: outcome.cancelled.fecha,
    });

    Ok(Json(outcome.cancelled.into()))
}

async fn list_audits(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CancellationAudit>>, AppError> {
    let audits = state.audits.list_for_reservation(id).await?;
    Ok(Json(audits))
}

/// Block one or more dates (whole-day or sub-interval) in a single action.
/// The cascade cancels every conflicting active reservation inside the same
/// transaction; notifications go out afterwards, best-effort.
async fn create_blocked_dates(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Json(req): Json<CreateBlockRequest>,
) -> Result<(StatusCode, Json<BlockResponse>), AppError> {
    if req.motivo.trim().is_empty() {
        return Err(AppError::ValidationError("motivo is required".into()));
    }
    if req.entries.is_empty() {
        return Err(AppError::ValidationError("at least one entry is required".into()));
    }
    for entry in &req.entries {
        entry.validate()?;
    }

    let outcome = state
        .blocks
        .create_group(&req.motivo, &req.entries, &actor)
        .await?;

    for reservation in &outcome.cancelled {
        state.mailer.spawn_send(
            reservation,
            Notification::Cancelled { reason: Some(req.motivo.clone()) },
        );
        state.broadcast(ChangeEvent {
            table: ChangeTable::Reservations,
            action: ChangeAction::Cancelled,
            id: reservation.id,
            fecha: reservation.fecha,
        });
    }
    for block in &outcome.blocks {
        state.broadcast(ChangeEvent {
            table: ChangeTable::BlockedDates,
            action: ChangeAction::Created,
            id: block.id,
            fecha: block.fecha,
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(BlockResponse {
            cancelled_reservations: outcome.cancelled.len(),
            blocks: outcome.blocks,
        }),
    ))
}

async fn delete_blocked_date(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let block = state.blocks.delete(id).await?;

    state.broadcast(ChangeEvent {
        table: ChangeTable::BlockedDates,
        action: ChangeAction::Deleted,
        id: block.id,
        fecha: block.fecha,
    });

    Ok(StatusCode::NO_CONTENT)
}

async fn delete_block_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let blocks = state.blocks.delete_group(group_id).await?;

    for block in blocks {
        state.broadcast(ChangeEvent {
            table: ChangeTable::BlockedDates,
            action: ChangeAction::Deleted,
            id: block.id,
            fecha: block.fecha,
        });
    }

    Ok(StatusCode::NO_CONTENT)
}
