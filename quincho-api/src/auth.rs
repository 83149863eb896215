use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    routing::post,
    Json, Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

/// Injected by the admin middleware once the profile gate has passed.
#[derive(Debug, Clone)]
pub struct AdminActor(pub String);

#[derive(Debug, Deserialize)]
struct GuestLoginRequest {
    email: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/guest", post(login_guest))
}

/// Issue a short-lived token for a self-identified guest. Admin rights come
/// from the profiles table, never from anything in this token.
async fn login_guest(
    State(state): State<AppState>,
    Json(req): Json<GuestLoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if req.email.trim().is_empty() || !req.email.contains('@') {
        return Err(AppError::ValidationError("a valid email is required".into()));
    }

    let claims = Claims {
        sub: format!("guest-{}", Uuid::new_v4()),
        email: req.email,
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.auth.secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    Ok(Json(AuthResponse { token }))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

/// Best-effort identification on public routes: a valid bearer token yields
/// an actor id, anything else is an anonymous caller, not an error.
pub fn maybe_claims(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    bearer_token(headers).and_then(|t| decode_claims(t, secret))
}

/// Admin gate: valid token plus an is_admin profile row. The profile lookup
/// fails open to non-admin under its timeout, so a degraded profiles table
/// reads as "not an admin", never as a hung request.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = decode_claims(token, &state.auth.secret).ok_or(StatusCode::UNAUTHORIZED)?;

    if !state.profiles.is_admin(&claims.sub).await {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(AdminActor(claims.sub.clone()));
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
