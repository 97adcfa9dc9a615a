use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{middleware::AuthUser, AppState};

/// The caller's sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let sessions = state.accounts.list_sessions(principal.user_id).await?;
    Ok((StatusCode::OK, Json(sessions)))
}

pub async fn get_session(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .accounts
        .get_session(principal.user_id, session_id)
        .await?;
    Ok((StatusCode::OK, Json(session)))
}

pub async fn terminate_session(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .accounts
        .terminate_session(&principal, session_id)
        .await?;
    Ok((StatusCode::OK, Json(session)))
}
