use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{LoginRequest, RegisterRequest},
    middleware::AuthUser,
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.accounts.register(&req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.accounts.login(&req).await?;
    Ok((StatusCode::OK, Json(res)))
}

pub async fn logout(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let session = state.accounts.logout(&principal).await?;
    Ok((StatusCode::OK, Json(session)))
}
