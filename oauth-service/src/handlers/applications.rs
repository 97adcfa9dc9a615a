use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{middleware::AuthUser, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub callback_uri: String,
    #[serde(default)]
    pub scope: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameApplicationRequest {
    #[serde(default)]
    pub name: String,
}

pub async fn create_application(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<CreateApplicationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = state
        .clients
        .create(&req.name, &req.callback_uri, &req.scope, &principal.email)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_applications(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let apps = state.clients.list(&principal.email).await?;
    Ok((StatusCode::OK, Json(apps)))
}

pub async fn get_application(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let app = state.clients.get(id, &principal.email).await?;
    Ok((StatusCode::OK, Json(app)))
}

pub async fn rename_application(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameApplicationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let app = state
        .clients
        .rename(id, &req.name, &principal.email)
        .await?;
    Ok((StatusCode::OK, Json(app)))
}

pub async fn rotate_application_secret(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let secret = state.clients.rotate_secret(id, &principal.email).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "client_id": id, "client_secret": secret })),
    ))
}

pub async fn delete_application(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let app = state.clients.delete(id, &principal.email).await?;
    Ok((StatusCode::OK, Json(app)))
}
