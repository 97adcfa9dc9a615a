use axum::{extract::State, http::StatusCode, response::IntoResponse, Form, Json};
use service_core::error::AppError;

use crate::{
    dtos::{AuthorizeRequest, DeviceAuthorizationRequest, TokenRequest},
    middleware::AuthUser,
    AppState,
};

/// `POST /oauth/token`
pub async fn token(
    State(state): State<AppState>,
    Form(req): Form<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.engine.token(&req).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// `POST /oauth/authorize`, on behalf of the logged-in user.
pub async fn authorize(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<AuthorizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.engine.authorize(&req, principal.session_id).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// `POST /oauth/device_authorization`
pub async fn device_authorization(
    State(state): State<AppState>,
    Form(req): Form<DeviceAuthorizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.engine.start_device_authorization(&req).await?;
    Ok((StatusCode::OK, Json(res)))
}
