use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{dtos::PageParams, middleware::AuthUser, AppState};

/// Maximum page size for activity reads.
const MAX_PAGE: usize = 200;

/// The caller's own activity feed, newest first.
pub async fn list_activities(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let activities = state
        .activity
        .read_page(&principal.email, page.offset, page.limit.min(MAX_PAGE))
        .await?;
    Ok((StatusCode::OK, Json(activities)))
}
