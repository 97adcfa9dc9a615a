use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{
    services::{AccessTokenClaims, Principal},
    AppState,
};

/// Middleware to require a valid first-party bearer token. Tokens delegated
/// to client applications are not accepted on account routes.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let claims = state.jwt.validate_first_party_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })?;

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor for the logged-in user behind a session-bound token.
///
/// Tokens without a session (client_credentials) are refused here.
pub struct AuthUser(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<AccessTokenClaims>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth claims missing from request extensions"
            ))
        })?;

        let principal = match (claims.subject_id(), claims.session_id(), &claims.email) {
            (Some(user_id), Some(session_id), Some(email)) if claims.client_id.is_none() => {
                Principal {
                    user_id,
                    email: email.clone(),
                    session_id,
                }
            }
            _ => {
                return Err(AppError::Forbidden(anyhow::anyhow!(
                    "A user session token is required"
                )))
            }
        };

        Ok(AuthUser(principal))
    }
}
