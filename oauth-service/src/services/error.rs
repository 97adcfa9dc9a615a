use axum::http::StatusCode;
use service_core::error::{field_violations, AppError, FieldViolation};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed or missing request fields; every violation is carried.
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Unknown client or wrong secret. Deliberately does not say which.
    #[error("Client authentication failed")]
    InvalidClient,

    #[error("Invalid grant")]
    InvalidGrant,

    #[error("Authorization pending")]
    AuthorizationPending,

    #[error("Grant expired")]
    Expired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// RFC 6749 / RFC 8628 error code for this failure.
    pub fn oauth_code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "invalid_request",
            ServiceError::InvalidClient => "invalid_client",
            ServiceError::InvalidGrant => "invalid_grant",
            ServiceError::AuthorizationPending => "authorization_pending",
            ServiceError::Expired => "expired_token",
            ServiceError::Unauthorized => "access_denied",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Internal(_) => "server_error",
        }
    }

    /// Structured (field, message) pairs for validation failures.
    pub fn violations(&self) -> Vec<FieldViolation> {
        match self {
            ServiceError::Validation(errors) => field_violations(errors),
            _ => Vec::new(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::AuthorizationPending)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let code = err.oauth_code();
        let oauth = |status: StatusCode| AppError::OAuth {
            status,
            code,
            description: None,
        };

        match err {
            ServiceError::Validation(e) => AppError::ValidationError(e),
            ServiceError::InvalidClient => oauth(StatusCode::UNAUTHORIZED),
            ServiceError::InvalidGrant
            | ServiceError::AuthorizationPending
            | ServiceError::Expired => oauth(StatusCode::BAD_REQUEST),
            ServiceError::Unauthorized => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
            ServiceError::NotFound(what) => {
                AppError::NotFound(anyhow::anyhow!("{} not found", what))
            }
            ServiceError::InvalidState(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_failures_share_one_message() {
        // Unknown id and bad secret surface identically
        assert_eq!(
            ServiceError::InvalidClient.to_string(),
            "Client authentication failed"
        );
        assert_eq!(ServiceError::InvalidClient.oauth_code(), "invalid_client");
    }

    #[test]
    fn test_pending_is_the_only_retryable_error() {
        assert!(ServiceError::AuthorizationPending.is_retryable());
        assert!(!ServiceError::Expired.is_retryable());
        assert!(!ServiceError::InvalidGrant.is_retryable());
    }

    #[test]
    fn test_internal_maps_to_generic_app_error() {
        let app: AppError = ServiceError::Internal(anyhow::anyhow!("pool exhausted")).into();
        assert!(matches!(app, AppError::InternalError(_)));
    }
}
