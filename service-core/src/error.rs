use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// One rejected request field, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Flattens validator output into a stable, field-ordered list.
pub fn field_violations(errors: &validator::ValidationErrors) -> Vec<FieldViolation> {
    let mut violations: Vec<FieldViolation> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| FieldViolation {
                field: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    violations.sort_by(|a, b| a.field.cmp(&b.field).then(a.message.cmp(&b.message)));
    violations
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Authentication error: {0}")]
    AuthError(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    /// OAuth protocol error carrying an RFC 6749 error code.
    #[error("OAuth error: {code}")]
    OAuth {
        status: StatusCode,
        code: &'static str,
        description: Option<String>,
    },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        #[derive(Serialize)]
        struct ValidationErrorResponse {
            error: &'static str,
            violations: Vec<FieldViolation>,
        }

        #[derive(Serialize)]
        struct OAuthErrorResponse {
            error: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            error_description: Option<String>,
        }

        let (status, error_message, details) = match self {
            AppError::ValidationError(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ValidationErrorResponse {
                        error: "invalid_request",
                        violations: field_violations(&err),
                    }),
                )
                    .into_response();
            }
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None),
            AppError::Forbidden(err) => (StatusCode::FORBIDDEN, err.to_string(), None),
            AppError::AuthError(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string(), None),
            AppError::OAuth {
                status,
                code,
                description,
            } => {
                return (
                    status,
                    Json(OAuthErrorResponse {
                        error: code,
                        error_description: description,
                    }),
                )
                    .into_response();
            }
            AppError::InternalError(err) => {
                // Full context goes to the log, never to the caller
                tracing::error!(error = ?err, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
                None,
            ),
            AppError::InvalidToken(err) => {
                tracing::debug!(error = %err, "Rejected bearer token");
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string(), None)
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error".to_string(),
                    None,
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_is_generic() {
        let response =
            AppError::InternalError(anyhow::anyhow!("db at 10.0.0.3 refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_field_violations_are_sorted_and_complete() {
        let mut errors = validator::ValidationErrors::new();
        let mut uri = validator::ValidationError::new("required");
        uri.message = Some("callback_uri is required".into());
        errors.add("callback_uri", uri);
        let mut id = validator::ValidationError::new("guid");
        id.message = Some("client_id must be a GUID".into());
        errors.add("client_id", id);

        let violations = field_violations(&errors);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].field, "callback_uri");
        assert_eq!(violations[1].field, "client_id");
        assert_eq!(violations[1].message, "client_id must be a GUID");
    }

    #[test]
    fn test_oauth_error_status() {
        let response = AppError::OAuth {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_grant",
            description: None,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
