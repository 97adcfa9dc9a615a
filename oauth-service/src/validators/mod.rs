//! Inbound request validation.
//!
//! Validators collect every violation before returning; nothing here
//! touches storage or credentials. A request that passes comes out as a
//! typed value the engine can match on exhaustively.

pub mod authorize;
pub mod token;

use std::borrow::Cow;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

pub use authorize::{AuthorizeRequestValidator, ValidatedAuthorizeRequest};
pub use token::{TokenGrant, TokenRequestValidator, ValidatedTokenRequest};

pub(crate) fn violation(
    code: &'static str,
    message: impl Into<Cow<'static, str>>,
) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Non-empty, syntactically valid GUID.
pub(crate) fn guid(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
) -> Option<Uuid> {
    if is_blank(value) {
        errors.add(field, violation("required", format!("{} is required", field)));
        return None;
    }
    match Uuid::parse_str(value.trim()) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(field, violation("guid", format!("{} must be a valid GUID", field)));
            None
        }
    }
}

/// Non-empty, absolute URI.
pub(crate) fn absolute_uri(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
) -> bool {
    if is_blank(value) {
        errors.add(field, violation("required", format!("{} is required", field)));
        return false;
    }
    match url::Url::parse(value) {
        Ok(_) => true,
        Err(_) => {
            errors.add(
                field,
                violation("uri", format!("{} must be an absolute URI", field)),
            );
            false
        }
    }
}

/// Trimmed-nonblank value of an optional field, or a `required` violation
/// carrying `message`. Callers decide which grant makes the field mandatory.
pub(crate) fn required(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<&str>,
    message: &'static str,
) -> Option<String> {
    match value.filter(|v| !is_blank(v)) {
        Some(v) => Some(v.to_string()),
        None => {
            errors.add(field, violation("required", message));
            None
        }
    }
}
