use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use super::{guid, required, violation};
use crate::dtos::TokenRequest;
use crate::models::GrantType;
use crate::utils::Password;

/// Grant-specific inputs of a token request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    ClientCredentials,
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        code_verifier: Option<String>,
    },
    DeviceCode {
        device_code: String,
    },
    RefreshToken {
        refresh_token: String,
    },
}

impl TokenGrant {
    pub fn grant_type(&self) -> GrantType {
        match self {
            TokenGrant::ClientCredentials => GrantType::ClientCredentials,
            TokenGrant::AuthorizationCode { .. } => GrantType::AuthorizationCode,
            TokenGrant::DeviceCode { .. } => GrantType::DeviceCode,
            TokenGrant::RefreshToken { .. } => GrantType::RefreshToken,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedTokenRequest {
    pub client_id: Uuid,
    pub client_secret: Password,
    pub scope: Option<String>,
    pub grant: TokenGrant,
}

pub struct TokenRequestValidator;

impl TokenRequestValidator {
    pub fn validate(request: &TokenRequest) -> Result<ValidatedTokenRequest, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let grant_type = match GrantType::from_str(request.grant_type.trim()) {
            Ok(grant_type) => Some(grant_type),
            Err(_) => {
                errors.add(
                    "grant_type",
                    violation(
                        "grant_type",
                        "grant_type must be one of client_credentials, device_code, code, \
                         refresh_token",
                    ),
                );
                None
            }
        };

        let client_id = guid(&mut errors, "client_id", &request.client_id);

        if request.client_secret.trim().is_empty() {
            errors.add(
                "client_secret",
                violation("required", "client_secret is required"),
            );
        }

        let grant = match grant_type {
            Some(grant_type) => grant_inputs(grant_type, request, &mut errors),
            None => None,
        };

        match (client_id, grant) {
            (Some(client_id), Some(grant)) if errors.is_empty() => Ok(ValidatedTokenRequest {
                client_id,
                client_secret: Password::new(request.client_secret.clone()),
                scope: request.scope.clone(),
                grant,
            }),
            _ => Err(errors),
        }
    }
}

/// Conditional fields for one grant type. Fields belonging to other grant
/// types are ignored.
fn grant_inputs(
    grant_type: GrantType,
    request: &TokenRequest,
    errors: &mut ValidationErrors,
) -> Option<TokenGrant> {
    match grant_type {
        GrantType::ClientCredentials => Some(TokenGrant::ClientCredentials),
        GrantType::AuthorizationCode => {
            let code = required(
                errors,
                "code",
                request.code.as_deref(),
                "code is required when grant_type is code",
            );
            let redirect_uri = required(
                errors,
                "redirect_uri",
                request.redirect_uri.as_deref(),
                "redirect_uri is required when grant_type is code",
            );
            Some(TokenGrant::AuthorizationCode {
                code: code?,
                redirect_uri: redirect_uri?,
                code_verifier: request
                    .code_verifier
                    .clone()
                    .filter(|v| !v.trim().is_empty()),
            })
        }
        GrantType::DeviceCode => required(
            errors,
            "device_code",
            request.device_code.as_deref(),
            "device_code is required when grant_type is device_code",
        )
        .map(|device_code| TokenGrant::DeviceCode { device_code }),
        GrantType::RefreshToken => required(
            errors,
            "refresh_token",
            request.refresh_token.as_deref(),
            "refresh_token is required when grant_type is refresh_token",
        )
        .map(|refresh_token| TokenGrant::RefreshToken { refresh_token }),
    }
}

impl Validate for TokenRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        TokenRequestValidator::validate(self).map(|_| ())
    }
}
