use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use super::{absolute_uri, guid, violation};
use crate::dtos::{AuthorizeRequest, DeviceAuthorizationRequest};
use crate::models::{CodeChallengeMethod, PkceChallenge};

/// RFC 7636 §4.2 bounds on challenge and verifier length.
const PKCE_MIN_LEN: usize = 43;
const PKCE_MAX_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct ValidatedAuthorizeRequest {
    pub client_id: Uuid,
    pub callback_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub pkce: Option<PkceChallenge>,
}

pub struct AuthorizeRequestValidator;

impl AuthorizeRequestValidator {
    pub fn validate(
        request: &AuthorizeRequest,
    ) -> Result<ValidatedAuthorizeRequest, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let client_id = guid(&mut errors, "client_id", &request.client_id);
        let callback_ok = absolute_uri(&mut errors, "callback_uri", &request.callback_uri);
        let pkce = pkce_challenge(request, &mut errors);

        match client_id {
            Some(client_id) if callback_ok && errors.is_empty() => Ok(ValidatedAuthorizeRequest {
                client_id,
                callback_uri: request.callback_uri.clone(),
                scope: request.scope.clone(),
                state: request.state.clone(),
                pkce,
            }),
            _ => Err(errors),
        }
    }

    pub fn validate_device(request: &DeviceAuthorizationRequest) -> Result<Uuid, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        guid(&mut errors, "client_id", &request.client_id).ok_or(errors)
    }
}

fn pkce_challenge(
    request: &AuthorizeRequest,
    errors: &mut ValidationErrors,
) -> Option<PkceChallenge> {
    let challenge = request
        .code_challenge
        .as_deref()
        .filter(|c| !c.trim().is_empty());
    let method = request
        .code_challenge_method
        .as_deref()
        .filter(|m| !m.trim().is_empty());

    let method = match method.map(CodeChallengeMethod::from_str) {
        None => CodeChallengeMethod::Plain,
        Some(Ok(method)) => method,
        Some(Err(_)) => {
            errors.add(
                "code_challenge_method",
                violation("pkce", "code_challenge_method must be plain or S256"),
            );
            return None;
        }
    };

    let Some(challenge) = challenge else {
        if request.code_challenge_method.is_some() {
            errors.add(
                "code_challenge",
                violation(
                    "required",
                    "code_challenge is required when code_challenge_method is set",
                ),
            );
        }
        return None;
    };

    if !(PKCE_MIN_LEN..=PKCE_MAX_LEN).contains(&challenge.len()) {
        errors.add(
            "code_challenge",
            violation("pkce", "code_challenge must be 43 to 128 characters"),
        );
        return None;
    }

    Some(PkceChallenge {
        challenge: challenge.to_string(),
        method,
    })
}

impl Validate for AuthorizeRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        AuthorizeRequestValidator::validate(self).map(|_| ())
    }
}
