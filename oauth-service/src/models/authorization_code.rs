//! Authorization code model - single-use grant bound to a client and
//! redirect URI.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::utils::hash_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "plain")]
    Plain,
    S256,
}

impl CodeChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::Plain => "plain",
            CodeChallengeMethod::S256 => "S256",
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(CodeChallengeMethod::Plain),
            "S256" => Ok(CodeChallengeMethod::S256),
            _ => Err(format!("Unsupported code challenge method: {}", s)),
        }
    }
}

/// PKCE challenge registered with an authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    pub challenge: String,
    pub method: CodeChallengeMethod,
}

impl PkceChallenge {
    /// Check a presented verifier against the stored challenge.
    pub fn verify(&self, verifier: &str) -> bool {
        let derived = match self.method {
            CodeChallengeMethod::Plain => verifier.to_string(),
            CodeChallengeMethod::S256 => {
                let digest = Sha256::digest(verifier.as_bytes());
                URL_SAFE_NO_PAD.encode(digest)
            }
        };
        derived.as_bytes().ct_eq(self.challenge.as_bytes()).into()
    }
}

/// Issued authorization code. Only the hash of the code is kept.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub code_hash: String,
    pub client_id: Uuid,
    pub redirect_uri: String,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub scopes: Vec<String>,
    pub pkce: Option<PkceChallenge>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl AuthorizationCode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        code: &str,
        client_id: Uuid,
        redirect_uri: String,
        user_id: Uuid,
        session_id: Uuid,
        scopes: Vec<String>,
        pkce: Option<PkceChallenge>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            code_hash: hash_token(code),
            client_id,
            redirect_uri,
            user_id,
            session_id,
            scopes,
            pkce,
            created_at: now,
            expires_at: now + ttl,
            consumed_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 appendix B
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_s256_verifier_matches_rfc_vector() {
        let pkce = PkceChallenge {
            challenge: CHALLENGE.to_string(),
            method: CodeChallengeMethod::S256,
        };
        assert!(pkce.verify(VERIFIER));
        assert!(!pkce.verify("not-the-verifier"));
    }

    #[test]
    fn test_plain_verifier() {
        let pkce = PkceChallenge {
            challenge: VERIFIER.to_string(),
            method: CodeChallengeMethod::Plain,
        };
        assert!(pkce.verify(VERIFIER));
        assert!(!pkce.verify(CHALLENGE));
    }

    #[test]
    fn test_method_parsing_is_case_sensitive() {
        assert_eq!("S256".parse(), Ok(CodeChallengeMethod::S256));
        assert!("s256".parse::<CodeChallengeMethod>().is_err());
    }

    #[test]
    fn test_code_is_stored_hashed() {
        let code = AuthorizationCode::new(
            "raw-code",
            Uuid::new_v4(),
            "https://app.example.com/cb".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![],
            None,
            Duration::minutes(5),
        );
        assert_ne!(code.code_hash, "raw-code");
        assert!(!code.is_expired());
        assert!(!code.is_consumed());
    }
}
