use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fs;
use uuid::Uuid;

use crate::config::{SigningKey, TokenConfig};

/// Signs access tokens. The engine only ever needs this one operation.
pub trait TokenSigner: Send + Sync {
    fn sign_access_token(&self, claims: &AccessTokenClaims) -> Result<String, anyhow::Error>;
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user ID, or client ID for client_credentials)
    pub sub: String,
    /// Audience (the client the token was issued to)
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
    /// Space-delimited granted scopes
    #[serde(default)]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Session the token was issued under, absent for client_credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AccessTokenClaims {
    pub fn new(issuer: &str, subject: &str, audience: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            aud: audience.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: String::new(),
            client_id: None,
            sid: None,
            email: None,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.sid.as_deref().and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn subject_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// JWT service for access token signing and validation
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
}

impl JwtService {
    /// Build from configuration: RS256 from PEM files or HS256 from a shared
    /// secret.
    pub fn new(config: &TokenConfig) -> Result<Self, anyhow::Error> {
        match &config.signing_key {
            SigningKey::Rsa {
                private_key_path,
                public_key_path,
            } => Self::from_pem_files(private_key_path, public_key_path, &config.issuer),
            SigningKey::Secret(secret) => Ok(Self::from_secret(secret.as_bytes(), &config.issuer)),
        }
    }

    pub fn from_pem_files(
        private_key_path: &str,
        public_key_path: &str,
        issuer: &str,
    ) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                private_key_path,
                e
            )
        })?;

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;

        let public_key_pem = fs::read_to_string(public_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                public_key_path,
                e
            )
        })?;

        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        tracing::info!("JWT service initialized with RS256 keys");

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm: Algorithm::RS256,
            issuer: issuer.to_string(),
        })
    }

    pub fn from_secret(secret: &[u8], issuer: &str) -> Self {
        tracing::info!("JWT service initialized with HS256 secret");
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            issuer: issuer.to_string(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Validate signature, expiry and issuer of an access token minted for
    /// any audience.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = self.validation();
        // Delegated tokens name their client; resource servers check it
        validation.validate_aud = false;
        self.decode(token, &validation)
    }

    /// Like [`validate_access_token`](Self::validate_access_token), but only
    /// tokens issued to this service itself (login tokens, `aud == iss`) pass.
    /// Tokens delegated to a client application are refused.
    pub fn validate_first_party_token(
        &self,
        token: &str,
    ) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = self.validation();
        validation.set_audience(&[self.issuer.as_str()]);
        self.decode(token, &validation)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation
    }

    fn decode(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<AccessTokenClaims, anyhow::Error> {
        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;
        Ok(token_data.claims)
    }
}

impl TokenSigner for JwtService {
    fn sign_access_token(&self, claims: &AccessTokenClaims) -> Result<String, anyhow::Error> {
        let header = Header::new(self.algorithm);
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }
}
