use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::utils::password::{
    HashParams, DEGREE_OF_PARALLELISM, HASH_SIZE, ITERATIONS, MEMORY_SIZE_KIB, SALT_SIZE,
};

const DEV_SIGNING_SECRET: &str = "dev-only-signing-secret-change-me-0123456789";
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub hashing: HashParams,
    pub token: TokenConfig,
    pub device: DeviceConfig,
    pub security: SecurityConfig,
    /// How often expired codes and refresh tokens are swept from the stores.
    pub purge_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

/// Access token signing material.
#[derive(Clone)]
pub enum SigningKey {
    Secret(String),
    Rsa {
        private_key_path: String,
        public_key_path: String,
    },
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningKey::Secret(_) => f.write_str("Secret(<redacted>)"),
            SigningKey::Rsa {
                private_key_path,
                public_key_path,
            } => f
                .debug_struct("Rsa")
                .field("private_key_path", private_key_path)
                .field("public_key_path", public_key_path)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub signing_key: SigningKey,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub authorization_code_expiry_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub verification_uri: String,
    pub expiry_seconds: i64,
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl OAuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let signing_key = match env::var("JWT_PRIVATE_KEY_PATH") {
            Ok(private_key_path) => SigningKey::Rsa {
                private_key_path,
                public_key_path: get_env("JWT_PUBLIC_KEY_PATH", None, is_prod)?,
            },
            Err(_) => SigningKey::Secret(get_env("JWT_SECRET", Some(DEV_SIGNING_SECRET), is_prod)?),
        };

        let config = OAuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("oauth-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            hashing: HashParams {
                salt_size: parse_env("HASH_SALT_SIZE", SALT_SIZE, false)?,
                hash_size: parse_env("HASH_OUTPUT_SIZE", HASH_SIZE, false)?,
                parallelism: parse_env("HASH_PARALLELISM", DEGREE_OF_PARALLELISM, false)?,
                memory_kib: parse_env("HASH_MEMORY_KIB", MEMORY_SIZE_KIB, false)?,
                iterations: parse_env("HASH_ITERATIONS", ITERATIONS, false)?,
            },
            token: TokenConfig {
                issuer: get_env("TOKEN_ISSUER", Some("http://localhost:8080"), is_prod)?,
                signing_key,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    15,
                    false,
                )?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", 7, false)?,
                authorization_code_expiry_seconds: parse_env(
                    "AUTHORIZATION_CODE_EXPIRY_SECONDS",
                    300,
                    false,
                )?,
            },
            device: DeviceConfig {
                verification_uri: get_env(
                    "DEVICE_VERIFICATION_URI",
                    Some("http://localhost:3000/device"),
                    is_prod,
                )?,
                expiry_seconds: parse_env("DEVICE_CODE_EXPIRY_SECONDS", 600, false)?,
                poll_interval_seconds: parse_env("DEVICE_POLL_INTERVAL_SECONDS", 5, false)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            purge_interval_seconds: parse_env("STORE_PURGE_INTERVAL_SECONDS", 300, false)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.token.access_token_expiry_minutes <= 0 {
            return Err(config_error("JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"));
        }

        if self.token.refresh_token_expiry_days <= 0 {
            return Err(config_error("JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"));
        }

        if self.token.authorization_code_expiry_seconds <= 0 {
            return Err(config_error("AUTHORIZATION_CODE_EXPIRY_SECONDS must be positive"));
        }

        if self.purge_interval_seconds == 0 {
            return Err(config_error("STORE_PURGE_INTERVAL_SECONDS must be positive"));
        }

        if self.device.expiry_seconds <= 0 || self.device.poll_interval_seconds == 0 {
            return Err(config_error(
                "DEVICE_CODE_EXPIRY_SECONDS and DEVICE_POLL_INTERVAL_SECONDS must be positive",
            ));
        }

        // Argon2 needs at least 8 KiB of memory per lane
        if self.hashing.parallelism == 0
            || self.hashing.memory_kib < 8 * self.hashing.parallelism
            || self.hashing.salt_size < 8
            || self.hashing.hash_size < 4
        {
            return Err(config_error("Hashing parameters are out of range"));
        }

        if self.environment == Environment::Prod {
            if let SigningKey::Secret(secret) = &self.token.signing_key {
                if secret == DEV_SIGNING_SECRET || secret.len() < MIN_SECRET_LEN {
                    return Err(config_error(
                        "JWT_SECRET must be set to at least 32 characters in production",
                    ));
                }
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }

            if self.hashing != HashParams::default() {
                tracing::warn!(
                    hashing = ?self.hashing,
                    "Non-default credential hashing parameters in production"
                );
            }
        }

        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr + ToString,
    T::Err: fmt::Display,
{
    get_env(key, Some(&default.to_string()), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
