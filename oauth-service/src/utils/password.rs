use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use std::fmt;
use subtle::ConstantTimeEq;

pub const SALT_SIZE: usize = 64;
pub const HASH_SIZE: usize = 64;
pub const DEGREE_OF_PARALLELISM: u32 = 8;
pub const MEMORY_SIZE_KIB: u32 = 65536;
pub const ITERATIONS: u32 = 16;

/// Smallest salt Argon2 accepts.
const MIN_SALT_SIZE: usize = 8;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Argon2id cost parameters. Hash and verify must use the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HashParams {
    pub salt_size: usize,
    pub hash_size: usize,
    pub parallelism: u32,
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            salt_size: SALT_SIZE,
            hash_size: HASH_SIZE,
            parallelism: DEGREE_OF_PARALLELISM,
            memory_kib: MEMORY_SIZE_KIB,
            iterations: ITERATIONS,
        }
    }
}

impl HashParams {
    /// Cheap parameters for local development and test suites. Output and
    /// salt sizes stay at their production values.
    pub fn low_cost() -> Self {
        Self {
            parallelism: 1,
            memory_kib: 64,
            iterations: 1,
            ..Self::default()
        }
    }
}

/// Base64-encoded hash and the salt it was derived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedCredential {
    pub hash: String,
    pub salt: String,
}

/// Salted, memory-hard credential hashing (Argon2id).
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: HashParams,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(HashParams::default())
    }
}

impl CredentialHasher {
    pub fn new(params: HashParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HashParams {
        &self.params
    }

    fn argon2(&self) -> Result<Argon2<'static>, anyhow::Error> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            Some(self.params.hash_size),
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn derive(&self, password: &Password, salt: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
        let mut output = vec![0u8; self.params.hash_size];
        self.argon2()?
            .hash_password_into(password.as_str().as_bytes(), salt, &mut output)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
        Ok(output)
    }

    /// Hash a password. A fresh salt is drawn from the OS RNG unless one is
    /// supplied.
    pub fn hash(
        &self,
        password: &Password,
        salt: Option<&[u8]>,
    ) -> Result<HashedCredential, anyhow::Error> {
        let salt = match salt {
            Some(salt) if salt.len() < MIN_SALT_SIZE => {
                return Err(anyhow::anyhow!(
                    "Salt must be at least {} bytes, got {}",
                    MIN_SALT_SIZE,
                    salt.len()
                ));
            }
            Some(salt) => salt.to_vec(),
            None => {
                let mut salt = vec![0u8; self.params.salt_size];
                OsRng.fill_bytes(&mut salt);
                salt
            }
        };

        let hash = self.derive(password, &salt)?;

        Ok(HashedCredential {
            hash: STANDARD.encode(hash),
            salt: STANDARD.encode(salt),
        })
    }

    /// Verify a password against a stored hash and salt.
    ///
    /// Returns false on mismatch and on any malformed stored value; the
    /// final comparison is constant-time.
    pub fn verify(&self, password: &Password, stored_hash: &str, stored_salt: &str) -> bool {
        let (Ok(expected), Ok(salt)) = (STANDARD.decode(stored_hash), STANDARD.decode(stored_salt))
        else {
            return false;
        };

        if expected.len() != self.params.hash_size || salt.len() < MIN_SALT_SIZE {
            return false;
        }

        match self.derive(password, &salt) {
            Ok(computed) => computed.ct_eq(&expected).into(),
            Err(e) => {
                tracing::error!(error = %e, "Password verification could not run");
                false
            }
        }
    }

    /// A well-formed credential no password matches. Verifying against it
    /// costs a full derivation, so lookups of unknown accounts take as long
    /// as a wrong password.
    pub fn decoy(&self) -> HashedCredential {
        HashedCredential {
            hash: STANDARD.encode(vec![0u8; self.params.hash_size]),
            salt: STANDARD.encode(vec![0u8; self.params.salt_size.max(MIN_SALT_SIZE)]),
        }
    }

    /// [`Self::hash`] on the blocking pool.
    pub async fn hash_blocking(
        &self,
        password: Password,
    ) -> Result<HashedCredential, anyhow::Error> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password, None))
            .await
            .map_err(|e| anyhow::anyhow!("Hashing task failed: {}", e))?
    }

    /// [`Self::verify`] on the blocking pool.
    pub async fn verify_blocking(
        &self,
        password: Password,
        stored_hash: String,
        stored_salt: String,
    ) -> bool {
        let hasher = self.clone();
        match tokio::task::spawn_blocking(move || {
            hasher.verify(&password, &stored_hash, &stored_salt)
        })
        .await
        {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!(error = %e, "Verification task failed");
                false
            }
        }
    }
}
