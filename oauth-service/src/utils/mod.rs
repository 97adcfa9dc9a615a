pub mod password;
pub mod scope;
pub mod token;

pub use password::{CredentialHasher, HashParams, HashedCredential, Password};
pub use scope::{
    format_scopes, negotiate_scopes, parse_scopes, ScopeProvider, WhitespaceScopeParser,
};
pub use token::{generate_opaque_token, generate_user_code, hash_token, normalize_user_code};
