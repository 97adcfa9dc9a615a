use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

/// Characters used for device user codes: no vowels, no look-alikes.
const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";

/// Random opaque token, URL-safe base64 of `len` bytes from the OS RNG.
pub fn generate_opaque_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest. Opaque tokens are only ever stored in this form.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Human-typable device user code, `XXXX-XXXX`.
pub fn generate_user_code() -> String {
    let mut rng = OsRng;
    let mut code = String::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            code.push('-');
        }
        let idx = rng.gen_range(0..USER_CODE_ALPHABET.len());
        code.push(USER_CODE_ALPHABET[idx] as char);
    }
    code
}

/// Normalizes what a user typed: uppercase, dashes and spaces ignored.
pub fn normalize_user_code(input: &str) -> String {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(|c| c.to_uppercase())
        .collect();
    if compact.len() == 8 {
        format!("{}-{}", &compact[..4], &compact[4..])
    } else {
        compact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_tokens_are_unique() {
        let a = generate_opaque_token(32);
        let b = generate_opaque_token(32);
        assert_ne!(a, b);
        // 32 bytes -> 43 unpadded base64 chars
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let h = hash_token("token_abc");
        assert_eq!(h, hash_token("token_abc"));
        assert_eq!(h.len(), 64);
        assert_ne!(h, "token_abc");
    }

    #[test]
    fn test_user_code_shape() {
        let code = generate_user_code();
        assert_eq!(code.len(), 9);
        assert_eq!(&code[4..5], "-");
        assert!(code
            .chars()
            .filter(|c| *c != '-')
            .all(|c| USER_CODE_ALPHABET.contains(&(c as u8))));
    }

    #[test]
    fn test_normalize_user_code() {
        assert_eq!(normalize_user_code("bcdf ghjk"), "BCDF-GHJK");
        assert_eq!(normalize_user_code("BCDF-GHJK"), "BCDF-GHJK");
        assert_eq!(normalize_user_code("bcd"), "BCD");
    }
}
