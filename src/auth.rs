//! Password hashing for room admin/readonly roles. Reuses the repo's existing
//! `sha2`/`hex` dependency pair (previously used only for webhook signing) for
//! a salted digest instead of pulling in a dedicated password-hashing crate.

use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_BYTES: usize = 16;

/// Hashes a plaintext password with a fresh random salt. Stored form is
/// `hex(salt):hex(sha256(salt || password))`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    format!("{}:{}", hex::encode(salt), digest(&salt, password))
}

/// Constant-time comparison against a stored `salt:digest` hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let expected = digest(&salt, password);
    constant_time_eq(expected.as_bytes(), digest_hex.as_bytes())
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrips() {
        let hash = hash_password("correct horse");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn two_hashes_of_same_password_differ_by_salt() {
        let a = hash_password("same");
        let b = hash_password("same");
        assert_ne!(a, b);
    }
}
