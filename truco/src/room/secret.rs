//! Private room secrets and invite codes.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

/// Length of a generated invite code
pub const INVITE_CODE_LEN: usize = 6;

/// Uppercase letters and digits, without the easily confused 0/O and 1/I.
const INVITE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Hash a room secret with Argon2id.
///
/// Runs on the blocking pool.
pub async fn hash_secret(secret: String) -> Result<String, String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| format!("Failed to hash room secret: {e}"))
    })
    .await
    .map_err(|e| format!("Secret hashing task failed: {e}"))?
}

/// Check `secret` against a stored hash. A malformed hash never verifies.
pub async fn verify_secret(hash: String, secret: String) -> bool {
    tokio::task::spawn_blocking(move || {
        let Ok(parsed_hash) = PasswordHash::new(&hash) else {
            log::error!("Stored room secret hash is malformed");
            return false;
        };
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed_hash)
            .is_ok()
    })
    .await
    .unwrap_or(false)
}

pub fn generate_invite_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_CHARSET[rng.random_range(0..INVITE_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_secret_round_trip() {
        let hash = hash_secret("truco!".to_string()).await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_secret(hash.clone(), "truco!".to_string()).await);
        assert!(!verify_secret(hash, "retruco".to_string()).await);
    }

    #[tokio::test]
    async fn test_malformed_hash_never_verifies() {
        assert!(!verify_secret("plain".to_string(), "plain".to_string()).await);
    }

    #[test]
    fn test_invite_code_shape() {
        let code = generate_invite_code();
        assert_eq!(code.len(), INVITE_CODE_LEN);
        assert!(code.bytes().all(|b| INVITE_CHARSET.contains(&b)));
    }
}
