//! Password hashing and verification using Argon2id

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::OnceLock;

use crate::types::DevAgentError;

/// Shortest password accepted at signup and reset
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Hash a password, returning a PHC string carrying salt and parameters
pub fn hash_password(password: &str) -> Result<String, DevAgentError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DevAgentError::Auth(format!("Failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, DevAgentError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| DevAgentError::Auth(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Sign-in check against an account's stored hash.
///
/// Unknown and OAuth-only accounts have no hash; they are verified against a
/// throwaway hash so every failed sign-in costs one Argon2 run.
pub fn verify_account_password(password: &str, hash: Option<&str>) -> bool {
    match hash {
        Some(hash) => verify_password(password, hash).unwrap_or(false),
        None => {
            let _ = verify_password(password, placeholder_hash());
            false
        }
    }
}

fn placeholder_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password("placeholder-account-password").unwrap_or_default())
}

/// Length check shared by signup and reset
pub fn check_password_strength(password: &str) -> Result<(), DevAgentError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(DevAgentError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}
