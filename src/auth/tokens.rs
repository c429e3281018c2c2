//! One-time tokens for email verification and password reset

use bson::DateTime;
use rand::Rng;

/// Reset links stay valid for one hour
pub const RESET_TOKEN_TTL_MS: i64 = 60 * 60 * 1000;

/// 32 random bytes, hex encoded
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

/// Expiry instant for a reset token issued now
pub fn reset_token_expiry() -> DateTime {
    DateTime::from_millis(DateTime::now().timestamp_millis() + RESET_TOKEN_TTL_MS)
}

pub fn reset_link(public_url: &str, token: &str) -> String {
    format!(
        "{}/auth/reset-password?token={}",
        public_url.trim_end_matches('/'),
        token
    )
}

pub fn verification_link(public_url: &str, token: &str) -> String {
    format!(
        "{}/auth/verify-email?token={}",
        public_url.trim_end_matches('/'),
        token
    )
}
