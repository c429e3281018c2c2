//! Authentication for DevAgent
//!
//! Provides:
//! - Password hashing with Argon2
//! - Session JWT issue and validation
//! - One-time reset and verification tokens
//! - GitHub and Google OAuth sign-in

pub mod jwt;
pub mod oauth;
pub mod password;
pub mod tokens;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
pub use oauth::{OAuthClient, OAuthError, OAuthProfile, OAuthProviderConfig};
pub use password::{
    check_password_strength, hash_password, verify_account_password, verify_password,
    MIN_PASSWORD_LENGTH,
};
