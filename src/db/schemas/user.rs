//! User document schema
//!
//! Accounts, per-user provider API keys, and one-time token state for
//! email verification and password reset.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Third-party API keys a user has saved in settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ApiKeys {
    #[serde(default, rename = "togetherAI", skip_serializing_if = "Option::is_none")]
    pub together_ai: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groq: Option<String>,

    #[serde(default, rename = "codeRabbit", skip_serializing_if = "Option::is_none")]
    pub code_rabbit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oumi: Option<String>,
}

impl ApiKeys {
    /// Drop empty and whitespace-only values
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        Self {
            together_ai: clean(self.together_ai),
            groq: clean(self.groq),
            code_rabbit: clean(self.code_rabbit),
            oumi: clean(self.oumi),
        }
    }

    /// Copy with every key masked for display
    pub fn masked(&self) -> Self {
        Self {
            together_ai: self.together_ai.as_deref().map(mask_key),
            groq: self.groq.as_deref().map(mask_key),
            code_rabbit: self.code_rabbit.as_deref().map(mask_key),
            oumi: self.oumi.as_deref().map(mask_key),
        }
    }
}

/// Show the first 8 and last 4 characters of a key. Keys too short to
/// hide anything are fully masked.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Lowercased email, unique
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Argon2 PHC hash; absent for accounts created through OAuth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    #[serde(default)]
    pub api_keys: ApiKeys,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token_expiry: Option<DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<serde_json::Value>,

    /// Sign-in methods used with this account (credentials, github, google)
    #[serde(default)]
    pub providers: Vec<String>,
}

impl UserDoc {
    /// New account from the signup form
    pub fn with_password(email: &str, name: Option<String>, password_hash: String) -> Self {
        Self {
            metadata: Metadata::new(),
            email: normalize_email(email),
            name,
            password_hash: Some(password_hash),
            providers: vec!["credentials".to_string()],
            ..Default::default()
        }
    }

    /// New account from a first OAuth sign-in. The provider has already
    /// verified the address.
    pub fn from_oauth(
        email: &str,
        name: Option<String>,
        image: Option<String>,
        provider: &str,
    ) -> Self {
        Self {
            metadata: Metadata::new(),
            email: normalize_email(email),
            name,
            image,
            email_verified: true,
            providers: vec![provider.to_string()],
            ..Default::default()
        }
    }

    /// Creation time as RFC 3339, if recorded
    pub fn created_at_rfc3339(&self) -> Option<String> {
        self.metadata
            .created_at
            .map(|dt| dt.to_chrono().to_rfc3339())
    }
}

/// Emails are matched case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "reset_token": 1 },
                Some(
                    IndexOptions::builder()
                        .sparse(true)
                        .name("reset_token_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "verification_token": 1 },
                Some(
                    IndexOptions::builder()
                        .sparse(true)
                        .name("verification_token_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("gsk_1234567890abcdef"), "gsk_1234...cdef");
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key("exactly12chr"), "****");
    }

    #[test]
    fn test_api_keys_json_names() {
        let keys = ApiKeys {
            together_ai: Some("t".into()),
            code_rabbit: Some("c".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&keys).unwrap();
        assert_eq!(json["togetherAI"], "t");
        assert_eq!(json["codeRabbit"], "c");
        assert!(json.get("groq").is_none());
    }

    #[test]
    fn test_normalized_drops_blank_keys() {
        let keys = ApiKeys {
            together_ai: Some("  ".into()),
            groq: Some(" gsk_abc ".into()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(keys.together_ai, None);
        assert_eq!(keys.groq.as_deref(), Some("gsk_abc"));
    }

    #[test]
    fn test_new_users() {
        let user = UserDoc::with_password("Dev@Example.com ", None, "$argon2id$x".into());
        assert_eq!(user.email, "dev@example.com");
        assert!(!user.email_verified);
        assert_eq!(user.providers, vec!["credentials"]);

        let user = UserDoc::from_oauth("octo@github.com", Some("Octo".into()), None, "github");
        assert!(user.email_verified);
        assert!(user.password_hash.is_none());
        assert!(user.created_at_rfc3339().is_some());
    }
}
