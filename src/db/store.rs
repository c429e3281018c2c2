//! User persistence
//!
//! `UserStore` is the seam the routes talk to. `MongoUserStore` is the
//! production implementation; `MemoryUserStore` backs dev mode without a
//! database and the integration tests.

use async_trait::async_trait;
use bson::{doc, DateTime};
use serde::Deserialize;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{normalize_email, ApiKeys, UserDoc, USER_COLLECTION};
use crate::types::DevAgentError;

/// Fields a user may change on their own profile. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub preferences: Option<serde_json::Value>,
}

/// Account storage operations
///
/// Methods returning `bool` report whether a live account matched.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>, DevAgentError>;

    /// Insert a new account. Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: UserDoc) -> Result<UserDoc, DevAgentError>;

    async fn update_profile(&self, email: &str, update: ProfileUpdate) -> Result<bool, DevAgentError>;

    async fn update_api_keys(&self, email: &str, keys: ApiKeys) -> Result<bool, DevAgentError>;

    /// Record that a sign-in provider was used with this account
    async fn link_provider(&self, email: &str, provider: &str) -> Result<bool, DevAgentError>;

    async fn set_verification_token(&self, email: &str, token: &str) -> Result<bool, DevAgentError>;

    /// Consume a verification token, marking its account verified
    async fn verify_email(&self, token: &str) -> Result<bool, DevAgentError>;

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expiry: DateTime,
    ) -> Result<bool, DevAgentError>;

    /// Replace the password of the account holding an unexpired reset token
    /// and clear the token.
    async fn reset_password(&self, token: &str, password_hash: &str) -> Result<bool, DevAgentError>;

    /// Backend label for health output
    fn backend_name(&self) -> &'static str;
}

/// MongoDB-backed user store
pub struct MongoUserStore {
    users: MongoCollection<UserDoc>,
}

impl MongoUserStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self, DevAgentError> {
        let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        Ok(Self { users })
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>, DevAgentError> {
        self.users
            .find_one(doc! { "email": normalize_email(email) })
            .await
    }

    async fn create_user(&self, user: UserDoc) -> Result<UserDoc, DevAgentError> {
        let mut user = user;
        let id = self.users.insert_one(user.clone()).await.map_err(|e| match e {
            DevAgentError::Conflict(_) => DevAgentError::Conflict("User already exists".into()),
            other => other,
        })?;
        user._id = Some(id);
        Ok(user)
    }

    async fn update_profile(&self, email: &str, update: ProfileUpdate) -> Result<bool, DevAgentError> {
        let mut set = bson::Document::new();
        if let Some(name) = update.name {
            set.insert("name", name);
        }
        if let Some(image) = update.image {
            set.insert("image", image);
        }
        if let Some(preferences) = update.preferences {
            set.insert("preferences", bson::to_bson(&preferences)?);
        }

        let result = self
            .users
            .update_one(doc! { "email": normalize_email(email) }, doc! { "$set": set })
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn update_api_keys(&self, email: &str, keys: ApiKeys) -> Result<bool, DevAgentError> {
        let result = self
            .users
            .update_one(
                doc! { "email": normalize_email(email) },
                doc! { "$set": { "api_keys": bson::to_bson(&keys)? } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn link_provider(&self, email: &str, provider: &str) -> Result<bool, DevAgentError> {
        let result = self
            .users
            .update_one(
                doc! { "email": normalize_email(email) },
                doc! { "$addToSet": { "providers": provider } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn set_verification_token(&self, email: &str, token: &str) -> Result<bool, DevAgentError> {
        let result = self
            .users
            .update_one(
                doc! { "email": normalize_email(email) },
                doc! { "$set": { "verification_token": token } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn verify_email(&self, token: &str) -> Result<bool, DevAgentError> {
        let result = self
            .users
            .update_one(
                doc! { "verification_token": token },
                doc! {
                    "$set": { "email_verified": true },
                    "$unset": { "verification_token": "" },
                },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expiry: DateTime,
    ) -> Result<bool, DevAgentError> {
        let result = self
            .users
            .update_one(
                doc! { "email": normalize_email(email) },
                doc! { "$set": { "reset_token": token, "reset_token_expiry": expiry } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn reset_password(&self, token: &str, password_hash: &str) -> Result<bool, DevAgentError> {
        let result = self
            .users
            .update_one(
                doc! {
                    "reset_token": token,
                    "reset_token_expiry": { "$gt": DateTime::now() },
                },
                doc! {
                    "$set": { "password_hash": password_hash },
                    "$unset": { "reset_token": "", "reset_token_expiry": "" },
                    "$addToSet": { "providers": "credentials" },
                },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }
}
