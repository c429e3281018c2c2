//! In-memory user store for dev mode and tests

use async_trait::async_trait;
use bson::DateTime;
use dashmap::DashMap;

use crate::db::schemas::{normalize_email, ApiKeys, Metadata, UserDoc};
use crate::db::store::{ProfileUpdate, UserStore};
use crate::types::DevAgentError;

/// Accounts keyed by normalized email
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, UserDoc>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Apply `f` to the live account with this email
    fn modify(&self, email: &str, f: impl FnOnce(&mut UserDoc)) -> bool {
        match self.users.get_mut(&normalize_email(email)) {
            Some(mut user) if !user.metadata.is_deleted => {
                f(&mut user);
                user.metadata.touch();
                true
            }
            _ => false,
        }
    }

    /// Apply `f` to the first live account matching `pred`
    fn modify_where(
        &self,
        pred: impl Fn(&UserDoc) -> bool,
        f: impl FnOnce(&mut UserDoc),
    ) -> bool {
        for mut entry in self.users.iter_mut() {
            if !entry.metadata.is_deleted && pred(&entry) {
                f(entry.value_mut());
                entry.metadata.touch();
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>, DevAgentError> {
        Ok(self
            .users
            .get(&normalize_email(email))
            .filter(|u| !u.metadata.is_deleted)
            .map(|u| u.clone()))
    }

    async fn create_user(&self, user: UserDoc) -> Result<UserDoc, DevAgentError> {
        use dashmap::mapref::entry::Entry;

        let mut user = user;
        user.email = normalize_email(&user.email);
        user.metadata = Metadata::new();
        user._id = Some(bson::oid::ObjectId::new());

        match self.users.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(DevAgentError::Conflict("User already exists".into())),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn update_profile(&self, email: &str, update: ProfileUpdate) -> Result<bool, DevAgentError> {
        Ok(self.modify(email, |user| {
            if let Some(name) = update.name {
                user.name = Some(name);
            }
            if let Some(image) = update.image {
                user.image = Some(image);
            }
            if let Some(preferences) = update.preferences {
                user.preferences = Some(preferences);
            }
        }))
    }

    async fn update_api_keys(&self, email: &str, keys: ApiKeys) -> Result<bool, DevAgentError> {
        Ok(self.modify(email, |user| user.api_keys = keys))
    }

    async fn link_provider(&self, email: &str, provider: &str) -> Result<bool, DevAgentError> {
        Ok(self.modify(email, |user| {
            if !user.providers.iter().any(|p| p == provider) {
                user.providers.push(provider.to_string());
            }
        }))
    }

    async fn set_verification_token(&self, email: &str, token: &str) -> Result<bool, DevAgentError> {
        Ok(self.modify(email, |user| user.verification_token = Some(token.to_string())))
    }

    async fn verify_email(&self, token: &str) -> Result<bool, DevAgentError> {
        Ok(self.modify_where(
            |user| user.verification_token.as_deref() == Some(token),
            |user| {
                user.email_verified = true;
                user.verification_token = None;
            },
        ))
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expiry: DateTime,
    ) -> Result<bool, DevAgentError> {
        Ok(self.modify(email, |user| {
            user.reset_token = Some(token.to_string());
            user.reset_token_expiry = Some(expiry);
        }))
    }

    async fn reset_password(&self, token: &str, password_hash: &str) -> Result<bool, DevAgentError> {
        let now = DateTime::now();
        Ok(self.modify_where(
            |user| {
                user.reset_token.as_deref() == Some(token)
                    && user.reset_token_expiry.is_some_and(|expiry| expiry > now)
            },
            |user| {
                user.password_hash = Some(password_hash.to_string());
                user.reset_token = None;
                user.reset_token_expiry = None;
                if !user.providers.iter().any(|p| p == "credentials") {
                    user.providers.push("credentials".to_string());
                }
            },
        ))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
