//! Database schemas for DevAgent

mod metadata;
mod user;

pub use metadata::Metadata;
pub use user::{mask_key, normalize_email, ApiKeys, UserDoc, USER_COLLECTION};
