//! Persistence layer: MongoDB client, schemas, and the user store

pub mod memory;
pub mod mongo;
pub mod schemas;
pub mod store;

pub use memory::MemoryUserStore;
pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use store::{MongoUserStore, ProfileUpdate, UserStore};
