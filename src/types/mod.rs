//! Shared types for DevAgent

pub mod error;

pub use error::{DevAgentError, Result};
