//! DevAgent - AI code generation pipeline service
//!
//! A prompt goes in; generated files, a review, a quality evaluation and a
//! run summary come out.
//!
//! ## Services
//!
//! - **Pipeline**: provider-chain generation, static and AI review, evaluation
//! - **Accounts**: password and OAuth sign-in, stored provider keys, profiles
//! - **Orchestration**: optional Kestra detour with webhook result pickup
//! - **Limits**: per-client fixed-window rate limiting

pub mod auth;
pub mod config;
pub mod db;
pub mod llm;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, serve, AppState};
pub use types::{DevAgentError, Result};
