//! Supporting services around the pipeline
//!
//! - `kestra`: optional workflow orchestration detour
//! - `webhooks`: results posted back by orchestrated runs
//! - `rate_limit`: per-client fixed-window request limits

pub mod kestra;
pub mod rate_limit;
pub mod webhooks;

pub use kestra::{KestraClient, KestraError, KestraExecution, KestraInput, KestraRun};
pub use rate_limit::{client_key, Limited, RateLimitConfig, RateLimiter};
pub use webhooks::{WebhookPayload, WebhookStore, WorkflowResults};
