//! Health check endpoints
//!
//! - /health, /healthz - liveness; always 200 while the process serves requests
//! - /version          - build information for deployment verification
//!
//! The health body reports the user store backend and whether MongoDB
//! answers a ping, so a degraded deployment is visible without failing the probe.

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// True while the service is running
    pub healthy: bool,
    /// "online", or "degraded" when a configured database stops answering
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the server state was created
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    pub store: StoreHealth,
    pub kestra: KestraHealth,
}

#[derive(Serialize)]
pub struct StoreHealth {
    /// "mongodb" or "memory"
    pub backend: &'static str,
    pub connected: bool,
}

#[derive(Serialize)]
pub struct KestraHealth {
    pub enabled: bool,
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
    commit: &'static str,
    commit_full: &'static str,
    build_time: &'static str,
    service: &'static str,
}

async fn build_health_response(state: &AppState) -> HealthResponse {
    let connected = match &state.mongo {
        Some(mongo) => mongo.ping().await,
        None => state.store.backend_name() == "memory",
    };

    HealthResponse {
        healthy: true,
        status: if connected { "online" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        store: StoreHealth {
            backend: state.store.backend_name(),
            connected,
        },
        kestra: KestraHealth {
            enabled: state.args.kestra.kestra_enabled,
        },
    }
}

/// GET /health
pub async fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    let response = build_health_response(&state).await;
    json_response(StatusCode::OK, &response)
}

/// GET /version
pub fn version_info() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            service: "devagent",
        },
    )
}
