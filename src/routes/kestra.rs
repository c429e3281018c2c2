//! Kestra orchestration endpoints
//!
//! - GET  /api/kestra-status  - whether the orchestrator answers (always 200)
//! - POST /api/kestra-webhook - stage results posted by a running flow

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    error_response, get_auth_header, invalid_body, json_response, parse_json_body, unauthorized,
    BoxBody,
};
use crate::auth::extract_token_from_header;
use crate::server::AppState;
use crate::services::{WebhookPayload, WorkflowResults};

#[derive(Debug, Serialize)]
struct KestraStatusResponse {
    available: bool,
    enabled: bool,
    url: String,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct WebhookData {
    generation: Option<Value>,
    review: Option<Value>,
    evaluation: Option<Value>,
    summary: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    success: bool,
    workflow_id: String,
    execution_id: String,
    status: Option<String>,
    timestamp: String,
    data: WebhookData,
}

/// GET /api/kestra-status
pub async fn handle_kestra_status(state: Arc<AppState>) -> Response<BoxBody> {
    let available = state.kestra.is_available().await;

    json_response(
        StatusCode::OK,
        &KestraStatusResponse {
            available,
            enabled: state.args.kestra.kestra_enabled,
            url: state.kestra.base_url().to_string(),
            message: if available {
                "Kestra workflow orchestration is active"
            } else {
                "Kestra unavailable, using direct AI execution"
            },
        },
    )
}

/// True when no webhook secret is configured or the bearer token matches it
fn webhook_authorized(headers: &hyper::HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return true;
    };
    // Compared without an early exit
    extract_token_from_header(get_auth_header(headers)).is_some_and(|token| {
        token.len() == secret.len()
            && token
                .bytes()
                .zip(secret.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    })
}

/// POST /api/kestra-webhook
pub async fn handle_kestra_webhook(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    if !webhook_authorized(req.headers(), state.args.kestra.kestra_webhook_secret.as_deref()) {
        warn!("Rejected Kestra webhook without a valid secret");
        return unauthorized();
    }

    let payload: WebhookPayload = match parse_json_body(req).await {
        Ok(p) => p,
        Err(e) => return invalid_body(e),
    };

    let results = match WorkflowResults::try_from(payload) {
        Ok(r) => r,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    info!(
        workflow_id = %results.workflow_id,
        execution_id = %results.execution_id,
        status = results.status.as_deref().unwrap_or("unknown"),
        "Received Kestra webhook"
    );

    let response = WebhookResponse {
        success: true,
        workflow_id: results.workflow_id.clone(),
        execution_id: results.execution_id.clone(),
        status: results.status.clone(),
        timestamp: results.received_at.to_rfc3339(),
        data: WebhookData {
            generation: results.generation.clone(),
            review: results.review.clone(),
            evaluation: results.evaluation.clone(),
            summary: results.summary.clone(),
        },
    };

    state.webhooks.put(results);

    json_response(StatusCode::OK, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::HeaderMap;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            hyper::header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        headers
    }

    #[test]
    fn test_webhook_secret() {
        assert!(webhook_authorized(&HeaderMap::new(), None));
        assert!(webhook_authorized(&HeaderMap::new(), Some("")));

        assert!(webhook_authorized(&bearer("hook-secret"), Some("hook-secret")));
        assert!(!webhook_authorized(&bearer("hook-secreT"), Some("hook-secret")));
        assert!(!webhook_authorized(&bearer("hook"), Some("hook-secret")));
        assert!(!webhook_authorized(&HeaderMap::new(), Some("hook-secret")));
    }
}
