//! POST /api/generate
//!
//! Runs the workflow for a prompt. When Kestra orchestration is enabled and
//! reachable the run is delegated to it, otherwise (or when the delegated
//! run fails) the pipeline runs in-process.

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{info, warn};

use super::{invalid_body, json_response, parse_json_body, session_claims, BoxBody, ErrorResponse};
use crate::db::schemas::ApiKeys;
use crate::pipeline::{GenerateRequest, Pipeline, ProviderKeys};
use crate::server::AppState;

/// Stored keys of the signed-in caller, if any
async fn caller_keys(state: &AppState, email: Option<String>) -> Option<ApiKeys> {
    let email = email?;
    match state.store.find_by_email(&email).await {
        Ok(user) => user.map(|u| u.api_keys),
        Err(e) => {
            warn!(error = %e, "Could not load stored API keys, using server keys");
            None
        }
    }
}

pub async fn handle_generate(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let email = session_claims(req.headers(), &state.jwt).map(|c| c.sub);

    let request: GenerateRequest = match parse_json_body(req).await {
        Ok(r) => r,
        Err(e) => return invalid_body(e),
    };

    if request.prompt.trim().is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            &ErrorResponse {
                error: "Prompt is required".into(),
                message: None,
            },
        );
    }

    if state.args.kestra.kestra_enabled && request.use_kestra != Some(false) {
        if state.kestra.is_available().await {
            match state.kestra.run(&request, &state.webhooks).await {
                Ok(run) => return json_response(StatusCode::OK, &run),
                Err(e) => warn!(error = %e, "Kestra workflow failed, running pipeline directly"),
            }
        } else {
            info!("Kestra unavailable, running pipeline directly");
        }
    }

    let stored = caller_keys(&state, email).await;
    let keys = ProviderKeys::resolve(
        request.api_key.as_deref(),
        stored.as_ref(),
        &state.args.providers,
    );
    let pipeline = Pipeline::from_keys(&state.http, &state.args.providers, &keys);

    // A panic inside a stage surfaces as a 500 instead of a dropped connection
    let run = tokio::spawn(async move { pipeline.run(&request).await }).await;

    match run {
        Ok(output) => json_response(StatusCode::OK, &output),
        Err(e) => {
            warn!(error = %e, "Workflow task failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorResponse {
                    error: "Workflow execution failed".into(),
                    message: Some(e.to_string()),
                },
            )
        }
    }
}
