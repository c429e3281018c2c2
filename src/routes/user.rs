//! Signed-in user settings
//!
//! - GET/POST /api/user/api-keys - stored provider keys (masked on read)
//! - GET/PUT  /api/user/profile  - name, image and dashboard preferences

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    error_response, invalid_body, json_response, message_response, method_not_allowed,
    parse_json_body, session_claims, unauthorized, BoxBody,
};
use crate::db::schemas::ApiKeys;
use crate::db::ProfileUpdate;
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeysResponse {
    api_keys: ApiKeys,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    email: String,
    name: Option<String>,
    image: Option<String>,
    email_verified: bool,
    preferences: Option<serde_json::Value>,
    created_at: Option<String>,
}

fn store_failure(context: &str, e: impl std::fmt::Display) -> Response<BoxBody> {
    warn!(error = %e, "{}", context);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, context)
}

/// GET/POST /api/user/api-keys
pub async fn handle_api_keys(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let Some(claims) = session_claims(req.headers(), &state.jwt) else {
        return unauthorized();
    };

    let method = req.method().clone();
    match method {
        Method::GET => match state.store.find_by_email(&claims.sub).await {
            Ok(user) => json_response(
                StatusCode::OK,
                &ApiKeysResponse {
                    api_keys: user.map(|u| u.api_keys.masked()).unwrap_or_default(),
                },
            ),
            Err(e) => store_failure("Failed to fetch API keys", e),
        },
        Method::POST => {
            let keys: ApiKeys = match parse_json_body(req).await {
                Ok(k) => k,
                Err(e) => return invalid_body(e),
            };

            match state.store.update_api_keys(&claims.sub, keys.normalized()).await {
                Ok(true) => {
                    info!(email = %claims.sub, "API keys updated");
                    message_response(StatusCode::OK, "API keys updated successfully")
                }
                Ok(false) => error_response(StatusCode::NOT_FOUND, "User not found"),
                Err(e) => store_failure("Failed to update API keys", e),
            }
        }
        _ => method_not_allowed(),
    }
}

/// GET/PUT /api/user/profile
pub async fn handle_profile(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let Some(claims) = session_claims(req.headers(), &state.jwt) else {
        return unauthorized();
    };

    let method = req.method().clone();
    match method {
        Method::GET => match state.store.find_by_email(&claims.sub).await {
            Ok(Some(user)) => json_response(
                StatusCode::OK,
                &ProfileResponse {
                    created_at: user.created_at_rfc3339(),
                    email: user.email,
                    name: user.name,
                    image: user.image,
                    email_verified: user.email_verified,
                    preferences: user.preferences,
                },
            ),
            Ok(None) => error_response(StatusCode::NOT_FOUND, "User not found"),
            Err(e) => store_failure("Internal server error", e),
        },
        Method::PUT => {
            let update: ProfileUpdate = match parse_json_body(req).await {
                Ok(u) => u,
                Err(e) => return invalid_body(e),
            };

            match state.store.update_profile(&claims.sub, update).await {
                Ok(true) => message_response(StatusCode::OK, "Profile updated successfully"),
                Ok(false) => error_response(StatusCode::NOT_FOUND, "User not found"),
                Err(e) => store_failure("Failed to update profile", e),
            }
        }
        _ => method_not_allowed(),
    }
}
