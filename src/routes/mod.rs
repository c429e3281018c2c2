//! HTTP routes for DevAgent
//!
//! Shared response helpers live here; handlers are grouped by surface.

pub mod auth_routes;
pub mod generate;
pub mod health;
pub mod kestra;
pub mod user;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::{HeaderMap, Request, Response, StatusCode, Uri};
use serde::{Deserialize, Serialize};

use crate::auth::{extract_token_from_header, Claims, JwtValidator};
use crate::types::DevAgentError;

pub use auth_routes::handle_auth_request;
pub use generate::handle_generate;
pub use health::{health_check, version_info};
pub use kestra::{handle_kestra_status, handle_kestra_webhook};
pub use user::{handle_api_keys, handle_profile};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap_or_else(|_| Response::new(empty_body()))
}

pub fn error_response(status: StatusCode, error: impl Into<String>) -> Response<BoxBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.into(),
            message: None,
        },
    )
}

pub fn message_response(status: StatusCode, message: impl Into<String>) -> Response<BoxBody> {
    json_response(
        status,
        &MessageResponse {
            message: message.into(),
        },
    )
}

pub fn method_not_allowed() -> Response<BoxBody> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub fn not_found() -> Response<BoxBody> {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

pub fn unauthorized() -> Response<BoxBody> {
    error_response(StatusCode::UNAUTHORIZED, "Unauthorized")
}

/// 429 with the body the dashboard expects and a `Retry-After` header
pub fn too_many_requests(retry_after: u64) -> Response<BoxBody> {
    let mut response = json_response(
        StatusCode::TOO_MANY_REQUESTS,
        &serde_json::json!({
            "error": "Too many requests",
            "message": format!("Rate limit exceeded. Try again in {} seconds.", retry_after),
            "retryAfter": retry_after,
        }),
    );
    if let Ok(value) = retry_after.to_string().parse() {
        response.headers_mut().insert(hyper::header::RETRY_AFTER, value);
    }
    response
}

pub fn redirect(location: &str) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header("Location", location)
        .header("Cache-Control", "no-store")
        .body(empty_body())
        .unwrap_or_else(|_| Response::new(empty_body()))
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap_or_else(|_| Response::new(empty_body()))
}

/// Read and decode a JSON body, refusing bodies over `MAX_BODY_BYTES`
pub async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
) -> Result<T, DevAgentError> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                DevAgentError::PayloadTooLarge(format!(
                    "Request body exceeds {} bytes",
                    MAX_BODY_BYTES
                ))
            } else {
                DevAgentError::Http(format!("Failed to read body: {}", e))
            }
        })?;

    serde_json::from_slice(&body.to_bytes())
        .map_err(|e| DevAgentError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// 413 for an oversized body, 400 for anything else unreadable
pub fn invalid_body(err: DevAgentError) -> Response<BoxBody> {
    match err {
        DevAgentError::PayloadTooLarge(_) => {
            error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
        }
        DevAgentError::BadRequest(m) | DevAgentError::Http(m) => {
            error_response(StatusCode::BAD_REQUEST, m)
        }
        other => error_response(StatusCode::BAD_REQUEST, other.to_string()),
    }
}

pub fn get_auth_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Claims of a valid bearer token, if any
pub fn session_claims(headers: &HeaderMap, jwt: &JwtValidator) -> Option<Claims> {
    let token = extract_token_from_header(get_auth_header(headers))?;
    jwt.verify_token(token).claims
}

/// Decode the query string into `T`, treating a missing query as empty
pub fn parse_query<T: for<'de> Deserialize<'de>>(uri: &Uri) -> Result<T, DevAgentError> {
    serde_urlencoded::from_str(uri.query().unwrap_or(""))
        .map_err(|e| DevAgentError::BadRequest(format!("Invalid query: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Query {
        code: Option<String>,
        state: Option<String>,
    }

    #[test]
    fn test_parse_query() {
        let uri: Uri = "/api/auth/callback/github?code=abc&state=x%20y".parse().unwrap();
        let query: Query = parse_query(&uri).unwrap();
        assert_eq!(query.code.as_deref(), Some("abc"));
        assert_eq!(query.state.as_deref(), Some("x y"));

        let uri: Uri = "/api/auth/callback/github".parse().unwrap();
        let query: Query = parse_query(&uri).unwrap();
        assert!(query.code.is_none());
    }

    #[test]
    fn test_too_many_requests_shape() {
        let response = too_many_requests(42);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[test]
    fn test_invalid_body_status() {
        let response = invalid_body(DevAgentError::PayloadTooLarge("big".into()));
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = invalid_body(DevAgentError::BadRequest("Invalid JSON".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_session_claims() {
        let jwt = JwtValidator::new_dev();
        let (token, _) = jwt
            .generate_token(crate::auth::TokenInput {
                email: "a@b.co".into(),
                name: None,
                image: None,
                provider: "credentials".into(),
            })
            .unwrap();

        let mut headers = HeaderMap::new();
        assert!(session_claims(&headers, &jwt).is_none());

        headers.insert(
            hyper::header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        assert_eq!(session_claims(&headers, &jwt).unwrap().sub, "a@b.co");

        headers.insert(hyper::header::AUTHORIZATION, "Bearer junk".parse().unwrap());
        assert!(session_claims(&headers, &jwt).is_none());
    }
}
