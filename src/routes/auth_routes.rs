//! HTTP routes for accounts and sessions
//!
//! - POST /api/auth/signup                - create a password account
//! - POST /api/auth/callback/credentials  - email + password sign-in
//! - POST /api/auth/forgot-password       - issue a reset token
//! - POST /api/auth/reset-password        - consume a reset token
//! - POST /api/auth/verify-email          - consume a verification token
//! - GET  /api/auth/session               - current session from the bearer token
//! - POST /api/auth/signout               - stateless sign-out
//! - GET  /api/auth/providers             - available sign-in methods
//! - GET  /api/auth/signin/{provider}     - start an OAuth flow
//! - GET  /api/auth/callback/{provider}   - finish an OAuth flow

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    error_response, invalid_body, json_response, message_response, method_not_allowed,
    not_found, parse_json_body, parse_query, redirect, session_claims, BoxBody,
};
use crate::auth::tokens::{generate_token, reset_link, reset_token_expiry, verification_link};
use crate::auth::{
    check_password_strength, hash_password, verify_account_password, Claims, OAuthError, TokenInput,
};
use crate::db::schemas::{normalize_email, UserDoc};
use crate::server::AppState;
use crate::types::DevAgentError;

pub const CREDENTIALS_PROVIDER: &str = "credentials";

const RESET_REQUESTED: &str = "If an account exists, a password reset link has been sent";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct OAuthCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl From<&UserDoc> for SessionUser {
    fn from(user: &UserDoc) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
            image: user.image.clone(),
        }
    }
}

impl From<Claims> for SessionUser {
    fn from(claims: Claims) -> Self {
        Self {
            email: claims.sub,
            name: claims.name,
            image: claims.image,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupResponse {
    message: &'static str,
    user: SessionUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification_link: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    token: String,
    expires_at: String,
    user: SessionUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForgotPasswordResponse {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_link: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    user: SessionUser,
    expires: String,
}

#[derive(Debug, Serialize)]
struct ProvidersResponse {
    providers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SignOutResponse {
    success: bool,
    message: &'static str,
}

fn unix_to_rfc3339(secs: u64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

fn internal_error(context: &'static str, e: DevAgentError) -> Response<BoxBody> {
    warn!(error = %e, "{}", context);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, context)
}

/// Issue a session token for an account
fn issue_session(state: &AppState, user: &UserDoc, provider: &str) -> Result<SignInResponse, DevAgentError> {
    let (token, exp) = state.jwt.generate_token(TokenInput {
        email: user.email.clone(),
        name: user.name.clone(),
        image: user.image.clone(),
        provider: provider.to_string(),
    })?;

    Ok(SignInResponse {
        token,
        expires_at: unix_to_rfc3339(exp),
        user: SessionUser::from(user),
    })
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /api/auth/signup
async fn handle_signup(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: SignupRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return invalid_body(e),
    };

    let email = normalize_email(&body.email);
    if email.is_empty() || body.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email and password are required");
    }

    if let Err(e) = check_password_strength(&body.password) {
        return invalid_body(e);
    }

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => return internal_error("Failed to create user", e),
    };

    let name = body.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let user = match state
        .store
        .create_user(UserDoc::with_password(&email, name, password_hash))
        .await
    {
        Ok(u) => u,
        Err(DevAgentError::Conflict(_)) => {
            return error_response(StatusCode::BAD_REQUEST, "User already exists")
        }
        Err(e) => return internal_error("Failed to create user", e),
    };

    let token = generate_token();
    let link = verification_link(&state.args.public_url, &token);
    match state.store.set_verification_token(&user.email, &token).await {
        Ok(_) => info!(email = %user.email, "Email verification link: {}", link),
        Err(e) => warn!(error = %e, "Failed to store verification token"),
    }

    info!(email = %user.email, "User created");

    json_response(
        StatusCode::CREATED,
        &SignupResponse {
            message: "User created successfully",
            user: SessionUser::from(&user),
            verification_link: state.args.dev_mode.then_some(link),
        },
    )
}

/// POST /api/auth/callback/credentials
async fn handle_credentials(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: CredentialsRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return invalid_body(e),
    };

    if body.email.trim().is_empty() || body.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email and password are required");
    }

    let user = match state.store.find_by_email(&body.email).await {
        Ok(u) => u,
        Err(e) => return internal_error("Sign-in failed", e),
    };

    // Unknown email, OAuth-only account and wrong password look the same
    let hash = user.as_ref().and_then(|u| u.password_hash.as_deref());
    let verified = verify_account_password(&body.password, hash);

    let Some(user) = user.filter(|_| verified) else {
        warn!(email = %normalize_email(&body.email), "Failed sign-in attempt");
        return error_response(StatusCode::UNAUTHORIZED, "Invalid credentials");
    };

    match issue_session(&state, &user, CREDENTIALS_PROVIDER) {
        Ok(session) => {
            info!(email = %user.email, "User signed in with credentials");
            json_response(StatusCode::OK, &session)
        }
        Err(e) => internal_error("Sign-in failed", e),
    }
}

/// POST /api/auth/forgot-password
async fn handle_forgot_password(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: ForgotPasswordRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return invalid_body(e),
    };

    if body.email.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email is required");
    }

    let token = generate_token();
    let matched = match state
        .store
        .set_reset_token(&body.email, &token, reset_token_expiry())
        .await
    {
        Ok(m) => m,
        Err(e) => return internal_error("Failed to process request", e),
    };

    // The response never reveals whether the account exists
    let reset_link = if matched {
        let link = reset_link(&state.args.public_url, &token);
        info!(email = %normalize_email(&body.email), "Password reset link: {}", link);
        state.args.dev_mode.then_some(link)
    } else {
        None
    };

    json_response(
        StatusCode::OK,
        &ForgotPasswordResponse {
            message: RESET_REQUESTED,
            reset_link,
        },
    )
}

/// POST /api/auth/reset-password
async fn handle_reset_password(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: ResetPasswordRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return invalid_body(e),
    };

    if body.token.trim().is_empty() || body.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Token and password are required");
    }

    if let Err(e) = check_password_strength(&body.password) {
        return invalid_body(e);
    }

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => return internal_error("Failed to reset password", e),
    };

    match state.store.reset_password(body.token.trim(), &password_hash).await {
        Ok(true) => message_response(StatusCode::OK, "Password reset successful"),
        Ok(false) => error_response(StatusCode::BAD_REQUEST, "Invalid or expired reset token"),
        Err(e) => internal_error("Failed to reset password", e),
    }
}

/// POST /api/auth/verify-email
async fn handle_verify_email(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: TokenRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return invalid_body(e),
    };

    if body.token.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Token is required");
    }

    match state.store.verify_email(body.token.trim()).await {
        Ok(true) => message_response(StatusCode::OK, "Email verified successfully"),
        Ok(false) => error_response(StatusCode::BAD_REQUEST, "Invalid or expired verification token"),
        Err(e) => internal_error("Failed to verify email", e),
    }
}

/// GET /api/auth/session
fn handle_session(req: &Request<Incoming>, state: &AppState) -> Response<BoxBody> {
    match session_claims(req.headers(), &state.jwt) {
        Some(claims) => {
            let expires = unix_to_rfc3339(claims.exp);
            json_response(
                StatusCode::OK,
                &SessionResponse {
                    user: SessionUser::from(claims),
                    expires,
                },
            )
        }
        None => json_response(StatusCode::OK, &serde_json::json!({})),
    }
}

/// GET /api/auth/providers
fn handle_providers(state: &AppState) -> Response<BoxBody> {
    let mut providers = vec![CREDENTIALS_PROVIDER.to_string()];
    providers.extend(state.oauth.provider_names());
    json_response(StatusCode::OK, &ProvidersResponse { providers })
}

/// GET /api/auth/signin/{provider}
fn handle_oauth_signin(provider: &str, state: &AppState) -> Response<BoxBody> {
    match state.oauth.authorize_url(provider) {
        Ok(url) => redirect(&url),
        Err(OAuthError::UnknownProvider(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("Unknown provider: {}", provider))
        }
        Err(e) => {
            warn!(error = %e, "Failed to start OAuth sign-in");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to start sign-in")
        }
    }
}

/// Send the browser back to the sign-in page with an error code
fn signin_error_redirect(state: &AppState, error: &str) -> Response<BoxBody> {
    redirect(&format!(
        "{}/auth/signin?error={}",
        state.args.public_url.trim_end_matches('/'),
        urlencoding::encode(error)
    ))
}

/// GET /api/auth/callback/{provider}
async fn handle_oauth_callback(
    provider: &str,
    uri: &Uri,
    state: &AppState,
) -> Response<BoxBody> {
    let query: OAuthCallbackQuery = match parse_query(uri) {
        Ok(q) => q,
        Err(_) => return signin_error_redirect(state, "OAuthCallback"),
    };

    if let Some(error) = query.error {
        warn!(provider, error = %error, "OAuth provider returned an error");
        return signin_error_redirect(state, "OAuthCallback");
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return signin_error_redirect(state, "OAuthCallback");
    };

    let profile = match state.oauth.complete(provider, &code, &oauth_state).await {
        Ok(p) => p,
        Err(e) => {
            warn!(provider, error = %e, "OAuth sign-in failed");
            let code = match e {
                OAuthError::MissingEmail => "OAuthAccountNotLinked",
                _ => "OAuthCallback",
            };
            return signin_error_redirect(state, code);
        }
    };

    let user = match state.store.find_by_email(&profile.email).await {
        Ok(Some(existing)) => {
            if !existing.providers.iter().any(|p| p == provider) {
                if let Err(e) = state.store.link_provider(&existing.email, provider).await {
                    warn!(error = %e, "Failed to record sign-in provider");
                }
            }
            existing
        }
        Ok(None) => {
            let doc = UserDoc::from_oauth(&profile.email, profile.name, profile.image, provider);
            match state.store.create_user(doc).await {
                Ok(created) => {
                    info!(email = %created.email, provider, "User created from OAuth sign-in");
                    created
                }
                Err(e) => {
                    warn!(error = %e, "Failed to create OAuth user");
                    return signin_error_redirect(state, "OAuthCreateAccount");
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "User lookup failed during OAuth sign-in");
            return signin_error_redirect(state, "OAuthCallback");
        }
    };

    match issue_session(state, &user, provider) {
        Ok(session) => redirect(&format!(
            "{}/dashboard#token={}",
            state.args.public_url.trim_end_matches('/'),
            urlencoding::encode(&session.token)
        )),
        Err(e) => {
            warn!(error = %e, "Failed to issue session after OAuth sign-in");
            signin_error_redirect(state, "OAuthCallback")
        }
    }
}

/// Route `/api/auth/*`. Returns `None` for paths outside it.
pub async fn handle_auth_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    let rest = path.strip_prefix("/api/auth/")?;
    let method = req.method().clone();

    let response = match (&method, rest) {
        (&Method::POST, "signup") => handle_signup(req, state).await,
        (&Method::POST, "callback/credentials") => handle_credentials(req, state).await,
        (&Method::POST, "forgot-password") => handle_forgot_password(req, state).await,
        (&Method::POST, "reset-password") => handle_reset_password(req, state).await,
        (&Method::POST, "verify-email") => handle_verify_email(req, state).await,
        (&Method::GET, "session") => handle_session(&req, &state),
        (&Method::POST, "signout") => json_response(
            StatusCode::OK,
            &SignOutResponse {
                success: true,
                message: "Signed out",
            },
        ),
        (&Method::GET, "providers") => handle_providers(&state),

        (_, "signup")
        | (_, "callback/credentials")
        | (_, "forgot-password")
        | (_, "reset-password")
        | (_, "verify-email")
        | (_, "session")
        | (_, "signout")
        | (_, "providers") => method_not_allowed(),

        (&Method::GET, rest) => {
            if let Some(provider) = rest.strip_prefix("signin/") {
                handle_oauth_signin(provider, &state)
            } else if let Some(provider) = rest.strip_prefix("callback/") {
                handle_oauth_callback(provider, req.uri(), &state).await
            } else {
                not_found()
            }
        }

        _ => not_found(),
    };

    Some(response)
}
