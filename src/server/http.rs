//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; one task per connection and a manual
//! `(method, path)` router.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{oauth, JwtValidator, OAuthClient};
use crate::config::Args;
use crate::db::{MongoClient, UserStore};
use crate::routes::{self, BoxBody};
use crate::services::{client_key, rate_limit, webhooks, KestraClient, RateLimiter, WebhookStore};
use crate::types::DevAgentError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Set when the user store is backed by MongoDB
    pub mongo: Option<MongoClient>,
    pub store: Arc<dyn UserStore>,
    pub jwt: JwtValidator,
    /// Outbound client for LLM providers, Oumi, Kestra and OAuth
    pub http: reqwest::Client,
    pub oauth: Arc<OAuthClient>,
    pub kestra: Arc<KestraClient>,
    pub webhooks: Arc<WebhookStore>,
    /// Credential endpoints
    pub strict_limit: Arc<RateLimiter>,
    /// Code generation
    pub moderate_limit: Arc<RateLimiter>,
    /// Signed-in user settings
    pub relaxed_limit: Arc<RateLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn UserStore>,
        mongo: Option<MongoClient>,
    ) -> Result<Self, DevAgentError> {
        let secret = args
            .jwt_secret()
            .ok_or_else(|| DevAgentError::Config("JWT_SECRET is not set".into()))?;
        let jwt = JwtValidator::new(secret, args.jwt_expiry_seconds)?;

        let http = reqwest::Client::builder()
            .timeout(args.request_timeout())
            .build()
            .map_err(|e| DevAgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let oauth = Arc::new(OAuthClient::from_args(http.clone(), &args.public_url, &args.oauth));
        let kestra = Arc::new(KestraClient::from_args(http.clone(), &args.kestra));
        let webhooks = Arc::new(WebhookStore::with_capacity(args.kestra.kestra_webhook_max_results));

        Ok(Self {
            args,
            mongo,
            store,
            jwt,
            http,
            oauth,
            kestra,
            webhooks,
            strict_limit: Arc::new(RateLimiter::strict()),
            moderate_limit: Arc::new(RateLimiter::moderate()),
            relaxed_limit: Arc::new(RateLimiter::relaxed()),
            started_at: Instant::now(),
        })
    }

    /// Limiter guarding a route, if any
    fn limiter_for(&self, method: &Method, path: &str) -> Option<&Arc<RateLimiter>> {
        match (method, path) {
            (&Method::POST, "/api/auth/signup")
            | (&Method::POST, "/api/auth/callback/credentials")
            | (&Method::POST, "/api/auth/forgot-password")
            | (&Method::POST, "/api/auth/reset-password") => Some(&self.strict_limit),
            (&Method::POST, "/api/generate") => Some(&self.moderate_limit),
            (&Method::POST, "/api/kestra-webhook") => Some(&self.relaxed_limit),
            (_, p) if p.starts_with("/api/user/") => Some(&self.relaxed_limit),
            _ => None,
        }
    }
}

/// Start the HTTP server on the configured address
pub async fn run(state: Arc<AppState>) -> Result<(), DevAgentError> {
    let listener = TcpListener::bind(state.args.listen).await?;
    serve(listener, state).await
}

/// Serve connections from an already-bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), DevAgentError> {
    info!("DevAgent listening on {}", listener.local_addr()?);

    if state.args.dev_mode {
        warn!("Development mode enabled - reset and verification links are returned in responses");
    }

    rate_limit::spawn_cleanup_task(vec![
        Arc::clone(&state.strict_limit),
        Arc::clone(&state.moderate_limit),
        Arc::clone(&state.relaxed_limit),
    ]);
    webhooks::spawn_cleanup_task(Arc::clone(&state.webhooks));
    oauth::spawn_state_cleanup_task(Arc::clone(&state.oauth));

    let providers = state.oauth.provider_names();
    if providers.is_empty() {
        info!("OAuth sign-in disabled (no providers configured)");
    } else {
        info!("OAuth sign-in enabled: {}", providers.join(", "));
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    if method == Method::OPTIONS {
        return Ok(routes::cors_preflight());
    }

    if let Some(limiter) = state.limiter_for(&method, &path) {
        let key = client_key(req.headers(), Some(addr));
        if let Err(limited) = limiter.check(&key) {
            warn!(
                client = %key,
                limiter = limiter.name(),
                retry_after = limited.retry_after,
                "Rate limit exceeded on {}",
                path
            );
            return Ok(routes::too_many_requests(limited.retry_after));
        }
    }

    // Auth routes consume the request
    if path.starts_with("/api/auth/") {
        if let Some(response) = routes::handle_auth_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(routes::not_found());
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state)).await
        }
        (Method::GET, "/version") => routes::version_info(),

        (Method::POST, "/api/generate") => routes::handle_generate(req, Arc::clone(&state)).await,

        (_, "/api/user/api-keys") => routes::handle_api_keys(req, Arc::clone(&state)).await,
        (_, "/api/user/profile") => routes::handle_profile(req, Arc::clone(&state)).await,

        (Method::GET, "/api/kestra-status") => {
            routes::handle_kestra_status(Arc::clone(&state)).await
        }
        (Method::POST, "/api/kestra-webhook") => {
            routes::handle_kestra_webhook(req, Arc::clone(&state)).await
        }

        (_, "/api/generate") | (_, "/api/kestra-status") | (_, "/api/kestra-webhook") => {
            routes::method_not_allowed()
        }

        _ => routes::not_found(),
    };

    Ok(response)
}
