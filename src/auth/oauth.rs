//! OAuth sign-in with GitHub and Google
//!
//! Authorization-code flow. `state` values are single use, bound to the
//! provider that issued them, and expire after ten minutes.

use dashmap::DashMap;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::auth::tokens::generate_token;
use crate::config::OAuthArgs;

const STATE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Unknown or unconfigured provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Code exchange failed: {0}")]
    Exchange(String),

    #[error("Profile fetch failed: {0}")]
    Profile(String),

    #[error("Provider did not return an email address")]
    MissingEmail,
}

/// Endpoints and credentials for one provider
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// GitHub hides private addresses from /user; they come from here
    pub emails_url: Option<String>,
    pub scope: String,
}

impl OAuthProviderConfig {
    pub fn github(client_id: String, client_secret: String) -> Self {
        Self {
            name: "github".into(),
            client_id,
            client_secret,
            authorize_url: "https://github.com/login/oauth/authorize".into(),
            token_url: "https://github.com/login/oauth/access_token".into(),
            userinfo_url: "https://api.github.com/user".into(),
            emails_url: Some("https://api.github.com/user/emails".into()),
            scope: "read:user user:email".into(),
        }
    }

    pub fn google(client_id: String, client_secret: String) -> Self {
        Self {
            name: "google".into(),
            client_id,
            client_secret,
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".into(),
            emails_url: None,
            scope: "openid email profile".into(),
        }
    }
}

/// Identity returned by a provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OAuthProfile {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug)]
struct PendingState {
    provider: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

/// Configured providers plus outstanding `state` values
pub struct OAuthClient {
    http: Client,
    providers: HashMap<String, OAuthProviderConfig>,
    states: DashMap<String, PendingState>,
    callback_base: String,
}

impl OAuthClient {
    pub fn new(http: Client, public_url: &str, providers: Vec<OAuthProviderConfig>) -> Self {
        Self {
            http,
            providers: providers.into_iter().map(|p| (p.name.clone(), p)).collect(),
            states: DashMap::new(),
            callback_base: format!("{}/api/auth/callback", public_url.trim_end_matches('/')),
        }
    }

    /// Providers whose client id and secret are both set
    pub fn from_args(http: Client, public_url: &str, args: &OAuthArgs) -> Self {
        let mut providers = Vec::new();
        if let (Some(id), Some(secret)) = (&args.github_client_id, &args.github_client_secret) {
            providers.push(OAuthProviderConfig::github(id.clone(), secret.clone()));
        }
        if let (Some(id), Some(secret)) = (&args.google_client_id, &args.google_client_secret) {
            providers.push(OAuthProviderConfig::google(id.clone(), secret.clone()));
        }
        Self::new(http, public_url, providers)
    }

    /// Configured provider names, sorted
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    fn provider(&self, name: &str) -> Result<&OAuthProviderConfig, OAuthError> {
        self.providers
            .get(name)
            .ok_or_else(|| OAuthError::UnknownProvider(name.to_string()))
    }

    fn redirect_uri(&self, provider: &str) -> String {
        format!("{}/{}", self.callback_base, provider)
    }

    /// Build the provider's consent URL and remember the `state` it carries
    pub fn authorize_url(&self, provider: &str) -> Result<String, OAuthError> {
        let config = self.provider(provider)?;
        let state = generate_token();

        self.states.insert(
            state.clone(),
            PendingState {
                provider: provider.to_string(),
                expires_at: Instant::now() + STATE_TTL,
            },
        );

        let query = serde_urlencoded::to_string([
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", self.redirect_uri(provider).as_str()),
            ("response_type", "code"),
            ("scope", config.scope.as_str()),
            ("state", state.as_str()),
        ])
        .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        Ok(format!("{}?{}", config.authorize_url, query))
    }

    /// Consume a `state`. Succeeds once, for the provider that issued it.
    fn take_state(&self, provider: &str, state: &str) -> Result<(), OAuthError> {
        let (_, pending) = self.states.remove(state).ok_or(OAuthError::InvalidState)?;
        if pending.provider != provider || pending.expires_at < Instant::now() {
            return Err(OAuthError::InvalidState);
        }
        Ok(())
    }

    /// Finish the flow: validate state, trade the code, fetch the profile
    pub async fn complete(
        &self,
        provider: &str,
        code: &str,
        state: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        let config = self.provider(provider)?;
        self.take_state(provider, state)?;

        let access_token = self.exchange_code(config, code).await?;
        let profile = self.fetch_profile(config, &access_token).await?;
        info!(provider = %provider, email = %profile.email, "OAuth sign-in completed");
        Ok(profile)
    }

    async fn exchange_code(
        &self,
        config: &OAuthProviderConfig,
        code: &str,
    ) -> Result<String, OAuthError> {
        let redirect_uri = self.redirect_uri(&config.name);
        let form = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let body = serde_urlencoded::to_string(form)
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        let response = self
            .http
            .post(&config.token_url)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OAuthError::Exchange(format!("HTTP {}", response.status())));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        match (token.access_token, token.error) {
            (Some(access_token), None) => Ok(access_token),
            (_, Some(error)) => Err(OAuthError::Exchange(format!(
                "{}: {}",
                error,
                token.error_description.unwrap_or_default()
            ))),
            (None, None) => Err(OAuthError::Exchange("No access token in response".into())),
        }
    }

    async fn fetch_profile(
        &self,
        config: &OAuthProviderConfig,
        access_token: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        let user: serde_json::Value = self
            .http
            .get(&config.userinfo_url)
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))?
            .error_for_status()
            .map_err(|e| OAuthError::Profile(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))?;

        let text = |key: &str| {
            user.get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let email = match text("email") {
            Some(email) => email,
            None => match &config.emails_url {
                Some(url) => self.fetch_primary_email(url, access_token).await?,
                None => return Err(OAuthError::MissingEmail),
            },
        };

        Ok(OAuthProfile {
            email,
            name: text("name").or_else(|| text("login")),
            image: text("avatar_url").or_else(|| text("picture")),
        })
    }

    async fn fetch_primary_email(&self, url: &str, access_token: &str) -> Result<String, OAuthError> {
        let emails: Vec<GithubEmail> = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))?
            .error_for_status()
            .map_err(|e| OAuthError::Profile(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))?;

        emails
            .iter()
            .find(|e| e.primary && e.verified)
            .or_else(|| emails.iter().find(|e| e.verified))
            .map(|e| e.email.clone())
            .ok_or(OAuthError::MissingEmail)
    }

    /// Drop expired states, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.states.len();
        self.states.retain(|_, pending| pending.expires_at >= now);
        before - self.states.len()
    }
}

/// Sweep expired OAuth states every minute
pub fn spawn_state_cleanup_task(client: Arc<OAuthClient>) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60);
        loop {
            tokio::time::sleep(interval).await;
            let removed = client.cleanup();
            if removed > 0 {
                debug!("OAuth cleanup: removed {} expired states", removed);
            }
        }
    });
    info!("OAuth state cleanup task started");
}
