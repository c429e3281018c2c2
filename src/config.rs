//! Configuration for DevAgent
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// DevAgent - prompt in, reviewed and scored code out
#[derive(Parser, Debug, Clone)]
#[command(name = "devagent")]
#[command(about = "AI code generation pipeline with review and evaluation")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Public base URL used in redirect and reset links
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:3000")]
    pub public_url: String,

    /// Enable development mode (in-memory store fallback, reset links in responses)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "devagent")]
    pub mongodb_db: String,

    /// JWT secret for session signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Session token lifetime in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (pretty, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Timeout for outbound HTTP calls in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "60000")]
    pub request_timeout_ms: u64,

    /// LLM provider configuration
    #[command(flatten)]
    pub providers: ProviderArgs,

    /// Kestra orchestration configuration
    #[command(flatten)]
    pub kestra: KestraArgs,

    /// OAuth sign-in providers
    #[command(flatten)]
    pub oauth: OAuthArgs,
}

/// LLM, review and evaluation provider settings
#[derive(Parser, Debug, Clone)]
pub struct ProviderArgs {
    /// Together AI API key (primary generation provider)
    #[arg(long, env = "TOGETHER_API_KEY")]
    pub together_api_key: Option<String>,

    /// Together AI OpenAI-compatible base URL
    #[arg(long, env = "TOGETHER_API_URL", default_value = "https://api.together.xyz/v1")]
    pub together_api_url: String,

    /// Together AI model
    #[arg(
        long,
        env = "TOGETHER_MODEL",
        default_value = "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo"
    )]
    pub together_model: String,

    /// Groq API key (secondary generation provider and AI reviewer)
    #[arg(long, env = "GROQ_API_KEY")]
    pub groq_api_key: Option<String>,

    /// Groq OpenAI-compatible base URL
    #[arg(long, env = "GROQ_API_URL", default_value = "https://api.groq.com/openai/v1")]
    pub groq_api_url: String,

    /// Groq model
    #[arg(long, env = "GROQ_MODEL", default_value = "llama-3.1-70b-versatile")]
    pub groq_model: String,

    /// CodeRabbit API key (enables AI review)
    #[arg(long, env = "CODERABBIT_API_KEY")]
    pub coderabbit_api_key: Option<String>,

    /// Oumi API key (enables AI evaluation)
    #[arg(long, env = "OUMI_API_KEY")]
    pub oumi_api_key: Option<String>,

    /// Oumi API base URL
    #[arg(long, env = "OUMI_API_URL", default_value = "https://api.oumi.ai")]
    pub oumi_api_url: String,
}

/// Kestra workflow orchestrator settings
#[derive(Parser, Debug, Clone)]
pub struct KestraArgs {
    /// Route generation through Kestra when it is reachable
    #[arg(long, env = "KESTRA_ENABLED", default_value = "false")]
    pub kestra_enabled: bool,

    /// Kestra API base URL
    #[arg(long, env = "KESTRA_API_URL", default_value = "http://localhost:8080")]
    pub kestra_api_url: String,

    /// Kestra API bearer token (optional)
    #[arg(long, env = "KESTRA_API_KEY")]
    pub kestra_api_key: Option<String>,

    /// Kestra flow namespace
    #[arg(long, env = "KESTRA_NAMESPACE", default_value = "devagent")]
    pub kestra_namespace: String,

    /// Kestra flow id
    #[arg(long, env = "KESTRA_FLOW_ID", default_value = "devagent_workflow")]
    pub kestra_flow_id: String,

    /// Execution status poll interval in milliseconds
    #[arg(long, env = "KESTRA_POLL_INTERVAL_MS", default_value = "2000")]
    pub kestra_poll_interval_ms: u64,

    /// Maximum time to wait for an execution in seconds
    #[arg(long, env = "KESTRA_TIMEOUT_SECS", default_value = "300")]
    pub kestra_timeout_secs: u64,

    /// Bearer token flows must present when posting to /api/kestra-webhook
    #[arg(long, env = "KESTRA_WEBHOOK_SECRET")]
    pub kestra_webhook_secret: Option<String>,

    /// Unclaimed webhook results kept before the oldest is evicted
    #[arg(long, env = "KESTRA_WEBHOOK_MAX_RESULTS", default_value = "1000")]
    pub kestra_webhook_max_results: usize,
}

/// OAuth client credentials
#[derive(Parser, Debug, Clone)]
pub struct OAuthArgs {
    #[arg(long, env = "GITHUB_ID")]
    pub github_client_id: Option<String>,

    #[arg(long, env = "GITHUB_SECRET")]
    pub github_client_secret: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
    pub google_client_secret: Option<String>,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Some(secret.clone()),
            (None, true) => Some("dev-only-insecure-secret-do-not-deploy-0000".to_string()),
            (None, false) => None,
        }
    }

    /// Timeout applied to every outbound HTTP client
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// MongoDB URI with any password replaced, for logging
    pub fn mongodb_uri_redacted(&self) -> String {
        redact_uri(&self.mongodb_uri)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                Some(secret) if secret.len() < 32 => {
                    return Err("JWT_SECRET must be at least 32 characters".to_string())
                }
                Some(_) => {}
            }
        }

        if self.kestra.kestra_poll_interval_ms == 0 {
            return Err("KESTRA_POLL_INTERVAL_MS must be greater than zero".to_string());
        }

        if self.kestra.kestra_poll_interval_ms > self.kestra.kestra_timeout_secs * 1000 {
            return Err("KESTRA_POLL_INTERVAL_MS must not exceed KESTRA_TIMEOUT_SECS".to_string());
        }

        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(format!("Unknown LOG_FORMAT '{}'", self.log_format));
        }

        Ok(())
    }
}

fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let Some(at) = rest.find('@') else {
        return uri.to_string();
    };
    let credentials = &rest[..at];
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}{}:****{}", &uri[..scheme_end + 3], user, &rest[at..]),
        None => uri.to_string(),
    }
}
