//! DevAgent - prompt in, reviewed and scored code out

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devagent::{
    config::Args,
    db::{MemoryUserStore, MongoClient, MongoUserStore, UserStore},
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("devagent={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  DevAgent - AI code generation pipeline");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Public URL: {}", args.public_url);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri_redacted());
    info!(
        "Kestra: {} ({})",
        if args.kestra.kestra_enabled { "enabled" } else { "disabled" },
        args.kestra.kestra_api_url
    );
    info!(
        "Providers: together={} groq={} review={} oumi={}",
        args.providers.together_api_key.is_some(),
        args.providers.groq_api_key.is_some(),
        args.providers.coderabbit_api_key.is_some(),
        args.providers.oumi_api_key.is_some()
    );
    info!("======================================");

    let (store, mongo): (Arc<dyn UserStore>, Option<MongoClient>) =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => match MongoUserStore::new(&client).await {
                Ok(store) => {
                    info!("MongoDB connected successfully");
                    (Arc::new(store), Some(client))
                }
                Err(e) => {
                    error!("Failed to prepare users collection: {}", e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, using in-memory users): {}", e);
                    (Arc::new(MemoryUserStore::new()), None)
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    let state = match server::AppState::new(args, store, mongo) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    server::run(state).await?;

    Ok(())
}
