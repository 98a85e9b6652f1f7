//! Achievement Tracker - student achievements, advisor verification

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use achievement_tracker::{
    achievement::AchievementEngine,
    auth::JwtValidator,
    config::Args,
    db::MongoClient,
    logging::{init_tracing, ReconciliationLog},
    server::{self, AppState},
    store::{DocumentStore, InMemoryDocumentStore, MongoDocumentStore, SqliteReferenceStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Achievement Tracker");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} / {}", args.mongodb_db, args.mongodb_collection);
    info!("SQLite: {}", args.database_path.display());
    info!("======================================");

    let references = SqliteReferenceStore::open(
        &args.database_path,
        args.db_pool_size,
        args.db_busy_timeout_ms,
    )?;
    info!("Reference store ready (pool size {})", args.db_pool_size);

    let documents: Arc<dyn DocumentStore> =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db, args.mongodb_timeout_ms).await {
            Ok(client) => Arc::new(MongoDocumentStore::new(client, &args.mongodb_collection).await?),
            Err(e) if args.dev_mode => {
                warn!("MongoDB unavailable (dev mode, using in-memory documents): {}", e);
                Arc::new(InMemoryDocumentStore::new())
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        };

    let reconciliation = ReconciliationLog::new();
    if let Some(path) = &args.reconciliation_log {
        reconciliation.init_file(path.clone()).await?;
    }

    let secret = args
        .jwt_secret()
        .ok_or_else(|| anyhow::anyhow!("JWT_SECRET is not configured"))?;
    let jwt = if args.dev_mode {
        JwtValidator::new_dev(secret)
    } else {
        JwtValidator::new(secret, args.jwt_expiry_seconds)?
    };

    let engine = AchievementEngine::new(documents, Arc::new(references), reconciliation);
    let state = Arc::new(AppState::new(args, engine, jwt));

    server::run(state).await?;
    Ok(())
}
