//! Configuration for the tracker service
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEV_JWT_SECRET: &str = "dev-only-insecure-secret-do-not-deploy";

/// Minimum accepted length for a production JWT secret
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Achievement tracker - student submissions and advisor verification
#[derive(Parser, Debug, Clone)]
#[command(name = "achievement-tracker")]
#[command(about = "Academic achievement tracking backend")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Enable development mode (default JWT secret, in-memory document store fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "prestasi")]
    pub mongodb_db: String,

    /// MongoDB collection holding achievement content
    #[arg(long, env = "MONGODB_COLLECTION", default_value = "achievement_records")]
    pub mongodb_collection: String,

    /// MongoDB server selection / connect timeout in milliseconds
    #[arg(long, env = "MONGODB_TIMEOUT_MS", default_value = "3000")]
    pub mongodb_timeout_ms: u64,

    /// SQLite database path for achievement references
    #[arg(long, env = "DATABASE_PATH", default_value = "achievements.db")]
    pub database_path: PathBuf,

    /// Maximum pooled SQLite connections
    #[arg(long, env = "DB_POOL_SIZE", default_value = "8")]
    pub db_pool_size: u32,

    /// SQLite busy timeout in milliseconds
    #[arg(long, env = "DB_BUSY_TIMEOUT_MS", default_value = "5000")]
    pub db_busy_timeout_ms: u64,

    /// JWT secret for token verification (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds (used when issuing dev tokens)
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Optional JSONL file receiving cross-store reconciliation events
    #[arg(long, env = "RECONCILIATION_LOG")]
    pub reconciliation_log: Option<PathBuf>,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        match &self.jwt_secret {
            Some(secret) => Some(secret.clone()),
            None if self.dev_mode => Some(DEV_JWT_SECRET.to_string()),
            None => None,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                Some(s) if s.len() < MIN_JWT_SECRET_LEN => {
                    return Err(format!(
                        "JWT_SECRET must be at least {} characters",
                        MIN_JWT_SECRET_LEN
                    ))
                }
                Some(_) => {}
            }
        }

        if self.db_pool_size == 0 {
            return Err("DB_POOL_SIZE must be greater than zero".to_string());
        }

        if self.mongodb_collection.trim().is_empty() {
            return Err("MONGODB_COLLECTION must not be empty".to_string());
        }

        Ok(())
    }
}
