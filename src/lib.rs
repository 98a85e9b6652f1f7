//! Achievement Tracker - academic achievement lifecycle backend
//!
//! Students record achievements, submit them for verification, and their
//! assigned advisor verifies (awarding points) or rejects them.
//!
//! ## Storage
//!
//! - **Content** lives in MongoDB: flexible per-type details, tags, points,
//!   attachments.
//! - **Lifecycle** lives in SQLite through Diesel: one reference row per
//!   document, its status, timestamps, and an append-only transition history.
//!
//! The two stores are never written in one transaction. Create and verify
//! order their writes so that the failure window is small and every leftover
//! inconsistency is reported on the reconciliation log.

pub mod achievement;
pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use achievement::{AchievementEngine, AchievementError, ListScope};
pub use config::Args;
pub use types::{Result, TrackerError};
