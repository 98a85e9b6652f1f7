//! Achievement lifecycle
//!
//! - [`model`] - content, reference, and view types
//! - [`policy`] - who may read or mutate a reference
//! - [`engine`] - state machine and cross-store write ordering
//! - [`error`] - lifecycle error taxonomy

pub mod engine;
pub mod error;
pub mod model;
pub mod policy;

pub use engine::{AchievementEngine, ListScope};
pub use error::{AchievementError, AchievementResult};
pub use model::{
    Achievement, AchievementDetails, AchievementHistory, AchievementReference, AchievementStatus,
    AchievementView,
};
pub use policy::{can_mutate, can_read, Decision, Operation};
