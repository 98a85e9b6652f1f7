//! Lifecycle error taxonomy

use hyper::StatusCode;

use super::model::AchievementStatus;

/// Outcome of a failed lifecycle operation.
///
/// Store details never leak through `StoreFailure`; they are logged where the
/// failure happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AchievementError {
    /// Absent, or invisible to the caller. The two are never distinguished.
    #[error("achievement not found")]
    NotFound,

    #[error("not permitted to perform this operation")]
    Forbidden,

    #[error("cannot {operation} an achievement in status '{status}'")]
    InvalidState {
        status: AchievementStatus,
        operation: &'static str,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage temporarily unavailable")]
    StoreFailure,
}

impl AchievementError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidState { .. } => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::StoreFailure => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::InvalidState { .. } => "invalid_state",
            Self::Validation(_) => "validation_error",
            Self::StoreFailure => "store_failure",
        }
    }
}

pub type AchievementResult<T> = std::result::Result<T, AchievementError>;
