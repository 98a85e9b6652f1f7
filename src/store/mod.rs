//! Storage seams for the lifecycle engine
//!
//! The engine only talks to these traits. Production implementations:
//! - [`MongoDocumentStore`] for achievement content
//! - [`SqliteReferenceStore`] for lifecycle references and the advisor lookup
//!
//! [`InMemoryDocumentStore`] backs dev mode without MongoDB, and tests.

pub mod document;
pub mod reference;

pub use document::{InMemoryDocumentStore, MongoDocumentStore};
pub use reference::SqliteReferenceStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::achievement::model::{
    Achievement, AchievementPatch, AchievementReference, NewAchievement, NewAttachment,
    TransitionRecord,
};

/// Failure reported by a store adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// A compare-and-set lost: the row was not in an expected state.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Achievement content storage
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert new content, returning it as stored: assigned ID and store-stamped timestamps.
    async fn create(&self, achievement: NewAchievement) -> StoreResult<Achievement>;

    /// Merge-patch: only fields present in `patch` change. Always stamps `updatedAt`.
    async fn partial_update(&self, id: &str, patch: AchievementPatch) -> StoreResult<()>;

    /// Hard delete. Used only to compensate a failed create.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    async fn fetch(&self, id: &str) -> StoreResult<Option<Achievement>>;

    /// Append to the attachment list, stamping `uploadedAt`. Never replaces.
    async fn append_attachments(&self, id: &str, attachments: Vec<NewAttachment>)
        -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Lifecycle reference storage.
///
/// Status transitions are compare-and-set on the current status and return
/// [`StoreError::Conflict`] when the row was not in an allowed state. Every
/// transition appends a [`TransitionRecord`] in the same transaction.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Insert a `draft` reference for an existing document.
    async fn create_reference(
        &self,
        student_id: &str,
        document_id: &str,
    ) -> StoreResult<AchievementReference>;

    async fn get_reference(&self, id: Uuid) -> StoreResult<Option<AchievementReference>>;

    /// Reference joined with the owning student's advisor.
    async fn get_reference_with_advisor(
        &self,
        id: Uuid,
    ) -> StoreResult<Option<(AchievementReference, Option<String>)>>;

    async fn list_for_student(
        &self,
        student_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Vec<AchievementReference>>;

    /// References of every student advised by `advisor_id`.
    async fn list_for_advisor(
        &self,
        advisor_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Vec<AchievementReference>>;

    async fn list_all(&self, include_deleted: bool) -> StoreResult<Vec<AchievementReference>>;

    /// draft | rejected -> submitted
    async fn submit(&self, id: Uuid, actor_id: &str) -> StoreResult<AchievementReference>;

    /// submitted -> verified
    async fn verify(&self, id: Uuid, verifier_id: &str) -> StoreResult<AchievementReference>;

    /// submitted -> rejected
    async fn reject(
        &self,
        id: Uuid,
        verifier_id: &str,
        note: &str,
    ) -> StoreResult<AchievementReference>;

    /// draft -> deleted
    async fn soft_delete(&self, id: Uuid, actor_id: &str) -> StoreResult<AchievementReference>;

    /// Transition history, oldest first.
    async fn history(&self, id: Uuid) -> StoreResult<Vec<TransitionRecord>>;

    /// Advisor assigned to a student, if any.
    async fn advisor_for(&self, student_id: &str) -> StoreResult<Option<String>>;

    async fn ping(&self) -> StoreResult<()>;
}
