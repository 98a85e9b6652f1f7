//! Shared fixtures for integration tests
//!
//! Both stores are wrapped so individual calls can be made to fail, which is
//! how the cross-store failure paths are exercised without a real outage.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use achievement_tracker::achievement::model::{
    Achievement, AchievementPatch, AchievementReference, CreateAchievement, NewAchievement,
    NewAttachment, TransitionRecord,
};
use achievement_tracker::achievement::AchievementEngine;
use achievement_tracker::auth::{Permission, Principal, Role};
use achievement_tracker::logging::ReconciliationLog;
use achievement_tracker::store::{
    DocumentStore, InMemoryDocumentStore, ReferenceStore, SqliteReferenceStore, StoreError,
    StoreResult,
};

pub const S1: &str = "S1";
pub const S2: &str = "S2";
pub const A1: &str = "A1";
pub const A2: &str = "A2";
pub const ADMIN: &str = "ADM";

fn injected() -> StoreError {
    StoreError::Backend("injected failure".into())
}

fn tripped(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

// ============================================================================
// Document store
// ============================================================================

#[derive(Default)]
pub struct FlakyDocuments {
    pub inner: InMemoryDocumentStore,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub fail_ping: AtomicBool,
}

#[async_trait]
impl DocumentStore for FlakyDocuments {
    async fn create(&self, achievement: NewAchievement) -> StoreResult<Achievement> {
        if tripped(&self.fail_create) {
            return Err(injected());
        }
        self.inner.create(achievement).await
    }

    async fn partial_update(&self, id: &str, patch: AchievementPatch) -> StoreResult<()> {
        if tripped(&self.fail_update) {
            return Err(injected());
        }
        self.inner.partial_update(id, patch).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        if tripped(&self.fail_delete) {
            return Err(injected());
        }
        self.inner.delete(id).await
    }

    async fn fetch(&self, id: &str) -> StoreResult<Option<Achievement>> {
        if tripped(&self.fail_fetch) {
            return Err(injected());
        }
        self.inner.fetch(id).await
    }

    async fn append_attachments(
        &self,
        id: &str,
        attachments: Vec<NewAttachment>,
    ) -> StoreResult<()> {
        if tripped(&self.fail_update) {
            return Err(injected());
        }
        self.inner.append_attachments(id, attachments).await
    }

    async fn ping(&self) -> StoreResult<()> {
        if tripped(&self.fail_ping) {
            return Err(injected());
        }
        self.inner.ping().await
    }
}

// ============================================================================
// Reference store
// ============================================================================

pub struct FlakyReferences {
    pub inner: SqliteReferenceStore,
    pub fail_create: AtomicBool,
    pub fail_verify: AtomicBool,
    pub fail_ping: AtomicBool,
}

impl FlakyReferences {
    pub fn new(inner: SqliteReferenceStore) -> Self {
        Self {
            inner,
            fail_create: AtomicBool::new(false),
            fail_verify: AtomicBool::new(false),
            fail_ping: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ReferenceStore for FlakyReferences {
    async fn create_reference(
        &self,
        student_id: &str,
        document_id: &str,
    ) -> StoreResult<AchievementReference> {
        if tripped(&self.fail_create) {
            return Err(injected());
        }
        self.inner.create_reference(student_id, document_id).await
    }

    async fn get_reference(&self, id: Uuid) -> StoreResult<Option<AchievementReference>> {
        self.inner.get_reference(id).await
    }

    async fn get_reference_with_advisor(
        &self,
        id: Uuid,
    ) -> StoreResult<Option<(AchievementReference, Option<String>)>> {
        self.inner.get_reference_with_advisor(id).await
    }

    async fn list_for_student(
        &self,
        student_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Vec<AchievementReference>> {
        self.inner.list_for_student(student_id, include_deleted).await
    }

    async fn list_for_advisor(
        &self,
        advisor_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Vec<AchievementReference>> {
        self.inner.list_for_advisor(advisor_id, include_deleted).await
    }

    async fn list_all(&self, include_deleted: bool) -> StoreResult<Vec<AchievementReference>> {
        self.inner.list_all(include_deleted).await
    }

    async fn submit(&self, id: Uuid, actor_id: &str) -> StoreResult<AchievementReference> {
        self.inner.submit(id, actor_id).await
    }

    async fn verify(&self, id: Uuid, verifier_id: &str) -> StoreResult<AchievementReference> {
        if tripped(&self.fail_verify) {
            return Err(injected());
        }
        self.inner.verify(id, verifier_id).await
    }

    async fn reject(
        &self,
        id: Uuid,
        verifier_id: &str,
        note: &str,
    ) -> StoreResult<AchievementReference> {
        self.inner.reject(id, verifier_id, note).await
    }

    async fn soft_delete(&self, id: Uuid, actor_id: &str) -> StoreResult<AchievementReference> {
        self.inner.soft_delete(id, actor_id).await
    }

    async fn history(&self, id: Uuid) -> StoreResult<Vec<TransitionRecord>> {
        self.inner.history(id).await
    }

    async fn advisor_for(&self, student_id: &str) -> StoreResult<Option<String>> {
        self.inner.advisor_for(student_id).await
    }

    async fn ping(&self) -> StoreResult<()> {
        if tripped(&self.fail_ping) {
            return Err(injected());
        }
        self.inner.ping().await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub engine: AchievementEngine,
    pub documents: Arc<FlakyDocuments>,
    pub references: Arc<FlakyReferences>,
    pub reconciliation: ReconciliationLog,
}

impl Harness {
    /// In-memory stores with S1 advised by A1 and S2 advised by A2.
    pub async fn new() -> Self {
        let sqlite = SqliteReferenceStore::open_in_memory().unwrap();
        sqlite.upsert_student(S1, Some(A1)).await.unwrap();
        sqlite.upsert_student(S2, Some(A2)).await.unwrap();

        let documents = Arc::new(FlakyDocuments::default());
        let references = Arc::new(FlakyReferences::new(sqlite));
        let reconciliation = ReconciliationLog::new();

        let engine = AchievementEngine::new(
            documents.clone(),
            references.clone(),
            reconciliation.clone(),
        );

        Self {
            engine,
            documents,
            references,
            reconciliation,
        }
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn heal(flag: &AtomicBool) {
        flag.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Principals and inputs
// ============================================================================

pub fn student(id: &str) -> Principal {
    Principal::new(id, Role::Student).with_permissions([
        Permission::Read,
        Permission::Create,
        Permission::Update,
        Permission::Delete,
    ])
}

pub fn advisor(id: &str) -> Principal {
    Principal::new(id, Role::Advisor).with_permissions([Permission::Read, Permission::Verify])
}

pub fn admin() -> Principal {
    Principal::new(ADMIN, Role::Admin).with_permissions([Permission::Manage])
}

pub fn competition(title: &str) -> CreateAchievement {
    CreateAchievement {
        achievement_type: "competition".into(),
        title: title.into(),
        description: Some("National programming contest".into()),
        details: Some(serde_json::json!({
            "competitionName": "Gemastik",
            "competitionLevel": "national",
            "rank": 1,
            "medalType": "gold"
        })),
        tags: vec!["programming".into(), " programming ".into(), "contest".into()],
    }
}
