//! Achievement lifecycle engine
//!
//! Owns the state machine and the write ordering across the two stores:
//!
//! - create: document first, then reference. A failed reference write is
//!   compensated by deleting the document.
//! - verify: points into the document first, then the reference flips to
//!   `verified`. A failed flip leaves points on a `submitted` reference; this
//!   is reported, not repaired.
//! - everything else touches one store.
//!
//! Every operation validates input, loads the reference, consults the policy,
//! and checks the current status before writing anything.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{AchievementError, AchievementResult};
use super::model::{
    normalize_tags, Achievement, AchievementDetails, AchievementHistory, AchievementPatch,
    AchievementReference, AchievementStatus, AchievementView, AddAttachments, CreateAchievement,
    NewAchievement, RejectAchievement, UpdateAchievement, VerifyAchievement,
};
use super::policy::{self, Decision, Operation};
use crate::auth::{Principal, Role};
use crate::logging::{ReconciliationEvent, ReconciliationKind, ReconciliationLog};
use crate::store::{DocumentStore, ReferenceStore, StoreError};

/// Longest accepted title
pub const MAX_TITLE_LEN: usize = 200;

/// Which references a listing covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Derived from the caller's role: own, advisees', or everything for admins
    Default,
    /// One student's references
    Student(String),
}

/// The lifecycle engine
#[derive(Clone)]
pub struct AchievementEngine {
    documents: Arc<dyn DocumentStore>,
    references: Arc<dyn ReferenceStore>,
    reconciliation: ReconciliationLog,
}

impl AchievementEngine {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        references: Arc<dyn ReferenceStore>,
        reconciliation: ReconciliationLog,
    ) -> Self {
        Self {
            documents,
            references,
            reconciliation,
        }
    }

    pub fn reconciliation(&self) -> &ReconciliationLog {
        &self.reconciliation
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    pub fn references(&self) -> &Arc<dyn ReferenceStore> {
        &self.references
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Create a draft achievement owned by the calling student.
    pub async fn create_achievement(
        &self,
        principal: &Principal,
        input: CreateAchievement,
    ) -> AchievementResult<AchievementView> {
        if !policy::can_create(principal) {
            return Err(AchievementError::Forbidden);
        }
        let new = validate_create(&principal.id, input)?;

        let achievement = self.documents.create(new).await.map_err(|e| {
            error!(student_id = %principal.id, "Document create failed: {}", e);
            AchievementError::StoreFailure
        })?;
        let document_id = achievement.id.clone();

        let reference = match self
            .references
            .create_reference(&principal.id, &document_id)
            .await
        {
            Ok(reference) => reference,
            Err(e) => {
                warn!(
                    student_id = %principal.id,
                    document_id = %document_id,
                    "Reference create failed, compensating: {}", e
                );
                self.compensate_create(&principal.id, &document_id).await;
                return Err(AchievementError::StoreFailure);
            }
        };

        info!(
            reference_id = %reference.id,
            document_id = %document_id,
            student_id = %principal.id,
            "Achievement created"
        );

        Ok(AchievementView::new(reference, None, Some(achievement)))
    }

    /// Edit content of a draft or rejected achievement.
    pub async fn update_achievement(
        &self,
        principal: &Principal,
        id: Uuid,
        input: UpdateAchievement,
    ) -> AchievementResult<AchievementView> {
        if input.is_empty() {
            return Err(AchievementError::validation(
                "at least one of title, description, details, tags is required",
            ));
        }
        if let Some(title) = &input.title {
            validate_title(title)?;
        }

        let (reference, advisor) = self.load(id).await?;
        authorize(principal, &reference, advisor.as_deref(), Operation::Update)?;
        require_editable(&reference, Operation::Update)?;

        let patch = match input.details {
            Some(details) => {
                let current = self.require_document(&reference).await?;
                let details = AchievementDetails::parse(&current.achievement_type, Some(details))
                    .map_err(AchievementError::Validation)?;
                content_patch(input.title, input.description, Some(details), input.tags)
            }
            None => content_patch(input.title, input.description, None, input.tags),
        };

        self.documents
            .partial_update(&reference.document_id, patch)
            .await
            .map_err(|e| document_write_failed(&reference, e))?;

        info!(reference_id = %reference.id, "Achievement content updated");
        self.view(reference, advisor).await
    }

    /// Soft-delete a draft.
    pub async fn delete_achievement(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> AchievementResult<AchievementReference> {
        let (reference, advisor) = self.load(id).await?;
        authorize(principal, &reference, advisor.as_deref(), Operation::Delete)?;
        require_status(&reference, &[AchievementStatus::Draft], Operation::Delete)?;

        let deleted = self
            .references
            .soft_delete(reference.id, &principal.id)
            .await
            .map_err(|e| transition_failed(&reference, Operation::Delete, e))?;

        info!(reference_id = %deleted.id, "Achievement deleted");
        Ok(deleted)
    }

    /// Submit a draft or rejected achievement for review.
    pub async fn submit_achievement(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> AchievementResult<AchievementView> {
        let (reference, advisor) = self.load(id).await?;
        authorize(principal, &reference, advisor.as_deref(), Operation::Submit)?;
        require_status(
            &reference,
            &[AchievementStatus::Draft, AchievementStatus::Rejected],
            Operation::Submit,
        )?;

        let submitted = self
            .references
            .submit(reference.id, &principal.id)
            .await
            .map_err(|e| transition_failed(&reference, Operation::Submit, e))?;

        info!(reference_id = %submitted.id, "Achievement submitted");
        self.view(submitted, advisor).await
    }

    /// Verify a submitted achievement and award points.
    pub async fn verify_achievement(
        &self,
        principal: &Principal,
        id: Uuid,
        input: VerifyAchievement,
    ) -> AchievementResult<AchievementView> {
        let points = match input.points {
            Some(p) if p > 0 => p,
            Some(_) => return Err(AchievementError::validation("points must be greater than 0")),
            None => return Err(AchievementError::validation("points is required")),
        };

        let (reference, advisor) = self.load(id).await?;
        authorize(principal, &reference, advisor.as_deref(), Operation::Verify)?;
        require_status(&reference, &[AchievementStatus::Submitted], Operation::Verify)?;

        self.documents
            .partial_update(&reference.document_id, AchievementPatch::points(points))
            .await
            .map_err(|e| document_write_failed(&reference, e))?;

        let verified = match self.references.verify(reference.id, &principal.id).await {
            Ok(verified) => verified,
            Err(e) => {
                self.reconciliation
                    .record(
                        ReconciliationEvent::new(
                            ReconciliationKind::VerifyPointsOrphaned,
                            &reference.document_id,
                        )
                        .with_reference(reference.id)
                        .with_student(&reference.student_id)
                        .with_points(points)
                        .with_detail(e.to_string()),
                    )
                    .await;
                return Err(transition_failed(&reference, Operation::Verify, e));
            }
        };

        info!(
            reference_id = %verified.id,
            verified_by = %principal.id,
            points,
            "Achievement verified"
        );
        self.view(verified, advisor).await
    }

    /// Reject a submitted achievement with a note.
    pub async fn reject_achievement(
        &self,
        principal: &Principal,
        id: Uuid,
        input: RejectAchievement,
    ) -> AchievementResult<AchievementView> {
        let note = input
            .note
            .ok_or_else(|| AchievementError::validation("note is required"))?;

        let (reference, advisor) = self.load(id).await?;
        authorize(principal, &reference, advisor.as_deref(), Operation::Reject)?;
        require_status(&reference, &[AchievementStatus::Submitted], Operation::Reject)?;

        let rejected = self
            .references
            .reject(reference.id, &principal.id, &note)
            .await
            .map_err(|e| transition_failed(&reference, Operation::Reject, e))?;

        info!(
            reference_id = %rejected.id,
            verified_by = %principal.id,
            "Achievement rejected"
        );
        self.view(rejected, advisor).await
    }

    /// Reference metadata merged with content.
    pub async fn get_achievement_detail(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> AchievementResult<AchievementView> {
        let (reference, advisor) = self.load(id).await?;
        authorize(principal, &reference, advisor.as_deref(), Operation::Read)?;
        self.view(reference, advisor).await
    }

    /// List references visible to the caller, merged with content.
    pub async fn list_achievements(
        &self,
        principal: &Principal,
        scope: ListScope,
    ) -> AchievementResult<Vec<AchievementView>> {
        let references = match (&scope, principal.role) {
            (ListScope::Default, Role::Admin) => self.references.list_all(true).await,
            (ListScope::Default, Role::Student) => {
                self.references.list_for_student(&principal.id, false).await
            }
            (ListScope::Default, Role::Advisor) => {
                self.references.list_for_advisor(&principal.id, false).await
            }
            (ListScope::Student(student_id), Role::Admin) => {
                self.references.list_for_student(student_id, true).await
            }
            (ListScope::Student(student_id), Role::Student) => {
                if *student_id != principal.id {
                    return Err(AchievementError::Forbidden);
                }
                self.references.list_for_student(student_id, false).await
            }
            (ListScope::Student(student_id), Role::Advisor) => {
                let advisor = self.references.advisor_for(student_id).await.map_err(|e| {
                    error!(student_id = %student_id, "Advisor lookup failed: {}", e);
                    AchievementError::StoreFailure
                })?;
                if advisor.as_deref() != Some(principal.id.as_str()) {
                    return Err(AchievementError::Forbidden);
                }
                self.references.list_for_student(student_id, false).await
            }
        }
        .map_err(|e| {
            error!(principal_id = %principal.id, scope = ?scope, "Listing failed: {}", e);
            AchievementError::StoreFailure
        })?;

        let views = references.into_iter().map(|reference| self.list_view(reference));
        Ok(join_all(views).await)
    }

    /// Status history of one reference.
    pub async fn get_history(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> AchievementResult<AchievementHistory> {
        let (reference, advisor) = self.load(id).await?;
        authorize(principal, &reference, advisor.as_deref(), Operation::Read)?;

        let entries = self.references.history(reference.id).await.map_err(|e| {
            error!(reference_id = %reference.id, "History read failed: {}", e);
            AchievementError::StoreFailure
        })?;

        Ok(AchievementHistory {
            reference_id: reference.id,
            status: reference.status,
            entries,
        })
    }

    /// Append attachment metadata to a draft or rejected achievement.
    pub async fn add_attachments(
        &self,
        principal: &Principal,
        id: Uuid,
        input: AddAttachments,
    ) -> AchievementResult<AchievementView> {
        if input.attachments.is_empty() {
            return Err(AchievementError::validation("at least one attachment is required"));
        }
        for attachment in &input.attachments {
            if attachment.file_name.trim().is_empty() || attachment.file_url.trim().is_empty() {
                return Err(AchievementError::validation(
                    "attachments need a fileName and fileUrl",
                ));
            }
        }

        let (reference, advisor) = self.load(id).await?;
        authorize(principal, &reference, advisor.as_deref(), Operation::AttachFiles)?;
        require_editable(&reference, Operation::AttachFiles)?;

        let count = input.attachments.len();
        self.documents
            .append_attachments(&reference.document_id, input.attachments)
            .await
            .map_err(|e| document_write_failed(&reference, e))?;

        info!(reference_id = %reference.id, count, "Attachments added");
        self.view(reference, advisor).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, id: Uuid) -> AchievementResult<(AchievementReference, Option<String>)> {
        match self.references.get_reference_with_advisor(id).await {
            Ok(Some(found)) => Ok(found),
            Ok(None) => Err(AchievementError::NotFound),
            Err(e) => {
                error!(reference_id = %id, "Reference load failed: {}", e);
                Err(AchievementError::StoreFailure)
            }
        }
    }

    /// Merge a reference with its document. A missing document is reported and
    /// yields a view without content.
    async fn view(
        &self,
        reference: AchievementReference,
        advisor: Option<String>,
    ) -> AchievementResult<AchievementView> {
        let achievement = match self.documents.fetch(&reference.document_id).await {
            Ok(Some(achievement)) => Some(achievement),
            Ok(None) => {
                self.report_dangling(&reference).await;
                None
            }
            Err(e) => {
                error!(
                    reference_id = %reference.id,
                    document_id = %reference.document_id,
                    "Document fetch failed: {}", e
                );
                return Err(AchievementError::StoreFailure);
            }
        };
        Ok(AchievementView::new(reference, advisor, achievement))
    }

    /// Listing counterpart of `view`: a failed fetch drops the content of
    /// that one entry instead of failing the listing.
    async fn list_view(&self, reference: AchievementReference) -> AchievementView {
        let achievement = match self.documents.fetch(&reference.document_id).await {
            Ok(found) => {
                if found.is_none() {
                    self.report_dangling(&reference).await;
                }
                found
            }
            Err(e) => {
                error!(
                    reference_id = %reference.id,
                    document_id = %reference.document_id,
                    "Document fetch failed, listing without content: {}", e
                );
                None
            }
        };
        AchievementView::new(reference, None, achievement)
    }

    async fn require_document(
        &self,
        reference: &AchievementReference,
    ) -> AchievementResult<Achievement> {
        match self.documents.fetch(&reference.document_id).await {
            Ok(Some(achievement)) => Ok(achievement),
            Ok(None) => {
                self.report_dangling(reference).await;
                Err(AchievementError::StoreFailure)
            }
            Err(e) => {
                error!(reference_id = %reference.id, "Document fetch failed: {}", e);
                Err(AchievementError::StoreFailure)
            }
        }
    }

    async fn report_dangling(&self, reference: &AchievementReference) {
        self.reconciliation
            .record(
                ReconciliationEvent::new(
                    ReconciliationKind::DanglingReference,
                    &reference.document_id,
                )
                .with_reference(reference.id)
                .with_student(&reference.student_id),
            )
            .await;
    }

    /// Undo a document create whose reference never landed.
    async fn compensate_create(&self, student_id: &str, document_id: &str) {
        match self.documents.delete(document_id).await {
            Ok(()) => info!(document_id = %document_id, "Compensating delete succeeded"),
            Err(e) => {
                self.reconciliation
                    .record(
                        ReconciliationEvent::new(
                            ReconciliationKind::CompensationFailure,
                            document_id,
                        )
                        .with_student(student_id)
                        .with_detail(e.to_string()),
                    )
                    .await;
            }
        }
    }
}

// ============================================================================
// Guards
// ============================================================================

fn authorize(
    principal: &Principal,
    reference: &AchievementReference,
    advisor_id: Option<&str>,
    operation: Operation,
) -> AchievementResult<()> {
    let decision = policy::decide(principal, reference, advisor_id, operation);
    if decision != Decision::Allow {
        warn!(
            principal_id = %principal.id,
            role = %principal.role,
            reference_id = %reference.id,
            operation = operation.as_str(),
            decision = ?decision,
            "Access denied"
        );
    }
    decision.into_result()
}

fn require_status(
    reference: &AchievementReference,
    allowed: &[AchievementStatus],
    operation: Operation,
) -> AchievementResult<()> {
    if allowed.contains(&reference.status) {
        Ok(())
    } else {
        Err(AchievementError::InvalidState {
            status: reference.status,
            operation: operation.as_str(),
        })
    }
}

fn require_editable(reference: &AchievementReference, operation: Operation) -> AchievementResult<()> {
    if reference.status.is_editable() {
        Ok(())
    } else {
        Err(AchievementError::InvalidState {
            status: reference.status,
            operation: operation.as_str(),
        })
    }
}

fn document_write_failed(reference: &AchievementReference, e: StoreError) -> AchievementError {
    error!(
        reference_id = %reference.id,
        document_id = %reference.document_id,
        "Document write failed: {}", e
    );
    AchievementError::StoreFailure
}

/// Map a failed relational transition. A lost compare-and-set means another
/// request moved the status first.
fn transition_failed(
    reference: &AchievementReference,
    operation: Operation,
    e: StoreError,
) -> AchievementError {
    match e {
        StoreError::Conflict(msg) => {
            warn!(reference_id = %reference.id, "Concurrent transition: {}", msg);
            AchievementError::InvalidState {
                status: reference.status,
                operation: operation.as_str(),
            }
        }
        StoreError::NotFound => AchievementError::NotFound,
        StoreError::Backend(msg) => {
            error!(
                reference_id = %reference.id,
                operation = operation.as_str(),
                "Reference write failed: {}", msg
            );
            AchievementError::StoreFailure
        }
    }
}

// ============================================================================
// Input validation
// ============================================================================

fn validate_title(title: &str) -> AchievementResult<()> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AchievementError::validation("title must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AchievementError::validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn validate_create(student_id: &str, input: CreateAchievement) -> AchievementResult<NewAchievement> {
    let achievement_type = input.achievement_type.trim().to_ascii_lowercase();
    if achievement_type.is_empty() {
        return Err(AchievementError::validation("achievementType is required"));
    }
    validate_title(&input.title)?;

    let details = AchievementDetails::parse(&achievement_type, input.details)
        .map_err(AchievementError::Validation)?;

    Ok(NewAchievement {
        student_id: student_id.to_string(),
        achievement_type,
        title: input.title.trim().to_string(),
        description: input.description.unwrap_or_default(),
        details,
        tags: normalize_tags(input.tags),
    })
}

fn content_patch(
    title: Option<String>,
    description: Option<String>,
    details: Option<AchievementDetails>,
    tags: Option<Vec<String>>,
) -> AchievementPatch {
    AchievementPatch {
        title: title.map(|t| t.trim().to_string()),
        description,
        details,
        tags: tags.map(normalize_tags),
        points: None,
    }
}
