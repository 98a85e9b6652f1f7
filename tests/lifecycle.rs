//! End-to-end lifecycle tests over in-memory stores

mod common;

use common::*;

use achievement_tracker::achievement::model::{
    AddAttachments, AchievementStatus, CreateAchievement, NewAttachment, RejectAchievement,
    UpdateAchievement, VerifyAchievement,
};
use achievement_tracker::achievement::{AchievementError, ListScope};
use achievement_tracker::logging::ReconciliationKind;
use achievement_tracker::store::{DocumentStore, ReferenceStore};
use uuid::Uuid;

fn verify(points: i32) -> VerifyAchievement {
    VerifyAchievement {
        points: Some(points),
    }
}

fn reject(note: &str) -> RejectAchievement {
    RejectAchievement {
        note: Some(note.into()),
    }
}

#[tokio::test]
async fn test_create_submit_verify_awards_points() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("Gemastik 2024"))
        .await
        .unwrap();
    assert_eq!(created.status, AchievementStatus::Draft);
    assert_eq!(created.student_id, S1);
    let content = created.achievement.as_ref().unwrap();
    assert_eq!(content.points, 0);
    assert_eq!(content.tags, vec!["programming", "contest"]);

    let submitted = h
        .engine
        .submit_achievement(&s1, created.reference_id)
        .await
        .unwrap();
    assert_eq!(submitted.status, AchievementStatus::Submitted);
    assert!(submitted.submitted_at.is_some());

    let verified = h
        .engine
        .verify_achievement(&advisor(A1), created.reference_id, verify(50))
        .await
        .unwrap();
    assert_eq!(verified.status, AchievementStatus::Verified);
    assert_eq!(verified.verified_by.as_deref(), Some(A1));
    assert!(verified.verified_at.is_some());
    assert_eq!(verified.achievement.as_ref().unwrap().points, 50);

    let stored = h
        .documents
        .fetch(&created.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.points, 50);
    assert!(h.reconciliation.recent().await.is_empty());
}

#[tokio::test]
async fn test_other_advisor_cannot_review() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    h.engine
        .submit_achievement(&s1, created.reference_id)
        .await
        .unwrap();

    let err = h
        .engine
        .reject_achievement(&advisor(A2), created.reference_id, reject("no"))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::Forbidden);

    let err = h
        .engine
        .verify_achievement(&advisor(A2), created.reference_id, verify(10))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::Forbidden);

    // Admins have no review override either
    let err = h
        .engine
        .verify_achievement(&admin(), created.reference_id, verify(10))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::Forbidden);

    let reference = h
        .references
        .get_reference(created.reference_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reference.status, AchievementStatus::Submitted);
}

#[tokio::test]
async fn test_verify_requires_positive_points() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    h.engine
        .submit_achievement(&s1, created.reference_id)
        .await
        .unwrap();

    for input in [verify(0), verify(-5), VerifyAchievement { points: None }] {
        let err = h
            .engine
            .verify_achievement(&advisor(A1), created.reference_id, input)
            .await
            .unwrap_err();
        assert!(matches!(err, AchievementError::Validation(_)));
    }

    let detail = h
        .engine
        .get_achievement_detail(&s1, created.reference_id)
        .await
        .unwrap();
    assert_eq!(detail.status, AchievementStatus::Submitted);
    assert_eq!(detail.achievement.unwrap().points, 0);
}

#[tokio::test]
async fn test_reject_then_resubmit_keeps_note_in_history() {
    let h = Harness::new().await;
    let s1 = student(S1);
    let a1 = advisor(A1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    let id = created.reference_id;

    h.engine.submit_achievement(&s1, id).await.unwrap();
    let rejected = h
        .engine
        .reject_achievement(&a1, id, reject("missing certificate scan"))
        .await
        .unwrap();
    assert_eq!(rejected.status, AchievementStatus::Rejected);
    assert_eq!(
        rejected.rejection_note.as_deref(),
        Some("missing certificate scan")
    );

    // Rejected content is editable again
    h.engine
        .update_achievement(
            &s1,
            id,
            UpdateAchievement {
                title: Some("X (with certificate)".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let resubmitted = h.engine.submit_achievement(&s1, id).await.unwrap();
    assert_eq!(resubmitted.status, AchievementStatus::Submitted);

    let verified = h.engine.verify_achievement(&a1, id, verify(30)).await.unwrap();
    assert!(verified.rejection_note.is_none());

    let history = h.engine.get_history(&s1, id).await.unwrap();
    let statuses: Vec<_> = history.entries.iter().map(|e| e.to_status).collect();
    assert_eq!(
        statuses,
        vec![
            AchievementStatus::Draft,
            AchievementStatus::Submitted,
            AchievementStatus::Rejected,
            AchievementStatus::Submitted,
            AchievementStatus::Verified,
        ]
    );
    assert_eq!(
        history.entries[2].note.as_deref(),
        Some("missing certificate scan")
    );
    assert_eq!(history.entries[2].actor_id, A1);
}

#[tokio::test]
async fn test_reject_note_must_be_present_but_may_be_empty() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    let id = created.reference_id;
    h.engine.submit_achievement(&s1, id).await.unwrap();

    let err = h
        .engine
        .reject_achievement(&advisor(A1), id, RejectAchievement { note: None })
        .await
        .unwrap_err();
    assert!(matches!(err, AchievementError::Validation(_)));

    let rejected = h
        .engine
        .reject_achievement(&advisor(A1), id, reject(""))
        .await
        .unwrap();
    assert_eq!(rejected.status, AchievementStatus::Rejected);
}

#[tokio::test]
async fn test_illegal_transitions_are_invalid_state() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    let id = created.reference_id;

    // draft cannot be verified
    let err = h
        .engine
        .verify_achievement(&advisor(A1), id, verify(10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AchievementError::InvalidState {
            status: AchievementStatus::Draft,
            ..
        }
    ));

    h.engine.submit_achievement(&s1, id).await.unwrap();

    // submitted is frozen for the owner
    let err = h.engine.submit_achievement(&s1, id).await.unwrap_err();
    assert!(matches!(err, AchievementError::InvalidState { .. }));
    let err = h.engine.delete_achievement(&s1, id).await.unwrap_err();
    assert!(matches!(err, AchievementError::InvalidState { .. }));
    let err = h
        .engine
        .update_achievement(
            &s1,
            id,
            UpdateAchievement {
                description: Some("late edit".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AchievementError::InvalidState { .. }));

    h.engine
        .verify_achievement(&advisor(A1), id, verify(10))
        .await
        .unwrap();

    // verified is terminal for review
    let err = h
        .engine
        .reject_achievement(&advisor(A1), id, reject("changed my mind"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AchievementError::InvalidState {
            status: AchievementStatus::Verified,
            ..
        }
    ));
}

#[tokio::test]
async fn test_students_never_see_each_other() {
    let h = Harness::new().await;

    let created = h
        .engine
        .create_achievement(&student(S1), competition("X"))
        .await
        .unwrap();
    let id = created.reference_id;
    let s2 = student(S2);

    let err = h.engine.get_achievement_detail(&s2, id).await.unwrap_err();
    assert_eq!(err, AchievementError::NotFound);
    let err = h.engine.submit_achievement(&s2, id).await.unwrap_err();
    assert_eq!(err, AchievementError::NotFound);
    let err = h.engine.get_history(&s2, id).await.unwrap_err();
    assert_eq!(err, AchievementError::NotFound);

    // Unknown ids look the same as invisible ones
    let err = h
        .engine
        .get_achievement_detail(&s2, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::NotFound);

    let err = h
        .engine
        .list_achievements(&s2, ListScope::Student(S1.into()))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::Forbidden);
    assert!(h
        .engine
        .list_achievements(&s2, ListScope::Default)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_advisor_reads_advisees_only() {
    let h = Harness::new().await;

    let created = h
        .engine
        .create_achievement(&student(S1), competition("X"))
        .await
        .unwrap();
    h.engine
        .create_achievement(&student(S2), competition("Y"))
        .await
        .unwrap();

    let a1 = advisor(A1);
    let detail = h
        .engine
        .get_achievement_detail(&a1, created.reference_id)
        .await
        .unwrap();
    assert_eq!(detail.advisor_id.as_deref(), Some(A1));

    let listed = h.engine.list_achievements(&a1, ListScope::Default).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].student_id, S1);

    let err = h
        .engine
        .get_achievement_detail(&advisor(A2), created.reference_id)
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::NotFound);

    let err = h
        .engine
        .list_achievements(&a1, ListScope::Student(S2.into()))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::Forbidden);
}

#[tokio::test]
async fn test_deleted_hidden_except_for_admin() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let kept = h
        .engine
        .create_achievement(&s1, competition("kept"))
        .await
        .unwrap();
    let dropped = h
        .engine
        .create_achievement(&s1, competition("dropped"))
        .await
        .unwrap();

    let deleted = h
        .engine
        .delete_achievement(&s1, dropped.reference_id)
        .await
        .unwrap();
    assert_eq!(deleted.status, AchievementStatus::Deleted);

    let own = h.engine.list_achievements(&s1, ListScope::Default).await.unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].reference_id, kept.reference_id);

    let err = h
        .engine
        .get_achievement_detail(&s1, dropped.reference_id)
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::NotFound);

    let advisees = h
        .engine
        .list_achievements(&advisor(A1), ListScope::Default)
        .await
        .unwrap();
    assert_eq!(advisees.len(), 1);

    let all = h
        .engine
        .list_achievements(&admin(), ListScope::Student(S1.into()))
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let detail = h
        .engine
        .get_achievement_detail(&admin(), dropped.reference_id)
        .await
        .unwrap();
    assert_eq!(detail.status, AchievementStatus::Deleted);

    // Soft delete keeps the content
    assert!(detail.achievement.is_some());
}

#[tokio::test]
async fn test_admin_cannot_create_or_mutate() {
    let h = Harness::new().await;

    let err = h
        .engine
        .create_achievement(&admin(), competition("X"))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::Forbidden);

    let created = h
        .engine
        .create_achievement(&student(S1), competition("X"))
        .await
        .unwrap();
    let err = h
        .engine
        .delete_achievement(&admin(), created.reference_id)
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::Forbidden);
}

#[tokio::test]
async fn test_document_create_failure_leaves_nothing() {
    let h = Harness::new().await;
    Harness::fail(&h.documents.fail_create);

    let err = h
        .engine
        .create_achievement(&student(S1), competition("X"))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::StoreFailure);

    let references = h.references.list_for_student(S1, true).await.unwrap();
    assert!(references.is_empty());
    assert!(h.documents.inner.is_empty().await);
}

#[tokio::test]
async fn test_reference_create_failure_compensates() {
    let h = Harness::new().await;
    Harness::fail(&h.references.fail_create);

    let err = h
        .engine
        .create_achievement(&student(S1), competition("X"))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::StoreFailure);

    assert!(h.documents.inner.is_empty().await);
    assert!(h.reconciliation.recent().await.is_empty());
}

#[tokio::test]
async fn test_failed_compensation_is_reported() {
    let h = Harness::new().await;
    Harness::fail(&h.references.fail_create);
    Harness::fail(&h.documents.fail_delete);

    let err = h
        .engine
        .create_achievement(&student(S1), competition("X"))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::StoreFailure);

    // The orphan document stays and is reported
    assert_eq!(h.documents.inner.len().await, 1);
    let events = h.reconciliation.recent().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ReconciliationKind::CompensationFailure);
    assert_eq!(events[0].student_id.as_deref(), Some(S1));

    // The reference is never resurrected
    Harness::heal(&h.references.fail_create);
    assert!(h
        .references
        .list_for_student(S1, true)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unstorable_details_rejected_before_any_write() {
    let h = Harness::new().await;
    let s1 = student(S1);

    for details in [
        serde_json::json!({"ticket": 18446744073709551615u64}),
        serde_json::json!({"$where": 1}),
        serde_json::json!({"judges": [{"name": "x", "$ne": null}]}),
    ] {
        let err = h
            .engine
            .create_achievement(
                &s1,
                CreateAchievement {
                    achievement_type: "hackathon".into(),
                    title: "Garuda Hacks".into(),
                    details: Some(details),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AchievementError::Validation(_)), "{:?}", err);
    }

    assert!(h.documents.inner.is_empty().await);
    assert!(h.references.list_for_student(S1, true).await.unwrap().is_empty());
    assert!(h.reconciliation.recent().await.is_empty());
}

#[tokio::test]
async fn test_create_returns_stored_timestamps() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    let returned = created.achievement.unwrap();
    assert!(returned.created_at.is_some());

    let detail = h
        .engine
        .get_achievement_detail(&s1, created.reference_id)
        .await
        .unwrap();
    let stored = detail.achievement.unwrap();
    assert_eq!(returned.id, created.document_id);
    assert_eq!(returned.created_at, stored.created_at);
    assert_eq!(returned.updated_at, stored.updated_at);
}

#[tokio::test]
async fn test_verify_reference_failure_orphans_points() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    let id = created.reference_id;
    h.engine.submit_achievement(&s1, id).await.unwrap();

    Harness::fail(&h.references.fail_verify);
    let err = h
        .engine
        .verify_achievement(&advisor(A1), id, verify(40))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::StoreFailure);

    let stored = h
        .documents
        .fetch(&created.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.points, 40);

    let reference = h.references.get_reference(id).await.unwrap().unwrap();
    assert_eq!(reference.status, AchievementStatus::Submitted);

    let events = h.reconciliation.recent().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ReconciliationKind::VerifyPointsOrphaned);
    assert_eq!(events[0].reference_id, Some(id));
    assert_eq!(events[0].points, Some(40));

    // A retry completes the verification
    Harness::heal(&h.references.fail_verify);
    let verified = h
        .engine
        .verify_achievement(&advisor(A1), id, verify(40))
        .await
        .unwrap();
    assert_eq!(verified.status, AchievementStatus::Verified);
}

#[tokio::test]
async fn test_verify_point_write_failure_changes_nothing() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    let id = created.reference_id;
    h.engine.submit_achievement(&s1, id).await.unwrap();

    Harness::fail(&h.documents.fail_update);
    let err = h
        .engine
        .verify_achievement(&advisor(A1), id, verify(40))
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::StoreFailure);

    let reference = h.references.get_reference(id).await.unwrap().unwrap();
    assert_eq!(reference.status, AchievementStatus::Submitted);
    assert!(h.reconciliation.recent().await.is_empty());
}

#[tokio::test]
async fn test_missing_document_yields_view_without_content() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    h.documents.inner.delete(&created.document_id).await.unwrap();

    let detail = h
        .engine
        .get_achievement_detail(&s1, created.reference_id)
        .await
        .unwrap();
    assert!(detail.achievement.is_none());

    let events = h.reconciliation.recent().await;
    assert_eq!(events[0].kind, ReconciliationKind::DanglingReference);
    assert_eq!(events[0].document_id, created.document_id);
}

#[tokio::test]
async fn test_listing_survives_document_fetch_failure() {
    let h = Harness::new().await;
    let s1 = student(S1);

    for title in ["First", "Second"] {
        h.engine
            .create_achievement(&s1, competition(title))
            .await
            .unwrap();
    }

    Harness::fail(&h.documents.fail_fetch);
    let listed = h
        .engine
        .list_achievements(&s1, ListScope::Default)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|view| view.achievement.is_none()));
    assert!(listed
        .iter()
        .all(|view| view.status == AchievementStatus::Draft));

    // Single reads still surface the outage
    let err = h
        .engine
        .get_achievement_detail(&s1, listed[0].reference_id)
        .await
        .unwrap_err();
    assert_eq!(err, AchievementError::StoreFailure);

    Harness::heal(&h.documents.fail_fetch);
    let listed = h
        .engine
        .list_achievements(&s1, ListScope::Default)
        .await
        .unwrap();
    assert!(listed.iter().all(|view| view.achievement.is_some()));
}

#[tokio::test]
async fn test_update_merges_and_validates_details() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    let id = created.reference_id;

    let err = h
        .engine
        .update_achievement(&s1, id, UpdateAchievement::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AchievementError::Validation(_)));

    let err = h
        .engine
        .update_achievement(
            &s1,
            id,
            UpdateAchievement {
                details: Some(serde_json::json!({"journal": "not a competition field"})),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AchievementError::Validation(_)));

    let err = h
        .engine
        .update_achievement(
            &s1,
            id,
            UpdateAchievement {
                details: Some(serde_json::json!({"customFields": {"$inc": {"points": 100}}})),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AchievementError::Validation(_)));

    let updated = h
        .engine
        .update_achievement(
            &s1,
            id,
            UpdateAchievement {
                tags: Some(vec!["icpc".into(), "icpc".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let content = updated.achievement.unwrap();
    assert_eq!(content.tags, vec!["icpc"]);
    assert_eq!(content.title, "X");
    assert_eq!(content.description, "National programming contest");
}

#[tokio::test]
async fn test_attachments_append_while_editable() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    let id = created.reference_id;

    let attachment = |name: &str| NewAttachment {
        file_name: name.into(),
        file_url: format!("https://files.example/{}", name),
        file_type: "application/pdf".into(),
    };

    h.engine
        .add_attachments(
            &s1,
            id,
            AddAttachments {
                attachments: vec![attachment("certificate.pdf")],
            },
        )
        .await
        .unwrap();
    let view = h
        .engine
        .add_attachments(
            &s1,
            id,
            AddAttachments {
                attachments: vec![attachment("photo.pdf")],
            },
        )
        .await
        .unwrap();
    assert_eq!(view.achievement.unwrap().attachments.len(), 2);

    let err = h
        .engine
        .add_attachments(&s1, id, AddAttachments::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AchievementError::Validation(_)));

    h.engine.submit_achievement(&s1, id).await.unwrap();
    let err = h
        .engine
        .add_attachments(
            &s1,
            id,
            AddAttachments {
                attachments: vec![attachment("late.pdf")],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AchievementError::InvalidState { .. }));
}

#[tokio::test]
async fn test_concurrent_submits_one_wins() {
    let h = Harness::new().await;
    let s1 = student(S1);

    let created = h
        .engine
        .create_achievement(&s1, competition("X"))
        .await
        .unwrap();
    let id = created.reference_id;

    let (first, second) = tokio::join!(
        h.engine.submit_achievement(&s1, id),
        h.engine.submit_achievement(&s1, id)
    );
    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

    let err = first.err().or(second.err()).unwrap();
    assert!(matches!(err, AchievementError::InvalidState { .. }));

    let history = h.engine.get_history(&s1, id).await.unwrap();
    assert_eq!(history.entries.len(), 2);
}
