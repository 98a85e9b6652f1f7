//! SQLite reference store
//!
//! Lifecycle rows live in `achievement_references`. Transitions are
//! compare-and-set on `status` inside an immediate transaction, and each one
//! appends to `achievement_transitions`. Timestamps come from SQLite's clock.

use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ReferenceStore, StoreError, StoreResult};
use crate::achievement::model::{AchievementReference, AchievementStatus, TransitionRecord};
use crate::db::sqlite::models::{NewReferenceRow, NewTransitionRow, ReferenceRow, TransitionRow};
use crate::db::sqlite::schema::{
    achievement_references as refs, achievement_transitions as transitions, students, STORE_NOW,
};
use crate::db::{open_in_memory_pool, open_pool, DbPool};
use crate::types::TrackerError;

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => StoreError::NotFound,
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

fn corrupt(msg: String) -> StoreError {
    StoreError::Backend(format!("corrupt reference row: {}", msg))
}

fn to_domain(row: ReferenceRow) -> StoreResult<AchievementReference> {
    AchievementReference::try_from(row).map_err(corrupt)
}

fn to_domain_list(rows: Vec<ReferenceRow>) -> StoreResult<Vec<AchievementReference>> {
    rows.into_iter().map(to_domain).collect()
}

fn now_text() -> diesel::expression::SqlLiteral<Text> {
    sql::<Text>(STORE_NOW)
}

fn now_nullable() -> diesel::expression::SqlLiteral<Nullable<Text>> {
    sql::<Nullable<Text>>(STORE_NOW)
}

/// Newest first; rowid breaks ties between rows created in the same millisecond.
fn rowid_desc() -> diesel::dsl::Desc<diesel::expression::SqlLiteral<BigInt>> {
    sql::<BigInt>("achievement_references.rowid").desc()
}

/// Requested state change
#[derive(Debug, Clone)]
enum Transition {
    Submit,
    Verify { verifier_id: String },
    Reject { verifier_id: String, note: String },
    Delete,
}

impl Transition {
    fn allowed_from(&self) -> &'static [AchievementStatus] {
        match self {
            Transition::Submit => &[AchievementStatus::Draft, AchievementStatus::Rejected],
            Transition::Verify { .. } | Transition::Reject { .. } => &[AchievementStatus::Submitted],
            Transition::Delete => &[AchievementStatus::Draft],
        }
    }

    fn target(&self) -> AchievementStatus {
        match self {
            Transition::Submit => AchievementStatus::Submitted,
            Transition::Verify { .. } => AchievementStatus::Verified,
            Transition::Reject { .. } => AchievementStatus::Rejected,
            Transition::Delete => AchievementStatus::Deleted,
        }
    }

    fn note(&self) -> Option<&str> {
        match self {
            Transition::Reject { note, .. } => Some(note.as_str()),
            _ => None,
        }
    }
}

/// Apply a transition atomically. Returns the updated row.
fn apply_transition(
    conn: &mut SqliteConnection,
    id: &str,
    actor_id: &str,
    transition: &Transition,
) -> StoreResult<ReferenceRow> {
    conn.immediate_transaction::<_, StoreError, _>(|conn| {
        let current: String = refs::table
            .filter(refs::id.eq(id))
            .select(refs::status)
            .first::<String>(conn)
            .optional()?
            .ok_or(StoreError::NotFound)?;

        let allowed: Vec<&str> = transition
            .allowed_from()
            .iter()
            .map(AchievementStatus::as_str)
            .collect();
        let target = refs::table
            .filter(refs::id.eq(id))
            .filter(refs::status.eq_any(allowed));
        let to = transition.target().as_str();

        let changed = match transition {
            Transition::Submit => diesel::update(target)
                .set((
                    refs::status.eq(to),
                    refs::submitted_at.eq(now_nullable()),
                    refs::updated_at.eq(now_text()),
                ))
                .execute(conn)?,
            Transition::Verify { verifier_id } => diesel::update(target)
                .set((
                    refs::status.eq(to),
                    refs::verified_at.eq(now_nullable()),
                    refs::verified_by.eq(verifier_id.as_str()),
                    refs::rejection_note.eq(None::<String>),
                    refs::updated_at.eq(now_text()),
                ))
                .execute(conn)?,
            Transition::Reject { verifier_id, note } => diesel::update(target)
                .set((
                    refs::status.eq(to),
                    refs::verified_at.eq(now_nullable()),
                    refs::verified_by.eq(verifier_id.as_str()),
                    refs::rejection_note.eq(note.as_str()),
                    refs::updated_at.eq(now_text()),
                ))
                .execute(conn)?,
            Transition::Delete => diesel::update(target)
                .set((refs::status.eq(to), refs::updated_at.eq(now_text())))
                .execute(conn)?,
        };

        if changed == 0 {
            return Err(StoreError::Conflict(format!(
                "reference {} is '{}', cannot move to '{}'",
                id, current, to
            )));
        }

        diesel::insert_into(transitions::table)
            .values(&NewTransitionRow {
                reference_id: id,
                from_status: Some(current.as_str()),
                to_status: to,
                actor_id,
                note: transition.note(),
            })
            .execute(conn)?;

        let row = refs::table
            .filter(refs::id.eq(id))
            .select(ReferenceRow::as_select())
            .first::<ReferenceRow>(conn)?;
        Ok(row)
    })
}

/// Reference store backed by SQLite through an r2d2 pool
#[derive(Clone)]
pub struct SqliteReferenceStore {
    pool: DbPool,
}

impl SqliteReferenceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (or create) a file-backed store
    pub fn open(
        path: &std::path::Path,
        max_size: u32,
        busy_timeout_ms: u64,
    ) -> Result<Self, TrackerError> {
        Ok(Self::new(open_pool(path, max_size, busy_timeout_ms)?))
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self, TrackerError> {
        Ok(Self::new(open_in_memory_pool()?))
    }

    /// Run a blocking diesel closure on the blocking thread pool
    async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Backend(format!("Failed to get connection: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("Blocking task failed: {}", e)))?
    }

    /// Insert or replace a student's advisor assignment.
    ///
    /// The assignment is owned by the identity service; this exists for
    /// seeding dev databases and tests.
    pub async fn upsert_student(&self, student_id: &str, advisor_id: Option<&str>) -> StoreResult<()> {
        let student_id = student_id.to_string();
        let advisor_id = advisor_id.map(str::to_string);

        self.run(move |conn| {
            diesel::sql_query(
                "INSERT INTO students (id, advisor_id) VALUES (?, ?) \
                 ON CONFLICT(id) DO UPDATE SET advisor_id = excluded.advisor_id",
            )
            .bind::<Text, _>(&student_id)
            .bind::<Nullable<Text>, _>(advisor_id.as_deref())
            .execute(conn)?;
            debug!(student_id = %student_id, advisor_id = ?advisor_id, "Student advisor assigned");
            Ok(())
        })
        .await
    }

    async fn transition(
        &self,
        id: Uuid,
        actor_id: &str,
        transition: Transition,
    ) -> StoreResult<AchievementReference> {
        let id = id.to_string();
        let actor_id = actor_id.to_string();
        let row = self
            .run(move |conn| apply_transition(conn, &id, &actor_id, &transition))
            .await?;
        let reference = to_domain(row)?;
        info!(
            reference_id = %reference.id,
            status = %reference.status,
            "Achievement reference transitioned"
        );
        Ok(reference)
    }
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
    async fn create_reference(
        &self,
        student_id: &str,
        document_id: &str,
    ) -> StoreResult<AchievementReference> {
        let id = Uuid::new_v4().to_string();
        let student_id = student_id.to_string();
        let document_id = document_id.to_string();

        let row = self
            .run(move |conn| {
                conn.immediate_transaction::<_, StoreError, _>(|conn| {
                    diesel::insert_into(refs::table)
                        .values(&NewReferenceRow {
                            id: &id,
                            student_id: &student_id,
                            document_id: &document_id,
                        })
                        .execute(conn)?;

                    diesel::insert_into(transitions::table)
                        .values(&NewTransitionRow {
                            reference_id: &id,
                            from_status: None,
                            to_status: AchievementStatus::Draft.as_str(),
                            actor_id: &student_id,
                            note: None,
                        })
                        .execute(conn)?;

                    let row = refs::table
                        .filter(refs::id.eq(&id))
                        .select(ReferenceRow::as_select())
                        .first::<ReferenceRow>(conn)?;
                    Ok(row)
                })
            })
            .await?;

        let reference = to_domain(row)?;
        info!(
            reference_id = %reference.id,
            document_id = %reference.document_id,
            "Achievement reference created"
        );
        Ok(reference)
    }

    async fn get_reference(&self, id: Uuid) -> StoreResult<Option<AchievementReference>> {
        let id = id.to_string();
        let row = self
            .run(move |conn| {
                Ok(refs::table
                    .filter(refs::id.eq(&id))
                    .select(ReferenceRow::as_select())
                    .first::<ReferenceRow>(conn)
                    .optional()?)
            })
            .await?;
        row.map(to_domain).transpose()
    }

    async fn get_reference_with_advisor(
        &self,
        id: Uuid,
    ) -> StoreResult<Option<(AchievementReference, Option<String>)>> {
        let id = id.to_string();
        let row = self
            .run(move |conn| {
                Ok(refs::table
                    .left_join(students::table)
                    .filter(refs::id.eq(&id))
                    .select((ReferenceRow::as_select(), students::advisor_id.nullable()))
                    .first::<(ReferenceRow, Option<String>)>(conn)
                    .optional()?)
            })
            .await?;

        match row {
            Some((row, advisor)) => Ok(Some((to_domain(row)?, advisor))),
            None => Ok(None),
        }
    }

    async fn list_for_student(
        &self,
        student_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Vec<AchievementReference>> {
        let student_id = student_id.to_string();
        let rows = self
            .run(move |conn| {
                let mut query = refs::table
                    .filter(refs::student_id.eq(student_id))
                    .select(ReferenceRow::as_select())
                    .order_by(refs::created_at.desc())
                    .then_order_by(rowid_desc())
                    .into_boxed();
                if !include_deleted {
                    query = query.filter(refs::status.ne(AchievementStatus::Deleted.as_str()));
                }
                Ok(query.load::<ReferenceRow>(conn)?)
            })
            .await?;
        to_domain_list(rows)
    }

    async fn list_for_advisor(
        &self,
        advisor_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Vec<AchievementReference>> {
        let advisor_id = advisor_id.to_string();
        let rows = self
            .run(move |conn| {
                let mut query = refs::table
                    .inner_join(students::table)
                    .filter(students::advisor_id.eq(advisor_id))
                    .select(ReferenceRow::as_select())
                    .order_by(refs::created_at.desc())
                    .then_order_by(rowid_desc())
                    .into_boxed();
                if !include_deleted {
                    query = query.filter(refs::status.ne(AchievementStatus::Deleted.as_str()));
                }
                Ok(query.load::<ReferenceRow>(conn)?)
            })
            .await?;
        to_domain_list(rows)
    }

    async fn list_all(&self, include_deleted: bool) -> StoreResult<Vec<AchievementReference>> {
        let rows = self
            .run(move |conn| {
                let mut query = refs::table
                    .select(ReferenceRow::as_select())
                    .order_by(refs::created_at.desc())
                    .then_order_by(rowid_desc())
                    .into_boxed();
                if !include_deleted {
                    query = query.filter(refs::status.ne(AchievementStatus::Deleted.as_str()));
                }
                Ok(query.load::<ReferenceRow>(conn)?)
            })
            .await?;
        to_domain_list(rows)
    }

    async fn submit(&self, id: Uuid, actor_id: &str) -> StoreResult<AchievementReference> {
        self.transition(id, actor_id, Transition::Submit).await
    }

    async fn verify(&self, id: Uuid, verifier_id: &str) -> StoreResult<AchievementReference> {
        let transition = Transition::Verify {
            verifier_id: verifier_id.to_string(),
        };
        self.transition(id, verifier_id, transition).await
    }

    async fn reject(
        &self,
        id: Uuid,
        verifier_id: &str,
        note: &str,
    ) -> StoreResult<AchievementReference> {
        let transition = Transition::Reject {
            verifier_id: verifier_id.to_string(),
            note: note.to_string(),
        };
        self.transition(id, verifier_id, transition).await
    }

    async fn soft_delete(&self, id: Uuid, actor_id: &str) -> StoreResult<AchievementReference> {
        self.transition(id, actor_id, Transition::Delete).await
    }

    async fn history(&self, id: Uuid) -> StoreResult<Vec<TransitionRecord>> {
        let id = id.to_string();
        let rows = self
            .run(move |conn| {
                Ok(transitions::table
                    .filter(transitions::reference_id.eq(&id))
                    .select(TransitionRow::as_select())
                    .order_by(transitions::id.asc())
                    .load::<TransitionRow>(conn)?)
            })
            .await?;

        rows.into_iter()
            .map(|row| TransitionRecord::try_from(row).map_err(corrupt))
            .collect()
    }

    async fn advisor_for(&self, student_id: &str) -> StoreResult<Option<String>> {
        let student_id = student_id.to_string();
        let advisor = self
            .run(move |conn| {
                Ok(students::table
                    .filter(students::id.eq(&student_id))
                    .select(students::advisor_id)
                    .first::<Option<String>>(conn)
                    .optional()?)
            })
            .await?;
        Ok(advisor.flatten())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }
}
