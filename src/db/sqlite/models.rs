//! Diesel row types for the reference store

use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{achievement_references, achievement_transitions};
use crate::achievement::model::{AchievementReference, AchievementStatus, TransitionRecord};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = achievement_references)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReferenceRow {
    pub id: String,
    pub student_id: String,
    pub document_id: String,
    pub status: String,
    pub submitted_at: Option<String>,
    pub verified_at: Option<String>,
    pub verified_by: Option<String>,
    pub rejection_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Timestamps and status come from column defaults.
#[derive(Insertable, Debug)]
#[diesel(table_name = achievement_references)]
pub struct NewReferenceRow<'a> {
    pub id: &'a str,
    pub student_id: &'a str,
    pub document_id: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = achievement_transitions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TransitionRow {
    pub id: i32,
    pub reference_id: String,
    pub from_status: Option<String>,
    pub to_status: String,
    pub actor_id: String,
    pub note: Option<String>,
    pub occurred_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = achievement_transitions)]
pub struct NewTransitionRow<'a> {
    pub reference_id: &'a str,
    pub from_status: Option<&'a str>,
    pub to_status: &'a str,
    pub actor_id: &'a str,
    pub note: Option<&'a str>,
}

impl TryFrom<ReferenceRow> for AchievementReference {
    type Error = String;

    fn try_from(row: ReferenceRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| format!("corrupt reference id '{}': {}", row.id, e))?;
        let status: AchievementStatus = row.status.parse()?;

        Ok(AchievementReference {
            id,
            student_id: row.student_id,
            document_id: row.document_id,
            status,
            submitted_at: row.submitted_at,
            verified_at: row.verified_at,
            verified_by: row.verified_by,
            rejection_note: row.rejection_note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<TransitionRow> for TransitionRecord {
    type Error = String;

    fn try_from(row: TransitionRow) -> Result<Self, Self::Error> {
        let from_status = row
            .from_status
            .as_deref()
            .map(str::parse::<AchievementStatus>)
            .transpose()?;

        Ok(TransitionRecord {
            from_status,
            to_status: row.to_status.parse()?,
            actor_id: row.actor_id,
            note: row.note,
            occurred_at: row.occurred_at,
        })
    }
}
