//! Diesel schema and DDL for the reference store
//!
//! ## Tables
//!
//! - `students` - student to advisor assignment (owned by the identity service)
//! - `achievement_references` - one lifecycle row per achievement document
//! - `achievement_transitions` - append-only status history

use diesel::connection::SimpleConnection;
use diesel::SqliteConnection;
use tracing::info;

diesel::table! {
    students (id) {
        id -> Text,
        advisor_id -> Nullable<Text>,
    }
}

diesel::table! {
    achievement_references (id) {
        id -> Text,
        student_id -> Text,
        document_id -> Text,
        status -> Text,
        submitted_at -> Nullable<Text>,
        verified_at -> Nullable<Text>,
        verified_by -> Nullable<Text>,
        rejection_note -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    achievement_transitions (id) {
        id -> Integer,
        reference_id -> Text,
        from_status -> Nullable<Text>,
        to_status -> Text,
        actor_id -> Text,
        note -> Nullable<Text>,
        occurred_at -> Text,
    }
}

diesel::joinable!(achievement_references -> students (student_id));
diesel::joinable!(achievement_transitions -> achievement_references (reference_id));
diesel::allow_tables_to_appear_in_same_query!(
    students,
    achievement_references,
    achievement_transitions,
);

/// SQL expression for the store clock, millisecond precision UTC.
pub const STORE_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ','now')";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    id TEXT PRIMARY KEY NOT NULL,
    advisor_id TEXT
);

CREATE TABLE IF NOT EXISTS achievement_references (
    id TEXT PRIMARY KEY NOT NULL,
    student_id TEXT NOT NULL,
    document_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'draft'
        CHECK (status IN ('draft', 'submitted', 'verified', 'rejected', 'deleted')),
    submitted_at TEXT,
    verified_at TEXT,
    verified_by TEXT,
    rejection_note TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);

CREATE INDEX IF NOT EXISTS idx_achievement_references_student
    ON achievement_references(student_id);
CREATE INDEX IF NOT EXISTS idx_achievement_references_status
    ON achievement_references(status);
CREATE INDEX IF NOT EXISTS idx_students_advisor
    ON students(advisor_id);

CREATE TABLE IF NOT EXISTS achievement_transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reference_id TEXT NOT NULL REFERENCES achievement_references(id),
    from_status TEXT,
    to_status TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    note TEXT,
    occurred_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);

CREATE INDEX IF NOT EXISTS idx_achievement_transitions_reference
    ON achievement_transitions(reference_id);
"#;

/// Create tables and indexes if they do not exist
pub fn init_schema(conn: &mut SqliteConnection) -> diesel::QueryResult<()> {
    conn.batch_execute(SCHEMA_SQL)?;
    info!("Reference store schema initialized");
    Ok(())
}
