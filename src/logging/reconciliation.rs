//! Reconciliation events for cross-store inconsistencies
//!
//! The document store and the reference store are not transactionally
//! linked. When a write sequence leaves them disagreeing, the engine records a
//! [`ReconciliationEvent`] here. Events go to three places:
//! - `tracing` at error level with target `reconciliation`
//! - an optional JSONL file for operators
//! - a bounded in-memory buffer served by the admin endpoint

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

/// Number of events retained in memory
pub const RECENT_CAPACITY: usize = 200;

/// Kinds of inconsistency requiring operator attention
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// Reference create failed and the compensating document delete failed too.
    /// An orphan document exists with no reference.
    CompensationFailure,
    /// Points were written to the document but the reference did not move to
    /// `verified`.
    VerifyPointsOrphaned,
    /// A reference points at a document that no longer exists.
    DanglingReference,
}

/// A single reconciliation event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: ReconciliationKind,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i32>,
    /// Underlying store error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ReconciliationEvent {
    pub fn new(kind: ReconciliationKind, document_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            document_id: document_id.into(),
            reference_id: None,
            student_id: None,
            points: None,
            detail: None,
        }
    }

    pub fn with_reference(mut self, reference_id: Uuid) -> Self {
        self.reference_id = Some(reference_id);
        self
    }

    pub fn with_student(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    pub fn with_points(mut self, points: i32) -> Self {
        self.points = Some(points);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Sink for reconciliation events
#[derive(Clone, Default)]
pub struct ReconciliationLog {
    inner: Arc<Mutex<ReconciliationLogInner>>,
}

#[derive(Default)]
struct ReconciliationLogInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    recent: VecDeque<ReconciliationEvent>,
}

impl ReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize file logging to the specified path
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut inner = self.inner.lock().await;
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.clone());

        info!("Reconciliation log initialized to {}", path.display());
        Ok(())
    }

    /// Record an event
    pub async fn record(&self, event: ReconciliationEvent) {
        error!(
            target: "reconciliation",
            kind = ?event.kind,
            document_id = %event.document_id,
            reference_id = ?event.reference_id,
            student_id = ?event.student_id,
            points = ?event.points,
            detail = ?event.detail,
            "Cross-store inconsistency requires manual reconciliation"
        );

        let mut inner = self.inner.lock().await;

        if let Some(ref mut writer) = inner.writer {
            match event.to_jsonl() {
                Ok(line) => {
                    if let Err(e) = writeln!(writer, "{}", line) {
                        error!("Failed to write reconciliation event: {}", e);
                    }
                    if let Err(e) = writer.flush() {
                        error!("Failed to flush reconciliation log: {}", e);
                    }
                }
                Err(e) => error!("Failed to serialize reconciliation event: {}", e),
            }
        }

        if inner.recent.len() == RECENT_CAPACITY {
            inner.recent.pop_front();
        }
        inner.recent.push_back(event);
    }

    /// Most recent events, newest first
    pub async fn recent(&self) -> Vec<ReconciliationEvent> {
        let inner = self.inner.lock().await;
        inner.recent.iter().rev().cloned().collect()
    }

    /// Path of the JSONL file, if file logging is enabled
    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ReconciliationEvent::new(ReconciliationKind::VerifyPointsOrphaned, "64f0")
            .with_reference(Uuid::nil())
            .with_points(50);

        let jsonl = event.to_jsonl().unwrap();
        assert!(jsonl.contains("verify_points_orphaned"));
        assert!(jsonl.contains("\"points\":50"));
        assert!(!jsonl.contains("student_id"));
    }

    #[tokio::test]
    async fn test_recent_is_bounded_and_newest_first() {
        let log = ReconciliationLog::new();
        for i in 0..(RECENT_CAPACITY + 5) {
            log.record(ReconciliationEvent::new(
                ReconciliationKind::DanglingReference,
                format!("doc-{}", i),
            ))
            .await;
        }

        let recent = log.recent().await;
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent[0].document_id, format!("doc-{}", RECENT_CAPACITY + 4));
    }

    #[tokio::test]
    async fn test_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciliation.jsonl");

        let log = ReconciliationLog::new();
        log.init_file(path.clone()).await.unwrap();
        log.record(
            ReconciliationEvent::new(ReconciliationKind::CompensationFailure, "abc")
                .with_student("s1")
                .with_detail("connection reset"),
        )
        .await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("compensation_failure"));
        assert!(lines[0].contains("connection reset"));
        assert_eq!(log.path().await, Some(path));
    }
}
