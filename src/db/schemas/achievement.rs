//! Achievement record schema
//!
//! Holds the content half of an achievement. The lifecycle half lives in the
//! SQLite reference store and points here by ObjectId hex.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::achievement::model::{
    Achievement, AchievementDetails, Attachment, NewAchievement, NewAttachment,
};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Default collection name for achievement records
pub const ACHIEVEMENT_COLLECTION: &str = "achievement_records";

/// Attachment entry inside a record
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDoc {
    pub file_name: String,
    pub file_url: String,
    #[serde(default)]
    pub file_type: String,
    pub uploaded_at: DateTime,
}

impl AttachmentDoc {
    /// Stamp `uploaded_at` with the current time
    pub fn stamped(attachment: NewAttachment) -> Self {
        Self {
            file_name: attachment.file_name,
            file_url: attachment.file_url,
            file_type: attachment.file_type,
            uploaded_at: DateTime::now(),
        }
    }
}

impl From<AttachmentDoc> for Attachment {
    fn from(doc: AttachmentDoc) -> Self {
        Attachment {
            file_name: doc.file_name,
            file_url: doc.file_url,
            file_type: doc.file_type,
            uploaded_at: doc.uploaded_at.to_chrono(),
        }
    }
}

/// Achievement record stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRecordDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    pub student_id: String,
    pub achievement_type: String,
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Type-specific fields as a plain sub-document
    #[serde(default)]
    pub details: Document,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Written only by verification
    #[serde(default)]
    pub points: i32,

    #[serde(default)]
    pub attachments: Vec<AttachmentDoc>,
}

impl AchievementRecordDoc {
    /// Build a record from validated content
    pub fn from_new(new: NewAchievement) -> Result<Self, bson::ser::Error> {
        Ok(Self {
            id: None,
            metadata: Metadata::new(),
            student_id: new.student_id,
            achievement_type: new.achievement_type,
            title: new.title,
            description: new.description,
            details: details_to_document(&new.details)?,
            tags: new.tags,
            points: 0,
            attachments: Vec::new(),
        })
    }

    /// Convert to the domain type.
    ///
    /// Details that no longer match their type's schema are surfaced as a
    /// custom field bag rather than failing the read.
    pub fn into_domain(self) -> Achievement {
        let id = self.id.map(|oid| oid.to_hex()).unwrap_or_default();
        let raw = bson::from_document::<serde_json::Value>(self.details).ok();

        let details = match AchievementDetails::parse(&self.achievement_type, raw.clone()) {
            Ok(details) => details,
            Err(e) => {
                warn!(document_id = %id, "Stored details do not match type: {}", e);
                match raw {
                    Some(serde_json::Value::Object(map)) => AchievementDetails::Custom(map),
                    _ => AchievementDetails::Custom(serde_json::Map::new()),
                }
            }
        };

        Achievement {
            id,
            student_id: self.student_id,
            achievement_type: self.achievement_type,
            title: self.title,
            description: self.description,
            details,
            tags: self.tags,
            points: self.points,
            attachments: self.attachments.into_iter().map(Attachment::from).collect(),
            created_at: self.metadata.created_at.map(|d| d.to_chrono()),
            updated_at: self.metadata.updated_at.map(|d| d.to_chrono()),
        }
    }
}

/// Serialize details into a sub-document
pub fn details_to_document(details: &AchievementDetails) -> Result<Document, bson::ser::Error> {
    bson::to_document(details)
}

impl IntoIndexes for AchievementRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Listing a student's records
            (
                doc! { "studentId": 1 },
                Some(
                    IndexOptions::builder()
                        .name("student_id_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "achievementType": 1 },
                Some(
                    IndexOptions::builder()
                        .name("achievement_type_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AchievementRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
