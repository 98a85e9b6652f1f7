//! Achievement domain types
//!
//! Content types live in the document store; [`AchievementReference`] is the
//! lifecycle row in the reference store. [`AchievementView`] merges both for
//! callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of an achievement reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
    Deleted,
}

impl AchievementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementStatus::Draft => "draft",
            AchievementStatus::Submitted => "submitted",
            AchievementStatus::Verified => "verified",
            AchievementStatus::Rejected => "rejected",
            AchievementStatus::Deleted => "deleted",
        }
    }

    /// Content may be edited (and attachments added) only in these states.
    pub fn is_editable(&self) -> bool {
        matches!(self, AchievementStatus::Draft | AchievementStatus::Rejected)
    }
}

impl fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AchievementStatus::Draft),
            "submitted" => Ok(AchievementStatus::Submitted),
            "verified" => Ok(AchievementStatus::Verified),
            "rejected" => Ok(AchievementStatus::Rejected),
            "deleted" => Ok(AchievementStatus::Deleted),
            other => Err(format!("unknown achievement status: {}", other)),
        }
    }
}

// ============================================================================
// Type-specific details
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompetitionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medal_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PublicationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CertificationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_number: Option<String>,
    /// ISO 8601 date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Period {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrganizationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventDetails {
    /// ISO 8601 date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

/// Type-specific achievement details.
///
/// The variant is chosen by the achievement type, so serialization is
/// untagged: callers always see the plain field object. Use
/// [`AchievementDetails::parse`] to read details back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AchievementDetails {
    Competition(CompetitionDetails),
    Publication(PublicationDetails),
    Certification(CertificationDetails),
    Organization(OrganizationDetails),
    Event(EventDetails),
    /// Unrecognized achievement types keep an opaque key/value bag
    Custom(Map<String, Value>),
}

impl AchievementDetails {
    /// Parse details for the given achievement type.
    ///
    /// Missing or null details yield the empty variant. Typed variants reject
    /// unknown fields. Anything the document store cannot hold (`$`-prefixed
    /// keys at any depth, integers beyond the signed 64-bit range) is rejected
    /// here rather than at write time.
    pub fn parse(achievement_type: &str, details: Option<Value>) -> Result<Self, String> {
        let value = match details {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(v @ Value::Object(_)) => v,
            Some(_) => return Err("details must be a JSON object".into()),
        };
        if let Some(key) = operator_key(&value) {
            return Err(format!("details key '{}' must not start with '$'", key));
        }

        let details = Self::parse_typed(achievement_type, value)?;
        bson::to_document(&details)
            .map_err(|e| format!("details cannot be stored: {}", e))?;
        Ok(details)
    }

    fn parse_typed(achievement_type: &str, value: Value) -> Result<Self, String> {
        let invalid = |e: serde_json::Error| format!("invalid {} details: {}", achievement_type, e);

        match achievement_type.trim().to_ascii_lowercase().as_str() {
            "competition" => serde_json::from_value(value)
                .map(AchievementDetails::Competition)
                .map_err(invalid),
            "publication" => serde_json::from_value(value)
                .map(AchievementDetails::Publication)
                .map_err(invalid),
            "certification" => serde_json::from_value(value)
                .map(AchievementDetails::Certification)
                .map_err(invalid),
            "organization" => serde_json::from_value(value)
                .map(AchievementDetails::Organization)
                .map_err(invalid),
            "event" => serde_json::from_value(value)
                .map(AchievementDetails::Event)
                .map_err(invalid),
            _ => match value {
                Value::Object(map) => Ok(AchievementDetails::Custom(map)),
                _ => Err("details must be a JSON object".into()),
            },
        }
    }

    /// Plain JSON object form, as stored in the document.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// First object key at any depth that reads as a query operator
fn operator_key(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map.iter().find_map(|(key, nested)| {
            if key.starts_with('$') {
                Some(key.as_str())
            } else {
                operator_key(nested)
            }
        }),
        Value::Array(items) => items.iter().find_map(operator_key),
        _ => None,
    }
}

// ============================================================================
// Document content
// ============================================================================

/// File attached to an achievement. The bytes live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub file_url: String,
    #[serde(default)]
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Attachment metadata supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
    pub file_name: String,
    pub file_url: String,
    #[serde(default)]
    pub file_type: String,
}

/// Achievement content as held in the document store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub student_id: String,
    pub achievement_type: String,
    pub title: String,
    pub description: String,
    pub details: AchievementDetails,
    pub tags: Vec<String>,
    pub points: i32,
    pub attachments: Vec<Attachment>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Validated content for a new document
#[derive(Debug, Clone, PartialEq)]
pub struct NewAchievement {
    pub student_id: String,
    pub achievement_type: String,
    pub title: String,
    pub description: String,
    pub details: AchievementDetails,
    pub tags: Vec<String>,
}

/// Merge-patch for document content. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AchievementPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<AchievementDetails>,
    pub tags: Option<Vec<String>>,
    pub points: Option<i32>,
}

impl AchievementPatch {
    pub fn points(points: i32) -> Self {
        Self {
            points: Some(points),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.details.is_none()
            && self.tags.is_none()
            && self.points.is_none()
    }
}

/// Trim, drop empties, and de-duplicate tags preserving first occurrence.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

// ============================================================================
// Lifecycle reference
// ============================================================================

/// Lifecycle row linking a student to one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementReference {
    pub id: Uuid,
    pub student_id: String,
    pub document_id: String,
    pub status: AchievementStatus,
    pub submitted_at: Option<String>,
    pub verified_at: Option<String>,
    pub verified_by: Option<String>,
    pub rejection_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One row of the append-only transition history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    /// None for the creation entry
    pub from_status: Option<AchievementStatus>,
    pub to_status: AchievementStatus,
    pub actor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub occurred_at: String,
}

/// Status history of one reference
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementHistory {
    pub reference_id: Uuid,
    pub status: AchievementStatus,
    pub entries: Vec<TransitionRecord>,
}

/// Reference metadata merged with document content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementView {
    pub reference_id: Uuid,
    pub document_id: String,
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor_id: Option<String>,
    pub status: AchievementStatus,
    pub submitted_at: Option<String>,
    pub verified_at: Option<String>,
    pub verified_by: Option<String>,
    pub rejection_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// None when the document is missing, or could not be fetched for a listing
    pub achievement: Option<Achievement>,
}

impl AchievementView {
    pub fn new(
        reference: AchievementReference,
        advisor_id: Option<String>,
        achievement: Option<Achievement>,
    ) -> Self {
        Self {
            reference_id: reference.id,
            document_id: reference.document_id,
            student_id: reference.student_id,
            advisor_id,
            status: reference.status,
            submitted_at: reference.submitted_at,
            verified_at: reference.verified_at,
            verified_by: reference.verified_by,
            rejection_note: reference.rejection_note,
            created_at: reference.created_at,
            updated_at: reference.updated_at,
            achievement,
        }
    }
}

// ============================================================================
// Operation inputs
// ============================================================================

/// Body of a create request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAchievement {
    #[serde(alias = "achievement_type")]
    pub achievement_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Body of an update request. Points are not updatable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateAchievement {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl UpdateAchievement {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.details.is_none()
            && self.tags.is_none()
    }
}

/// Body of a verify request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyAchievement {
    #[serde(default)]
    pub points: Option<i32>,
}

/// Body of a reject request. The note must be present but may be empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectAchievement {
    #[serde(default, alias = "rejection_note", alias = "rejectionNote")]
    pub note: Option<String>,
}

/// Body of an attachment request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddAttachments {
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}
