//! MongoDB document schemas

mod achievement;
mod metadata;

pub use achievement::{
    details_to_document, AchievementRecordDoc, AttachmentDoc, ACHIEVEMENT_COLLECTION,
};
pub use metadata::Metadata;
