//! Document store adapters for achievement content

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Document};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{DocumentStore, StoreError, StoreResult};
use crate::achievement::model::{Achievement, AchievementPatch, NewAchievement, NewAttachment};
use crate::db::mongo::{id_filter, MongoClient, MongoCollection};
use crate::db::schemas::{details_to_document, AchievementRecordDoc, AttachmentDoc, Metadata};
use crate::types::TrackerError;

impl From<TrackerError> for StoreError {
    fn from(err: TrackerError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

fn ser_error(e: bson::ser::Error) -> StoreError {
    StoreError::Backend(format!("Failed to encode document: {}", e))
}

/// `$set` body for a merge-patch
fn patch_to_set(patch: &AchievementPatch) -> StoreResult<Document> {
    let mut set = Document::new();
    if let Some(title) = &patch.title {
        set.insert("title", title.clone());
    }
    if let Some(description) = &patch.description {
        set.insert("description", description.clone());
    }
    if let Some(details) = &patch.details {
        set.insert("details", details_to_document(details).map_err(ser_error)?);
    }
    if let Some(tags) = &patch.tags {
        set.insert("tags", tags.clone());
    }
    if let Some(points) = patch.points {
        set.insert("points", points);
    }
    Ok(set)
}

// ============================================================================
// MongoDB
// ============================================================================

/// Document store backed by a MongoDB collection
#[derive(Clone)]
pub struct MongoDocumentStore {
    client: MongoClient,
    collection: MongoCollection<AchievementRecordDoc>,
}

impl MongoDocumentStore {
    pub async fn new(client: MongoClient, collection_name: &str) -> Result<Self, TrackerError> {
        let collection = client.collection(collection_name).await?;
        info!("Achievement records in collection '{}'", collection_name);
        Ok(Self { client, collection })
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn create(&self, achievement: NewAchievement) -> StoreResult<Achievement> {
        let mut record = AchievementRecordDoc::from_new(achievement).map_err(ser_error)?;
        let oid = self.collection.insert_one(&mut record).await?;
        debug!(document_id = %oid, "Achievement record created");
        record.id = Some(oid);
        Ok(record.into_domain())
    }

    async fn partial_update(&self, id: &str, patch: AchievementPatch) -> StoreResult<()> {
        let filter = id_filter(id).ok_or(StoreError::NotFound)?;
        let set = patch_to_set(&patch)?;

        let result = self.collection.update_one(filter, doc! { "$set": set }).await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let filter = id_filter(id).ok_or(StoreError::NotFound)?;
        let result = self.collection.delete_one(filter).await?;
        if result.deleted_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn fetch(&self, id: &str) -> StoreResult<Option<Achievement>> {
        let Some(filter) = id_filter(id) else {
            return Ok(None);
        };
        let record = self.collection.find_one(filter).await?;
        Ok(record.map(AchievementRecordDoc::into_domain))
    }

    async fn append_attachments(
        &self,
        id: &str,
        attachments: Vec<NewAttachment>,
    ) -> StoreResult<()> {
        let filter = id_filter(id).ok_or(StoreError::NotFound)?;

        let mut entries = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let entry = bson::to_bson(&AttachmentDoc::stamped(attachment)).map_err(ser_error)?;
            entries.push(entry);
        }

        let update = doc! { "$push": { "attachments": { "$each": entries } } };
        let result = self.collection.update_one(filter, update).await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.client.ping().await?;
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory document store (for testing/local development)
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    records: Arc<RwLock<HashMap<String, AchievementRecordDoc>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, achievement: NewAchievement) -> StoreResult<Achievement> {
        let mut record = AchievementRecordDoc::from_new(achievement).map_err(ser_error)?;
        let oid = ObjectId::new();
        record.id = Some(oid);
        record.metadata = Metadata::new();

        self.records
            .write()
            .await
            .insert(oid.to_hex(), record.clone());
        Ok(record.into_domain())
    }

    async fn partial_update(&self, id: &str, patch: AchievementPatch) -> StoreResult<()> {
        let details = match &patch.details {
            Some(d) => Some(details_to_document(d).map_err(ser_error)?),
            None => None,
        };

        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(StoreError::NotFound)?;

        if let Some(title) = patch.title {
            record.title = title;
        }
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(details) = details {
            record.details = details;
        }
        if let Some(tags) = patch.tags {
            record.tags = tags;
        }
        if let Some(points) = patch.points {
            record.points = points;
        }
        record.metadata.updated_at = Some(bson::DateTime::now());
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.records
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn fetch(&self, id: &str) -> StoreResult<Option<Achievement>> {
        Ok(self
            .records
            .read()
            .await
            .get(id)
            .cloned()
            .map(AchievementRecordDoc::into_domain))
    }

    async fn append_attachments(
        &self,
        id: &str,
        attachments: Vec<NewAttachment>,
    ) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(StoreError::NotFound)?;
        record
            .attachments
            .extend(attachments.into_iter().map(AttachmentDoc::stamped));
        record.metadata.updated_at = Some(bson::DateTime::now());
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
