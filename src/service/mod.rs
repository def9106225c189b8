//! Client side of the persistence service.

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    ChapterId, ChapterPayload, ChapterRecord, Document, DocumentId, DocumentMetadata, NewDocument,
    ReadingProgress, SavedChapter, Tag, TagId,
};

pub use http::HttpPersistence;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The remote resource does not exist (HTTP 404).
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Any other non-2xx answer. `reason` is the server's own message when it sent one.
    #[error("server rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Full error chain, for display next to a human-readable message.
    pub fn detail(&self) -> String {
        match self {
            Self::Transport(err) => format!("{err:#}"),
            other => other.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[async_trait]
pub trait PersistenceService: Send + Sync {
    async fn create_document(&self, draft: &NewDocument) -> ServiceResult<Document>;
    async fn get_document(&self, document_id: &DocumentId) -> ServiceResult<Document>;
    async fn update_document(
        &self,
        document_id: &DocumentId,
        metadata: &DocumentMetadata,
    ) -> ServiceResult<()>;

    async fn list_chapters(&self, document_id: &DocumentId) -> ServiceResult<Vec<ChapterRecord>>;
    async fn create_chapter(
        &self,
        document_id: &DocumentId,
        chapter: &ChapterPayload,
    ) -> ServiceResult<SavedChapter>;
    async fn update_chapter(
        &self,
        document_id: &DocumentId,
        chapter_id: &ChapterId,
        chapter: &ChapterPayload,
    ) -> ServiceResult<SavedChapter>;
    async fn delete_chapter(
        &self,
        document_id: &DocumentId,
        chapter_id: &ChapterId,
    ) -> ServiceResult<()>;

    async fn reading_progress(
        &self,
        document_id: &DocumentId,
    ) -> ServiceResult<Option<ReadingProgress>>;
    async fn record_progress(
        &self,
        document_id: &DocumentId,
        progress: &ReadingProgress,
    ) -> ServiceResult<()>;

    async fn publish(&self, document_id: &DocumentId, tag_ids: &[TagId]) -> ServiceResult<()>;
    async fn tags(&self) -> ServiceResult<Vec<Tag>>;
    async fn remaining_publish_slots(&self) -> ServiceResult<u32>;
}
