//! Scripted in-memory service used by unit tests.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::model::{
    ChapterId, ChapterPayload, ChapterRecord, Document, DocumentId, DocumentMetadata, NewDocument,
    ReadingProgress, SavedChapter, Tag, TagId,
};
use crate::service::{PersistenceService, ServiceError, ServiceResult};

#[derive(Default)]
pub(crate) struct FakeState {
    pub calls: Vec<String>,
    pub document: Option<Document>,
    pub chapters: Vec<ChapterRecord>,
    pub next_id: u32,
    pub progress: Option<ReadingProgress>,
    pub tags: Vec<Tag>,
    pub slots: u32,
    /// Next chapter update answers 404.
    pub update_not_found_once: bool,
    /// Chapter saves answer 500 with this reason while set.
    pub fail_saves: Option<String>,
    pub fail_deletes: Option<String>,
    pub fail_metadata: Option<String>,
    pub fail_progress: bool,
    pub publish_rejection: Option<String>,
}

#[derive(Default)]
pub(crate) struct FakeService {
    pub state: Mutex<FakeState>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_state(f: impl FnOnce(&mut FakeState)) -> Arc<Self> {
        let service = Self::default();
        f(&mut service.state.lock().unwrap());
        Arc::new(service)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn edit(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    /// Chapter saves block until the returned semaphore gets a permit.
    pub fn hold_saves(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    async fn wait_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn rejected(reason: &str) -> ServiceError {
    ServiceError::Rejected {
        status: 500,
        reason: reason.to_owned(),
    }
}

#[async_trait]
impl PersistenceService for FakeService {
    async fn create_document(&self, draft: &NewDocument) -> ServiceResult<Document> {
        self.record(format!("create_document:{}", draft.title));
        let mut doc = Document::new(DocumentId::new("doc-1"), draft.title.clone());
        doc.description = draft.description.clone();
        self.state.lock().unwrap().document = Some(doc.clone());
        Ok(doc)
    }

    async fn get_document(&self, document_id: &DocumentId) -> ServiceResult<Document> {
        self.record(format!("get_document:{document_id}"));
        self.state
            .lock()
            .unwrap()
            .document
            .clone()
            .ok_or_else(|| ServiceError::NotFound {
                resource: document_id.to_string(),
            })
    }

    async fn update_document(
        &self,
        document_id: &DocumentId,
        _metadata: &DocumentMetadata,
    ) -> ServiceResult<()> {
        self.record(format!("update_document:{document_id}"));
        match self.state.lock().unwrap().fail_metadata.as_deref() {
            Some(reason) => Err(rejected(reason)),
            None => Ok(()),
        }
    }

    async fn list_chapters(&self, _document_id: &DocumentId) -> ServiceResult<Vec<ChapterRecord>> {
        self.record("list_chapters".to_owned());
        Ok(self.state.lock().unwrap().chapters.clone())
    }

    async fn create_chapter(
        &self,
        _document_id: &DocumentId,
        chapter: &ChapterPayload,
    ) -> ServiceResult<SavedChapter> {
        self.record(format!("create_chapter:{}", chapter.number));
        self.wait_gate().await;
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_saves.as_deref() {
            return Err(rejected(reason));
        }
        state.next_id += 1;
        let id = ChapterId::new(format!("c{}", state.next_id));
        state.chapters.push(ChapterRecord {
            id: id.clone(),
            number: chapter.number,
            title: chapter.title.clone(),
            content: chapter.content.clone(),
            page_count: Some(chapter.page_count),
        });
        let book_page_count = state.chapters.iter().filter_map(|c| c.page_count).sum();
        Ok(SavedChapter {
            id,
            page_count: Some(chapter.page_count),
            book_page_count: Some(book_page_count),
            book_chapter_count: Some(state.chapters.len() as u32),
        })
    }

    async fn update_chapter(
        &self,
        _document_id: &DocumentId,
        chapter_id: &ChapterId,
        chapter: &ChapterPayload,
    ) -> ServiceResult<SavedChapter> {
        self.record(format!("update_chapter:{chapter_id}"));
        self.wait_gate().await;
        let mut state = self.state.lock().unwrap();
        if state.update_not_found_once {
            state.update_not_found_once = false;
            state.chapters.retain(|c| &c.id != chapter_id);
            return Err(ServiceError::NotFound {
                resource: chapter_id.to_string(),
            });
        }
        if let Some(reason) = state.fail_saves.as_deref() {
            return Err(rejected(reason));
        }
        let Some(record) = state.chapters.iter_mut().find(|c| &c.id == chapter_id) else {
            return Err(ServiceError::NotFound {
                resource: chapter_id.to_string(),
            });
        };
        record.number = chapter.number;
        record.title = chapter.title.clone();
        record.content = chapter.content.clone();
        record.page_count = Some(chapter.page_count);
        Ok(SavedChapter {
            id: chapter_id.clone(),
            page_count: Some(chapter.page_count),
            book_page_count: None,
            book_chapter_count: None,
        })
    }

    async fn delete_chapter(
        &self,
        _document_id: &DocumentId,
        chapter_id: &ChapterId,
    ) -> ServiceResult<()> {
        self.record(format!("delete_chapter:{chapter_id}"));
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_deletes.as_deref() {
            return Err(rejected(reason));
        }
        let before = state.chapters.len();
        state.chapters.retain(|c| &c.id != chapter_id);
        if state.chapters.len() == before {
            return Err(ServiceError::NotFound {
                resource: chapter_id.to_string(),
            });
        }
        Ok(())
    }

    async fn reading_progress(
        &self,
        _document_id: &DocumentId,
    ) -> ServiceResult<Option<ReadingProgress>> {
        self.record("reading_progress".to_owned());
        Ok(self.state.lock().unwrap().progress.clone())
    }

    async fn record_progress(
        &self,
        _document_id: &DocumentId,
        progress: &ReadingProgress,
    ) -> ServiceResult<()> {
        self.record(format!(
            "record_progress:{}:{}",
            progress.current_chapter_id, progress.progress_percent
        ));
        let mut state = self.state.lock().unwrap();
        if state.fail_progress {
            return Err(ServiceError::Transport(anyhow!("connection reset")));
        }
        state.progress = Some(progress.clone());
        Ok(())
    }

    async fn publish(&self, document_id: &DocumentId, tag_ids: &[TagId]) -> ServiceResult<()> {
        let ids: Vec<&str> = tag_ids.iter().map(TagId::as_str).collect();
        self.record(format!("publish:{document_id}:{}", ids.join(",")));
        let state = self.state.lock().unwrap();
        match state.publish_rejection.as_deref() {
            Some(reason) => Err(ServiceError::Rejected {
                status: 422,
                reason: reason.to_owned(),
            }),
            None => Ok(()),
        }
    }

    async fn tags(&self) -> ServiceResult<Vec<Tag>> {
        self.record("tags".to_owned());
        Ok(self.state.lock().unwrap().tags.clone())
    }

    async fn remaining_publish_slots(&self) -> ServiceResult<u32> {
        self.record("slots".to_owned());
        Ok(self.state.lock().unwrap().slots)
    }
}
