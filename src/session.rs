use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::autosave::{AutosaveCoordinator, AutosaveHandle, SaveOutcome, SaveStatus, SaveTrigger};
use crate::chapters::{ChapterField, ChapterStore};
use crate::error::AuthoringError;
use crate::model::{Document, DocumentId, DocumentMetadata, NewDocument, TagId};
use crate::optimistic::{MetadataEdit, Reversible as _};
use crate::publish::PublicationWorkflow;
use crate::readiness::{self, Readiness, ReadinessInput};
use crate::service::PersistenceService;

/// One author editing one book.
pub struct AuthoringSession {
    document: Document,
    store: Arc<Mutex<ChapterStore>>,
    service: Arc<dyn PersistenceService>,
    autosave: Arc<AutosaveCoordinator>,
    autosave_task: Option<AutosaveHandle>,
}

impl AuthoringSession {
    pub async fn create(
        service: Arc<dyn PersistenceService>,
        draft: NewDocument,
    ) -> Result<Self, AuthoringError> {
        draft.validate()?;
        let document = service
            .create_document(&draft)
            .await
            .map_err(|err| AuthoringError::persistence("Could not create your book.", &err))?;
        tracing::info!(document_id = %document.id, title = document.title(), "created book");
        Ok(Self::assemble(document, ChapterStore::new(), service))
    }

    pub async fn open(
        service: Arc<dyn PersistenceService>,
        document_id: &DocumentId,
    ) -> Result<Self, AuthoringError> {
        let document = service
            .get_document(document_id)
            .await
            .map_err(|err| AuthoringError::persistence("Could not load your book.", &err))?;
        let records = service
            .list_chapters(document_id)
            .await
            .map_err(|err| AuthoringError::persistence("Could not load chapters.", &err))?;
        tracing::debug!(%document_id, chapters = records.len(), "opened book for editing");
        let session = Self::assemble(document, ChapterStore::from_records(records), service);
        // Stored numbers with gaps were closed up locally.
        session.autosave.flush_all().await?;
        Ok(session)
    }

    fn assemble(
        document: Document,
        chapters: ChapterStore,
        service: Arc<dyn PersistenceService>,
    ) -> Self {
        let store = Arc::new(Mutex::new(chapters));
        let autosave = Arc::new(AutosaveCoordinator::new(
            document.id.clone(),
            Arc::clone(&store),
            Arc::clone(&service),
        ));
        Self {
            document,
            store,
            service,
            autosave,
            autosave_task: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn autosave(&self) -> &Arc<AutosaveCoordinator> {
        &self.autosave
    }

    pub fn save_status(&self) -> SaveStatus {
        self.autosave.status()
    }

    /// Starts (or restarts) the periodic autosave.
    pub fn start_autosave(&mut self, period: Duration) {
        self.autosave_task = Some(self.autosave.spawn(period));
    }

    /// Read access to the chapter list.
    pub async fn with_chapters<T>(&self, f: impl FnOnce(&ChapterStore) -> T) -> T {
        f(&*self.store.lock().await)
    }

    pub async fn edit(
        &self,
        index: usize,
        field: ChapterField,
        value: impl Into<String>,
    ) -> Result<(), AuthoringError> {
        self.store.lock().await.update(index, field, value)
    }

    pub async fn edit_title(
        &self,
        index: usize,
        title: impl Into<String>,
    ) -> Result<(), AuthoringError> {
        self.edit(index, ChapterField::Title, title).await
    }

    pub async fn edit_content(
        &self,
        index: usize,
        content: impl Into<String>,
    ) -> Result<(), AuthoringError> {
        self.edit(index, ChapterField::Content, content).await
    }

    /// Edits the active chapter's content.
    pub async fn write(&self, content: impl Into<String>) -> Result<(), AuthoringError> {
        let mut store = self.store.lock().await;
        let index = store.active_index();
        store.update(index, ChapterField::Content, content)
    }

    /// Flushes the outgoing chapter, then appends a new active draft. Returns its index.
    pub async fn insert_chapter(&self) -> Result<(SaveOutcome, usize), AuthoringError> {
        self.autosave
            .flush_then(|store| {
                store.insert();
                Ok(store.active_index())
            })
            .await
    }

    pub async fn switch_to(&self, index: usize) -> Result<SaveOutcome, AuthoringError> {
        self.autosave.switch_to(index).await
    }

    pub async fn save_now(&self) -> Result<SaveOutcome, AuthoringError> {
        self.autosave.save(SaveTrigger::Manual).await
    }

    /// Deletes a chapter locally and remotely, then renumbers the rest and saves
    /// the chapters whose number changed.
    ///
    /// A remote not-found counts as deleted. Any other remote failure leaves the
    /// local list untouched.
    pub async fn delete_chapter(&self, index: usize) -> Result<Vec<SaveOutcome>, AuthoringError> {
        let paused = self.autosave.pause().await;
        let remote_id = {
            let store = self.store.lock().await;
            store.ensure_removable(index)?;
            store.get(index)?.id().cloned()
        };

        if let Some(chapter_id) = remote_id {
            match self
                .service
                .delete_chapter(&self.document.id, &chapter_id)
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    tracing::info!(%chapter_id, "chapter already gone remotely");
                }
                Err(err) => {
                    return Err(AuthoringError::persistence(
                        "Could not delete the chapter.",
                        &err,
                    ));
                }
            }
        }

        let removed = self.store.lock().await.remove(index)?;
        tracing::info!(number = removed.number(), "deleted chapter");
        paused.flush_all().await
    }

    /// Applies new metadata immediately and rolls it back if the server refuses it.
    pub async fn update_metadata(
        &mut self,
        metadata: DocumentMetadata,
    ) -> Result<(), AuthoringError> {
        if metadata.description.trim().is_empty() {
            return Err(AuthoringError::Validation(
                "Add a short description of your book.".to_owned(),
            ));
        }
        let mut edit = MetadataEdit::new(metadata);
        edit.apply(&mut self.document);
        if let Err(err) = self
            .service
            .update_document(&self.document.id, edit.next())
            .await
        {
            edit.revert(&mut self.document);
            tracing::warn!(error = %err.detail(), "metadata update rolled back");
            return Err(AuthoringError::persistence(
                "Could not save the book details.",
                &err,
            ));
        }
        Ok(())
    }

    pub async fn total_pages(&self) -> u32 {
        self.store.lock().await.total_pages()
    }

    pub async fn readiness(
        &self,
        selected_tags: &[TagId],
        consent_affirmed: bool,
        remaining_publish_slots: u32,
    ) -> Readiness {
        readiness::evaluate(&ReadinessInput {
            total_pages: self.total_pages().await,
            selected_tags,
            consent_affirmed,
            remaining_publish_slots,
        })
    }

    /// Fetches the tag catalog and remaining slots and opens the publish wizard.
    pub async fn begin_publication(&self) -> Result<PublicationWorkflow, AuthoringError> {
        if self.document.published {
            return Err(AuthoringError::AlreadyPublished);
        }
        let catalog = self
            .service
            .tags()
            .await
            .map_err(|err| AuthoringError::persistence("Could not load tags.", &err))?;
        let slots = self.service.remaining_publish_slots().await.map_err(|err| {
            AuthoringError::persistence("Could not check your publish allowance.", &err)
        })?;
        Ok(PublicationWorkflow::new(
            self.document.id.clone(),
            self.total_pages().await,
            catalog,
            slots,
        ))
    }

    /// Submits the wizard with current page totals. On success the book is published.
    pub async fn submit_publication(
        &mut self,
        workflow: &mut PublicationWorkflow,
    ) -> Result<(), AuthoringError> {
        workflow.set_total_pages(self.total_pages().await);
        workflow.submit(self.service.as_ref()).await?;
        self.document.published = true;
        self.document.tags = workflow.selected_tags().to_vec();
        Ok(())
    }

    /// Stops the timer and flushes every unsaved chapter one last time.
    pub async fn close(mut self) -> Result<Vec<SaveOutcome>, AuthoringError> {
        // Never abort the timer in the middle of a request.
        let paused = self.autosave.pause().await;
        if let Some(task) = self.autosave_task.take() {
            task.stop();
        }
        paused.flush_all().await
    }
}
