use std::sync::Arc;

use anyhow::Context as _;

use crate::background::BackgroundTasks;
use crate::model::{ChapterId, ChapterRecord, Document, DocumentId, ReadingProgress};
use crate::prefs::{DeviceId, PreferencesStore, ReaderLayout, ReaderPreferences};
use crate::service::PersistenceService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTracking {
    /// Signed-in reader: progress is read on open and written on every chapter change.
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeSource {
    Explicit,
    SavedProgress,
    Start,
}

/// `round(100 * (index + 1) / count)`. Going back lowers it; that is expected.
pub fn progress_percent(index: usize, count: usize) -> u32 {
    if count == 0 {
        return 0;
    }
    let percent = (100.0 * (index as f64 + 1.0) / count as f64).round();
    percent.clamp(0.0, 100.0) as u32
}

/// Deep link first, then saved progress, then the first chapter.
///
/// Ids that no longer exist in `chapters` are skipped rather than treated as errors.
pub fn resolve_start(
    chapters: &[ChapterRecord],
    explicit: Option<&ChapterId>,
    saved: Option<&ChapterId>,
) -> (usize, ResumeSource) {
    let position = |id: &ChapterId| chapters.iter().position(|c| &c.id == id);
    if let Some(index) = explicit.and_then(position) {
        return (index, ResumeSource::Explicit);
    }
    if let Some(index) = saved.and_then(position) {
        return (index, ResumeSource::SavedProgress);
    }
    (0, ResumeSource::Start)
}

/// Device-scoped preferences handed to a reader session.
#[derive(Clone)]
pub struct PreferencesScope {
    pub store: Arc<dyn PreferencesStore>,
    pub device: DeviceId,
}

pub struct ReaderSession {
    document: Document,
    chapters: Vec<ChapterRecord>,
    index: usize,
    resumed_from: ResumeSource,
    tracking: ProgressTracking,
    service: Arc<dyn PersistenceService>,
    background: BackgroundTasks,
    prefs: PreferencesScope,
    preferences: ReaderPreferences,
}

impl ReaderSession {
    pub async fn open(
        service: Arc<dyn PersistenceService>,
        document_id: &DocumentId,
        explicit_chapter: Option<&ChapterId>,
        tracking: ProgressTracking,
        prefs: PreferencesScope,
    ) -> anyhow::Result<Self> {
        let document = service
            .get_document(document_id)
            .await
            .with_context(|| format!("load document {document_id}"))?;
        let mut chapters = service
            .list_chapters(document_id)
            .await
            .with_context(|| format!("load chapters of {document_id}"))?;
        chapters.sort_by_key(|c| c.number);
        if chapters.is_empty() {
            anyhow::bail!("book {document_id} has no chapters");
        }

        let saved = match tracking {
            ProgressTracking::Disabled => None,
            ProgressTracking::Enabled => match service.reading_progress(document_id).await {
                Ok(progress) => progress,
                Err(err) => {
                    tracing::warn!(%document_id, error = %err.detail(), "could not load reading progress");
                    None
                }
            },
        };

        let (index, resumed_from) = resolve_start(
            &chapters,
            explicit_chapter,
            saved.as_ref().map(|p| &p.current_chapter_id),
        );
        tracing::debug!(%document_id, index, ?resumed_from, "opened reader");

        let preferences = match prefs.store.load(&prefs.device).await {
            Ok(preferences) => preferences,
            Err(err) => {
                tracing::warn!(device = %prefs.device, ?err, "could not load reader preferences");
                ReaderPreferences::default()
            }
        };

        let session = Self {
            document,
            chapters,
            index,
            resumed_from,
            tracking,
            service,
            background: BackgroundTasks::start(),
            prefs,
            preferences,
        };
        session.record_progress();
        Ok(session)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn chapters(&self) -> &[ChapterRecord] {
        &self.chapters
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based place of the current chapter in reading order, whatever the stored numbers say.
    pub fn position(&self) -> usize {
        self.index + 1
    }

    pub fn current(&self) -> &ChapterRecord {
        &self.chapters[self.index]
    }

    pub fn resumed_from(&self) -> ResumeSource {
        self.resumed_from
    }

    pub fn progress_percent(&self) -> u32 {
        progress_percent(self.index, self.chapters.len())
    }

    pub fn go_to(&mut self, index: usize) -> anyhow::Result<&ChapterRecord> {
        if index >= self.chapters.len() {
            anyhow::bail!(
                "no chapter at position {index} (book has {})",
                self.chapters.len()
            );
        }
        if index != self.index {
            self.index = index;
            self.record_progress();
        }
        Ok(self.current())
    }

    /// Moves forward one chapter; `None` at the end of the book.
    pub fn next(&mut self) -> Option<&ChapterRecord> {
        let index = self.index + 1;
        if index >= self.chapters.len() {
            return None;
        }
        self.index = index;
        self.record_progress();
        Some(self.current())
    }

    pub fn previous(&mut self) -> Option<&ChapterRecord> {
        let index = self.index.checked_sub(1)?;
        self.index = index;
        self.record_progress();
        Some(self.current())
    }

    /// Waits for queued progress writes.
    pub async fn flush(&self) {
        self.background.flush().await;
    }

    pub fn preferences(&self) -> &ReaderPreferences {
        &self.preferences
    }

    pub fn layout(&self) -> ReaderLayout {
        self.preferences.layout()
    }

    /// Applies `change` and writes the result to the device's store.
    pub async fn update_preferences(
        &mut self,
        change: impl FnOnce(&mut ReaderPreferences),
    ) -> anyhow::Result<()> {
        let mut next = self.preferences;
        change(&mut next);
        let next = next.normalized();
        self.prefs
            .store
            .save(&self.prefs.device, &next)
            .await
            .context("save reader preferences")?;
        self.preferences = next;
        Ok(())
    }

    fn record_progress(&self) {
        if self.tracking == ProgressTracking::Disabled {
            return;
        }
        let progress = ReadingProgress {
            current_chapter_id: self.current().id.clone(),
            progress_percent: self.progress_percent(),
        };
        let service = Arc::clone(&self.service);
        let document_id = self.document.id.clone();
        self.background.spawn(async move {
            if let Err(err) = service.record_progress(&document_id, &progress).await {
                tracing::warn!(
                    %document_id,
                    chapter = %progress.current_chapter_id,
                    error = %err.detail(),
                    "could not record reading progress"
                );
            }
        });
    }
}
