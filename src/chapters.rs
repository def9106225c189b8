use crate::error::{AuthoringError, MinimumChapterError};
use crate::model::{ChapterId, ChapterPayload, ChapterRecord};
use crate::pagination::{self, ChapterMetrics};

/// Whether a chapter has been given an id by the persistence service yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterIdentity {
    Draft,
    Persisted(ChapterId),
}

impl ChapterIdentity {
    pub fn id(&self) -> Option<&ChapterId> {
        match self {
            Self::Draft => None,
            Self::Persisted(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterField {
    Title,
    Content,
}

#[derive(Debug, Clone)]
pub struct Chapter {
    identity: ChapterIdentity,
    number: u32,
    title: String,
    content: String,
    metrics: ChapterMetrics,
    revision: u64,
    saved_revision: Option<u64>,
}

impl Chapter {
    fn draft(number: u32) -> Self {
        Self {
            identity: ChapterIdentity::Draft,
            number,
            title: default_title(number),
            content: String::new(),
            metrics: pagination::compute_metrics(""),
            revision: 0,
            saved_revision: None,
        }
    }

    fn from_record(record: ChapterRecord) -> Self {
        let metrics = pagination::compute_metrics(&record.content);
        Self {
            identity: ChapterIdentity::Persisted(record.id),
            number: record.number,
            title: record.title,
            content: record.content,
            metrics,
            revision: 0,
            saved_revision: Some(0),
        }
    }

    pub fn identity(&self) -> &ChapterIdentity {
        &self.identity
    }

    pub fn id(&self) -> Option<&ChapterId> {
        self.identity.id()
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metrics(&self) -> ChapterMetrics {
        self.metrics
    }

    /// Local edits not yet confirmed by a successful save.
    pub fn is_dirty(&self) -> bool {
        self.saved_revision != Some(self.revision)
    }

    pub fn has_default_title(&self) -> bool {
        is_default_title(&self.title)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

/// What autosave sends for one chapter, frozen at the start of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSnapshot {
    pub identity: ChapterIdentity,
    pub revision: u64,
    pub payload: ChapterPayload,
}

pub fn default_title(number: u32) -> String {
    format!("Chapter {number}")
}

fn is_default_title(title: &str) -> bool {
    title
        .strip_prefix("Chapter ")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// In-memory, ordered chapter list of one document.
#[derive(Debug, Clone)]
pub struct ChapterStore {
    chapters: Vec<Chapter>,
    active: usize,
    server_page_count: Option<u32>,
}

impl Default for ChapterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChapterStore {
    /// A fresh document: one empty draft chapter.
    pub fn new() -> Self {
        Self {
            chapters: vec![Chapter::draft(1)],
            active: 0,
            server_page_count: None,
        }
    }

    /// Builds the list from the server's view, ordered by `number`.
    pub fn from_records(mut records: Vec<ChapterRecord>) -> Self {
        if records.is_empty() {
            return Self::new();
        }
        records.sort_by_key(|r| r.number);
        let mut store = Self {
            chapters: records.into_iter().map(Chapter::from_record).collect(),
            active: 0,
            server_page_count: None,
        };
        store.renumber();
        store
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Indices of chapters with edits the server has not seen, renumbering included.
    pub fn unsaved(&self) -> Vec<usize> {
        self.chapters
            .iter()
            .enumerate()
            .filter(|(_, chapter)| chapter.is_dirty())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn get(&self, index: usize) -> Result<&Chapter, AuthoringError> {
        self.chapters.get(index).ok_or(AuthoringError::NoSuchChapter {
            index,
            count: self.chapters.len(),
        })
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut Chapter, AuthoringError> {
        let count = self.chapters.len();
        self.chapters
            .get_mut(index)
            .ok_or(AuthoringError::NoSuchChapter { index, count })
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_chapter(&self) -> &Chapter {
        &self.chapters[self.active]
    }

    pub fn set_active(&mut self, index: usize) -> Result<(), AuthoringError> {
        self.get(index)?;
        self.active = index;
        Ok(())
    }

    /// Appends an empty draft and makes it the active chapter.
    pub fn insert(&mut self) -> &Chapter {
        let number = self.chapters.len() as u32 + 1;
        self.chapters.push(Chapter::draft(number));
        self.active = self.chapters.len() - 1;
        &self.chapters[self.active]
    }

    pub fn update(
        &mut self,
        index: usize,
        field: ChapterField,
        value: impl Into<String>,
    ) -> Result<(), AuthoringError> {
        let chapter = self.get_mut(index)?;
        let value = value.into();
        match field {
            ChapterField::Title => chapter.title = value,
            ChapterField::Content => {
                chapter.metrics = pagination::compute_metrics(&value);
                chapter.content = value;
            }
        }
        chapter.touch();
        Ok(())
    }

    /// Checks the delete guards without touching anything.
    pub fn ensure_removable(&self, index: usize) -> Result<(), AuthoringError> {
        self.get(index)?;
        if self.chapters.len() <= 1 {
            return Err(MinimumChapterError.into());
        }
        Ok(())
    }

    /// Removes a chapter locally, then renumbers the rest `1..N`.
    pub fn remove(&mut self, index: usize) -> Result<Chapter, AuthoringError> {
        self.ensure_removable(index)?;
        let removed = self.chapters.remove(index);
        if self.active > index || self.active >= self.chapters.len() {
            self.active = self.active.saturating_sub(1);
        }
        self.renumber();
        Ok(removed)
    }

    fn renumber(&mut self) {
        for (idx, chapter) in self.chapters.iter_mut().enumerate() {
            let number = idx as u32 + 1;
            if chapter.number == number {
                continue;
            }
            if chapter.has_default_title() {
                chapter.title = default_title(number);
            }
            chapter.number = number;
            chapter.touch();
        }
    }

    pub fn snapshot(&self, index: usize) -> Result<ChapterSnapshot, AuthoringError> {
        let chapter = self.get(index)?;
        Ok(ChapterSnapshot {
            identity: chapter.identity.clone(),
            revision: chapter.revision,
            payload: ChapterPayload {
                number: chapter.number,
                title: chapter.title.clone(),
                content: chapter.content.clone(),
                page_count: chapter.metrics.page_count,
            },
        })
    }

    /// Records a finished save against whichever chapter now holds `snapshot`'s number.
    ///
    /// The id is only attached when that chapter still has the identity the snapshot
    /// was taken with; returns whether it was.
    pub fn record_save(&mut self, snapshot: &ChapterSnapshot, id: ChapterId) -> bool {
        let number = snapshot.payload.number;
        let Some(chapter) = self.chapters.iter_mut().find(|c| c.number == number) else {
            tracing::warn!(number, "saved chapter no longer exists locally");
            return false;
        };
        if chapter.identity != snapshot.identity {
            tracing::warn!(
                number,
                %id,
                "chapter identity changed while saving; keeping local identity"
            );
            return false;
        }
        chapter.identity = ChapterIdentity::Persisted(id);
        chapter.saved_revision = Some(snapshot.revision);
        true
    }

    pub fn total_pages(&self) -> u32 {
        pagination::total_pages(self.chapters.iter().map(|c| &c.metrics))
    }

    pub fn total_words(&self) -> u32 {
        self.chapters.iter().map(|c| c.metrics.word_count).sum()
    }

    /// Page total last reported by the server, for display only.
    pub fn server_page_count(&self) -> Option<u32> {
        self.server_page_count
    }

    pub fn set_server_page_count(&mut self, pages: u32) {
        self.server_page_count = Some(pages);
    }
}
