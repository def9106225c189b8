use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::chapters::{ChapterIdentity, ChapterSnapshot, ChapterStore};
use crate::error::AuthoringError;
use crate::model::{ChapterId, DocumentId, SavedChapter};
use crate::service::{PersistenceService, ServiceError};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Saving,
    SaveFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFailure {
    pub message: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveStatus {
    pub state: SaveState,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_failure: Option<SaveFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Timer,
    Switch,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    EmptyContent,
    Unchanged,
    SameChapter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved {
        number: u32,
        id: ChapterId,
        created: bool,
    },
    Skipped(SkipReason),
    Failed(SaveFailure),
}

/// Persists the active chapter, one save at a time.
///
/// Timer and manual triggers that arrive while a save is in flight are dropped.
/// Chapter switches wait for it and then flush the outgoing chapter.
pub struct AutosaveCoordinator {
    document_id: DocumentId,
    store: Arc<Mutex<ChapterStore>>,
    service: Arc<dyn PersistenceService>,
    flight: Mutex<()>,
    status: watch::Sender<SaveStatus>,
}

impl AutosaveCoordinator {
    pub fn new(
        document_id: DocumentId,
        store: Arc<Mutex<ChapterStore>>,
        service: Arc<dyn PersistenceService>,
    ) -> Self {
        let (status, _) = watch::channel(SaveStatus {
            state: SaveState::Idle,
            last_saved_at: None,
            last_failure: None,
        });
        Self {
            document_id,
            store,
            service,
            flight: Mutex::new(()),
            status,
        }
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    /// Saves the active chapter.
    pub async fn save(&self, trigger: SaveTrigger) -> Result<SaveOutcome, AuthoringError> {
        let _flight = match trigger {
            SaveTrigger::Switch => self.flight.lock().await,
            SaveTrigger::Timer | SaveTrigger::Manual => match self.flight.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!(?trigger, "save already in flight; dropping trigger");
                    return Ok(SaveOutcome::Skipped(SkipReason::InFlight));
                }
            },
        };
        let index = self.store.lock().await.active_index();
        self.save_index(index, trigger).await
    }

    /// Flushes the outgoing chapter, then runs `change` against the store.
    ///
    /// `change` runs even when the flush fails; the unsaved edits stay in memory
    /// and the failure is reported through the status channel.
    pub async fn flush_then<T>(
        &self,
        change: impl FnOnce(&mut ChapterStore) -> Result<T, AuthoringError>,
    ) -> Result<(SaveOutcome, T), AuthoringError> {
        let _flight = self.flight.lock().await;
        let outgoing = self.store.lock().await.active_index();
        let outcome = self.save_index(outgoing, SaveTrigger::Switch).await?;
        let value = change(&mut *self.store.lock().await)?;
        Ok((outcome, value))
    }

    /// Waits for any in-flight save and holds off new ones until the guard drops.
    pub async fn pause(&self) -> PausedSaves<'_> {
        PausedSaves {
            coordinator: self,
            _flight: self.flight.lock().await,
        }
    }

    /// Saves every chapter with unsaved edits, not just the active one.
    pub async fn flush_all(&self) -> Result<Vec<SaveOutcome>, AuthoringError> {
        self.pause().await.flush_all().await
    }

    // Caller holds `flight`.
    async fn save_unsaved(&self) -> Result<Vec<SaveOutcome>, AuthoringError> {
        let pending = self.store.lock().await.unsaved();
        let mut outcomes = Vec::with_capacity(pending.len());
        for index in pending {
            outcomes.push(self.save_index(index, SaveTrigger::Switch).await?);
        }
        Ok(outcomes)
    }

    /// Makes `index` the active chapter after flushing the current one.
    pub async fn switch_to(&self, index: usize) -> Result<SaveOutcome, AuthoringError> {
        {
            let store = self.store.lock().await;
            store.get(index)?;
            if store.active_index() == index {
                return Ok(SaveOutcome::Skipped(SkipReason::SameChapter));
            }
        }
        let (outcome, ()) = self.flush_then(|store| store.set_active(index)).await?;
        Ok(outcome)
    }

    /// Runs the timer trigger every `period` until the handle is dropped.
    pub fn spawn(self: &Arc<Self>, period: Duration) -> AutosaveHandle {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match this.save(SaveTrigger::Timer).await {
                    Ok(SaveOutcome::Saved { number, .. }) => {
                        tracing::debug!(number, "autosaved chapter");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(?err, "autosave tick failed"),
                }
            }
        });
        AutosaveHandle { task }
    }

    async fn save_index(
        &self,
        index: usize,
        trigger: SaveTrigger,
    ) -> Result<SaveOutcome, AuthoringError> {
        let snapshot = {
            let store = self.store.lock().await;
            let chapter = store.get(index)?;
            let empty = chapter.content().trim().is_empty();
            let draft = chapter.id().is_none();
            match trigger {
                SaveTrigger::Timer if empty => {
                    return Ok(SaveOutcome::Skipped(SkipReason::EmptyContent));
                }
                SaveTrigger::Switch if empty && draft => {
                    return Ok(SaveOutcome::Skipped(SkipReason::EmptyContent));
                }
                SaveTrigger::Timer | SaveTrigger::Switch if !chapter.is_dirty() => {
                    return Ok(SaveOutcome::Skipped(SkipReason::Unchanged));
                }
                _ => {}
            }
            store.snapshot(index)?
        };

        self.status.send_modify(|s| s.state = SaveState::Saving);
        let number = snapshot.payload.number;
        tracing::debug!(number, ?trigger, "saving chapter");

        match self.persist(&snapshot).await {
            Ok((saved, created)) => {
                {
                    let mut store = self.store.lock().await;
                    store.record_save(&snapshot, saved.id.clone());
                    if let Some(pages) = saved.book_page_count {
                        store.set_server_page_count(pages);
                    }
                }
                self.status.send_modify(|s| {
                    s.state = SaveState::Idle;
                    s.last_saved_at = Some(Utc::now());
                    s.last_failure = None;
                });
                tracing::info!(number, id = %saved.id, created, "chapter saved");
                Ok(SaveOutcome::Saved {
                    number,
                    id: saved.id,
                    created,
                })
            }
            Err(err) => {
                let failure = SaveFailure {
                    message: format!("Could not save \"{}\".", snapshot.payload.title),
                    detail: err.detail(),
                };
                tracing::warn!(number, error = %failure.detail, "chapter save failed");
                self.status.send_modify(|s| {
                    s.state = SaveState::SaveFailed;
                    s.last_failure = Some(failure.clone());
                });
                Ok(SaveOutcome::Failed(failure))
            }
        }
    }

    /// Create for drafts, update otherwise. An update that finds nothing is retried as a create.
    async fn persist(
        &self,
        snapshot: &ChapterSnapshot,
    ) -> Result<(SavedChapter, bool), ServiceError> {
        let payload = &snapshot.payload;
        match &snapshot.identity {
            ChapterIdentity::Draft => {
                let saved = self
                    .service
                    .create_chapter(&self.document_id, payload)
                    .await?;
                Ok((saved, true))
            }
            ChapterIdentity::Persisted(id) => {
                match self
                    .service
                    .update_chapter(&self.document_id, id, payload)
                    .await
                {
                    Ok(saved) => Ok((saved, false)),
                    Err(err) if err.is_not_found() => {
                        tracing::info!(%id, "chapter missing remotely; recreating");
                        let saved = self
                            .service
                            .create_chapter(&self.document_id, payload)
                            .await?;
                        Ok((saved, true))
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}

/// Holds off every save trigger until dropped.
pub struct PausedSaves<'a> {
    coordinator: &'a AutosaveCoordinator,
    _flight: MutexGuard<'a, ()>,
}

impl PausedSaves<'_> {
    /// Saves every chapter with unsaved edits without releasing the pause.
    pub async fn flush_all(&self) -> Result<Vec<SaveOutcome>, AuthoringError> {
        self.coordinator.save_unsaved().await
    }
}

/// Stops the periodic autosave when dropped.
pub struct AutosaveHandle {
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for AutosaveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
