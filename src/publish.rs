use crate::error::AuthoringError;
use crate::model::{DocumentId, Tag, TagId};
use crate::readiness::{self, Readiness, ReadinessInput};
use crate::service::{PersistenceService, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationStep {
    Categorize,
    Review,
    Submitted,
}

/// Two-step publish wizard: pick tags, then review and confirm.
///
/// Client-side checks only decide whether a request is worth sending; the server
/// re-checks everything and its answer wins.
#[derive(Debug, Clone)]
pub struct PublicationWorkflow {
    document_id: DocumentId,
    total_pages: u32,
    catalog: Vec<Tag>,
    remaining_slots: u32,
    step: PublicationStep,
    selected: Vec<TagId>,
    consent: bool,
    last_error: Option<String>,
}

impl PublicationWorkflow {
    pub fn new(
        document_id: DocumentId,
        total_pages: u32,
        catalog: Vec<Tag>,
        remaining_slots: u32,
    ) -> Self {
        Self {
            document_id,
            total_pages,
            catalog,
            remaining_slots,
            step: PublicationStep::Categorize,
            selected: Vec::new(),
            consent: false,
            last_error: None,
        }
    }

    pub fn step(&self) -> PublicationStep {
        self.step
    }

    pub fn catalog(&self) -> &[Tag] {
        &self.catalog
    }

    pub fn selected_tags(&self) -> &[TagId] {
        &self.selected
    }

    pub fn consent(&self) -> bool {
        self.consent
    }

    /// Reason shown next to the wizard controls, if the last action failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn readiness(&self) -> Readiness {
        readiness::evaluate(&ReadinessInput {
            total_pages: self.total_pages,
            selected_tags: &self.selected,
            consent_affirmed: self.consent,
            remaining_publish_slots: self.remaining_slots,
        })
    }

    pub fn set_total_pages(&mut self, total_pages: u32) {
        self.total_pages = total_pages;
    }

    pub fn set_remaining_slots(&mut self, remaining: u32) {
        self.remaining_slots = remaining;
    }

    pub fn select_tag(&mut self, tag_id: &TagId) -> Result<(), AuthoringError> {
        self.ensure_open()?;
        if !self.catalog.iter().any(|t| &t.id == tag_id) {
            return Err(AuthoringError::Validation(format!("Unknown tag: {tag_id}")));
        }
        if !self.selected.contains(tag_id) {
            self.selected.push(tag_id.clone());
        }
        Ok(())
    }

    pub fn deselect_tag(&mut self, tag_id: &TagId) -> Result<(), AuthoringError> {
        self.ensure_open()?;
        self.selected.retain(|t| t != tag_id);
        Ok(())
    }

    pub fn set_consent(&mut self, affirmed: bool) -> Result<(), AuthoringError> {
        self.ensure_open()?;
        self.consent = affirmed;
        Ok(())
    }

    /// `Categorize -> Review`, guarded by the page and tag rules.
    pub fn advance(&mut self) -> Result<(), AuthoringError> {
        self.ensure_open()?;
        if self.step == PublicationStep::Review {
            return Ok(());
        }
        let verdict = self.readiness();
        if !verdict.can_proceed_step1 {
            let reason = verdict.reason.unwrap_or_default();
            self.last_error = Some(reason.clone());
            return Err(AuthoringError::Validation(reason));
        }
        self.last_error = None;
        self.step = PublicationStep::Review;
        Ok(())
    }

    /// `Review -> Categorize`; always allowed before submission.
    pub fn back(&mut self) -> Result<(), AuthoringError> {
        self.ensure_open()?;
        self.step = PublicationStep::Categorize;
        self.last_error = None;
        Ok(())
    }

    /// Sends the publish request. On any refusal the workflow stays in `Review`.
    pub async fn submit(&mut self, service: &dyn PersistenceService) -> Result<(), AuthoringError> {
        self.ensure_open()?;
        if self.step != PublicationStep::Review {
            let reason = "Choose your tags before publishing.".to_owned();
            self.last_error = Some(reason.clone());
            return Err(AuthoringError::Validation(reason));
        }
        let verdict = self.readiness();
        if !verdict.can_submit {
            let reason = verdict.reason.unwrap_or_default();
            self.last_error = Some(reason.clone());
            return Err(AuthoringError::Validation(reason));
        }

        tracing::info!(document_id = %self.document_id, tags = self.selected.len(), "publishing");
        match service.publish(&self.document_id, &self.selected).await {
            Ok(()) => {
                self.step = PublicationStep::Submitted;
                self.last_error = None;
                tracing::info!(document_id = %self.document_id, "published");
                Ok(())
            }
            Err(ServiceError::Rejected { reason, status }) => {
                tracing::info!(status, %reason, "publish rejected by server");
                self.last_error = Some(reason.clone());
                Err(AuthoringError::ServerRejection(reason))
            }
            Err(err) => {
                let error = AuthoringError::persistence("Could not publish your book.", &err);
                self.last_error = Some(error.to_string());
                tracing::warn!(error = %err.detail(), "publish failed");
                Err(error)
            }
        }
    }

    fn ensure_open(&self) -> Result<(), AuthoringError> {
        if self.step == PublicationStep::Submitted {
            return Err(AuthoringError::AlreadyPublished);
        }
        Ok(())
    }
}
