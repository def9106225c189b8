//! Local-first edits that can be undone exactly when the server refuses them.

use crate::model::{Document, DocumentMetadata};

pub trait Reversible<T> {
    fn apply(&mut self, target: &mut T);
    fn revert(&mut self, target: &mut T);
}

/// Replaces a document's metadata, remembering what it replaced.
#[derive(Debug, Clone)]
pub struct MetadataEdit {
    next: DocumentMetadata,
    previous: Option<DocumentMetadata>,
}

impl MetadataEdit {
    pub fn new(next: DocumentMetadata) -> Self {
        Self {
            next,
            previous: None,
        }
    }

    pub fn next(&self) -> &DocumentMetadata {
        &self.next
    }
}

impl Reversible<Document> for MetadataEdit {
    fn apply(&mut self, target: &mut Document) {
        self.previous = Some(target.metadata());
        target.set_metadata(self.next.clone());
    }

    fn revert(&mut self, target: &mut Document) {
        if let Some(previous) = self.previous.take() {
            target.set_metadata(previous);
        }
    }
}
