use thiserror::Error;

use crate::service::ServiceError;

/// Deleting the sole chapter of a document. Raised before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a book must keep at least one chapter")]
pub struct MinimumChapterError;

#[derive(Debug, Error)]
pub enum AuthoringError {
    /// Client-detected problem; never sent to the server.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    MinimumChapter(#[from] MinimumChapterError),

    #[error("no chapter at position {index} (book has {count})")]
    NoSuchChapter { index: usize, count: usize },

    /// Non-2xx or transport failure. `detail` holds the raw error chain.
    #[error("{message}")]
    Persistence { message: String, detail: String },

    /// The server refused a publish request; the reason is shown verbatim.
    #[error("{0}")]
    ServerRejection(String),

    #[error("the book has already been published")]
    AlreadyPublished,
}

impl AuthoringError {
    pub fn persistence(message: impl Into<String>, err: &ServiceError) -> Self {
        Self::Persistence {
            message: message.into(),
            detail: err.detail(),
        }
    }
}
