use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AuthoringError;

/// Server ids arrive either as JSON strings or as integers depending on the backend.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match RawId::deserialize(deserializer)? {
        RawId::Text(text) => Ok(text),
        RawId::Number(number) => Ok(number.to_string()),
    }
}

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(#[serde(deserialize_with = "deserialize_id")] String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }
    };
}

opaque_id!(DocumentId);
opaque_id!(ChapterId);
opaque_id!(TagId);

/// A multi-chapter book. The title is fixed once the document exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub tags: Vec<TagId>,
    /// Cached for display; recompute from chapters when it matters.
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: DocumentId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            subtitle: None,
            description: String::new(),
            cover: None,
            license: None,
            tags: Vec::new(),
            total_pages: 0,
            published: false,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            subtitle: self.subtitle.clone(),
            description: self.description.clone(),
            cover: self.cover.clone(),
            license: self.license.clone(),
        }
    }

    pub fn set_metadata(&mut self, metadata: DocumentMetadata) {
        self.subtitle = metadata.subtitle;
        self.description = metadata.description;
        self.cover = metadata.cover;
        self.license = metadata.license;
    }
}

/// The editable subset of a document, sent by `PUT /documents/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub subtitle: Option<String>,
    pub description: String,
    pub cover: Option<String>,
    pub license: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl NewDocument {
    pub fn validate(&self) -> Result<(), AuthoringError> {
        if self.title.trim().is_empty() {
            return Err(AuthoringError::Validation("Give your book a title.".to_owned()));
        }
        if self.description.trim().is_empty() {
            return Err(AuthoringError::Validation(
                "Add a short description of your book.".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A chapter as the persistence service returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: ChapterId,
    pub number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub page_count: Option<u32>,
}

/// Body of chapter create and update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterPayload {
    pub number: u32,
    pub title: String,
    pub content: String,
    pub page_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedChapter {
    pub id: ChapterId,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub book_page_count: Option<u32>,
    #[serde(default)]
    pub book_chapter_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub current_chapter_id: ChapterId,
    pub progress_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}
