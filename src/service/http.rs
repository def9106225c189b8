use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::model::{
    ChapterId, ChapterPayload, ChapterRecord, Document, DocumentId, DocumentMetadata, NewDocument,
    ReadingProgress, SavedChapter, Tag, TagId,
};
use crate::service::{PersistenceService, ServiceError, ServiceResult};

/// JSON-over-HTTP implementation of [`PersistenceService`].
#[derive(Debug, Clone)]
pub struct HttpPersistence {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpPersistence {
    pub fn new(base_url: &str, auth_token: Option<String>) -> anyhow::Result<Self> {
        let parsed = Url::parse(base_url).with_context(|| format!("parse api url: {base_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("api url must be http or https: {base_url}");
        }
        let auth_token = auth_token
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth_token,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%method, %url, "persistence request");
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder, path: &str) -> ServiceResult<String> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("send request: {path}"))?;
        let status = resp.status();
        let raw = resp
            .text()
            .await
            .with_context(|| format!("read response body: {path}"))?;
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound {
                resource: path.to_owned(),
            });
        }
        if !status.is_success() {
            let reason = parse_error_reason(&raw).unwrap_or_else(|| {
                if raw.trim().is_empty() {
                    status.to_string()
                } else {
                    raw.trim().to_owned()
                }
            });
            return Err(ServiceError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }
        Ok(raw)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        path: &str,
    ) -> ServiceResult<T> {
        let raw = self.send(req, path).await?;
        let value = serde_json::from_str(&raw).with_context(|| format!("parse response: {path}"))?;
        Ok(value)
    }
}

/// Pulls `error` (or `message`) out of a JSON error body.
fn parse_error_reason(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let field = value.get("error").or_else(|| value.get("message"))?;
    match field {
        serde_json::Value::String(reason) => Some(reason.clone()),
        serde_json::Value::Object(obj) => obj.get("message")?.as_str().map(str::to_owned),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct SlotsResponse {
    remaining: u32,
}

#[async_trait]
impl PersistenceService for HttpPersistence {
    async fn create_document(&self, draft: &NewDocument) -> ServiceResult<Document> {
        let path = "/documents";
        self.send_json(self.request(Method::POST, path).json(draft), path)
            .await
    }

    async fn get_document(&self, document_id: &DocumentId) -> ServiceResult<Document> {
        let path = format!("/documents/{document_id}");
        self.send_json(self.request(Method::GET, &path), &path).await
    }

    async fn update_document(
        &self,
        document_id: &DocumentId,
        metadata: &DocumentMetadata,
    ) -> ServiceResult<()> {
        let path = format!("/documents/{document_id}");
        self.send(self.request(Method::PUT, &path).json(metadata), &path)
            .await?;
        Ok(())
    }

    async fn list_chapters(&self, document_id: &DocumentId) -> ServiceResult<Vec<ChapterRecord>> {
        let path = format!("/documents/{document_id}/chapters");
        let mut chapters: Vec<ChapterRecord> =
            self.send_json(self.request(Method::GET, &path), &path).await?;
        chapters.sort_by_key(|c| c.number);
        Ok(chapters)
    }

    async fn create_chapter(
        &self,
        document_id: &DocumentId,
        chapter: &ChapterPayload,
    ) -> ServiceResult<SavedChapter> {
        let path = format!("/documents/{document_id}/chapters");
        self.send_json(self.request(Method::POST, &path).json(chapter), &path)
            .await
    }

    async fn update_chapter(
        &self,
        document_id: &DocumentId,
        chapter_id: &ChapterId,
        chapter: &ChapterPayload,
    ) -> ServiceResult<SavedChapter> {
        let path = format!("/documents/{document_id}/chapters/{chapter_id}");
        self.send_json(self.request(Method::PUT, &path).json(chapter), &path)
            .await
    }

    async fn delete_chapter(
        &self,
        document_id: &DocumentId,
        chapter_id: &ChapterId,
    ) -> ServiceResult<()> {
        let path = format!("/documents/{document_id}/chapters/{chapter_id}");
        self.send(self.request(Method::DELETE, &path), &path).await?;
        Ok(())
    }

    async fn reading_progress(
        &self,
        document_id: &DocumentId,
    ) -> ServiceResult<Option<ReadingProgress>> {
        let path = format!("/documents/{document_id}/reading-progress");
        match self
            .send_json::<Option<ReadingProgress>>(self.request(Method::GET, &path), &path)
            .await
        {
            Ok(progress) => Ok(progress),
            Err(ServiceError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn record_progress(
        &self,
        document_id: &DocumentId,
        progress: &ReadingProgress,
    ) -> ServiceResult<()> {
        let path = format!("/documents/{document_id}/reading-progress");
        self.send(self.request(Method::POST, &path).json(progress), &path)
            .await?;
        Ok(())
    }

    async fn publish(&self, document_id: &DocumentId, tag_ids: &[TagId]) -> ServiceResult<()> {
        let path = format!("/documents/{document_id}/publish");
        let body = serde_json::json!({ "tagIds": tag_ids });
        self.send(self.request(Method::POST, &path).json(&body), &path)
            .await?;
        Ok(())
    }

    async fn tags(&self) -> ServiceResult<Vec<Tag>> {
        let path = "/tags";
        self.send_json(self.request(Method::GET, path), path).await
    }

    async fn remaining_publish_slots(&self) -> ServiceResult<u32> {
        let path = "/publish-slots/remaining";
        let slots: SlotsResponse = self.send_json(self.request(Method::GET, path), path).await?;
        Ok(slots.remaining)
    }
}
