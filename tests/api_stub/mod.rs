use std::collections::BTreeMap;
use std::io::Read as _;
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

/// In-memory persistence service speaking the same JSON as the real one.
///
/// Chapter ids are handed out as JSON integers so the client's id parsing is exercised.
#[derive(Debug, Default)]
pub struct StubState {
    /// `"METHOD /path"` for every request, in arrival order.
    pub requests: Vec<String>,
    pub last_authorization: Option<String>,
    pub documents: BTreeMap<String, Value>,
    pub chapters: BTreeMap<String, Vec<Value>>,
    pub progress: BTreeMap<String, Value>,
    pub tags: Vec<Value>,
    pub slots: u32,
    pub publish_rejection: Option<String>,
    next_id: u64,
}

impl StubState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn chapters_of(&self, document_id: &str) -> Vec<Value> {
        self.chapters.get(document_id).cloned().unwrap_or_default()
    }

    pub fn requests_matching(&self, prefix: &str) -> Vec<String> {
        self.requests
            .iter()
            .filter(|r| r.starts_with(prefix))
            .cloned()
            .collect()
    }
}

pub struct ApiStub {
    pub base_url: String,
    state: Arc<Mutex<StubState>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl ApiStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start api stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/api");
        let state = Arc::new(Mutex::new(StubState::default()));

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&state);

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let method = request.method().to_string().to_ascii_uppercase();
                let path = request.url().to_string();
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_owned());

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let body: Value = if body.trim().is_empty() {
                    Value::Null
                } else {
                    match serde_json::from_str(&body) {
                        Ok(value) => value,
                        Err(_) => {
                            let _ = request.respond(
                                tiny_http::Response::from_string("invalid json")
                                    .with_status_code(400),
                            );
                            continue;
                        }
                    }
                };

                let (status, payload) = {
                    let mut state = shared.lock().expect("lock stub state");
                    state.requests.push(format!("{method} {path}"));
                    if authorization.is_some() {
                        state.last_authorization = authorization;
                    }
                    route(&mut state, &method, &path, body)
                };

                let response = tiny_http::Response::from_string(payload.to_string())
                    .with_status_code(status)
                    .with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"application/json"[..],
                        )
                        .expect("build header"),
                    );
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().expect("lock stub state")
    }

    /// Seeds a document with chapters numbered from 1. Returns the document id.
    pub fn seed_document(&self, title: &str, chapters: &[(&str, &str)]) -> String {
        let mut state = self.state();
        let document_id = format!("doc-{}", state.next_id());
        state.documents.insert(
            document_id.clone(),
            json!({
                "id": document_id,
                "title": title,
                "description": "Seeded for tests.",
                "published": false,
            }),
        );
        let mut records = Vec::new();
        for (i, (chapter_title, content)) in chapters.iter().enumerate() {
            let id = state.next_id();
            records.push(json!({
                "id": id,
                "number": i + 1,
                "title": chapter_title,
                "content": content,
                "page_count": 1,
            }));
        }
        state.chapters.insert(document_id.clone(), records);
        document_id
    }

    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }
}

impl Drop for ApiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn not_found(what: &str) -> (u16, Value) {
    (404, json!({ "error": format!("{what} not found") }))
}

fn route(state: &mut StubState, method: &str, path: &str, body: Value) -> (u16, Value) {
    let Some(rest) = path.strip_prefix("/api/") else {
        return not_found("route");
    };
    let segments: Vec<&str> = rest.split('/').collect();

    match (method, segments.as_slice()) {
        ("GET", ["tags"]) => (200, Value::Array(state.tags.clone())),
        ("GET", ["publish-slots", "remaining"]) => (200, json!({ "remaining": state.slots })),
        ("POST", ["documents"]) => {
            let document_id = format!("doc-{}", state.next_id());
            let mut document = body;
            document["id"] = json!(document_id);
            document["published"] = json!(false);
            state.documents.insert(document_id.clone(), document.clone());
            state.chapters.insert(document_id, Vec::new());
            (201, document)
        }
        ("GET", ["documents", id]) => match state.documents.get(*id) {
            Some(document) => (200, document.clone()),
            None => not_found("document"),
        },
        ("PUT", ["documents", id]) => match state.documents.get_mut(*id) {
            Some(document) => {
                for field in ["subtitle", "description", "cover", "license"] {
                    document[field] = body.get(field).cloned().unwrap_or(Value::Null);
                }
                (200, json!({}))
            }
            None => not_found("document"),
        },
        ("GET", ["documents", id, "chapters"]) => match state.chapters.get(*id) {
            Some(chapters) => (200, Value::Array(chapters.clone())),
            None => not_found("document"),
        },
        ("POST", ["documents", id, "chapters"]) => {
            if !state.documents.contains_key(*id) {
                return not_found("document");
            }
            let chapter_id = state.next_id();
            let page_count = body.get("page_count").cloned().unwrap_or(json!(1));
            let mut record = body;
            record["id"] = json!(chapter_id);
            let chapters = state.chapters.entry(id.to_string()).or_default();
            chapters.push(record);
            let book_pages: u64 = chapters
                .iter()
                .filter_map(|c| c.get("page_count").and_then(Value::as_u64))
                .sum();
            (
                201,
                json!({
                    "id": chapter_id,
                    "page_count": page_count,
                    "book_page_count": book_pages,
                    "book_chapter_count": chapters.len(),
                }),
            )
        }
        ("PUT", ["documents", id, "chapters", chapter_id]) => {
            let Some(record) = find_chapter(state, id, chapter_id) else {
                return not_found("chapter");
            };
            for field in ["number", "title", "content", "page_count"] {
                if let Some(value) = body.get(field) {
                    record[field] = value.clone();
                }
            }
            let saved = json!({ "id": record["id"], "page_count": record["page_count"] });
            (200, saved)
        }
        ("DELETE", ["documents", id, "chapters", chapter_id]) => {
            let Some(chapters) = state.chapters.get_mut(*id) else {
                return not_found("document");
            };
            let before = chapters.len();
            chapters.retain(|c| id_string(&c["id"]) != *chapter_id);
            if chapters.len() == before {
                return not_found("chapter");
            }
            (200, json!({}))
        }
        ("GET", ["documents", id, "reading-progress"]) => match state.progress.get(*id) {
            Some(progress) => (200, progress.clone()),
            None => not_found("reading progress"),
        },
        ("POST", ["documents", id, "reading-progress"]) => {
            state.progress.insert(id.to_string(), body);
            (200, json!({}))
        }
        ("POST", ["documents", id, "publish"]) => {
            if let Some(reason) = state.publish_rejection.clone() {
                return (422, json!({ "error": reason }));
            }
            let Some(document) = state.documents.get_mut(*id) else {
                return not_found("document");
            };
            document["published"] = json!(true);
            document["tags"] = body.get("tagIds").cloned().unwrap_or(json!([]));
            (200, json!({}))
        }
        _ => not_found("route"),
    }
}

fn find_chapter<'a>(
    state: &'a mut StubState,
    document_id: &str,
    chapter_id: &str,
) -> Option<&'a mut Value> {
    state
        .chapters
        .get_mut(document_id)?
        .iter_mut()
        .find(|c| id_string(&c["id"]) == chapter_id)
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
