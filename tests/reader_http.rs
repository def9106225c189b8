mod api_stub;

use std::sync::Arc;

use api_stub::ApiStub;
use chapterhouse::model::{ChapterId, DocumentId};
use chapterhouse::prefs::{DeviceId, InMemoryPreferencesStore, LocalFsPreferencesStore, Theme};
use chapterhouse::reader::{PreferencesScope, ProgressTracking, ReaderSession, ResumeSource};
use chapterhouse::service::{HttpPersistence, PersistenceService};
use serde_json::json;

fn service(stub: &ApiStub) -> Arc<dyn PersistenceService> {
    Arc::new(HttpPersistence::new(&stub.base_url, None).expect("client"))
}

fn memory_prefs() -> PreferencesScope {
    PreferencesScope {
        store: Arc::new(InMemoryPreferencesStore::default()),
        device: DeviceId::parse("test").expect("device id"),
    }
}

fn four_chapter_book(stub: &ApiStub) -> String {
    stub.seed_document(
        "Field Notes",
        &[
            ("Spring", "buds"),
            ("Summer", "heat"),
            ("Autumn", "leaves"),
            ("Winter", "snow"),
        ],
    )
}

fn chapter_id(stub: &ApiStub, document_id: &str, index: usize) -> String {
    let chapters = stub.state().chapters_of(document_id);
    chapters[index]["id"].to_string()
}

#[tokio::test]
async fn resumes_from_saved_progress_and_records_each_move() {
    let stub = ApiStub::spawn();
    let document_id = four_chapter_book(&stub);
    let third = chapter_id(&stub, &document_id, 2);
    stub.state().progress.insert(
        document_id.clone(),
        json!({ "current_chapter_id": third, "progress_percent": 75 }),
    );

    let mut reader = ReaderSession::open(
        service(&stub),
        &DocumentId::new(&*document_id),
        None,
        ProgressTracking::Enabled,
        memory_prefs(),
    )
    .await
    .unwrap();
    assert_eq!(reader.resumed_from(), ResumeSource::SavedProgress);
    assert_eq!(reader.current().title, "Autumn");
    assert_eq!(reader.progress_percent(), 75);

    assert_eq!(reader.next().map(|c| c.title.clone()).as_deref(), Some("Winter"));
    assert!(reader.next().is_none());
    reader.previous();
    reader.previous();
    reader.flush().await;

    let stored = stub.state().progress[&document_id].clone();
    assert_eq!(stored["progress_percent"], json!(50));
    assert_eq!(
        stub.state()
            .requests_matching("POST /api/documents/")
            .len(),
        4,
        "open, next, previous, previous"
    );
}

#[tokio::test]
async fn deep_link_beats_saved_progress() {
    let stub = ApiStub::spawn();
    let document_id = four_chapter_book(&stub);
    let first = chapter_id(&stub, &document_id, 0);
    let last = chapter_id(&stub, &document_id, 3);
    stub.state().progress.insert(
        document_id.clone(),
        json!({ "current_chapter_id": last, "progress_percent": 100 }),
    );

    let reader = ReaderSession::open(
        service(&stub),
        &DocumentId::new(&*document_id),
        Some(&ChapterId::new(first)),
        ProgressTracking::Enabled,
        memory_prefs(),
    )
    .await
    .unwrap();
    assert_eq!(reader.resumed_from(), ResumeSource::Explicit);
    assert_eq!(reader.index(), 0);
    reader.flush().await;
}

#[tokio::test]
async fn anonymous_readers_leave_no_trace() {
    let stub = ApiStub::spawn();
    let document_id = four_chapter_book(&stub);

    let mut reader = ReaderSession::open(
        service(&stub),
        &DocumentId::new(&*document_id),
        None,
        ProgressTracking::Disabled,
        memory_prefs(),
    )
    .await
    .unwrap();
    assert_eq!(reader.resumed_from(), ResumeSource::Start);
    reader.next();
    reader.flush().await;

    assert!(
        stub.state()
            .requests
            .iter()
            .all(|r| !r.contains("reading-progress"))
    );
}

#[tokio::test]
async fn preferences_follow_the_device() -> anyhow::Result<()> {
    let stub = ApiStub::spawn();
    let document_id = four_chapter_book(&stub);
    let temp = tempfile::TempDir::new()?;
    let store = Arc::new(LocalFsPreferencesStore::new(temp.path()));
    let scope = |device: &str| -> anyhow::Result<PreferencesScope> {
        Ok(PreferencesScope {
            store: store.clone(),
            device: DeviceId::parse(device)?,
        })
    };

    let mut phone = ReaderSession::open(
        service(&stub),
        &DocumentId::new(&*document_id),
        None,
        ProgressTracking::Disabled,
        scope("phone")?,
    )
    .await?;
    phone
        .update_preferences(|p| {
            p.theme = Theme::Dark;
            p.font_size = 60;
        })
        .await?;
    assert_eq!(phone.preferences().font_size, 28);

    let desk = ReaderSession::open(
        service(&stub),
        &DocumentId::new(&*document_id),
        None,
        ProgressTracking::Disabled,
        scope("desk")?,
    )
    .await?;
    assert_eq!(desk.preferences().theme, Theme::Light);

    let phone_again = ReaderSession::open(
        service(&stub),
        &DocumentId::new(&*document_id),
        None,
        ProgressTracking::Disabled,
        scope("phone")?,
    )
    .await?;
    assert_eq!(phone_again.preferences().theme, Theme::Dark);
    Ok(())
}

#[tokio::test]
async fn stored_number_gaps_do_not_leak_into_positions() {
    let stub = ApiStub::spawn();
    let document_id = four_chapter_book(&stub);
    for (chapter, number) in stub
        .state()
        .chapters
        .get_mut(&document_id)
        .unwrap()
        .iter_mut()
        .zip([2, 3, 5, 9])
    {
        chapter["number"] = json!(number);
    }

    let mut reader = ReaderSession::open(
        service(&stub),
        &DocumentId::new(&*document_id),
        None,
        ProgressTracking::Disabled,
        memory_prefs(),
    )
    .await
    .unwrap();
    assert_eq!(reader.position(), 1);
    assert_eq!(reader.current().title, "Spring");
    reader.next();
    reader.next();
    assert_eq!(reader.position(), 3);
    assert_eq!(reader.current().title, "Autumn");
    assert_eq!(reader.progress_percent(), 75);
}
