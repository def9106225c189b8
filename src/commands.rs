use anyhow::Context as _;

use crate::autosave::SaveOutcome;
use crate::cli::{
    GlobalArgs, MetricsArgs, NewArgs, PrefsCommand, PrefsSetArgs, PublishArgs, ReadArgs,
    WriteArgs,
};
use crate::config::Config;
use crate::model::{ChapterId, DocumentId, NewDocument, TagId};
use crate::pagination::{self, compute_metrics};
use crate::prefs::DeviceId;
use crate::publish::PublicationWorkflow;
use crate::reader::{ProgressTracking, ReaderSession};
use crate::session::AuthoringSession;

/// Applies command-line overrides on top of the environment.
pub fn resolve_config(global: &GlobalArgs) -> anyhow::Result<Config> {
    let mut config = Config::from_env().context("load config")?;
    if let Some(api_url) = &global.api_url {
        config.api_url = Some(api_url.clone());
    }
    if let Some(data_dir) = &global.data_dir {
        config.data_dir = data_dir.into();
    }
    if let Some(device) = &global.device {
        config.device_id = DeviceId::parse(device).context("invalid --device")?;
    }
    Ok(config)
}

pub async fn metrics(args: MetricsArgs) -> anyhow::Result<()> {
    let mut all = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read chapter file: {path}"))?;
        let metrics = compute_metrics(&content);
        tracing::debug!(path, words = metrics.word_count, "measured chapter");
        println!(
            "{path}: {} words, {} pages",
            metrics.word_count, metrics.page_count
        );
        all.push(metrics);
    }
    println!("total: {} pages", pagination::total_pages(&all));
    Ok(())
}

pub async fn new_book(args: NewArgs, config: &Config) -> anyhow::Result<()> {
    let draft = NewDocument {
        title: args.title,
        subtitle: args.subtitle,
        description: args.description,
        cover: args.cover,
        license: args.license,
    };
    let session = AuthoringSession::create(config.persistence()?, draft).await?;
    println!("{}", session.document().id);
    Ok(())
}

pub async fn write(args: WriteArgs, config: &Config) -> anyhow::Result<()> {
    let document_id = DocumentId::new(args.document);
    let mut session = AuthoringSession::open(config.persistence()?, &document_id).await?;
    session.start_autosave(args.autosave_secs.unwrap_or(config.autosave_interval));

    let mut reuse_blank = session
        .with_chapters(|store| {
            let first = store.active_chapter();
            store.len() == 1 && first.id().is_none() && first.content().is_empty()
        })
        .await;

    for path in &args.files {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read chapter file: {path}"))?;
        let index = if reuse_blank {
            reuse_blank = false;
            session.with_chapters(|store| store.active_index()).await
        } else {
            let (outcome, index) = session.insert_chapter().await?;
            report(&outcome)?;
            index
        };
        if let Some(title) = heading_title(&content) {
            session.edit_title(index, title).await?;
        }
        session.edit_content(index, content).await?;
        tracing::info!(path, index, "imported chapter");
    }

    let (chapters, pages) = session
        .with_chapters(|store| (store.len(), store.total_pages()))
        .await;
    for outcome in session.close().await? {
        report(&outcome)?;
    }
    println!("{chapters} chapters, {pages} pages");
    Ok(())
}

pub async fn readiness(args: PublishArgs, config: &Config) -> anyhow::Result<()> {
    let session = AuthoringSession::open(config.persistence()?, &DocumentId::new(&*args.document))
        .await?;
    let workflow = prepare_workflow(&session, &args).await?;
    let verdict = workflow.readiness();
    println!("pages: {}", session.total_pages().await);
    println!("tags: {}", workflow.selected_tags().len());
    println!("can continue: {}", yes_no(verdict.can_proceed_step1));
    println!("can publish: {}", yes_no(verdict.can_submit));
    if let Some(reason) = verdict.reason {
        println!("{reason}");
    }
    Ok(())
}

pub async fn publish(args: PublishArgs, config: &Config) -> anyhow::Result<()> {
    let mut session =
        AuthoringSession::open(config.persistence()?, &DocumentId::new(&*args.document)).await?;
    let mut workflow = prepare_workflow(&session, &args).await?;
    workflow.advance()?;
    session.submit_publication(&mut workflow).await?;
    println!("published {}", session.document().title());
    Ok(())
}

async fn prepare_workflow(
    session: &AuthoringSession,
    args: &PublishArgs,
) -> anyhow::Result<PublicationWorkflow> {
    let mut workflow = session.begin_publication().await?;
    for tag in &args.tags {
        workflow.select_tag(&TagId::new(tag.as_str()))?;
    }
    workflow.set_consent(args.consent)?;
    Ok(workflow)
}

pub async fn read(args: ReadArgs, config: &Config) -> anyhow::Result<()> {
    let tracking = if args.anonymous {
        ProgressTracking::Disabled
    } else {
        ProgressTracking::Enabled
    };
    let explicit = args.chapter.as_deref().map(ChapterId::new);
    let mut reader = ReaderSession::open(
        config.persistence()?,
        &DocumentId::new(args.document),
        explicit.as_ref(),
        tracking,
        config.preferences(),
    )
    .await?;
    for _ in 0..args.advance {
        if reader.next().is_none() {
            break;
        }
    }

    let layout = reader.layout();
    let chapter = reader.current();
    println!("{}", reader.document().title());
    println!(
        "Chapter {}: {} ({}%)",
        reader.position(),
        chapter.title,
        reader.progress_percent()
    );
    println!();
    for line in wrap(&chapter.content, layout.column_width) {
        println!("{line}");
    }
    reader.flush().await;
    Ok(())
}

pub async fn prefs(command: PrefsCommand, config: &Config) -> anyhow::Result<()> {
    let scope = config.preferences();
    let mut prefs = scope.store.load(&scope.device).await?;
    if let PrefsCommand::Set(args) = command {
        apply_prefs(&mut prefs, &args);
        prefs = prefs.normalized();
        scope.store.save(&scope.device, &prefs).await?;
        tracing::info!(device = %scope.device, "saved reader preferences");
    }
    let json = serde_json::to_string_pretty(&prefs).context("serialize preferences")?;
    println!("{json}");
    Ok(())
}

fn apply_prefs(prefs: &mut crate::prefs::ReaderPreferences, args: &PrefsSetArgs) {
    if let Some(size) = args.font_size {
        prefs.font_size = size;
    }
    if let Some(height) = args.line_height {
        prefs.line_height = height;
    }
    if let Some(family) = args.font_family {
        prefs.font_family = family;
    }
    if let Some(theme) = args.theme {
        prefs.theme = theme;
    }
    if let Some(width) = args.width {
        prefs.width = width;
    }
}

fn report(outcome: &SaveOutcome) -> anyhow::Result<()> {
    match outcome {
        SaveOutcome::Saved { number, id, created } => {
            let verb = if *created { "created" } else { "updated" };
            tracing::info!(number, %id, "{verb} chapter");
            Ok(())
        }
        SaveOutcome::Skipped(reason) => {
            tracing::debug!(?reason, "save skipped");
            Ok(())
        }
        SaveOutcome::Failed(failure) => {
            anyhow::bail!("{} ({})", failure.message, failure.detail)
        }
    }
}

/// Text of a leading `# Heading` line, if any.
fn heading_title(content: &str) -> Option<&str> {
    let first = content.lines().find(|line| !line.trim().is_empty())?;
    let title = first.trim().strip_prefix("# ")?.trim();
    (!title.is_empty()).then_some(title)
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Greedy word wrap that keeps blank lines between paragraphs.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.len() + 1 + word.len() > width {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}
