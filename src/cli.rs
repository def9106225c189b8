use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::parse_autosave_secs;
use crate::prefs::{FontFamily, Theme, Width};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for the `CHAPTERHOUSE_*` environment.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Persistence service base URL (http/https).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Directory holding per-device reader state.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Device whose reader preferences are used.
    #[arg(long, global = true)]
    pub device: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Word and page counts for local files. Works offline.
    Metrics(MetricsArgs),
    /// Create a new book.
    New(NewArgs),
    /// Import files as chapters through an autosaving session.
    Write(WriteArgs),
    /// Show whether a book can be published.
    Readiness(PublishArgs),
    /// Submit a book for publication with the chosen tags.
    Publish(PublishArgs),
    /// Open a book in the reader and print the current chapter.
    Read(ReadArgs),
    /// Show or change this device's reader preferences.
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },
}

#[derive(Debug, Args)]
pub struct MetricsArgs {
    /// Chapter file (Markdown or HTML). Repeat for several chapters.
    #[arg(long = "file", required = true)]
    pub files: Vec<String>,
}

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Book title. Cannot be changed later.
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub description: String,

    #[arg(long)]
    pub subtitle: Option<String>,

    /// Cover image URL.
    #[arg(long)]
    pub cover: Option<String>,

    #[arg(long)]
    pub license: Option<String>,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Book to write into.
    #[arg(long)]
    pub document: String,

    /// Chapter file, appended in order. Repeat for several chapters.
    #[arg(long = "file", required = true)]
    pub files: Vec<String>,

    /// Autosave period in seconds (default from CHAPTERHOUSE_AUTOSAVE_SECS).
    #[arg(long, value_parser = parse_autosave_secs)]
    pub autosave_secs: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct PublishArgs {
    #[arg(long)]
    pub document: String,

    /// Tag id to publish under. Repeat for several tags.
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Affirm that you hold the rights to publish this book.
    #[arg(long, default_value_t = false)]
    pub consent: bool,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    #[arg(long)]
    pub document: String,

    /// Open this chapter instead of resuming.
    #[arg(long)]
    pub chapter: Option<String>,

    /// Read without loading or saving progress.
    #[arg(long, default_value_t = false)]
    pub anonymous: bool,

    /// Move forward this many chapters after opening.
    #[arg(long, default_value_t = 0)]
    pub advance: usize,
}

#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    Show,
    Set(PrefsSetArgs),
}

#[derive(Debug, Args)]
pub struct PrefsSetArgs {
    /// Font size in points (14-28).
    #[arg(long)]
    pub font_size: Option<u8>,

    /// Line height multiplier (1.4-2.4).
    #[arg(long)]
    pub line_height: Option<f32>,

    #[arg(long, value_enum)]
    pub font_family: Option<FontFamily>,

    #[arg(long, value_enum)]
    pub theme: Option<Theme>,

    #[arg(long, value_enum)]
    pub width: Option<Width>,
}
