//! Per-device reader display settings. Never sent to the server.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

pub const FONT_SIZE_RANGE: (u8, u8) = (14, 28);
pub const LINE_HEIGHT_RANGE: (f32, f32) = (1.4, 2.4);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FontFamily {
    Serif,
    Sans,
    Mono,
    Dyslexic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Sepia,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Width {
    Narrow,
    Normal,
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderPreferences {
    pub font_size: u8,
    pub line_height: f32,
    pub font_family: FontFamily,
    pub theme: Theme,
    pub width: Width,
}

impl Default for ReaderPreferences {
    fn default() -> Self {
        Self {
            font_size: 18,
            line_height: 1.7,
            font_family: FontFamily::Serif,
            theme: Theme::Light,
            width: Width::Normal,
        }
    }
}

impl ReaderPreferences {
    /// Pulls out-of-range values back into range.
    pub fn normalized(mut self) -> Self {
        self.font_size = self.font_size.clamp(FONT_SIZE_RANGE.0, FONT_SIZE_RANGE.1);
        self.line_height = if self.line_height.is_finite() {
            self.line_height.clamp(LINE_HEIGHT_RANGE.0, LINE_HEIGHT_RANGE.1)
        } else {
            Self::default().line_height
        };
        self
    }

    pub fn layout(&self) -> ReaderLayout {
        let column_width = match self.width {
            Width::Narrow => 60,
            Width::Normal => 76,
            Width::Wide => 96,
        };
        ReaderLayout {
            column_width,
            theme: self.theme,
            font_family: self.font_family,
        }
    }
}

/// What a renderer needs from the preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderLayout {
    /// Text column width, in characters.
    pub column_width: usize,
    pub theme: Theme,
    pub font_family: FontFamily,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            anyhow::bail!("device id is empty");
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!("device id may only contain letters, digits, '-' and '_': {raw:?}");
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Saved preferences for `device`, or the defaults when none were saved.
    async fn load(&self, device: &DeviceId) -> anyhow::Result<ReaderPreferences>;
    async fn save(&self, device: &DeviceId, prefs: &ReaderPreferences) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct LocalFsPreferencesStore {
    base_dir: PathBuf,
}

impl LocalFsPreferencesStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn file(&self, device: &DeviceId) -> PrefsFile {
        PrefsFile {
            dir: self.base_dir.join("devices").join(device.as_str()),
        }
    }
}

#[async_trait]
impl PreferencesStore for LocalFsPreferencesStore {
    async fn load(&self, device: &DeviceId) -> anyhow::Result<ReaderPreferences> {
        let stored = self.file(device).read().await?;
        Ok(stored.unwrap_or_default().normalized())
    }

    async fn save(&self, device: &DeviceId, prefs: &ReaderPreferences) -> anyhow::Result<()> {
        self.file(device).replace(&prefs.normalized()).await
    }
}

const PREFS_FILE: &str = "reader-preferences.json";

/// `reader-preferences.json` inside one device directory.
///
/// A save is staged under a unique name in the same directory and renamed
/// over the old file, so a reader sees either the old settings or the new ones.
struct PrefsFile {
    dir: PathBuf,
}

impl PrefsFile {
    fn path(&self) -> PathBuf {
        self.dir.join(PREFS_FILE)
    }

    async fn read(&self) -> anyhow::Result<Option<ReaderPreferences>> {
        let path = self.path();
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("read: {}", path.display())),
        };
        let prefs = serde_json::from_str(&text)
            .with_context(|| format!("parse reader preferences: {}", path.display()))?;
        Ok(Some(prefs))
    }

    async fn replace(&self, prefs: &ReaderPreferences) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create device dir: {}", self.dir.display()))?;

        let mut text = serde_json::to_string_pretty(prefs).context("encode reader preferences")?;
        text.push('\n');
        let staged = self
            .dir
            .join(format!(".{PREFS_FILE}.{}", uuid::Uuid::new_v4().simple()));
        fs::write(&staged, text)
            .await
            .with_context(|| format!("stage: {}", staged.display()))?;

        let path = self.path();
        if let Err(err) = fs::rename(&staged, &path).await {
            if let Err(cleanup) = fs::remove_file(&staged).await {
                tracing::debug!(path = %staged.display(), error = %cleanup, "left staged preferences behind");
            }
            return Err(err).with_context(|| format!("replace: {}", path.display()));
        }
        Ok(())
    }
}

/// Keeps preferences for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct InMemoryPreferencesStore {
    entries: Mutex<HashMap<DeviceId, ReaderPreferences>>,
}

#[async_trait]
impl PreferencesStore for InMemoryPreferencesStore {
    async fn load(&self, device: &DeviceId) -> anyhow::Result<ReaderPreferences> {
        Ok(self
            .entries
            .lock()
            .await
            .get(device)
            .copied()
            .unwrap_or_default())
    }

    async fn save(&self, device: &DeviceId, prefs: &ReaderPreferences) -> anyhow::Result<()> {
        self.entries
            .lock()
            .await
            .insert(device.clone(), prefs.normalized());
        Ok(())
    }
}
