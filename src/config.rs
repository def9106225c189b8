use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::autosave::DEFAULT_INTERVAL;
use crate::prefs::{DeviceId, LocalFsPreferencesStore};
use crate::reader::PreferencesScope;
use crate::service::{HttpPersistence, PersistenceService};

pub const API_URL_VAR: &str = "CHAPTERHOUSE_API_URL";
pub const API_TOKEN_VAR: &str = "CHAPTERHOUSE_API_TOKEN";
pub const DATA_DIR_VAR: &str = "CHAPTERHOUSE_DATA_DIR";
pub const DEVICE_ID_VAR: &str = "CHAPTERHOUSE_DEVICE_ID";
pub const AUTOSAVE_SECS_VAR: &str = "CHAPTERHOUSE_AUTOSAVE_SECS";

const DEFAULT_DATA_DIR: &str = ".chapterhouse";
const DEFAULT_DEVICE_ID: &str = "default";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub data_dir: PathBuf,
    pub device_id: DeviceId,
    pub autosave_interval: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let device_id = match get(DEVICE_ID_VAR) {
            Some(raw) => DeviceId::parse(&raw).with_context(|| format!("invalid {DEVICE_ID_VAR}"))?,
            None => DeviceId::parse(DEFAULT_DEVICE_ID)?,
        };
        let autosave_interval = match get(AUTOSAVE_SECS_VAR) {
            Some(raw) => parse_autosave_secs(&raw)
                .with_context(|| format!("invalid {AUTOSAVE_SECS_VAR}={raw:?}"))?,
            None => DEFAULT_INTERVAL,
        };

        Ok(Self {
            api_url: get(API_URL_VAR),
            api_token: get(API_TOKEN_VAR),
            data_dir: get(DATA_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            device_id,
            autosave_interval,
        })
    }

    pub fn persistence(&self) -> anyhow::Result<Arc<dyn PersistenceService>> {
        let api_url = self
            .api_url
            .as_deref()
            .with_context(|| format!("{API_URL_VAR} (or --api-url) is required"))?;
        let client = HttpPersistence::new(api_url, self.api_token.clone())?;
        Ok(Arc::new(client))
    }

    pub fn preferences(&self) -> PreferencesScope {
        PreferencesScope {
            store: Arc::new(LocalFsPreferencesStore::new(&self.data_dir)),
            device: self.device_id.clone(),
        }
    }
}

pub fn parse_autosave_secs(raw: &str) -> anyhow::Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("not a whole number of seconds: {raw}"))?;
    if secs == 0 {
        anyhow::bail!("autosave interval must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}
