//! Scraper configuration: YAML file lookup, defaults, validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::types::Platform;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "CHATSCRIBE_CONFIG";

/// Config files tried, in order, when none is given explicitly.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["/etc/chatscribe.yaml", "./chatscribe.yaml"];

pub const DEFAULT_CHAT: &str = "ourchickenlife";

/// Top-level scraper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScraperConfig {
    /// Handles of the chat rooms to monitor.
    pub chats: Vec<String>,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Maximum concurrent page navigations.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Polling cadence of blocking surface waits.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause between two iterations of a record stream.
    #[serde(default = "default_yield_pause_ms")]
    pub yield_pause_ms: u64,
    /// Upper bound on waiting for the viewers panel to populate.
    #[serde(default = "default_viewer_settle_ms")]
    pub viewer_settle_ms: u64,
    /// How long the viewers control and panel may take to appear before the
    /// snapshot of that target fails.
    #[serde(default = "default_viewer_ready_timeout_ms")]
    pub viewer_ready_timeout_ms: u64,
    #[serde(default)]
    pub browser: BrowserSettings,
    /// File this config was read from (not serialized).
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// How to obtain a browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserSettings {
    /// Chromium executable. Searched on PATH when unset.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Attach to an already running browser (e.g. `http://127.0.0.1:9222`)
    /// instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Profile directory. A temporary one is created when unset.
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    #[serde(default)]
    pub launch_timeout_secs: Option<u64>,
}

fn default_db_path() -> String {
    "chatscribe.db".into()
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> usize {
    3
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_yield_pause_ms() -> u64 {
    10
}
fn default_viewer_settle_ms() -> u64 {
    500
}
fn default_viewer_ready_timeout_ms() -> u64 {
    30_000
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            chats: vec![DEFAULT_CHAT.into()],
            platform: Platform::Twitch,
            db_path: default_db_path(),
            headless: true,
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            yield_pause_ms: default_yield_pause_ms(),
            viewer_settle_ms: default_viewer_settle_ms(),
            viewer_ready_timeout_ms: default_viewer_ready_timeout_ms(),
            browser: BrowserSettings::default(),
            source: None,
        }
    }
}

impl ScraperConfig {
    /// Parse and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_yaml(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.source = Some(path.to_path_buf());
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: ScraperConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Pick a config: explicit path, then `CHATSCRIBE_CONFIG`, then the
    /// default locations, then built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Self::load(Path::new(&path));
            }
        }
        Self::resolve_from(DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from))
    }

    /// First existing file among `candidates`, or defaults.
    pub fn resolve_from(candidates: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
        for path in candidates {
            if path.is_file() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Reject settings that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.chats.is_empty() {
            return Err(Error::Config("`chats` must list at least one handle".into()));
        }
        if let Some(blank) = self.chats.iter().position(|c| c.trim().is_empty()) {
            return Err(Error::Config(format!("`chats[{}]` is blank", blank)));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("`concurrency` must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("`poll_interval_ms` must be positive".into()));
        }
        if self.viewer_ready_timeout_ms == 0 {
            return Err(Error::Config("`viewer_ready_timeout_ms` must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn yield_pause(&self) -> Duration {
        Duration::from_millis(self.yield_pause_ms)
    }

    pub fn viewer_settle(&self) -> Duration {
        Duration::from_millis(self.viewer_settle_ms)
    }

    pub fn viewer_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.viewer_ready_timeout_ms)
    }
}
