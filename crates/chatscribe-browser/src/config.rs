//! Launch options derived from the scraper configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use chatscribe_core::{Result, ScraperConfig};

const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 20;

/// Flags added to every launched browser.
pub const EXTRA_ARGS: &[&str] = &[
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-extensions",
    "--mute-audio",
];

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Browser binary. Auto-detected when unset.
    pub executable: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub user_data_dir: Option<PathBuf>,
    /// Where throwaway profiles are created when `user_data_dir` is unset.
    pub scratch_dir: PathBuf,
    pub headless: bool,
    /// Bound on browser startup, on each protocol request and on page loads.
    pub launch_timeout: Duration,
    /// Cadence of blocking waits on pages.
    pub poll_interval: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            remote_url: None,
            user_data_dir: None,
            scratch_dir: std::env::temp_dir(),
            headless: true,
            launch_timeout: Duration::from_secs(DEFAULT_LAUNCH_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl LaunchOptions {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            executable: config.browser.executable.clone(),
            remote_url: config.browser.remote_url.clone(),
            user_data_dir: config.browser.user_data_dir.clone(),
            headless: config.headless,
            launch_timeout: Duration::from_secs(
                config
                    .browser
                    .launch_timeout_secs
                    .unwrap_or(DEFAULT_LAUNCH_TIMEOUT_SECS),
            ),
            poll_interval: config.poll_interval(),
            ..Default::default()
        }
    }
}

/// Browser profile directory. A temporary one is deleted when dropped.
#[derive(Debug)]
pub struct ProfileDir {
    path: PathBuf,
    temporary: bool,
}

impl ProfileDir {
    /// Use `configured` if given, otherwise create a fresh directory under `scratch`.
    pub fn prepare(configured: Option<&Path>, scratch: &Path) -> Result<Self> {
        let (path, temporary) = match configured {
            Some(dir) => (dir.to_path_buf(), false),
            None => (
                scratch.join(format!("chatscribe-profile-{}", uuid::Uuid::new_v4())),
                true,
            ),
        };
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, temporary })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        if !self.temporary {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            debug!("Failed to remove profile {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = ScraperConfig::default();
        config.headless = false;
        config.poll_interval_ms = 100;
        config.browser.launch_timeout_secs = Some(5);
        let options = LaunchOptions::from_config(&config);
        assert!(!options.headless);
        assert_eq!(options.poll_interval, Duration::from_millis(100));
        assert_eq!(options.launch_timeout, Duration::from_secs(5));
        assert_eq!(options.scratch_dir, std::env::temp_dir());
    }

    #[test]
    fn test_temporary_profile_removed_on_drop() {
        let scratch = tempfile::tempdir().unwrap();
        let profile = ProfileDir::prepare(None, scratch.path()).unwrap();
        let path = profile.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path.starts_with(scratch.path()));

        drop(profile);
        assert!(!path.exists());
    }

    #[test]
    fn test_configured_profile_kept() {
        let scratch = tempfile::tempdir().unwrap();
        let configured = scratch.path().join("profile");
        let profile = ProfileDir::prepare(Some(&configured), scratch.path()).unwrap();
        assert_eq!(profile.path(), configured.as_path());

        drop(profile);
        assert!(configured.is_dir());
    }
}
