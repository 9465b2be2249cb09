//! Chromium lifecycle: launch or attach, open pages, shut down.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as Chromium, BrowserConfig};
use chromiumoxide::handler::Handler;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{LaunchOptions, ProfileDir, EXTRA_ARGS};
use crate::page::CdpPage;
use crate::types::VersionInfo;
use chatscribe_core::{Browser, Error, Page, Result};

/// A Chromium instance reachable over the DevTools Protocol.
pub struct ChromeBrowser {
    browser: RwLock<Chromium>,
    handler: JoinHandle<()>,
    options: LaunchOptions,
    /// Whether we own the browser process.
    launched: bool,
    profile: Mutex<Option<ProfileDir>>,
}

/// Drive the protocol connection until it closes.
fn drive(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("DevTools handler error: {}", e);
            }
        }
        debug!("DevTools connection closed");
    })
}

impl ChromeBrowser {
    /// Attach to `options.remote_url` if set, otherwise launch a new browser.
    pub async fn start(options: LaunchOptions) -> Result<Self> {
        match options.remote_url.clone() {
            Some(url) => Self::connect_remote(&url, options).await,
            None => Self::launch(options).await,
        }
    }

    /// Launch a browser process and connect to it.
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        // Dropped, and removed if temporary, when any step below fails.
        let profile = ProfileDir::prepare(options.user_data_dir.as_deref(), &options.scratch_dir)?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .launch_timeout(options.launch_timeout)
            .request_timeout(options.launch_timeout)
            .args(EXTRA_ARGS.iter().copied());
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(Error::Config)?;

        let (browser, handler) = Chromium::launch(config)
            .await
            .map_err(|e| Error::Surface(format!("failed to launch browser: {}", e)))?;
        let handler = drive(handler);

        match browser.version().await {
            Ok(version) => info!("Launched {} (headless={})", version.product, options.headless),
            Err(e) => debug!("Browser version unavailable: {}", e),
        }

        Ok(Self {
            browser: RwLock::new(browser),
            handler,
            options,
            launched: true,
            profile: Mutex::new(Some(profile)),
        })
    }

    /// Attach to a browser already listening on `remote_url` (e.g. `http://127.0.0.1:9222`).
    pub async fn connect_remote(remote_url: &str, options: LaunchOptions) -> Result<Self> {
        let endpoint = format!("{}/json/version", remote_url.trim_end_matches('/'));
        let version: VersionInfo = reqwest::get(&endpoint)
            .await
            .map_err(|e| Error::Surface(format!("GET {} failed: {}", endpoint, e)))?
            .json()
            .await
            .map_err(|e| Error::Surface(format!("bad response from {}: {}", endpoint, e)))?;

        let (browser, handler) = Chromium::connect(version.web_socket_debugger_url.as_str())
            .await
            .map_err(|e| Error::Surface(format!("failed to attach to {}: {}", remote_url, e)))?;
        info!("Attached to {} at {}", version.browser, remote_url);

        Ok(Self {
            browser: RwLock::new(browser),
            handler: drive(handler),
            options,
            launched: false,
            profile: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn open(&self, url: &str) -> Result<Box<dyn Page>> {
        let page = self
            .browser
            .read()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Surface(format!("failed to open a page: {}", e)))?;
        // From here on, dropping the page closes the tab.
        let page = CdpPage::new(page, self.options.poll_interval);
        page.navigate(url, self.options.launch_timeout).await?;
        Ok(Box::new(page))
    }

    async fn shutdown(&self) -> Result<()> {
        if self.launched {
            let mut browser = self.browser.write().await;
            if let Err(e) = browser.close().await {
                debug!("Browser.close failed: {}", e);
            }
            match tokio::time::timeout(self.options.launch_timeout, browser.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("Browser did not exit, killing it");
                    if let Some(Err(e)) = browser.kill().await {
                        debug!("Killing browser failed: {}", e);
                    }
                }
            }
        }
        self.handler.abort();
        self.profile.lock().take();
        Ok(())
    }
}
