//! One-shot viewer snapshot: reveal the viewers panel, enumerate it once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use crate::limiter::RequestLimiter;
use crate::stream::RecordSource;
use crate::types::StreamSettings;
use chatscribe_core::{
    Browser, ElementRef, Error, Page, Result, Target, ViewerMarkup, ViewerSighting,
};

/// Finite source of viewer sightings. Every sighting carries the timestamp
/// taken when the source was created.
pub struct ViewerSnapshotSource {
    browser: Arc<dyn Browser>,
    limiter: RequestLimiter,
    target: Target,
    markup: ViewerMarkup,
    settle: Duration,
    poll_interval: Duration,
    ready_timeout: Duration,
    label: String,
    observed_at: DateTime<Utc>,
    page: Option<Box<dyn Page>>,
    /// Panel size once settled.
    total: usize,
    next: usize,
}

impl ViewerSnapshotSource {
    pub fn new(
        browser: Arc<dyn Browser>,
        limiter: RequestLimiter,
        target: Target,
        settings: &StreamSettings,
    ) -> Self {
        let markup = target.platform.viewer_markup();
        Self {
            label: format!("viewers {}", target),
            browser,
            limiter,
            target,
            markup,
            settle: settings.viewer_settle,
            poll_interval: settings.poll_interval,
            ready_timeout: settings.viewer_ready_timeout,
            observed_at: Utc::now(),
            page: None,
            total: 0,
            next: 0,
        }
    }

    /// Timestamp shared by every sighting of this snapshot.
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    fn page(&self) -> Result<&dyn Page> {
        self.page
            .as_deref()
            .ok_or_else(|| Error::Internal(format!("{}: page not open", self.label)))
    }
}

/// Wait for `selector` to match, failing the snapshot after `limit`.
async fn await_visible(page: &dyn Page, selector: &str, limit: Duration) -> Result<ElementRef> {
    match tokio::time::timeout(limit, page.locate_first(selector)).await {
        Ok(found) => found,
        Err(_) => Err(Error::Surface(format!(
            "{} did not appear within {:?}",
            selector, limit
        ))),
    }
}

/// Wait for the entry count to stop changing, for at most `max_wait`.
/// Returns the last count seen.
async fn settle_count(
    page: &dyn Page,
    selector: &str,
    max_wait: Duration,
    poll_interval: Duration,
) -> Result<usize> {
    let deadline = Instant::now() + max_wait;
    let step = poll_interval
        .min(max_wait / 4)
        .max(Duration::from_millis(1));
    let mut last = page.count_matches(selector).await?;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(last);
        }
        tokio::time::sleep(step.min(deadline - now)).await;
        let count = page.count_matches(selector).await?;
        if count > 0 && count == last {
            return Ok(count);
        }
        last = count;
    }
}

#[async_trait]
impl RecordSource for ViewerSnapshotSource {
    type Record = ViewerSighting;

    fn label(&self) -> &str {
        &self.label
    }

    async fn prepare(&mut self) -> Result<()> {
        let url = self.target.chat_url();
        debug!("{}: opening {}", self.label, url);
        let page = self.limiter.run(self.browser.open(&url)).await?;
        self.page = Some(page);
        let page = self.page()?;

        // Failures while revealing the panel leave nothing to enumerate.
        let reveal = async {
            let button = await_visible(page, &self.markup.activate, self.ready_timeout).await?;
            page.click_element(&button).await?;
            debug!("{}: viewers control clicked", self.label);
            await_visible(page, &self.markup.panel, self.ready_timeout).await?;
            settle_count(page, &self.markup.entry, self.settle, self.poll_interval).await
        };
        let total = reveal.await.map_err(|e| match e {
            Error::Extraction(msg) => Error::Surface(format!("viewers panel unavailable: {}", msg)),
            other => other,
        })?;

        debug!("{}: {} entries", self.label, total);
        self.total = total;
        Ok(())
    }

    async fn detect_next(&mut self) -> Result<Option<ElementRef>> {
        if self.next >= self.total {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        self.page()?
            .nth_match(&self.markup.entry, index)
            .await?
            .map(Some)
            .ok_or_else(|| Error::Extraction(format!("viewer entry {} disappeared", index)))
    }

    async fn extract_and_retire(&mut self, element: ElementRef) -> Result<ViewerSighting> {
        // Detection already advanced past this entry.
        let handle = self
            .page()?
            .element_attribute(&element, &self.markup.identity_attribute)
            .await?
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::Extraction("viewer entry without handle".into()))?;
        Ok(ViewerSighting {
            handle,
            observed_at: self.observed_at,
        })
    }

    async fn finish(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("{}: closing page failed: {}", self.label, e);
            }
        }
    }
}
