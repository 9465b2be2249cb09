//! Live chat extraction: always read the oldest message still on the page,
//! then remove it so it is never read again.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::limiter::RequestLimiter;
use crate::stream::RecordSource;
use chatscribe_core::{
    Browser, ChatLine, ChatMarkup, ElementRef, Error, Page, Result, Target,
};

/// Endless source of chat messages for one target.
pub struct ChatSource {
    browser: Arc<dyn Browser>,
    limiter: RequestLimiter,
    target: Target,
    markup: ChatMarkup,
    label: String,
    page: Option<Box<dyn Page>>,
}

impl ChatSource {
    pub fn new(browser: Arc<dyn Browser>, limiter: RequestLimiter, target: Target) -> Self {
        let markup = target.platform.chat_markup();
        Self::with_markup(browser, limiter, target, markup)
    }

    pub fn with_markup(
        browser: Arc<dyn Browser>,
        limiter: RequestLimiter,
        target: Target,
        markup: ChatMarkup,
    ) -> Self {
        Self {
            label: format!("chat {}", target),
            browser,
            limiter,
            target,
            markup,
            page: None,
        }
    }

    fn page(&self) -> Result<&dyn Page> {
        self.page
            .as_deref()
            .ok_or_else(|| Error::Internal(format!("{}: page not open", self.label)))
    }

    /// Concatenate the body pieces in document order. Text pieces contribute
    /// their text; other pieces (emotes) their alternative text.
    async fn read_body(&self, page: &dyn Page, message: &ElementRef) -> Result<String> {
        let mut body = String::new();
        for piece in page.query_all(message, &self.markup.body_pieces).await? {
            let text = page.element_text(&piece).await?;
            if !text.is_empty() {
                body.push_str(&text);
                continue;
            }
            let alt = match page.query(&piece, &self.markup.emote).await? {
                Some(image) => {
                    page.element_attribute(&image, &self.markup.emote_text_attribute)
                        .await?
                }
                None => {
                    page.element_attribute(&piece, &self.markup.emote_text_attribute)
                        .await?
                }
            };
            if let Some(alt) = alt {
                body.push_str(&alt);
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl RecordSource for ChatSource {
    type Record = ChatLine;

    fn label(&self) -> &str {
        &self.label
    }

    async fn prepare(&mut self) -> Result<()> {
        let url = self.target.chat_url();
        debug!("{}: opening {}", self.label, url);
        let page = self.limiter.run(self.browser.open(&url)).await?;
        debug!("{}: opened", self.label);
        self.page = Some(page);
        Ok(())
    }

    async fn detect_next(&mut self) -> Result<Option<ElementRef>> {
        let page = self.page()?;
        page.locate_first(&self.markup.message).await.map(Some)
    }

    async fn extract_and_retire(&mut self, element: ElementRef) -> Result<ChatLine> {
        let page = self.page()?;
        let author = page
            .element_attribute(&element, &self.markup.author_attribute)
            .await;
        let body = match &author {
            Ok(_) => self.read_body(page, &element).await,
            Err(_) => Ok(String::new()),
        };

        // Retire even when reading failed, or a malformed message would be
        // detected again forever.
        match page.remove_element(&element).await {
            Err(e) if !e.is_transient() => return Err(e),
            _ => {}
        }

        let author = author?
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| Error::Extraction("message without author".into()))?;
        Ok(ChatLine {
            author,
            body: body?,
            observed_at: Utc::now(),
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
