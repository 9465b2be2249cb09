//! A browser tab behind the `Page` surface trait.
//!
//! Element handles are DevTools remote objects. Each one stays alive until
//! the element is removed through [`Page::remove_element`] or the page
//! closes; removing an element also releases every handle found beneath it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::ReleaseObjectParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use chatscribe_core::{ElementRef, Error, Page, Result};

/// Protocol errors that mean the element or document changed under us.
const VANISHED: &[&str] = &[
    "Could not find node with given id",
    "Could not find object with given id",
    "Cannot find context with specified id",
    "No node with given id found",
    "Node is detached from document",
];

/// Map a protocol failure to an element-level or a page-level error.
fn classify(context: &str, err: CdpError) -> Error {
    match err {
        CdpError::JavascriptException(details) => {
            Error::Extraction(format!("{}: {}", context, details.text))
        }
        CdpError::NotFound => Error::Extraction(format!("{}: element not found", context)),
        other => {
            let message = other.to_string();
            if VANISHED.iter().any(|marker| message.contains(marker)) {
                Error::Extraction(format!("{}: {}", context, message))
            } else {
                Error::Surface(format!("{}: {}", context, message))
            }
        }
    }
}

/// Quote `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
    // JSON string syntax is a subset of JS string syntax.
    Value::String(s.to_string()).to_string()
}

/// Handles handed out by a page, with the element each was found under.
struct Registry<E> {
    entries: HashMap<String, (E, Option<String>)>,
}

impl<E: Clone> Registry<E> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn track(&mut self, id: String, element: E, parent: Option<String>) {
        self.entries.insert(id, (element, parent));
    }

    fn get(&self, id: &str) -> Option<E> {
        self.entries.get(id).map(|(element, _)| element.clone())
    }

    /// Forget `root` and every handle found beneath it. Returns what was forgotten.
    fn detach(&mut self, root: &str) -> Vec<E> {
        let mut gone: HashSet<String> = HashSet::new();
        gone.insert(root.to_string());
        loop {
            let below: Vec<String> = self
                .entries
                .iter()
                .filter(|(id, (_, parent))| {
                    !gone.contains(*id) && parent.as_ref().is_some_and(|p| gone.contains(p))
                })
                .map(|(id, _)| id.clone())
                .collect();
            if below.is_empty() {
                break;
            }
            gone.extend(below);
        }
        gone.iter()
            .filter_map(|id| self.entries.remove(id))
            .map(|(element, _)| element)
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct CdpPage {
    page: chromiumoxide::Page,
    poll_interval: Duration,
    elements: Mutex<Registry<Arc<Element>>>,
    closed: AtomicBool,
    /// Runtime used to close the tab when the page is dropped unclosed.
    runtime: Option<tokio::runtime::Handle>,
}

impl CdpPage {
    pub fn new(page: chromiumoxide::Page, poll_interval: Duration) -> Self {
        Self {
            page,
            poll_interval,
            elements: Mutex::new(Registry::new()),
            closed: AtomicBool::new(false),
            runtime: tokio::runtime::Handle::try_current().ok(),
        }
    }

    /// Navigate and wait for the load to finish.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                debug!("Loaded {}", url);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Surface(format!("navigation to {} failed: {}", url, e))),
            Err(_) => Err(Error::Surface(format!(
                "{} did not finish loading within {:?}",
                url, timeout
            ))),
        }
    }

    /// Number of element handles currently held.
    pub fn tracked(&self) -> usize {
        self.elements.lock().len()
    }

    fn track(&self, element: Element, parent: Option<&ElementRef>) -> ElementRef {
        let id = element.remote_object_id.inner().clone();
        self.elements.lock().track(
            id.clone(),
            Arc::new(element),
            parent.map(|p| p.as_str().to_string()),
        );
        ElementRef::new(id)
    }

    fn element(&self, element: &ElementRef) -> Result<Arc<Element>> {
        self.elements
            .lock()
            .get(element.as_str())
            .ok_or_else(|| Error::Extraction(format!("unknown element {}", element.as_str())))
    }

    async fn release(&self, element: &Element) {
        let params = ReleaseObjectParams::new(element.remote_object_id.clone());
        if let Err(e) = self.page.execute(params).await {
            debug!("releaseObject failed: {}", e);
        }
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, expression: String) -> Result<T> {
        self.page
            .evaluate(expression)
            .await
            .map_err(|e| classify("evaluate", e))?
            .into_value()
            .map_err(|e| Error::Surface(format!("unexpected script result: {}", e)))
    }

    /// Keep the element at `keep`, release the rest.
    async fn pick(&self, found: Vec<Element>, keep: usize, parent: Option<&ElementRef>) -> Option<ElementRef> {
        let mut picked = None;
        for (i, element) in found.into_iter().enumerate() {
            if i == keep {
                picked = Some(self.track(element, parent));
            } else {
                self.release(&element).await;
            }
        }
        picked
    }
}

#[async_trait]
impl Page for CdpPage {
    async fn locate_first(&self, selector: &str) -> Result<ElementRef> {
        let exists = format!("document.querySelector({}) !== null", js_string(selector));
        loop {
            let present = match self.evaluate::<bool>(exists.clone()).await {
                Ok(present) => present,
                Err(e) if e.is_transient() => false,
                Err(e) => return Err(e),
            };
            if present {
                match self.page.find_element(selector).await {
                    Ok(element) => return Ok(self.track(element, None)),
                    Err(e) => {
                        let e = classify("find element", e);
                        if !e.is_transient() {
                            return Err(e);
                        }
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn count_matches(&self, selector: &str) -> Result<usize> {
        self.evaluate(format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        ))
        .await
    }

    async fn nth_match(&self, selector: &str, index: usize) -> Result<Option<ElementRef>> {
        let found = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| classify("find elements", e))?;
        Ok(self.pick(found, index, None).await)
    }

    async fn query_all(&self, element: &ElementRef, selector: &str) -> Result<Vec<ElementRef>> {
        let found = self
            .element(element)?
            .find_elements(selector)
            .await
            .map_err(|e| classify("query", e))?;
        Ok(found
            .into_iter()
            .map(|child| self.track(child, Some(element)))
            .collect())
    }

    async fn query(&self, element: &ElementRef, selector: &str) -> Result<Option<ElementRef>> {
        let found = self
            .element(element)?
            .find_elements(selector)
            .await
            .map_err(|e| classify("query", e))?;
        Ok(self.pick(found, 0, Some(element)).await)
    }

    async fn element_attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        self.element(element)?
            .attribute(name)
            .await
            .map_err(|e| classify("read attribute", e))
    }

    async fn element_text(&self, element: &ElementRef) -> Result<String> {
        let text = self
            .element(element)?
            .inner_text()
            .await
            .map_err(|e| classify("read text", e))?;
        Ok(text.unwrap_or_default())
    }

    async fn remove_element(&self, element: &ElementRef) -> Result<()> {
        let removed = self
            .element(element)?
            .call_js_fn("function() { this.remove(); }", false)
            .await;

        let detached = self.elements.lock().detach(element.as_str());
        for handle in &detached {
            self.release(handle).await;
        }

        match removed {
            Ok(returns) => match returns.exception_details {
                Some(details) => Err(Error::Extraction(format!("remove: {}", details.text))),
                None => Ok(()),
            },
            Err(e) => Err(classify("remove", e)),
        }
    }

    async fn click_element(&self, element: &ElementRef) -> Result<()> {
        let returns = self
            .element(element)?
            .call_js_fn(
                "function() { this.scrollIntoView({ block: 'center' }); this.click(); }",
                false,
            )
            .await
            .map_err(|e| classify("click", e))?;
        match returns.exception_details {
            Some(details) => Err(Error::Extraction(format!("click: {}", details.text))),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| Error::Surface(format!("closing page failed: {}", e)))
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(runtime) = &self.runtime else {
            debug!("No runtime to close a dropped page on");
            return;
        };
        let page = self.page.clone();
        runtime.spawn(async move {
            if let Err(e) = page.close().await {
                debug!("Closing dropped page failed: {}", e);
            }
        });
    }
}
