//! In-memory surface for driving the engine in tests.
//!
//! Selector matching is by exact tag: a node "matches" a selector when the
//! selector string is one of its tags. Document-level queries look at the
//! top-level nodes only; element-level queries search descendants.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use chatscribe_core::{
    Browser, CancellationSignal, ChatMarkup, ElementRef, Error, Page, Platform, Result,
    ViewerMarkup,
};

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub tags: Vec<String>,
    pub attrs: HashMap<String, String>,
    pub text: String,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(id: &str, tag: &str) -> Self {
        Self {
            id: id.into(),
            tags: vec![tag.into()],
            attrs: HashMap::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    fn has_tag(&self, selector: &str) -> bool {
        self.tags.iter().any(|t| t == selector)
    }

    fn find(&self, id: &str) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn find_descendant(&self, selector: &str) -> Option<&Node> {
        self.children
            .iter()
            .find_map(|c| if c.has_tag(selector) { Some(c) } else { c.find_descendant(selector) })
    }

    fn remove_descendant(&mut self, id: &str) -> bool {
        if let Some(pos) = self.children.iter().position(|c| c.id == id) {
            self.children.remove(pos);
            return true;
        }
        self.children.iter_mut().any(|c| c.remove_descendant(id))
    }
}

pub fn chat_markup() -> ChatMarkup {
    Platform::Twitch.chat_markup()
}

pub fn viewer_markup() -> ViewerMarkup {
    Platform::Twitch.viewer_markup()
}

/// A chat message whose body is plain text.
pub fn message(id: &str, author: &str, body: &str) -> Node {
    let markup = chat_markup();
    Node::new(id, &markup.message)
        .attr(&markup.author_attribute, author)
        .child(Node::new(&format!("{}-0", id), &markup.body_pieces).text(body))
}

/// A chat message made of pieces.
pub fn message_with(id: &str, author: &str, pieces: Vec<Node>) -> Node {
    let markup = chat_markup();
    pieces.into_iter().fold(
        Node::new(id, &markup.message).attr(&markup.author_attribute, author),
        Node::child,
    )
}

pub fn text_piece(id: &str, text: &str) -> Node {
    Node::new(id, &chat_markup().body_pieces).text(text)
}

/// A non-text piece wrapping an emote image.
pub fn emote_piece(id: &str, alt: &str) -> Node {
    let markup = chat_markup();
    Node::new(id, &markup.body_pieces).child(
        Node::new(&format!("{}-img", id), &markup.emote).attr(&markup.emote_text_attribute, alt),
    )
}

pub fn viewer(id: &str, handle: &str) -> Node {
    let markup = viewer_markup();
    Node::new(id, &markup.entry).attr(&markup.identity_attribute, handle)
}

pub fn chat_url(handle: &str) -> String {
    Platform::Twitch.chat_url(handle)
}

/// Mutable document behind one page.
#[derive(Default)]
pub struct FakePage {
    nodes: Mutex<Vec<Node>>,
    changed: Notify,
    /// Nodes appended to the document when the keyed element is clicked.
    on_click: Mutex<HashMap<String, Vec<Node>>>,
    /// Elements that disappear the moment something reads them.
    vanish_on_read: Mutex<HashSet<String>>,
    /// Cancel this signal once the last top-level node is removed.
    cancel_when_drained: Mutex<Option<CancellationSignal>>,
    /// After this many removals every call fails as a dead connection.
    break_after_removals: Mutex<Option<usize>>,
    removed: Mutex<Vec<String>>,
    broken: AtomicBool,
    closed: AtomicBool,
}

impl FakePage {
    pub fn new(nodes: Vec<Node>) -> Arc<Self> {
        Arc::new(Self {
            nodes: Mutex::new(nodes),
            ..Default::default()
        })
    }

    pub fn push(&self, node: Node) {
        self.nodes.lock().push(node);
        self.changed.notify_waiters();
    }

    pub fn reveal_on_click(&self, id: &str, nodes: Vec<Node>) {
        self.on_click.lock().insert(id.into(), nodes);
    }

    pub fn vanish_on_read(&self, id: &str) {
        self.vanish_on_read.lock().insert(id.into());
    }

    pub fn cancel_when_drained(&self, signal: CancellationSignal) {
        *self.cancel_when_drained.lock() = Some(signal);
    }

    pub fn break_after_removals(&self, n: usize) {
        *self.break_after_removals.lock() = Some(n);
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn alive(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::Surface("connection lost".into()));
        }
        Ok(())
    }

    fn with_node<T>(&self, element: &ElementRef, read: impl FnOnce(&Node) -> T) -> Result<T> {
        self.alive()?;
        if self.vanish_on_read.lock().remove(element.as_str()) {
            self.detach(element.as_str());
            return Err(Error::Extraction(format!("{} vanished", element.as_str())));
        }
        let nodes = self.nodes.lock();
        nodes
            .iter()
            .find_map(|n| n.find(element.as_str()))
            .map(read)
            .ok_or_else(|| Error::Extraction(format!("no element {}", element.as_str())))
    }

    fn detach(&self, id: &str) -> bool {
        let mut nodes = self.nodes.lock();
        if let Some(pos) = nodes.iter().position(|n| n.id == id) {
            nodes.remove(pos);
            return true;
        }
        nodes.iter_mut().any(|n| n.remove_descendant(id))
    }

    fn first_match(&self, selector: &str) -> Option<String> {
        self.nodes
            .lock()
            .iter()
            .find(|n| n.has_tag(selector))
            .map(|n| n.id.clone())
    }
}

/// `Page` impl over a shared [`FakePage`], so tests keep a handle to inspect it.
pub struct FakePageHandle(pub Arc<FakePage>);

#[async_trait]
impl Page for FakePageHandle {
    async fn locate_first(&self, selector: &str) -> Result<ElementRef> {
        loop {
            let changed = self.0.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            self.0.alive()?;
            if let Some(id) = self.0.first_match(selector) {
                return Ok(ElementRef::new(id));
            }
            changed.await;
        }
    }

    async fn count_matches(&self, selector: &str) -> Result<usize> {
        self.0.alive()?;
        Ok(self.0.nodes.lock().iter().filter(|n| n.has_tag(selector)).count())
    }

    async fn nth_match(&self, selector: &str, index: usize) -> Result<Option<ElementRef>> {
        self.0.alive()?;
        Ok(self
            .0
            .nodes
            .lock()
            .iter()
            .filter(|n| n.has_tag(selector))
            .nth(index)
            .map(|n| ElementRef::new(n.id.clone())))
    }

    async fn query_all(&self, element: &ElementRef, selector: &str) -> Result<Vec<ElementRef>> {
        self.0.with_node(element, |n| {
            n.children
                .iter()
                .filter(|c| c.has_tag(selector))
                .map(|c| ElementRef::new(c.id.clone()))
                .collect()
        })
    }

    async fn query(&self, element: &ElementRef, selector: &str) -> Result<Option<ElementRef>> {
        self.0.with_node(element, |n| {
            n.find_descendant(selector).map(|c| ElementRef::new(c.id.clone()))
        })
    }

    async fn element_attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        self.0.with_node(element, |n| n.attrs.get(name).cloned())
    }

    async fn element_text(&self, element: &ElementRef) -> Result<String> {
        self.0.with_node(element, |n| n.text.clone())
    }

    async fn remove_element(&self, element: &ElementRef) -> Result<()> {
        self.0.alive()?;
        if !self.0.detach(element.as_str()) {
            return Err(Error::Extraction(format!("no element {}", element.as_str())));
        }
        let removals = {
            let mut removed = self.0.removed.lock();
            removed.push(element.as_str().to_string());
            removed.len()
        };
        if let Some(limit) = *self.0.break_after_removals.lock() {
            if removals >= limit {
                self.0.broken.store(true, Ordering::SeqCst);
            }
        }
        if self.0.nodes.lock().is_empty() {
            if let Some(signal) = self.0.cancel_when_drained.lock().as_ref() {
                signal.cancel();
            }
        }
        Ok(())
    }

    async fn click_element(&self, element: &ElementRef) -> Result<()> {
        self.0.with_node(element, |_| ())?;
        let revealed = self.0.on_click.lock().remove(element.as_str());
        for node in revealed.unwrap_or_default() {
            self.0.push(node);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakePageHandle {
    fn drop(&mut self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

/// Browser serving registered pages by URL.
#[derive(Default)]
pub struct FakeBrowser {
    pages: Mutex<HashMap<String, Arc<FakePage>>>,
    failing: Mutex<HashSet<String>>,
    open_delay: Mutex<Duration>,
    opening: AtomicUsize,
    peak_opening: AtomicUsize,
    opens: AtomicUsize,
}

impl FakeBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, page: Arc<FakePage>) {
        self.pages.lock().insert(url.into(), page);
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().insert(url.into());
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = delay;
    }

    /// Most navigations ever in progress at once.
    pub fn peak_opening(&self) -> usize {
        self.peak_opening.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open(&self, url: &str) -> Result<Box<dyn Page>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let now = self.opening.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_opening.fetch_max(now, Ordering::SeqCst);
        let delay = *self.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.opening.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().contains(url) {
            return Err(Error::Surface(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        }
        let page = self.pages.lock().get(url).cloned();
        match page {
            Some(page) => Ok(Box::new(FakePageHandle(page))),
            None => Err(Error::Surface(format!("no page at {}", url))),
        }
    }
}
