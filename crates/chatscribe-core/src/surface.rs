//! Surface collaborator: the live, mutable document a record stream polls.
//!
//! Implemented over a real browser by `chatscribe-browser` and by an
//! in-memory fake in the runtime tests. Element-level failures (the element
//! vanished, script threw) must be reported as [`Error::Extraction`];
//! transport and navigation failures as [`Error::Surface`].
//!
//! [`Error::Extraction`]: crate::Error::Extraction
//! [`Error::Surface`]: crate::Error::Surface

use async_trait::async_trait;

use crate::error::Result;

/// Opaque handle to one element of a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Something that can open pages. Callers gate `open` behind the request limiter.
///
/// Dropping a returned page closes it, even when [`Page::close`] was never
/// awaited.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a new page and navigate it to `url`.
    async fn open(&self, url: &str) -> Result<Box<dyn Page>>;

    /// Release browser resources. Default: nothing to release.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// One open page.
#[async_trait]
pub trait Page: Send + Sync {
    /// Wait until `selector` matches, and return the first match. Never times
    /// out; callers bound the wait where one is needed.
    async fn locate_first(&self, selector: &str) -> Result<ElementRef>;

    /// Number of elements currently matching `selector`.
    async fn count_matches(&self, selector: &str) -> Result<usize>;

    /// The `index`-th element matching `selector`, if any.
    async fn nth_match(&self, selector: &str, index: usize) -> Result<Option<ElementRef>>;

    /// Descendants of `element` matching `selector`, in document order.
    async fn query_all(&self, element: &ElementRef, selector: &str) -> Result<Vec<ElementRef>>;

    /// First descendant of `element` matching `selector`.
    async fn query(&self, element: &ElementRef, selector: &str) -> Result<Option<ElementRef>>;

    async fn element_attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>>;

    /// Rendered text of `element`.
    async fn element_text(&self, element: &ElementRef) -> Result<String>;

    /// Detach `element` from the document.
    async fn remove_element(&self, element: &ElementRef) -> Result<()>;

    async fn click_element(&self, element: &ElementRef) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
