//! Platform adapter trait and built-in adapters for content extraction.
//!
//! Adapters recognise the site generator behind a page (Jupyter Book,
//! plain Sphinx) and pull out the main content without the surrounding
//! navigation chrome.

mod generic;
mod jupyterbook;
mod sphinx;

use scraper::{Html, Selector};
use url::Url;

pub use generic::GenericAdapter;
pub use jupyterbook::JupyterBookAdapter;
pub use sphinx::SphinxAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Content extraction result from an adapter.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    /// Main content HTML with chrome stripped.
    pub html: String,
    /// First `<h1>` of the page, if any.
    pub title: Option<String>,
}

/// Trait for platform-specific content extraction.
///
/// Adapters are tried in priority order; `GenericAdapter` is the always-last fallback.
pub trait PlatformAdapter: Send + Sync {
    /// Returns `true` if this adapter should handle the document.
    fn detect(&self, doc: &Html, url: &Url) -> bool;

    /// Extract the main content as clean HTML.
    fn extract_content(&self, doc: &Html) -> ExtractedContent;

    /// Adapter name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered adapters in priority order.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn PlatformAdapter>>,
    fallback: GenericAdapter,
}

impl AdapterRegistry {
    /// Create a registry with all built-in adapters (most specific first).
    pub fn new() -> Self {
        Self {
            adapters: vec![Box::new(JupyterBookAdapter), Box::new(SphinxAdapter)],
            fallback: GenericAdapter,
        }
    }

    /// Detect the best adapter for the given HTML document.
    pub fn detect(&self, doc: &Html, url: &Url) -> &dyn PlatformAdapter {
        for adapter in &self.adapters {
            if adapter.detect(doc, url) {
                return adapter.as_ref();
            }
        }
        &self.fallback
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by adapters
// ---------------------------------------------------------------------------

/// True if any element matches `selector`.
pub(crate) fn has_match(doc: &Html, selector: &str) -> bool {
    Selector::parse(selector)
        .map(|sel| doc.select(&sel).next().is_some())
        .unwrap_or(false)
}

/// Inner HTML of the first element matching any of `selectors`, tried in order.
pub(crate) fn first_inner_html(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel_str| {
        let sel = Selector::parse(sel_str).ok()?;
        doc.select(&sel).next().map(|el| el.inner_html())
    })
}

/// Remove every element matching `selector` from an HTML fragment.
pub(crate) fn remove_elements(html: &str, selector: &str) -> String {
    let Ok(sel) = Selector::parse(selector) else {
        return html.to_string();
    };
    let doc = Html::parse_fragment(html);

    let mut result = html.to_string();
    for el in doc.select(&sel) {
        result = result.replace(&el.html(), "");
    }
    result
}

/// Text of the first `<h1>`, without a trailing permalink marker.
pub(crate) fn extract_h1(doc: &Html) -> Option<String> {
    let sel = Selector::parse("h1").ok()?;
    doc.select(&sel)
        .next()
        .map(|el| {
            el.text()
                .collect::<String>()
                .trim()
                .trim_end_matches(['#', '¶'])
                .trim_end()
                .to_string()
        })
        .filter(|t| !t.is_empty())
}
