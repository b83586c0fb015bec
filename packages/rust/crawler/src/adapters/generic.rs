//! Generic (fallback) platform adapter.
//!
//! Used when no platform-specific adapter is detected. Picks the first
//! likely main-content container, falling back to `<body>`.

use scraper::Html;
use url::Url;

use super::{ExtractedContent, PlatformAdapter, extract_h1, first_inner_html, remove_elements};

/// Generic adapter that works on arbitrary HTML pages.
pub struct GenericAdapter;

impl PlatformAdapter for GenericAdapter {
    fn detect(&self, _doc: &Html, _url: &Url) -> bool {
        true
    }

    fn extract_content(&self, doc: &Html) -> ExtractedContent {
        let selectors = ["main", "article", r#"[role="main"]"#, ".content", "body"];

        let html = first_inner_html(doc, &selectors)
            .map(|inner| strip_chrome(&inner))
            .unwrap_or_default();

        ExtractedContent {
            html,
            title: extract_h1(doc),
        }
    }

    fn name(&self) -> &str {
        "generic"
    }
}

/// Strip common navigation/chrome elements from HTML content.
fn strip_chrome(html: &str) -> String {
    remove_elements(
        html,
        "nav, header, footer, aside, script, style, noscript, .sidebar, .nav",
    )
}
