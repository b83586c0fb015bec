//! Plain Sphinx (Read the Docs, Alabaster, classic themes) platform adapter.

use scraper::Html;
use url::Url;

use super::{ExtractedContent, PlatformAdapter, extract_h1, first_inner_html, has_match, remove_elements};

/// Detects and extracts content from Sphinx-generated documentation.
pub struct SphinxAdapter;

impl PlatformAdapter for SphinxAdapter {
    fn detect(&self, doc: &Html, _url: &Url) -> bool {
        has_match(doc, r#"meta[name="readthedocs"]"#)
            || has_match(doc, ".wy-nav-side")
            || has_match(doc, ".wy-body-for-nav")
            || has_match(doc, "div.sphinxsidebar")
            // _static/ asset paths are the common Sphinx marker
            || has_match(doc, r#"link[href*="_static"]"#)
    }

    fn extract_content(&self, doc: &Html) -> ExtractedContent {
        let selectors = [r#"[role="main"]"#, ".rst-content .document", ".document .body", "main"];

        let html = first_inner_html(doc, &selectors)
            .map(|inner| {
                remove_elements(&inner, r#".headerlink, footer, [role="navigation"], script, style"#)
            })
            .unwrap_or_default();

        ExtractedContent {
            html,
            title: extract_h1(doc),
        }
    }

    fn name(&self) -> &str {
        "sphinx"
    }
}
