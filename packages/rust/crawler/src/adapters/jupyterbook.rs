//! Jupyter Book (sphinx-book-theme) platform adapter.

use scraper::Html;
use url::Url;

use super::{ExtractedContent, PlatformAdapter, extract_h1, first_inner_html, has_match, remove_elements};

/// Chrome that lives inside the article container on Jupyter Book pages.
const ARTICLE_CHROME: &str = ".headerlink, .bd-header-article, .prev-next-area, \
    .prev-next-footer, .bd-sidebar-secondary, .toctree-wrapper, nav, footer, script, style";

/// Detects and extracts content from Jupyter Book sites.
pub struct JupyterBookAdapter;

impl PlatformAdapter for JupyterBookAdapter {
    fn detect(&self, doc: &Html, _url: &Url) -> bool {
        has_match(doc, r#"meta[name="generator"][content*="Jupyter Book"]"#)
            || has_match(doc, r#"link[href*="sphinx-book-theme"]"#)
            || has_match(doc, r#"script[src*="sphinx-book-theme"]"#)
            || has_match(doc, "#jb-print-docs-body")
            || has_match(doc, "article.bd-article")
    }

    fn extract_content(&self, doc: &Html) -> ExtractedContent {
        let selectors = [
            "main#main-content article.bd-article",
            "article.bd-article",
            "#main-content",
            "main",
        ];

        let html = first_inner_html(doc, &selectors)
            .map(|inner| remove_elements(&inner, ARTICLE_CHROME))
            .unwrap_or_default();

        ExtractedContent {
            html,
            title: extract_h1(doc),
        }
    }

    fn name(&self) -> &str {
        "jupyterbook"
    }
}
