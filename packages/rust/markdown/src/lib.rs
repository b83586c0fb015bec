//! Text extraction for notebook context.
//!
//! Two directions:
//! - [`content_to_text`]: main-content HTML → plain Markdown-ish text using
//!   the `htmd` crate plus a cleanup pipeline.
//! - [`extract_links`]: Markdown cell source → referenced link and image URLs.

mod cleanup;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use jupytutor_shared::{JupytutorError, Result};

/// Tags dropped wholesale during conversion.
const SKIPPED_TAGS: [&str; 12] = [
    "script", "style", "nav", "iframe", "noscript", "svg", "header", "footer", "aside", "form",
    "button", "template",
];

// ---------------------------------------------------------------------------
// HTML → text
// ---------------------------------------------------------------------------

/// Convert main-content HTML (already selected by a platform adapter) to text.
///
/// Relative links are resolved against `source_url` when given.
#[instrument(skip(content_html), fields(url = source_url.map(Url::as_str).unwrap_or("")))]
pub fn content_to_text(content_html: &str, source_url: Option<&Url>) -> Result<String> {
    let content_html = preprocess_tables(content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();

    let raw = converter
        .convert(&content_html)
        .map_err(|e| JupytutorError::Conversion(format!("htmd conversion failed: {e}")))?;

    let text = cleanup::run_pipeline(&raw, source_url);
    debug!(raw_len = raw.len(), text_len = text.len(), "page converted to text");
    Ok(text)
}

/// Convert HTML `<table>` elements to Markdown tables before `htmd` runs
/// (`htmd` 0.1 drops table structure).
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let Ok(table_sel) = Selector::parse("table") else {
        return html.to_string();
    };

    let mut result = html.to_string();
    for table in doc.select(&table_sel) {
        result = result.replacen(&table.html(), &table_to_markdown(&table), 1);
    }
    result
}

fn table_to_markdown(table: &scraper::ElementRef) -> String {
    let (Ok(tr_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
        return String::new();
    };

    let rows: Vec<Vec<String>> = table
        .select(&tr_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|cell| cell.text().collect::<String>().trim().replace('|', "\\|"))
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let mut md = String::from("\n\n");
    for (i, row) in rows.iter().enumerate() {
        let mut cells = row.clone();
        cells.resize(width, String::new());
        md.push_str(&format!("| {} |\n", cells.join(" | ")));
        if i == 0 {
            md.push_str(&format!("| {} |\n", vec!["---"; width].join(" | ")));
        }
    }
    md.push('\n');
    md
}

// ---------------------------------------------------------------------------
// Markdown → links
// ---------------------------------------------------------------------------

/// Absolute http(s) link and image URLs referenced by a Markdown source, in
/// order of appearance, deduplicated. Fenced code blocks are ignored.
pub fn extract_links(markdown: &str) -> Vec<String> {
    static FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?ms)^\s*(```|~~~).*?^\s*(```|~~~)").expect("valid regex"));
    static INLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"!?\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+["'][^"']*["'])?\s*\)"#)
            .expect("valid regex")
    });
    static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^ {0,3}\[[^\]]+\]:\s*<?([^\s>]+)>?").expect("valid regex")
    });
    static HTML_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)<(?:a|img)\s[^>]*?(?:href|src)\s*=\s*["']([^"']+)["']"#)
            .expect("valid regex")
    });
    static BARE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"https?://[^\s<>()\[\]"'`]+"#).expect("valid regex"));

    let text = FENCE_RE.replace_all(markdown, "");

    let mut found: Vec<(usize, String)> = Vec::new();
    for re in [&*INLINE_RE, &*REFERENCE_RE, &*HTML_RE] {
        for caps in re.captures_iter(&text) {
            if let Some(m) = caps.get(1) {
                found.push((m.start(), m.as_str().to_string()));
            }
        }
    }
    for m in BARE_RE.find_iter(&text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', '*', '_']);
        found.push((m.start(), url.to_string()));
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(_, url)| url)
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
