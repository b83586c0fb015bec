//! Chapter-link discovery on book pages.
//!
//! Book sites lay pages out as `/chapters/<N>/...` with subsections at
//! `/chapters/<N>/<M>/...`. Given one page of such a site, we pull every
//! anchor `href` out of the raw HTML and keep the ones that belong to the
//! same chapter.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use jupytutor_shared::{matches_any_domain, normalize_url};

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches the `href` of an `<a>` tag, single or double quoted.
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("href regex")
});

/// `/chapters/<N>[/<M>]` followed by a path separator, extension, query, fragment or the end.
static CHAPTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/chapters/(\d+)(?:/(\d+))?(?:[/.?#]|$)").expect("chapter regex")
});

/// Path segments that hold assets rather than readable pages.
const RESOURCE_DIRS: [&str; 7] = [
    "/_static/",
    "/_images/",
    "/_sources/",
    "/_downloads/",
    "/static/",
    "/media/",
    "/download",
];

/// File extensions that are never chapter pages.
const RESOURCE_EXTENSIONS: [&str; 12] = [
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".pdf", ".zip", ".csv", ".ipynb", ".js", ".css",
    ".json",
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Position of a page in the book: chapter number and optional subsection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChapterRef {
    pub chapter: u32,
    pub section: Option<u32>,
}

impl ChapterRef {
    /// Parse the chapter position out of a URL path. Leading zeros are
    /// insignificant (`03` is chapter 3).
    pub fn from_path(path: &str) -> Option<Self> {
        let caps = CHAPTER_RE.captures(path)?;
        let chapter = caps.get(1)?.as_str().parse().ok()?;
        let section = match caps.get(2) {
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        Some(Self { chapter, section })
    }

    /// Ordering key: the bare chapter page sorts before its subsections.
    fn sort_key(self) -> (u32, u32) {
        (self.chapter, self.section.unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// True for static assets, media and downloads.
pub fn is_resource_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    RESOURCE_DIRS.iter().any(|dir| lower.contains(dir))
        || RESOURCE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Raw `href` values of every anchor tag, in document order.
pub fn extract_hrefs(html: &str) -> Vec<&str> {
    HREF_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim())
        .filter(|href| !href.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Same-chapter links found on `page_url`'s HTML, deduplicated and ordered by
/// (chapter, subsection, path). Fragments are removed from the results.
///
/// Returns nothing when the page itself is not on a chapter path.
pub fn chapter_links(html: &str, page_url: &Url, book_domains: &[String]) -> Vec<String> {
    let Some(source) = ChapterRef::from_path(page_url.path()) else {
        return Vec::new();
    };

    // Candidates must share a book domain with the page they came from.
    let page_domains: Vec<&String> = book_domains
        .iter()
        .filter(|d| !d.is_empty() && page_url.as_str().contains(d.as_str()))
        .collect();

    let mut seen = HashSet::new();
    let mut found: Vec<(ChapterRef, Url)> = extract_hrefs(html)
        .into_iter()
        .filter_map(|href| page_url.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .filter_map(|mut url| {
            url.set_fragment(None);
            if !matches_any_domain(url.as_str(), &page_domains) || is_resource_path(url.path()) {
                return None;
            }
            let position = ChapterRef::from_path(url.path())?;
            (position.chapter == source.chapter).then_some((position, url))
        })
        .filter(|(_, url)| seen.insert(normalize_url(url.as_str())))
        .collect();

    found.sort_by(|(a, a_url), (b, b_url)| {
        a.sort_key()
            .cmp(&b.sort_key())
            .then_with(|| a_url.path().cmp(b_url.path()))
    });

    found.into_iter().map(|(_, url)| url.to_string()).collect()
}

/// Interleave expansions after their source links.
///
/// Walks `source_links` in order. Every link is emitted unless its normalised
/// form was already emitted; a link's expansions follow it immediately under
/// the same rule.
pub fn splice(source_links: &[String], expansions: &[Vec<String>]) -> Vec<String> {
    let mut emitted = HashSet::new();
    let mut result = Vec::new();

    for (index, link) in source_links.iter().enumerate() {
        if emitted.insert(normalize_url(link)) {
            result.push(link.clone());
        }
        for expanded in expansions.get(index).into_iter().flatten() {
            if emitted.insert(normalize_url(expanded)) {
                result.push(expanded.clone());
            }
        }
    }

    result
}
