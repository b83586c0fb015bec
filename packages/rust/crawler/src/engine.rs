//! Page scraping: fetch a link, extract its main content as text, and tag it
//! with a `[LINK]` marker so passages stay attributable.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use scraper::Html;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use jupytutor_shared::{FetchConfig, JupytutorError, Result, is_private_target};

use crate::adapters::AdapterRegistry;

/// User-Agent string for scrape requests.
const USER_AGENT: &str = concat!("Jupytutor/", env!("CARGO_PKG_VERSION"));

/// Maximum response size we read from a page (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Prefix a page's text with its source marker line.
pub fn mark_source(url: &str, text: &str) -> String {
    format!("[LINK] {url} [/LINK]\n{text}")
}

// ---------------------------------------------------------------------------
// PageScraper
// ---------------------------------------------------------------------------

/// Fetches pages and turns them into marked plain text.
pub struct PageScraper {
    client: Client,
    registry: AdapterRegistry,
    /// Allow localhost/private IPs (integration tests with mock servers).
    allow_private_hosts: bool,
}

impl PageScraper {
    /// Create a scraper with its own HTTP client.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JupytutorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            registry: AdapterRegistry::new(),
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Scrape one link into `[LINK] <link> [/LINK]\n<text>`.
    ///
    /// Any failure (bad URL, blocked host, network error, non-2xx status)
    /// is logged and yields `None`. A page that loads but has no text still
    /// yields its marker line.
    #[instrument(skip(self), fields(url = %link))]
    pub async fn scrape(&self, link: &str) -> Option<String> {
        match self.fetch_text(link).await {
            Ok(text) => Some(mark_source(link, &text)),
            Err(e) => {
                warn!(error = %e, "page could not be scraped");
                None
            }
        }
    }

    /// Fetch a page and return its extracted main-content text.
    pub async fn fetch_text(&self, link: &str) -> Result<String> {
        let url = Url::parse(link)
            .map_err(|e| JupytutorError::validation(format!("invalid URL {link}: {e}")))?;

        if !self.allow_private_hosts && is_private_target(&url) {
            return Err(JupytutorError::validation(format!(
                "{url}: private or non-HTTP target blocked"
            )));
        }

        debug!(%url, "fetching page");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| JupytutorError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JupytutorError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(JupytutorError::validation(format!(
                    "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| JupytutorError::Network(format!("{url}: body read failed: {e}")))?;

        self.extract_text(&body, &url)
    }

    /// Run adapter detection and text conversion on a fetched body.
    fn extract_text(&self, body: &str, url: &Url) -> Result<String> {
        let doc = Html::parse_document(body);
        let adapter = self.registry.detect(&doc, url);
        let content = adapter.extract_content(&doc);

        debug!(
            adapter = adapter.name(),
            title = content.title.as_deref().unwrap_or(""),
            html_len = content.html.len(),
            "content extracted"
        );

        jupytutor_markdown::content_to_text(&content.html, Some(url))
    }

    /// Scrape every link concurrently, one task per link, results in input order.
    ///
    /// A failing or panicking task only loses its own page. `max_concurrency`
    /// caps in-flight fetches; `None` fetches everything at once.
    #[instrument(skip_all, fields(links = links.len(), max_concurrency = ?max_concurrency))]
    pub async fn scrape_all(
        self: &Arc<Self>,
        links: &[String],
        max_concurrency: Option<usize>,
    ) -> Vec<Option<String>> {
        let start = Instant::now();
        let semaphore = max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));

        let handles: Vec<_> = links
            .iter()
            .map(|link| {
                let scraper = Arc::clone(self);
                let sem = semaphore.clone();
                let link = link.clone();
                tokio::spawn(async move {
                    let _permit = match &sem {
                        Some(sem) => Some(sem.acquire().await.ok()?),
                        None => None,
                    };
                    scraper.scrape(&link).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (link, handle) in links.iter().zip(handles) {
            match handle.await {
                Ok(page) => results.push(page),
                Err(e) => {
                    warn!(%link, error = %e, "scrape task failed");
                    results.push(None);
                }
            }
        }

        info!(
            fetched = results.iter().filter(|r| r.is_some()).count(),
            failed = results.iter().filter(|r| r.is_none()).count(),
            duration_ms = start.elapsed().as_millis(),
            "scrape pass finished"
        );
        results
    }
}
