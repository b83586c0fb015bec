//! Chapter link expansion for book-style reference sites.
//!
//! A notebook usually links to a handful of textbook pages. When those pages
//! live on a configured book domain, [`LinkExpander::expand`] fetches each one,
//! discovers the other pages of the same chapter, and interleaves them right
//! after the link they were found on.

mod parser;

use std::time::Instant;

use jupytutor_shared::{FetchConfig, JupytutorError, Result, is_private_target, matches_any_domain};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use parser::{ChapterRef, chapter_links, extract_hrefs, is_resource_path, splice};

/// Maximum response size we read from a book page (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// User-Agent string for expansion requests.
const USER_AGENT: &str = concat!("Jupytutor/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// LinkExpander
// ---------------------------------------------------------------------------

/// Discovers same-chapter pages for links on book domains.
#[derive(Debug, Clone)]
pub struct LinkExpander {
    client: Client,
    /// Allow localhost/private IPs (integration tests with mock servers).
    allow_private_hosts: bool,
}

impl LinkExpander {
    /// Create an expander with its own HTTP client.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Expand `source_links`, never failing as a whole.
    ///
    /// Book links (those containing one of `book_domains`) are fetched
    /// concurrently; a link whose page cannot be fetched simply gets no
    /// expansion. The result keeps the original order with each book link's
    /// expansions directly after it, deduplicated by normalised URL.
    #[instrument(skip_all, fields(links = source_links.len(), domains = book_domains.len()))]
    pub async fn expand(&self, source_links: &[String], book_domains: &[String]) -> Vec<String> {
        let start = Instant::now();

        let handles: Vec<_> = source_links
            .iter()
            .map(|link| {
                if !matches_any_domain(link, book_domains) {
                    return None;
                }
                let expander = self.clone();
                let link = link.clone();
                let domains = book_domains.to_vec();
                Some(tokio::spawn(async move {
                    expander.expand_one(&link, &domains).await
                }))
            })
            .collect();

        let mut expansions = Vec::with_capacity(handles.len());
        for (link, handle) in source_links.iter().zip(handles) {
            let found = match handle {
                None => Vec::new(),
                Some(handle) => match handle.await {
                    Ok(Ok(found)) => found,
                    Ok(Err(e)) => {
                        warn!(%link, error = %e, "chapter expansion failed");
                        Vec::new()
                    }
                    Err(e) => {
                        warn!(%link, error = %e, "chapter expansion task failed");
                        Vec::new()
                    }
                },
            };
            expansions.push(found);
        }

        let result = splice(source_links, &expansions);
        info!(
            before = source_links.len(),
            after = result.len(),
            duration_ms = start.elapsed().as_millis(),
            "link expansion finished"
        );
        result
    }

    /// Fetch one book page and return its same-chapter links.
    async fn expand_one(&self, link: &str, book_domains: &[String]) -> Result<Vec<String>> {
        let url = Url::parse(link)
            .map_err(|e| JupytutorError::validation(format!("invalid URL {link}: {e}")))?;

        if !self.allow_private_hosts && is_private_target(&url) {
            return Err(JupytutorError::validation(format!(
                "{url}: private or non-HTTP target blocked"
            )));
        }

        let html = fetch_page(&self.client, &url).await?;
        let found = chapter_links(&html, &url, book_domains);
        debug!(%url, found = found.len(), "chapter links discovered");
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with the configured limits.
fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| JupytutorError::Network(format!("failed to build HTTP client: {e}")))
}

/// Fetch a page body, treating any non-2xx status as a failure.
async fn fetch_page(client: &Client, url: &Url) -> Result<String> {
    let response = client
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

    response
        .text()
        .await
        .map_err(|e| JupytutorError::Network(format!("{url}: failed to read body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expander() -> LinkExpander {
        let config = FetchConfig {
            allow_private_hosts: true,
            ..FetchConfig::default()
        };
        LinkExpander::new(&config).unwrap()
    }

    /// Book domain of a mock server: `127.0.0.1:<port>`.
    fn domain_of(server: &wiremock::MockServer) -> String {
        server.uri().trim_start_matches("http://").to_string()
    }

    #[tokio::test]
    async fn test_expand_orders_chapter_pages() {
        let server = wiremock::MockServer::start().await;

        let page = r#"<html><body><nav>
            <a href="/chapters/3/3">3.3</a>
            <a href="/chapters/3/1">3.1</a>
            <a href="/chapters/3">3</a>
            <a href="/chapters/3/2">3.2 (this page)</a>
            <a href="/chapters/4">next chapter</a>
        </nav></body></html>"#;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/chapters/3/2"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let base = server.uri();
        let source = vec![format!("{base}/chapters/3/2")];
        let result = expander().expand(&source, &[domain_of(&server)]).await;

        assert_eq!(
            result,
            vec![
                format!("{base}/chapters/3/2"),
                format!("{base}/chapters/3"),
                format!("{base}/chapters/3/1"),
                format!("{base}/chapters/3/3"),
            ]
        );
    }

    #[tokio::test]
    async fn test_expand_keeps_non_book_links_in_place() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/chapters/5/1/Intro.html"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                r#"<a href="../2/More.html">5.2</a><a href="../../05/Overview.html">5</a>"#,
            ))
            .mount(&server)
            .await;

        let base = server.uri();
        let source = vec![
            "https://docs.python.org/3/".to_string(),
            format!("{base}/chapters/5/1/Intro.html"),
            "https://numpy.org/doc/".to_string(),
        ];
        let result = expander().expand(&source, &[domain_of(&server)]).await;

        assert_eq!(
            result,
            vec![
                "https://docs.python.org/3/".to_string(),
                format!("{base}/chapters/5/1/Intro.html"),
                format!("{base}/chapters/05/Overview.html"),
                format!("{base}/chapters/5/2/More.html"),
                "https://numpy.org/doc/".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_yields_no_expansion() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/chapters/1/1"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::path("/chapters/2/1"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(r#"<a href="/chapters/2/2">2.2</a>"#),
            )
            .mount(&server)
            .await;

        let base = server.uri();
        let source = vec![
            format!("{base}/chapters/1/1"),
            format!("{base}/chapters/2/1"),
        ];
        let result = expander().expand(&source, &[domain_of(&server)]).await;

        assert_eq!(
            result,
            vec![
                format!("{base}/chapters/1/1"),
                format!("{base}/chapters/2/1"),
                format!("{base}/chapters/2/2"),
            ]
        );
    }

    #[tokio::test]
    async fn test_private_hosts_blocked_by_default() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/chapters/1/1"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(r#"<a href="/chapters/1/2">1.2</a>"#),
            )
            .expect(0)
            .mount(&server)
            .await;

        let strict = LinkExpander::new(&FetchConfig::default()).unwrap();
        let source = vec![format!("{}/chapters/1/1", server.uri())];
        let result = strict.expand(&source, &[domain_of(&server)]).await;

        assert_eq!(result, source);
    }

    #[tokio::test]
    async fn test_no_book_domains_is_identity_modulo_dedup() {
        let source = vec![
            "https://a.com/x/".to_string(),
            "https://a.com/x#part".to_string(),
            "https://b.com/".to_string(),
        ];
        let result = expander().expand(&source, &[]).await;
        assert_eq!(result, vec!["https://a.com/x/", "https://b.com/"]);
    }
}
