//! Context retrieval: expand, filter and scrape a notebook's source links in
//! the background, and let readers decide how long they are willing to wait.
//!
//! Lifecycle: `Uninitialized → Loading → (Ready | Empty)`. Independently of
//! the phase, a retriever becomes *soft-ready* once its soft timeout has
//! elapsed since construction or it reached a terminal phase, whichever
//! happens first. Non-enforcing readers wait for soft-readiness only;
//! enforcing readers wait for the terminal phase.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use jupytutor_crawler::PageScraper;
use jupytutor_discovery::LinkExpander;
use jupytutor_shared::{
    DEFAULT_SOFT_TIMEOUT_MS, JupytutorError, PluginConfig, Result, RetrievalSettings,
    matches_any_domain,
};

/// Separator between the texts of two scraped pages.
const PAGE_SEPARATOR: &str = "\n\n";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything a retriever needs to know before it starts.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub source_links: Vec<String>,
    /// When non-empty, only links containing one of these are scraped.
    pub whitelist_domains: Option<Vec<String>>,
    /// Links containing one of these are never scraped.
    pub blacklist_domains: Vec<String>,
    /// Domains whose links get chapter expansion.
    pub book_domains: Vec<String>,
    pub attempt_expansion: bool,
    /// Never start the background work.
    pub debug_mode: bool,
    /// How long non-enforcing readers wait, measured from construction.
    pub soft_timeout: Duration,
    /// Cap on concurrent page fetches. `None` fetches every link at once.
    pub max_concurrency: Option<usize>,
}

impl RetrieverConfig {
    /// Defaults for everything but the links.
    pub fn new(source_links: Vec<String>) -> Self {
        Self {
            source_links,
            whitelist_domains: None,
            blacklist_domains: Vec::new(),
            book_domains: Vec::new(),
            attempt_expansion: false,
            debug_mode: false,
            soft_timeout: Duration::from_millis(DEFAULT_SOFT_TIMEOUT_MS),
            max_concurrency: None,
        }
    }

    /// Build from a notebook's plugin config and the user's retrieval settings.
    ///
    /// Book domains are the hosts (with port) of the configured Jupyter Book URLs.
    pub fn from_plugin(
        source_links: Vec<String>,
        plugin: &PluginConfig,
        settings: &RetrievalSettings,
    ) -> Self {
        let remote = &plugin.remote_context_gathering;
        Self {
            source_links,
            whitelist_domains: remote.whitelist.clone(),
            blacklist_domains: remote.blacklist.clone(),
            book_domains: remote.jupyterbook.urls.iter().map(|u| book_domain(u)).collect(),
            attempt_expansion: remote.jupyterbook.link_expansion,
            debug_mode: false,
            soft_timeout: Duration::from_millis(settings.soft_timeout_ms),
            max_concurrency: settings.max_concurrency,
        }
    }
}

/// Host (and port, if any) of a book URL; the raw entry when it does not parse.
fn book_domain(entry: &str) -> String {
    match Url::parse(entry) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => entry.to_string(),
        },
        Err(_) => entry.to_string(),
    }
}

/// Apply the whitelist (if non-empty) and then the blacklist (if non-empty).
pub fn filter_links(
    links: &[String],
    whitelist: Option<&[String]>,
    blacklist: &[String],
) -> Vec<String> {
    links
        .iter()
        .filter(|link| match whitelist {
            Some(allowed) if !allowed.is_empty() => matches_any_domain(link, allowed),
            _ => true,
        })
        .filter(|link| blacklist.is_empty() || !matches_any_domain(link, blacklist))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where the background work stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPhase {
    /// Not started (debug mode stays here).
    Uninitialized,
    /// Expanding or scraping.
    Loading,
    /// Finished with some content.
    Ready,
    /// Finished with nothing retrieved.
    Empty,
}

impl RetrievalPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Empty)
    }
}

/// What readers observe. Written only by the background task.
#[derive(Debug, Clone)]
struct Snapshot {
    phase: RetrievalPhase,
    links: Vec<String>,
    context: Option<String>,
}

// ---------------------------------------------------------------------------
// ContextRetriever
// ---------------------------------------------------------------------------

/// Gathers remote reference text for one notebook.
///
/// Construction spawns the background work on the current Tokio runtime and
/// returns immediately.
pub struct ContextRetriever {
    state: watch::Receiver<Snapshot>,
    soft_deadline: Instant,
    debug_mode: bool,
}

impl ContextRetriever {
    /// Start retrieving. Must be called from within a Tokio runtime.
    pub fn new(
        config: RetrieverConfig,
        scraper: Arc<PageScraper>,
        expander: Arc<LinkExpander>,
    ) -> Self {
        let soft_deadline = Instant::now() + config.soft_timeout;
        let (tx, rx) = watch::channel(Snapshot {
            phase: RetrievalPhase::Uninitialized,
            links: config.source_links.clone(),
            context: None,
        });

        if config.debug_mode {
            debug!("debug mode, background retrieval not started");
        } else {
            tokio::spawn(run(tx, config.clone(), scraper, expander));
        }

        Self {
            state: rx,
            soft_deadline,
            debug_mode: config.debug_mode,
        }
    }

    /// Current phase, without waiting.
    pub fn phase(&self) -> RetrievalPhase {
        self.state.borrow().phase
    }

    /// True once the soft timeout elapsed or a terminal phase was reached.
    pub fn is_soft_ready(&self) -> bool {
        Instant::now() >= self.soft_deadline || self.phase().is_terminal()
    }

    /// Retrieved context text.
    ///
    /// `Ok(None)` means nothing was retrieved (yet, for non-enforcing reads).
    /// Errors only on misuse: enforcing a debug-mode retriever, or the
    /// background task dying before it finished.
    pub async fn get_context(&self, enforcing: bool) -> Result<Option<String>> {
        let snapshot = self.wait(enforcing).await?;
        if snapshot.context.is_none() {
            warn!(phase = ?snapshot.phase, "no remote context retrieved");
        }
        Ok(snapshot.context)
    }

    /// The stored link list: the source links, or their expansion once it has run.
    pub async fn get_source_links(&self, enforcing: bool) -> Result<Vec<String>> {
        Ok(self.wait(enforcing).await?.links)
    }

    async fn wait(&self, enforcing: bool) -> Result<Snapshot> {
        let mut rx = self.state.clone();

        if enforcing {
            if self.debug_mode {
                return Err(JupytutorError::retrieval(
                    "enforcing read on a debug-mode retriever, which never loads",
                ));
            }
            return rx
                .wait_for(|s| s.phase.is_terminal())
                .await
                .map(|s| Snapshot::clone(&s))
                .map_err(|_| {
                    JupytutorError::retrieval("retrieval task ended before finishing")
                });
        }

        if self.debug_mode {
            return Ok(self.current());
        }

        let terminal = async move {
            rx.wait_for(|s| s.phase.is_terminal())
                .await
                .map(|s| Snapshot::clone(&s))
        };
        tokio::select! {
            Ok(snapshot) = terminal => Ok(snapshot),
            _ = tokio::time::sleep_until(self.soft_deadline) => {
                debug!("soft timeout reached, returning current state");
                Ok(self.current())
            }
        }
    }

    fn current(&self) -> Snapshot {
        self.state.borrow().clone()
    }
}

// ---------------------------------------------------------------------------
// Background work
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(links = config.source_links.len(), expansion = config.attempt_expansion))]
async fn run(
    tx: watch::Sender<Snapshot>,
    config: RetrieverConfig,
    scraper: Arc<PageScraper>,
    expander: Arc<LinkExpander>,
) {
    let start = std::time::Instant::now();
    tx.send_modify(|s| s.phase = RetrievalPhase::Loading);

    let mut links = config.source_links.clone();
    if config.attempt_expansion {
        let source = links.clone();
        let domains = config.book_domains.clone();
        let expansion = tokio::spawn(async move { expander.expand(&source, &domains).await });
        match expansion.await {
            Ok(expanded) => {
                links = expanded;
                let stored = links.clone();
                tx.send_modify(|s| s.links = stored);
            }
            Err(e) => warn!(error = %e, "link expansion failed, keeping source links"),
        }
    }

    let targets = filter_links(
        &links,
        config.whitelist_domains.as_deref(),
        &config.blacklist_domains,
    );
    debug!(total = links.len(), scraped = targets.len(), "links filtered");

    let pages: Vec<String> = scraper
        .scrape_all(&targets, config.max_concurrency)
        .await
        .into_iter()
        .flatten()
        .collect();

    let context = (!pages.is_empty()).then(|| pages.join(PAGE_SEPARATOR));
    let phase = if context.is_some() {
        RetrievalPhase::Ready
    } else {
        RetrievalPhase::Empty
    };

    info!(
        pages = pages.len(),
        ?phase,
        duration_ms = start.elapsed().as_millis(),
        "context retrieval finished"
    );

    tx.send_modify(|s| {
        s.phase = phase;
        s.context = context;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use jupytutor_shared::FetchConfig;

    fn services() -> (Arc<PageScraper>, Arc<LinkExpander>) {
        let config = FetchConfig {
            allow_private_hosts: true,
            ..FetchConfig::default()
        };
        (
            Arc::new(PageScraper::new(&config).unwrap()),
            Arc::new(LinkExpander::new(&config).unwrap()),
        )
    }

    fn retriever(config: RetrieverConfig) -> ContextRetriever {
        let (scraper, expander) = services();
        ContextRetriever::new(config, scraper, expander)
    }

    async fn page(server: &wiremock::MockServer, path: &str, body: &str) {
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path(path))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_filter_whitelist_then_blacklist() {
        let links: Vec<String> = [
            "https://book.org/chapters/1",
            "https://book.org/private/notes",
            "https://other.com/x",
        ]
        .map(String::from)
        .to_vec();

        let white = vec!["book.org".to_string()];
        let black = vec!["/private/".to_string()];

        assert_eq!(
            filter_links(&links, Some(white.as_slice()), &black),
            vec!["https://book.org/chapters/1"]
        );
        assert_eq!(filter_links(&links, Some(white.as_slice()), &[]).len(), 2);
        assert_eq!(filter_links(&links, Some(&[][..]), &black).len(), 2);
        assert_eq!(filter_links(&links, None, &[]), links);
    }

    #[test]
    fn test_book_domain_from_url() {
        assert_eq!(book_domain("https://inferentialthinking.com/"), "inferentialthinking.com");
        assert_eq!(book_domain("http://127.0.0.1:8080/book"), "127.0.0.1:8080");
        assert_eq!(book_domain("inferentialthinking.com"), "inferentialthinking.com");
    }

    #[tokio::test]
    async fn test_soft_timeout_then_enforced_read() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/slow"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("<main><p>Slow page</p></main>")
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let link = format!("{}/slow", server.uri());
        let mut config = RetrieverConfig::new(vec![link.clone()]);
        config.soft_timeout = Duration::from_millis(200);
        let retriever = retriever(config);

        let started = std::time::Instant::now();
        let early = retriever.get_context(false).await.unwrap();
        assert!(early.is_none());
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(retriever.phase(), RetrievalPhase::Loading);
        assert!(retriever.is_soft_ready());

        let full = retriever.get_context(true).await.unwrap();
        assert_eq!(full, Some(format!("[LINK] {link} [/LINK]\nSlow page")));
        assert_eq!(retriever.phase(), RetrievalPhase::Ready);
    }

    #[tokio::test]
    async fn test_fast_completion_beats_soft_timeout() {
        let server = wiremock::MockServer::start().await;
        page(&server, "/a", "<main><p>Alpha</p></main>").await;
        page(&server, "/b", "<main><p>Beta</p></main>").await;

        let base = server.uri();
        let retriever = retriever(RetrieverConfig::new(vec![
            format!("{base}/a"),
            format!("{base}/b"),
        ]));

        let started = std::time::Instant::now();
        let context = retriever.get_context(false).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(
            context,
            Some(format!(
                "[LINK] {base}/a [/LINK]\nAlpha\n\n[LINK] {base}/b [/LINK]\nBeta"
            ))
        );
    }

    #[tokio::test]
    async fn test_whitelist_ignores_unrelated_blacklist() {
        let server = wiremock::MockServer::start().await;
        page(&server, "/book/intro", "<main><p>Book</p></main>").await;
        wiremock::Mock::given(wiremock::matchers::path("/blog/post"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("<p>Blog</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let base = server.uri();
        let mut config = RetrieverConfig::new(vec![
            format!("{base}/blog/post"),
            format!("{base}/book/intro"),
        ]);
        config.whitelist_domains = Some(vec!["/book/".into()]);
        config.blacklist_domains = vec!["nowhere.example".into()];

        let context = retriever(config).get_context(true).await.unwrap().unwrap();
        assert_eq!(context, format!("[LINK] {base}/book/intro [/LINK]\nBook"));
    }

    #[tokio::test]
    async fn test_nothing_retrieved_is_none() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let base = server.uri();
        let mut config = RetrieverConfig::new(vec![
            format!("{base}/missing"),
            format!("{base}/blocked"),
        ]);
        config.blacklist_domains = vec!["/blocked".into()];
        let retriever = retriever(config);

        assert_eq!(retriever.get_context(true).await.unwrap(), None);
        assert_eq!(retriever.phase(), RetrievalPhase::Empty);
        // The stored list is not the filtered list.
        assert_eq!(retriever.get_source_links(true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_links_is_empty() {
        let retriever = retriever(RetrieverConfig::new(Vec::new()));
        assert_eq!(retriever.get_context(true).await.unwrap(), None);
        assert_eq!(retriever.phase(), RetrievalPhase::Empty);
    }

    #[tokio::test]
    async fn test_expansion_replaces_links() {
        let server = wiremock::MockServer::start().await;
        let base = server.uri();
        page(
            &server,
            "/chapters/2/1",
            r#"<main><p>Two one</p><a href="/chapters/2/2">next</a></main>"#,
        )
        .await;
        page(&server, "/chapters/2/2", "<main><p>Two two</p></main>").await;

        let mut config = RetrieverConfig::new(vec![format!("{base}/chapters/2/1")]);
        config.attempt_expansion = true;
        config.book_domains = vec![book_domain(&base)];
        let retriever = retriever(config);

        assert_eq!(
            retriever.get_source_links(true).await.unwrap(),
            vec![format!("{base}/chapters/2/1"), format!("{base}/chapters/2/2")]
        );
        let context = retriever.get_context(true).await.unwrap().unwrap();
        assert!(context.starts_with(&format!("[LINK] {base}/chapters/2/1 [/LINK]\nTwo one")));
        assert!(context.ends_with(&format!("[LINK] {base}/chapters/2/2 [/LINK]\nTwo two")));
    }

    #[tokio::test]
    async fn test_debug_mode_never_loads() {
        let mut config = RetrieverConfig::new(vec!["https://example.com/".into()]);
        config.debug_mode = true;
        let retriever = retriever(config);

        assert_eq!(retriever.phase(), RetrievalPhase::Uninitialized);
        assert_eq!(retriever.get_context(false).await.unwrap(), None);
        assert_eq!(
            retriever.get_source_links(false).await.unwrap(),
            vec!["https://example.com/"]
        );
        assert!(retriever.get_context(true).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrency_cap_still_fetches_everything() {
        let server = wiremock::MockServer::start().await;
        for name in ["a", "b", "c", "d"] {
            page(&server, &format!("/{name}"), &format!("<main><p>{name}</p></main>")).await;
        }

        let base = server.uri();
        let mut config = RetrieverConfig::new(
            ["a", "b", "c", "d"].iter().map(|n| format!("{base}/{n}")).collect(),
        );
        config.max_concurrency = Some(2);

        let context = retriever(config).get_context(true).await.unwrap().unwrap();
        assert_eq!(context.matches("[LINK]").count(), 4);
    }
}
