//! Per-cell tutoring session: what the assistant should do for the active
//! cell and which reference material it should read.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use jupytutor_crawler::PageScraper;
use jupytutor_discovery::LinkExpander;
use jupytutor_markdown::extract_links;
use jupytutor_rules::{NotebookHandle, resolve};
use jupytutor_shared::{CellKind, PluginConfig, RetrievalSettings, RuleConfig, normalize_url};

use crate::retriever::{ContextRetriever, RetrieverConfig};

/// Resolved assistant behaviour for one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellAssist {
    pub index: usize,
    pub config: RuleConfig,
    /// The rule's proactive flag, gated by the notebook-wide preference.
    pub proactive: bool,
}

/// Binds a notebook, its plugin config, and the shared fetch services.
pub struct TutorSession<'a> {
    notebook: &'a dyn NotebookHandle,
    plugin: &'a PluginConfig,
    settings: RetrievalSettings,
    scraper: Arc<PageScraper>,
    expander: Arc<LinkExpander>,
}

impl<'a> TutorSession<'a> {
    pub fn new(
        notebook: &'a dyn NotebookHandle,
        plugin: &'a PluginConfig,
        settings: RetrievalSettings,
        scraper: Arc<PageScraper>,
        expander: Arc<LinkExpander>,
    ) -> Self {
        Self {
            notebook,
            plugin,
            settings,
            scraper,
            expander,
        }
    }

    /// Assistant configuration for the cell at `index`.
    ///
    /// `None` when the plugin is disabled or the index is out of range, both
    /// of which mean "assistant inactive".
    pub fn assist(&self, index: usize) -> Option<CellAssist> {
        if !self.plugin.plugin_enabled || index >= self.notebook.cell_count() {
            return None;
        }

        let config = resolve(self.notebook, index, &self.plugin.rules);
        let proactive = config.chat_proactive && self.plugin.preferences.proactive_enabled;
        Some(CellAssist {
            index,
            config,
            proactive,
        })
    }

    /// Links referenced by markdown cells up to and including `active`,
    /// followed by the configured Jupyter Book URLs, deduplicated.
    pub fn source_links(&self, active: usize) -> Vec<String> {
        let last = active.min(self.notebook.cell_count().saturating_sub(1));
        let cell_links = (0..self.notebook.cell_count())
            .take_while(|&i| i <= last)
            .filter_map(|i| self.notebook.cell(i))
            .filter(|cell| cell.kind() == CellKind::Markdown)
            .flat_map(|cell| extract_links(&cell.source()));

        let book_urls = self
            .plugin
            .remote_context_gathering
            .jupyterbook
            .urls
            .iter()
            .cloned();

        let mut seen = HashSet::new();
        cell_links
            .chain(book_urls)
            .filter(|link| seen.insert(normalize_url(link)))
            .collect()
    }

    /// Start retrieving context for the cell at `active`.
    ///
    /// `None` when the plugin or remote gathering is disabled. Must be called
    /// from within a Tokio runtime.
    #[instrument(skip(self))]
    pub fn retriever(&self, active: usize) -> Option<ContextRetriever> {
        if !self.plugin.gathers_remote_context() {
            debug!("remote context gathering disabled");
            return None;
        }

        let links = self.source_links(active);
        debug!(links = links.len(), "starting context retrieval");
        let config = RetrieverConfig::from_plugin(links, self.plugin, &self.settings);
        Some(ContextRetriever::new(
            config,
            Arc::clone(&self.scraper),
            Arc::clone(&self.expander),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jupytutor_rules::{IpynbCell, IpynbNotebook};
    use jupytutor_shared::FetchConfig;
    use serde_json::json;

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

    fn notebook() -> IpynbNotebook {
        IpynbNotebook::new(vec![
            IpynbCell::markdown("Read [chapter 3](https://inferentialthinking.com/chapters/03/programming-in-python.html)."),
            IpynbCell::code("# https://not-a-link-from-code.com"),
            IpynbCell::markdown("**Question 1.** See <https://docs.python.org/3/> and [ch3](https://inferentialthinking.com/chapters/03/programming-in-python.html#top)")
                .with_metadata("tags", json!(["question"])),
            IpynbCell::code("answer = ..."),
            IpynbCell::markdown("Later: https://numpy.org/doc/"),
        ])
    }

    fn plugin(value: serde_json::Value) -> PluginConfig {
        PluginConfig::from_value(&value).unwrap()
    }

    #[test]
    fn assist_gates_proactive_by_preference() {
        let nb = notebook();
        let (scraper, expander) = services();
        let config = plugin(json!({
            "pluginEnabled": true,
            "rules": [{"when": {"cellType": "code"}, "config": {"chatEnabled": true}}],
            "preferences": {"proactiveEnabled": false}
        }));
        let session = TutorSession::new(&nb, &config, RetrievalSettings::default(), scraper, expander);

        let assist = session.assist(3).unwrap();
        assert!(assist.config.chat_enabled);
        assert!(assist.config.chat_proactive);
        assert!(!assist.proactive);

        assert!(!session.assist(0).unwrap().config.chat_enabled);
        assert!(session.assist(99).is_none());
    }

    #[test]
    fn disabled_plugin_is_inactive() {
        let nb = notebook();
        let (scraper, expander) = services();
        let config = PluginConfig::default();
        let session = TutorSession::new(&nb, &config, RetrievalSettings::default(), scraper, expander);
        assert!(session.assist(3).is_none());
    }

    #[test]
    fn links_up_to_active_cell_then_book_urls() {
        let nb = notebook();
        let (scraper, expander) = services();
        let config = plugin(json!({
            "pluginEnabled": true,
            "remoteContextGathering": {"jupyterbook": {"urls": [
                "https://inferentialthinking.com/chapters/03/programming-in-python.html",
                "https://inferentialthinking.com/chapters/04/Data_Types.html"
            ]}}
        }));
        let session = TutorSession::new(&nb, &config, RetrievalSettings::default(), scraper, expander);

        assert_eq!(
            session.source_links(3),
            vec![
                "https://inferentialthinking.com/chapters/03/programming-in-python.html",
                "https://docs.python.org/3/",
                "https://inferentialthinking.com/chapters/04/Data_Types.html",
            ]
        );
        assert_eq!(session.source_links(100).last().map(String::as_str), Some("https://inferentialthinking.com/chapters/04/Data_Types.html"));
        assert!(session.source_links(100).contains(&"https://numpy.org/doc/".to_string()));
    }

    #[tokio::test]
    async fn retriever_only_when_gathering_enabled() {
        let nb = notebook();
        let (scraper, expander) = services();

        let off = plugin(json!({"pluginEnabled": true, "remoteContextGathering": {"enabled": false}}));
        let session = TutorSession::new(&nb, &off, RetrievalSettings::default(), Arc::clone(&scraper), Arc::clone(&expander));
        assert!(session.retriever(3).is_none());

        let disabled = PluginConfig::default();
        let session = TutorSession::new(&nb, &disabled, RetrievalSettings::default(), Arc::clone(&scraper), Arc::clone(&expander));
        assert!(session.retriever(3).is_none());
    }

    #[tokio::test]
    async fn retriever_scrapes_cell_links() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/reading"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("<main><p>Reading</p></main>"))
            .mount(&server)
            .await;

        let link = format!("{}/reading", server.uri());
        let nb = IpynbNotebook::new(vec![
            IpynbCell::markdown(format!("Background: [reading]({link})")),
            IpynbCell::code("x = 1"),
        ]);
        let config = plugin(json!({"pluginEnabled": true}));
        let (scraper, expander) = services();
        let session = TutorSession::new(&nb, &config, RetrievalSettings::default(), scraper, expander);

        let retriever = session.retriever(1).unwrap();
        assert_eq!(
            retriever.get_context(true).await.unwrap(),
            Some(format!("[LINK] {link} [/LINK]\nReading"))
        );
    }
}
