//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use jupytutor_core::{NotebookStore, TutorSession};
use jupytutor_crawler::PageScraper;
use jupytutor_discovery::LinkExpander;
use jupytutor_rules::{IpynbNotebook, NotebookHandle};
use jupytutor_shared::{
    AppConfig, FetchConfig, PLUGIN_METADATA_KEY, PluginConfig, init_config, load_config,
};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Jupytutor: per-cell tutoring config and reference context for notebooks.
#[derive(Parser)]
#[command(
    name = "jupytutor",
    version,
    about = "Inspect how the tutoring assistant is configured for a notebook and what it reads.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print the resolved assistant config for one cell, or every cell.
    Resolve {
        /// Path to the .ipynb file.
        notebook: PathBuf,

        /// Zero-based cell index. Omit to resolve all cells.
        #[arg(short, long)]
        cell: Option<usize>,
    },

    /// List the reference links visible from a cell.
    Links {
        notebook: PathBuf,

        #[arg(short, long)]
        cell: usize,
    },

    /// Retrieve remote context for a cell and print it.
    Context {
        notebook: PathBuf,

        #[arg(short, long)]
        cell: usize,

        /// Wait for retrieval to finish instead of honouring the soft timeout.
        #[arg(long)]
        enforce: bool,
    },

    /// Expand Jupyter Book links into their chapter siblings.
    Expand {
        /// Source links, in order.
        #[arg(required = true)]
        links: Vec<String>,

        /// Book domain eligible for expansion (repeatable).
        #[arg(long = "book-domain")]
        book_domains: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
    /// Check a notebook's plugin config.
    Validate {
        notebook: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "jupytutor=info",
        1 => "jupytutor=debug",
        _ => "jupytutor=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Resolve { notebook, cell } => cmd_resolve(&notebook, cell),
        Command::Links { notebook, cell } => cmd_links(&notebook, cell),
        Command::Context {
            notebook,
            cell,
            enforce,
        } => cmd_context(&notebook, cell, enforce).await,
        Command::Expand {
            links,
            book_domains,
        } => cmd_expand(&links, &book_domains).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Validate { notebook } => cmd_config_validate(&notebook),
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

/// A notebook with its plugin config and the services a session needs.
struct Workspace {
    notebook: IpynbNotebook,
    plugin: PluginConfig,
    app: AppConfig,
    scraper: Arc<PageScraper>,
    expander: Arc<LinkExpander>,
}

impl Workspace {
    fn open(path: &Path) -> Result<Self> {
        let app = load_config()?;
        let notebook = IpynbNotebook::from_path(path)?;

        let mut store = NotebookStore::new();
        let state = store.ensure(path);
        state.subscribers_mut().on_config_changed(|config| {
            debug!(
                enabled = config.plugin_enabled,
                rules = config.rules.len(),
                "plugin config loaded"
            );
        });
        let plugin = state.load_from(&notebook).clone();

        let fetch = FetchConfig::from(&app);
        Ok(Self {
            notebook,
            plugin,
            scraper: Arc::new(PageScraper::new(&fetch)?),
            expander: Arc::new(LinkExpander::new(&fetch)?),
            app,
        })
    }

    fn session(&self) -> TutorSession<'_> {
        TutorSession::new(
            &self.notebook,
            &self.plugin,
            self.app.retrieval.clone(),
            Arc::clone(&self.scraper),
            Arc::clone(&self.expander),
        )
    }

    fn check_cell(&self, cell: usize) -> Result<()> {
        let count = self.notebook.cell_count();
        if cell >= count {
            return Err(eyre!("cell {cell} out of range (notebook has {count} cells)"));
        }
        Ok(())
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_resolve(path: &Path, cell: Option<usize>) -> Result<()> {
    let ws = Workspace::open(path)?;
    if !ws.plugin.plugin_enabled {
        println!("Jupytutor is disabled for {}", path.display());
        return Ok(());
    }

    let indices: Vec<usize> = match cell {
        Some(index) => {
            ws.check_cell(index)?;
            vec![index]
        }
        None => (0..ws.notebook.cell_count()).collect(),
    };

    let session = ws.session();
    let resolved: Vec<serde_json::Value> = indices
        .into_iter()
        .filter_map(|index| session.assist(index))
        .map(|assist| {
            serde_json::json!({
                "cell": assist.index,
                "proactive": assist.proactive,
                "config": assist.config,
            })
        })
        .collect();

    info!(notebook = %path.display(), cells = resolved.len(), "resolved cell configs");
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

fn cmd_links(path: &Path, cell: usize) -> Result<()> {
    let ws = Workspace::open(path)?;
    ws.check_cell(cell)?;

    for link in ws.session().source_links(cell) {
        println!("{link}");
    }
    Ok(())
}

async fn cmd_context(path: &Path, cell: usize, enforce: bool) -> Result<()> {
    let ws = Workspace::open(path)?;
    ws.check_cell(cell)?;

    let Some(retriever) = ws.session().retriever(cell) else {
        println!("Remote context gathering is disabled for {}", path.display());
        return Ok(());
    };

    let progress = spinner("Retrieving reference material")?;
    let context = retriever.get_context(enforce).await;
    let links = retriever.get_source_links(false).await;
    progress.finish_and_clear();

    let phase = retriever.phase();
    let links = links?;
    info!(?phase, links = links.len(), enforce, "context request finished");

    match context? {
        Some(text) => println!("{text}"),
        None => println!("No context retrieved ({phase:?}, {} links).", links.len()),
    }
    Ok(())
}

async fn cmd_expand(links: &[String], book_domains: &[String]) -> Result<()> {
    let app = load_config()?;
    let expander = LinkExpander::new(&FetchConfig::from(&app))?;

    let progress = spinner("Expanding book chapters")?;
    let expanded = expander.expand(links, book_domains).await;
    progress.finish_and_clear();

    info!(
        source = links.len(),
        expanded = expanded.len(),
        "link expansion finished"
    );
    for link in expanded {
        println!("{link}");
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn cmd_config_validate(path: &Path) -> Result<()> {
    let notebook = IpynbNotebook::from_path(path)?;
    let Some(raw) = notebook.metadata(PLUGIN_METADATA_KEY) else {
        println!(
            "No \"{PLUGIN_METADATA_KEY}\" metadata in {}; Jupytutor stays disabled.",
            path.display()
        );
        return Ok(());
    };

    let config = PluginConfig::from_value(raw)?;

    for (i, rule) in config.rules.iter().enumerate() {
        if rule.when.as_ref().is_some_and(|p| p.has_unrecognized()) {
            println!("  warning: rule {i} has a condition that will not be recognised");
        }
    }

    println!("  Plugin config is valid.");
    println!("  Enabled:  {}", config.plugin_enabled);
    println!("  Rules:    {}", config.rules.len());
    println!("  Backend:  {}", config.api.base_url);
    println!(
        "  Remote:   {}",
        if config.remote_context_gathering.enabled { "on" } else { "off" }
    );
    println!(
        "  Books:    {}",
        config.remote_context_gathering.jupyterbook.urls.len()
    );
    Ok(())
}
