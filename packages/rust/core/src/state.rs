//! Per-notebook state and config-change subscriptions.
//!
//! The store is owned by the caller and passed where it is needed. Entries are
//! created on first touch by [`NotebookStore::ensure`] and only go away when
//! the caller removes them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use jupytutor_rules::NotebookHandle;
use jupytutor_shared::{PLUGIN_METADATA_KEY, PluginConfig};

/// Handle returned by [`ConfigSubscribers::on_config_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ConfigHandler = Box<dyn Fn(&PluginConfig) + Send + Sync>;

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Handlers notified whenever a notebook's plugin config is re-read.
#[derive(Default)]
pub struct ConfigSubscribers {
    next_id: u64,
    handlers: Vec<(SubscriptionId, ConfigHandler)>,
}

impl ConfigSubscribers {
    /// Register `handler`; it runs after every config update, in registration order.
    pub fn on_config_changed<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: Fn(&PluginConfig) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _)| *existing != id);
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn notify(&self, config: &PluginConfig) {
        for (_, handler) in &self.handlers {
            handler(config);
        }
    }
}

impl std::fmt::Debug for ConfigSubscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSubscribers")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NotebookState
// ---------------------------------------------------------------------------

/// State kept for one open notebook.
#[derive(Debug)]
pub struct NotebookState {
    path: PathBuf,
    config: PluginConfig,
    subscribers: ConfigSubscribers,
}

impl NotebookState {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            config: PluginConfig::default(),
            subscribers: ConfigSubscribers::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current plugin config (the disabled default until first loaded).
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn subscribers_mut(&mut self) -> &mut ConfigSubscribers {
        &mut self.subscribers
    }

    /// Re-parse the plugin config from raw metadata and notify subscribers.
    ///
    /// Missing or invalid metadata leaves the plugin disabled.
    pub fn update_config(&mut self, metadata: Option<&Value>) -> &PluginConfig {
        self.config = PluginConfig::load_or_disabled(metadata);
        debug!(
            path = %self.path.display(),
            enabled = self.config.plugin_enabled,
            subscribers = self.subscribers.len(),
            "plugin config updated"
        );
        self.subscribers.notify(&self.config);
        &self.config
    }

    /// [`update_config`](Self::update_config) from the notebook's own metadata.
    pub fn load_from(&mut self, notebook: &dyn NotebookHandle) -> &PluginConfig {
        self.update_config(notebook.metadata(PLUGIN_METADATA_KEY))
    }
}

// ---------------------------------------------------------------------------
// NotebookStore
// ---------------------------------------------------------------------------

/// Notebook states keyed by path.
#[derive(Debug, Default)]
pub struct NotebookStore {
    entries: HashMap<PathBuf, NotebookState>,
}

impl NotebookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `path`, created on first touch.
    pub fn ensure(&mut self, path: impl AsRef<Path>) -> &mut NotebookState {
        let path = path.as_ref();
        self.entries
            .entry(path.to_path_buf())
            .or_insert_with(|| NotebookState::new(path.to_path_buf()))
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&NotebookState> {
        self.entries.get(path.as_ref())
    }

    /// Drop the state for `path`, returning it if it existed.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<NotebookState> {
        self.entries.remove(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
