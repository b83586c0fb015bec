//! Shared types, error model, and configuration for Jupytutor.
//!
//! This crate is the foundation depended on by all other Jupytutor crates.
//! It provides:
//! - [`JupytutorError`]: the unified error type
//! - Domain types ([`RuleConfig`], [`PartialRuleConfig`], [`Rule`], [`Predicate`])
//! - Configuration ([`PluginConfig`], [`AppConfig`], config loading)
//! - URL helpers ([`normalize_url`], [`matches_any_domain`])

pub mod config;
pub mod error;
pub mod net;
pub mod predicate;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, DEFAULT_SOFT_TIMEOUT_MS, FetchConfig, JupyterBookConfig,
    PLUGIN_METADATA_KEY, PluginConfig, PreferencesConfig, RemoteContextConfig, RetrievalSettings,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{JupytutorError, Result};
pub use net::{is_private_target, matches_any_domain, normalize_url};
pub use predicate::{ArrayMatch, Predicate, StringMatch};
pub use types::{CellKind, PRIOR_NOTES_PLACEHOLDER, PartialRuleConfig, Rule, RuleConfig};
