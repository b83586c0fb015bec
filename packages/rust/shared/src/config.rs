//! Configuration for Jupytutor.
//!
//! Two layers:
//! - [`PluginConfig`]: per-notebook JSON stored in notebook metadata under
//!   [`PLUGIN_METADATA_KEY`]. Parsed in two phases (serde shape + defaults,
//!   then semantic validation); a document that fails either phase leaves the
//!   plugin disabled.
//! - [`AppConfig`]: per-user TOML at `~/.jupytutor/jupytutor.toml` holding
//!   fetch settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{JupytutorError, Result};
use crate::types::Rule;

/// Notebook (and cell) metadata key holding Jupytutor settings.
pub const PLUGIN_METADATA_KEY: &str = "jupytutor";

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jupytutor.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".jupytutor";

/// Soft deadline readers wait for before returning partial retrieval state.
pub const DEFAULT_SOFT_TIMEOUT_MS: u64 = 5000;

// ---------------------------------------------------------------------------
// Plugin config (notebook metadata)
// ---------------------------------------------------------------------------

/// Notebook-level plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Master switch. Defaults to off so a missing document means "inactive".
    #[serde(default)]
    pub plugin_enabled: bool,

    #[serde(default)]
    pub api: ApiConfig,

    /// Ordered rules; later matching rules override earlier ones.
    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default)]
    pub remote_context_gathering: RemoteContextConfig,

    #[serde(default)]
    pub preferences: PreferencesConfig,
}

/// `api` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the tutoring backend.
    #[serde(rename = "baseURL", default = "default_base_url")]
    pub base_url: Url,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> Url {
    Url::parse("http://localhost:8000/").expect("static URL is valid")
}

/// `remoteContextGathering` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteContextConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// When set and non-empty, only links containing one of these domains are scraped.
    #[serde(default)]
    pub whitelist: Option<Vec<String>>,

    /// Links containing any of these domains are never scraped.
    #[serde(default)]
    pub blacklist: Vec<String>,

    #[serde(default)]
    pub jupyterbook: JupyterBookConfig,
}

impl Default for RemoteContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            whitelist: None,
            blacklist: Vec::new(),
            jupyterbook: JupyterBookConfig::default(),
        }
    }
}

/// `remoteContextGathering.jupyterbook` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JupyterBookConfig {
    /// Book domains eligible for chapter expansion.
    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default = "default_true")]
    pub link_expansion: bool,
}

impl Default for JupyterBookConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            link_expansion: true,
        }
    }
}

/// `preferences` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesConfig {
    #[serde(default = "default_true")]
    pub proactive_enabled: bool,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            proactive_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl PluginConfig {
    /// Parse and validate a configuration document.
    pub fn from_value(value: &Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value.clone())
            .map_err(|e| JupytutorError::config(format!("invalid plugin config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a document found in notebook metadata, falling back to the
    /// disabled default when it is absent or invalid.
    pub fn load_or_disabled(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            tracing::debug!("no plugin config in notebook metadata, plugin disabled");
            return Self::default();
        };

        match Self::from_value(value) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "plugin config rejected, plugin disabled");
                Self::default()
            }
        }
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        match self.api.base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(JupytutorError::config(format!(
                    "api.baseURL must be http(s), got scheme '{other}'"
                )));
            }
        }

        let remote = &self.remote_context_gathering;
        let lists = [
            ("remoteContextGathering.whitelist", remote.whitelist.as_deref().unwrap_or(&[])),
            ("remoteContextGathering.blacklist", remote.blacklist.as_slice()),
            ("remoteContextGathering.jupyterbook.urls", remote.jupyterbook.urls.as_slice()),
        ];
        for (field, entries) in lists {
            if entries.iter().any(|d| d.trim().is_empty()) {
                return Err(JupytutorError::config(format!(
                    "{field} contains an empty domain"
                )));
            }
        }

        Ok(())
    }

    /// Whether remote context should be gathered at all.
    pub fn gathers_remote_context(&self) -> bool {
        self.plugin_enabled && self.remote_context_gathering.enabled
    }
}

// ---------------------------------------------------------------------------
// App config (user TOML)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fetch and retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalSettings,
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Soft deadline for non-enforcing context readers.
    #[serde(default = "default_soft_timeout_ms")]
    pub soft_timeout_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Cap on concurrent page fetches. Unset means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            soft_timeout_ms: default_soft_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_redirects: default_max_redirects(),
            max_concurrency: None,
        }
    }
}

fn default_soft_timeout_ms() -> u64 {
    DEFAULT_SOFT_TIMEOUT_MS
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    5
}

/// HTTP settings shared by the link expander and the page scraper.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub request_timeout: Duration,
    pub max_redirects: usize,
    /// Allow fetching localhost/private IPs (integration tests with mock servers).
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.retrieval.request_timeout_secs),
            max_redirects: config.retrieval.max_redirects,
            allow_private_hosts: false,
        }
    }
}

/// Get the path to the config directory (`~/.jupytutor/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| JupytutorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.jupytutor/jupytutor.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| JupytutorError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        JupytutorError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| JupytutorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| JupytutorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| JupytutorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_gets_defaults() {
        let config = PluginConfig::from_value(&json!({})).unwrap();
        assert!(!config.plugin_enabled);
        assert_eq!(config.api.base_url.as_str(), "http://localhost:8000/");
        assert!(config.rules.is_empty());
        assert!(config.remote_context_gathering.enabled);
        assert!(config.remote_context_gathering.whitelist.is_none());
        assert!(config.remote_context_gathering.jupyterbook.link_expansion);
        assert!(config.preferences.proactive_enabled);
    }

    #[test]
    fn null_in_rule_config_rejects_document() {
        let doc = json!({
            "pluginEnabled": true,
            "rules": [{"config": {"chatEnabled": true, "instructorNote": null}}]
        });
        assert!(PluginConfig::from_value(&doc).is_err());
        assert!(!PluginConfig::load_or_disabled(Some(&doc)).plugin_enabled);
    }

    #[test]
    fn full_document_parses() {
        let config = PluginConfig::from_value(&json!({
            "pluginEnabled": true,
            "api": {"baseURL": "https://tutor.example.edu/api/"},
            "rules": [
                {"comment": "code cells", "when": {"cellType": "code"}, "config": {"chatEnabled": true}}
            ],
            "remoteContextGathering": {
                "enabled": true,
                "whitelist": ["inferentialthinking.com"],
                "blacklist": ["piazza.com"],
                "jupyterbook": {"urls": ["inferentialthinking.com"], "linkExpansion": false}
            },
            "preferences": {"proactiveEnabled": false},
            "someFutureField": 42
        }))
        .unwrap();

        assert!(config.plugin_enabled);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(
            config.remote_context_gathering.whitelist,
            Some(vec!["inferentialthinking.com".to_string()])
        );
        assert!(!config.remote_context_gathering.jupyterbook.link_expansion);
        assert!(!config.preferences.proactive_enabled);
        assert!(config.gathers_remote_context());
    }

    #[test]
    fn malformed_value_fails_whole_document() {
        let result = PluginConfig::from_value(&json!({
            "pluginEnabled": "true",
            "rules": []
        }));
        assert!(matches!(result, Err(JupytutorError::Config { .. })));

        let result = PluginConfig::from_value(&json!({"api": {"baseURL": "not a url"}}));
        assert!(result.is_err());

        let result = PluginConfig::from_value(&json!({
            "remoteContextGathering": {"blacklist": [""]}
        }));
        assert!(result.is_err());

        let result = PluginConfig::from_value(&json!({"api": {"baseURL": "ftp://host/"}}));
        assert!(result.is_err());
    }

    #[test]
    fn broken_config_behaves_as_disabled() {
        let broken = json!({"pluginEnabled": true, "rules": "everything"});
        let config = PluginConfig::load_or_disabled(Some(&broken));
        assert_eq!(config, PluginConfig::default());
        assert!(!config.plugin_enabled);

        assert!(!PluginConfig::load_or_disabled(None).plugin_enabled);
    }

    #[test]
    fn malformed_predicate_does_not_fail_document() {
        let config = PluginConfig::from_value(&json!({
            "pluginEnabled": true,
            "rules": [{"when": {"mystery": true}, "config": {"chatEnabled": true}}]
        }))
        .unwrap();
        let when = config.rules[0].when.as_ref().unwrap();
        assert!(when.has_unrecognized());
    }

    #[test]
    fn app_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        assert!(toml_str.contains("soft_timeout_ms"));
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retrieval.soft_timeout_ms, 5000);
        assert!(parsed.retrieval.max_concurrency.is_none());
    }

    #[test]
    fn fetch_config_from_app_config() {
        let mut app = AppConfig::default();
        app.retrieval.request_timeout_secs = 7;
        let fetch = FetchConfig::from(&app);
        assert_eq!(fetch.request_timeout, Duration::from_secs(7));
        assert_eq!(fetch.max_redirects, 5);
        assert!(!fetch.allow_private_hosts);
    }
}
