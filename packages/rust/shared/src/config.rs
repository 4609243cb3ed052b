//! Application configuration for citeflow.
//!
//! User config lives at `~/.citeflow/citeflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CiteflowError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "citeflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".citeflow";

// ---------------------------------------------------------------------------
// Config structs (matching citeflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat stream endpoint settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Citation catalog settings.
    #[serde(default)]
    pub citations: CitationsConfig,

    /// Terminal rendering of citation markers.
    #[serde(default)]
    pub render: RenderConfig,
}

/// `[stream]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// URL the chat question is POSTed to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            api_token_env: default_api_token_env(),
        }
    }
}

impl StreamConfig {
    /// Parse and validate the configured endpoint.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            CiteflowError::config(format!("invalid stream endpoint '{}': {e}", self.endpoint))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(CiteflowError::config(format!(
                "stream endpoint must be http or https, got '{other}'"
            ))),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8000/api/chat/stream".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_api_token_env() -> String {
    "CITEFLOW_API_TOKEN".into()
}

/// `[citations]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationsConfig {
    /// Prefixes stripped from source names before they become display names.
    #[serde(default = "default_noise_prefixes")]
    pub noise_prefixes: Vec<String>,
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            noise_prefixes: default_noise_prefixes(),
        }
    }
}

fn default_noise_prefixes() -> Vec<String> {
    ["Document:", "File:", "Source:", "uploaded_", "tmp_"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Document-view link template; `{doc_id}` is substituted.
    #[serde(default = "default_document_view_url")]
    pub document_view_url: String,

    /// Minimum doc-id length for a document link to be built.
    #[serde(default = "default_min_doc_id_len")]
    pub min_doc_id_len: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            document_view_url: default_document_view_url(),
            min_doc_id_len: default_min_doc_id_len(),
        }
    }
}

fn default_document_view_url() -> String {
    "http://localhost:3000/documents/{doc_id}".into()
}
fn default_min_doc_id_len() -> usize {
    32
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.citeflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CiteflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.citeflow/citeflow.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| CiteflowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CiteflowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CiteflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CiteflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CiteflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the bearer token from the env var named in the config, if set and non-empty.
pub fn api_token(config: &StreamConfig) -> Option<String> {
    match std::env::var(&config.api_token_env) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}
