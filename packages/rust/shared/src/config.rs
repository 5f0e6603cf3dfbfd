//! Application configuration for scrapedesk.
//!
//! User config lives at `~/.scrapedesk/scrapedesk.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeDeskError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "scrapedesk.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".scrapedesk";

// ---------------------------------------------------------------------------
// Config structs (matching scrapedesk.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote scraping service.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Job defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the scraping service.
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Upper bound on a single phase request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:5000".into()
}
fn default_timeout_secs() -> u64 {
    600
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory exported spreadsheets are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Drop repeated input URLs before discovery.
    #[serde(default)]
    pub dedupe_urls: bool,

    /// Cap on discovered product URLs. Unset means the service default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            dedupe_urls: false,
            limit: None,
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}

impl AppConfig {
    /// Reject values that cannot drive a job.
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            return Err(ScrapeDeskError::config("backend.url must not be empty"));
        }
        if url::Url::parse(&self.backend.url).is_err() {
            return Err(ScrapeDeskError::config(format!(
                "backend.url is not a valid URL: {}",
                self.backend.url
            )));
        }
        if self.defaults.limit == Some(0) {
            return Err(ScrapeDeskError::config(
                "defaults.limit must be a positive integer",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.scrapedesk/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ScrapeDeskError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.scrapedesk/scrapedesk.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ScrapeDeskError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ScrapeDeskError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScrapeDeskError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ScrapeDeskError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScrapeDeskError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
