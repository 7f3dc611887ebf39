//! CLI configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `$XDG_CONFIG_HOME/roomdrop/config.toml` (or `~/.config/...`)
//! - Windows: `%APPDATA%/roomdrop/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use roomdrop_client::{ClientConfig, RetryPolicy};
use roomdrop_protocol::constants::DEFAULT_COLLECTION_PATH;
use serde::{Deserialize, Serialize};

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the upload server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Collection endpoint path on the server.
    #[serde(default = "default_collection_path")]
    pub collection_path: String,

    /// Room uploads go to when `--container` is not given.
    #[serde(default)]
    pub container_id: String,

    /// Resume ledger file (platform default when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bytes per PATCH request; unset sends the whole file at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_server_url() -> String {
    "http://localhost:1080".into()
}

fn default_collection_path() -> String {
    DEFAULT_COLLECTION_PATH.into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_initial_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            collection_path: default_collection_path(),
            container_id: String::new(),
            ledger_path: None,
            request_timeout_secs: default_request_timeout_secs(),
            chunk_size: None,
            max_retries: default_max_retries(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating a
    /// default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Client settings derived from this file.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            collection_path: self.collection_path.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            chunk_size: self.chunk_size.filter(|&n| n > 0),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
                ..RetryPolicy::default()
            },
            ..ClientConfig::default()
        }
    }

    /// Ledger file to use.
    pub fn ledger_file(&self) -> anyhow::Result<PathBuf> {
        match &self.ledger_path {
            Some(p) => Ok(p.clone()),
            None => roomdrop_ledger::default_ledger_path()
                .ok_or_else(|| anyhow::anyhow!("cannot determine the ledger location; set ledger_path")),
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let base = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        Ok(base.join("roomdrop").join("config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("roomdrop").join("config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("roomdrop")
            .join("config.toml"))
    }
}
