//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The publishable key is loaded from STRIPE_PUBLISHABLE_KEY or
//! publishable_key_file, never stored in the TOML directly to avoid leaking
//! secrets.

use auth_flow::{EmptyAccounts, FlowConfig};
use connections_api::Secret;
use connections_api::constants::API_BASE_URL;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Error, Result};

/// Environment variable holding the publishable key
pub const PUBLISHABLE_KEY_ENV: &str = "STRIPE_PUBLISHABLE_KEY";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    pub flow: FlowSettings,
    pub bridge: BridgeConfig,
}

/// Session API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Path to a file containing the publishable key (alternative to the env var)
    #[serde(default)]
    pub publishable_key_file: Option<PathBuf>,
    #[serde(skip)]
    pub publishable_key: Option<Secret>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            publishable_key_file: None,
            publishable_key: None,
        }
    }
}

/// Flow settings shared by every flow the bridge runs
#[derive(Debug, Deserialize)]
pub struct FlowSettings {
    pub return_url: Url,
    #[serde(default = "default_max_accounts")]
    pub max_accounts: usize,
    #[serde(default)]
    pub empty_accounts: EmptyAccountsPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyAccountsPolicy {
    #[default]
    Cancel,
    Succeed,
}

impl From<EmptyAccountsPolicy> for EmptyAccounts {
    fn from(policy: EmptyAccountsPolicy) -> Self {
        match policy {
            EmptyAccountsPolicy::Cancel => EmptyAccounts::Cancel,
            EmptyAccountsPolicy::Succeed => EmptyAccounts::Succeed,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_accounts() -> usize {
    connections_api::DEFAULT_MAX_ACCOUNTS
}

fn default_max_connections() -> usize {
    64
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Publishable key resolution order:
    /// 1. STRIPE_PUBLISHABLE_KEY env var
    /// 2. publishable_key_file path from config
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }

        // The return URL's scheme is what marks the terminal redirect; a web
        // scheme would match ordinary navigations in the hosted page.
        let scheme = config.flow.return_url.scheme();
        if scheme == "http" || scheme == "https" {
            return Err(Error::Config(format!(
                "return_url must use an app scheme, got: {}",
                config.flow.return_url
            )));
        }

        if config.flow.max_accounts == 0 {
            return Err(Error::Config("max_accounts must be greater than 0".into()));
        }

        if config.bridge.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        // Resolve publishable key: env var takes precedence over file; blank
        // values count as unset
        let env_key = std::env::var(PUBLISHABLE_KEY_ENV)
            .ok()
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty());
        if let Some(key) = env_key {
            config.api.publishable_key = Some(Secret::new(key));
        } else if let Some(ref key_file) = config.api.publishable_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                Error::Config(format!(
                    "failed to read publishable_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.api.publishable_key = Some(Secret::new(key));
            }
        }

        if config.api.publishable_key.is_none() {
            return Err(Error::Config(format!(
                "publishable key missing: set {PUBLISHABLE_KEY_ENV} or api.publishable_key_file"
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("link-bridge.toml")
    }

    /// Per-flow settings handed to every `AuthFlow`.
    pub fn flow_config(&self) -> FlowConfig {
        let mut flow = FlowConfig::new(self.flow.return_url.clone());
        flow.max_accounts = self.flow.max_accounts;
        flow.empty_accounts = self.flow.empty_accounts.into();
        flow
    }
}
