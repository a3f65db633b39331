//! Filter configuration
//!
//! Chain names and the iptables invocation are configuration, not constants,
//! so tests and side-by-side deployments can use their own chains.
//!
//! Loaded from JSON:
//!
//! ```json
//! {
//!   "table": "filter",
//!   "base_chain": "CONTAINERS",
//!   "reject_chain": "CONTAINER-REJECT",
//!   "chain_prefix": "CONTAINER-",
//!   "iptables_path": "iptables",
//!   "elevate": true,
//!   "audit_log": true
//! }
//! ```
//!
//! Every field is optional and falls back to the value shown.

use crate::core::error::{Error, Result};
use crate::utils::get_config_dir;
use crate::validators::{IFNAME_MAX_LEN, validate_chain_name};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_TABLE: &str = "filter";
pub const DEFAULT_BASE_CHAIN: &str = "CONTAINERS";
pub const DEFAULT_REJECT_CHAIN: &str = "CONTAINER-REJECT";
pub const DEFAULT_CHAIN_PREFIX: &str = "CONTAINER-";
pub const DEFAULT_IPTABLES: &str = "iptables";

/// Settings for compiling and applying interface filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    #[serde(default = "default_table")]
    pub table: String,
    /// Shared chain that receives one jump rule per filtered interface
    #[serde(default = "default_base_chain")]
    pub base_chain: String,
    /// Chain every dedicated chain falls through to
    #[serde(default = "default_reject_chain")]
    pub reject_chain: String,
    #[serde(default = "default_chain_prefix")]
    pub chain_prefix: String,
    #[serde(default = "default_iptables")]
    pub iptables_path: String,
    /// Wrap iptables in run0/sudo/pkexec when not root
    #[serde(default = "default_true")]
    pub elevate: bool,
    #[serde(default = "default_true")]
    pub audit_log: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            base_chain: default_base_chain(),
            reject_chain: default_reject_chain(),
            chain_prefix: default_chain_prefix(),
            iptables_path: default_iptables(),
            elevate: true,
            audit_log: true,
        }
    }
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_base_chain() -> String {
    DEFAULT_BASE_CHAIN.to_string()
}

fn default_reject_chain() -> String {
    DEFAULT_REJECT_CHAIN.to_string()
}

fn default_chain_prefix() -> String {
    DEFAULT_CHAIN_PREFIX.to_string()
}

fn default_iptables() -> String {
    DEFAULT_IPTABLES.to_string()
}

fn default_true() -> bool {
    true
}

impl FilterConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns `Err` on malformed JSON, unknown fields, or invalid chain names.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FilterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks chain names against iptables limits.
    ///
    /// The prefix is checked with a maximum-length interface name appended,
    /// so every valid interface yields a valid dedicated chain name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("table", &self.table),
            ("base_chain", &self.base_chain),
            ("reject_chain", &self.reject_chain),
        ] {
            validate_chain_name(value).map_err(|e| Error::Config(format!("{field}: {e}")))?;
        }

        if self.chain_prefix.is_empty() {
            return Err(Error::Config("chain_prefix: must not be empty".to_string()));
        }
        let longest = format!("{}{}", self.chain_prefix, "x".repeat(IFNAME_MAX_LEN));
        validate_chain_name(&longest).map_err(|e| {
            Error::Config(format!(
                "chain_prefix: too long for {IFNAME_MAX_LEN}-character interfaces ({e})"
            ))
        })?;

        if self.chain_prefix == self.base_chain || self.chain_prefix == self.reject_chain {
            return Err(Error::Config(
                "chain_prefix: must differ from the base and reject chains".to_string(),
            ));
        }

        if self.iptables_path.trim().is_empty() {
            return Err(Error::Config("iptables_path: must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Loads the filter configuration.
///
/// An explicit `path` must exist. Without one, `config.json` in the user
/// config directory is used when present, and defaults otherwise.
///
/// # Errors
///
/// Returns `Err` if the file cannot be read or fails validation.
pub fn load_config(path: Option<&Path>) -> Result<FilterConfig> {
    if let Some(path) = path {
        debug!("Loading configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        return FilterConfig::from_json(&json);
    }

    if let Some(mut default_path) = get_config_dir() {
        default_path.push("config.json");
        if default_path.is_file() {
            debug!("Loading configuration from {}", default_path.display());
            let json = std::fs::read_to_string(&default_path)?;
            return FilterConfig::from_json(&json);
        }
    }

    debug!("No configuration file found, using defaults");
    Ok(FilterConfig::default())
}
