use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::protocol::{Account, ANY_ORIGIN};

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub simulator: Option<SimulatorConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// postMessage target and the only inbound origin accepted ("*" = any)
    #[serde(default = "default_target_origin")]
    pub target_origin: String,
    #[serde(default = "default_sign_timeout_ms")]
    pub sign_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn sign_timeout(&self) -> Duration {
        Duration::from_millis(self.sign_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sign_timeout_ms == 0 {
            anyhow::bail!("sign_timeout_ms must be greater than zero");
        }
        if self.target_origin != ANY_ORIGIN
            && !self.target_origin.starts_with("https://")
            && !self.target_origin.starts_with("http://")
        {
            anyhow::bail!(
                "Invalid target_origin: {}. Must be '*' or an http(s) origin",
                self.target_origin
            );
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            target_origin: default_target_origin(),
            sign_timeout_ms: default_sign_timeout_ms(),
        }
    }
}

fn default_target_origin() -> String {
    ANY_ORIGIN.to_string()
}

fn default_sign_timeout_ms() -> u64 {
    300_000
}

/// Scripted extension used by `bridge-sim`
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    #[serde(default = "default_page_origin")]
    pub page_origin: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub reject_signatures: bool,
    pub sign_message: String,
}

fn default_page_origin() -> String {
    "https://app.lunie.io".to_string()
}

impl ConfigFile {
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        self.bridge.validate()
    }
}
