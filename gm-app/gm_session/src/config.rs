//! Application configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainId, BASE_CHAIN_ID, GM_CONTRACT, GM_VALUE, U256};

use crate::error::ConfigError;

/// Metadata shown by wallets during pairing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icon: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        AppMetadata {
            name: "GM on Base".into(),
            description: "Daily GM signing on Base".into(),
            url: "https://gmbase-beta.vercel.app/".into(),
            icon: "https://gmbase-beta.vercel.app/icon.png".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// The one chain submissions are sent on.
    pub chain_id: ChainId,
    /// GM contract exposing `getPoints(address)` and payable `gm()`.
    pub contract: Address,
    /// Value attached to `gm()`.
    pub gm_value_wei: U256,
    /// Explorer prefix for transaction links.
    pub explorer_tx_url: String,
    pub celebration_ms: u64,
    pub highlight_ms: u64,
    pub receipt_poll_ms: u64,
    pub rpc_url: String,
    /// Where `JsonFileStore` keeps the cache. `None` keeps it in memory.
    pub cache_path: Option<PathBuf>,
    pub app: AppMetadata,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            chain_id: BASE_CHAIN_ID,
            contract: GM_CONTRACT,
            gm_value_wei: GM_VALUE,
            explorer_tx_url: "https://basescan.org/tx/".into(),
            celebration_ms: 2_000,
            highlight_ms: 1_000,
            receipt_poll_ms: 1_500,
            rpc_url: "https://mainnet.base.org".into(),
            cache_path: None,
            app: AppMetadata::default(),
        }
    }
}

impl AppConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn celebration(&self) -> Duration {
        Duration::from_millis(self.celebration_ms)
    }

    pub fn highlight(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn explorer_link(&self, hash: &impl std::fmt::Display) -> String {
        format!("{}{hash}", self.explorer_tx_url)
    }
}
