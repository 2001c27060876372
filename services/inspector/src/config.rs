//! Worker configuration.
//!
//! Loaded from a JSON file named by the `INSPECTOR_CONFIG` environment
//! variable; every field has a sensible localnet default.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectorConfig {
    pub rpc_url: String,
    /// Node-managed account transactions are sent from.
    pub tx_from: String,
    pub lottery_address: String,
    pub auction_address: String,
    /// Path of the JSON game database.
    pub store_path: String,
    /// Metadata pinning gateway; edition metadata is POSTed here.
    pub metadata_endpoint: String,
    /// Notification delivery webhook. None disables delivery.
    pub notifier_endpoint: Option<String>,
    /// Site base URL used in notification links.
    pub base_url: String,
    /// Explorer prefix for transaction links.
    pub explorer_tx_base: String,
    /// Refund payouts are deferred while gas is above this (gwei).
    pub gas_ceiling_gwei: u64,
    /// Receipt wait bound per transaction (seconds).
    pub tx_timeout_secs: u64,
    /// If true, evaluates and logs but submits no transactions.
    pub dry_run: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            tx_from: "0x0000000000000000000000000000000000000000".to_string(),
            lottery_address: "0x0000000000000000000000000000000000000000".to_string(),
            auction_address: "0x0000000000000000000000000000000000000000".to_string(),
            store_path: "games.json".to_string(),
            metadata_endpoint: "http://localhost:8900/metadata".to_string(),
            notifier_endpoint: None,
            base_url: "http://localhost:3000/".to_string(),
            explorer_tx_base: "https://etherscan.io/tx/".to_string(),
            gas_ceiling_gwei: 100,
            tx_timeout_secs: 120,
            dry_run: false,
        }
    }
}

pub fn load() -> InspectorConfig {
    let path = std::env::var("INSPECTOR_CONFIG").unwrap_or_default();
    if !path.is_empty() {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            if let Ok(config) = serde_json::from_str::<InspectorConfig>(&contents) {
                return config;
            }
        }
        warn!("failed to load config from {}, using defaults", path);
    }
    InspectorConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InspectorConfig::default();
        assert_eq!(config.rpc_url, "http://localhost:8545");
        assert_eq!(config.gas_ceiling_gwei, 100);
        assert!(!config.dry_run);
        assert!(config.notifier_endpoint.is_none());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = InspectorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: InspectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.store_path, config.store_path);
        assert_eq!(back.tx_timeout_secs, config.tx_timeout_secs);
    }
}
