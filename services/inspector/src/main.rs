//! Game Inspection Worker
//!
//! Polls the lottery and auction contracts plus the game datastore, drives
//! on-chain state transitions (request randomness, cancel, publish the
//! prize Merkle root, pay refunds), and persists winner proofs and refund
//! records.
//!
//! One inspection pass per invocation — schedule it externally (cron or a
//! systemd timer). All idempotency guards live in the datastore and on
//! chain, so overlapping or re-run passes are safe.
//!
//! # Running
//!
//! ```bash
//! INSPECTOR_CONFIG=inspector.json RUST_LOG=info cargo run -p inspector
//! ```

mod chain;
mod config;
mod error;
mod inspect;
mod metadata;
mod notifier;
mod store;
mod types;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use prize_draw::Address;

use crate::chain::EthRpc;
use crate::inspect::Inspector;
use crate::notifier::{NullNotifier, Notifier, WebhookNotifier};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    info!("starting the game inspection pass");

    let config = config::load();
    info!(
        rpc = %config.rpc_url,
        store = %config.store_path,
        dry_run = config.dry_run,
        "configuration loaded"
    );

    let tx_from = parse_address(&config.tx_from, "tx_from");
    let lottery_address = parse_address(&config.lottery_address, "lottery_address");
    let auction_address = parse_address(&config.auction_address, "auction_address");

    let client = reqwest::Client::new();
    let rpc = Arc::new(EthRpc::new(
        client.clone(),
        config.rpc_url.clone(),
        tx_from,
        lottery_address,
        auction_address,
        Duration::from_secs(config.tx_timeout_secs),
    ));

    let store = match store::JsonFileStore::open(&config.store_path) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(path = %config.store_path, error = %err, "failed to open the game store");
            process::exit(1);
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.notifier_endpoint {
        Some(endpoint) => Arc::new(WebhookNotifier::new(client.clone(), endpoint.clone())),
        None => Arc::new(NullNotifier),
    };

    let metadata = Arc::new(metadata::HttpMetadataPublisher::new(
        client,
        config.metadata_endpoint.clone(),
    ));

    let inspector = Inspector {
        lottery: rpc.clone(),
        auction: rpc.clone(),
        gas: rpc,
        store,
        notifier,
        metadata,
        config,
    };

    match inspector.run_pass().await {
        Ok(()) => info!("game inspection pass finished successfully"),
        Err(err) => {
            error!(error = %err, "game inspection pass failed");
            process::exit(1);
        }
    }
}

fn parse_address(value: &str, field: &str) -> Address {
    match value.parse() {
        Ok(address) => address,
        Err(err) => {
            error!(field, value, error = %err, "invalid address in configuration");
            process::exit(1);
        }
    }
}
