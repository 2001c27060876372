//! Typed chain boundary: contract traits plus the JSON-RPC implementation.
//!
//! The contract interfaces are pinned — function signatures and return
//! layouts are hardcoded constants of this module, never user-supplied.
//! Transactions go through the node's managed sender account
//! (`eth_sendTransaction`); key handling never enters this process.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use prize_draw::abi::{self, Token};
use prize_draw::Address;

use crate::types::{AuctionInfo, LotteryInfo, LotteryStatus};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("transaction {0} reverted")]
    TxFailed(String),
    #[error("timed out waiting for receipt of {0}")]
    Confirmation(String),
}

/// A confirmed transaction, stamped with the settling block's timestamp.
#[derive(Debug, Clone)]
pub struct SettledTx {
    pub tx_hash: String,
    pub block_timestamp: i64,
}

#[async_trait]
pub trait LotteryContract: Send + Sync {
    async fn lottery_info(&self, lottery_id: u64) -> Result<LotteryInfo, ChainError>;
    /// Ticket owners for positions `from..=to`, in chain-assigned order.
    async fn lottery_tickets(
        &self,
        lottery_id: u64,
        from: u64,
        to: u64,
    ) -> Result<Vec<Address>, ChainError>;
    async fn random_seed(&self, lottery_id: u64) -> Result<BigUint, ChainError>;
    async fn request_random_number(&self, lottery_id: u64) -> Result<String, ChainError>;
    async fn cancel_lottery(&self, lottery_id: u64) -> Result<String, ChainError>;
    async fn prize_merkle_root(&self, lottery_id: u64) -> Result<[u8; 32], ChainError>;
    async fn set_prize_merkle_root(
        &self,
        lottery_id: u64,
        root: [u8; 32],
    ) -> Result<String, ChainError>;
    async fn refund(
        &self,
        buyer: &Address,
        lottery_id: u64,
        amount_wei: &BigUint,
    ) -> Result<SettledTx, ChainError>;
}

#[async_trait]
pub trait AuctionContract: Send + Sync {
    async fn auction(&self, auction_id: u64) -> Result<AuctionInfo, ChainError>;
}

#[async_trait]
pub trait GasPriceSource: Send + Sync {
    async fn gas_price_gwei(&self) -> Result<u64, ChainError>;
}

// ── JSON-RPC client ─────────────────────────────────────────────

#[derive(Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
}

pub struct EthRpc {
    client: reqwest::Client,
    rpc_url: String,
    from: Address,
    lottery_address: Address,
    auction_address: Address,
    tx_timeout: Duration,
}

impl EthRpc {
    pub fn new(
        client: reqwest::Client,
        rpc_url: String,
        from: Address,
        lottery_address: Address,
        auction_address: Address,
        tx_timeout: Duration,
    ) -> Self {
        Self {
            client,
            rpc_url,
            from,
            lottery_address,
            auction_address,
            tx_timeout,
        }
    }

    async fn request(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(err) = response.error {
            return Err(ChainError::Rpc(format!("{method}: {err}")));
        }
        response
            .result
            .ok_or_else(|| ChainError::Decode(format!("{method}: empty result")))
    }

    async fn eth_call(&self, to: &Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let params = serde_json::json!([
            { "to": to.to_string(), "data": format!("0x{}", hex::encode(&data)) },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        let payload = result
            .as_str()
            .ok_or_else(|| ChainError::Decode("eth_call: non-string result".to_string()))?;
        decode_hex(payload)
    }

    async fn send_transaction(&self, to: &Address, data: Vec<u8>) -> Result<String, ChainError> {
        let params = serde_json::json!([{
            "from": self.from.to_string(),
            "to": to.to_string(),
            "data": format!("0x{}", hex::encode(&data)),
        }]);
        let result = self.request("eth_sendTransaction", params).await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ChainError::Decode("eth_sendTransaction: non-string result".to_string()))
    }

    /// Poll for the receipt until the transaction confirms or the timeout
    /// lapses. A reverted transaction is an error, not a timeout.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<u64, ChainError> {
        let started = Instant::now();
        loop {
            let result = self
                .request("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
                .await?;
            if !result.is_null() {
                if result["status"].as_str() != Some("0x1") {
                    return Err(ChainError::TxFailed(tx_hash.to_string()));
                }
                return result["blockNumber"]
                    .as_str()
                    .and_then(parse_quantity)
                    .ok_or_else(|| {
                        ChainError::Decode("receipt without blockNumber".to_string())
                    });
            }
            if started.elapsed() > self.tx_timeout {
                return Err(ChainError::Confirmation(tx_hash.to_string()));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Submit calldata to the contract and wait one confirmation.
    async fn transact(&self, to: &Address, data: Vec<u8>) -> Result<(String, u64), ChainError> {
        let tx_hash = self.send_transaction(to, data).await?;
        let block_number = self.wait_for_receipt(&tx_hash).await?;
        Ok((tx_hash, block_number))
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<i64, ChainError> {
        let result = self
            .request(
                "eth_getBlockByNumber",
                serde_json::json!([format!("0x{block_number:x}"), false]),
            )
            .await?;
        result["timestamp"]
            .as_str()
            .and_then(parse_quantity)
            .map(|t| t as i64)
            .ok_or_else(|| ChainError::Decode("block without timestamp".to_string()))
    }
}

#[async_trait]
impl LotteryContract for EthRpc {
    async fn lottery_info(&self, lottery_id: u64) -> Result<LotteryInfo, ChainError> {
        let data = abi::call_data(
            "getLotteryInfo(uint256)",
            &[Token::Uint(BigUint::from(lottery_id))],
        );
        let out = self.eth_call(&self.lottery_address, data).await?;
        decode_lottery_info(&out)
    }

    async fn lottery_tickets(
        &self,
        lottery_id: u64,
        from: u64,
        to: u64,
    ) -> Result<Vec<Address>, ChainError> {
        let data = abi::call_data(
            "getLotteryTickets(uint256,uint256,uint256)",
            &[
                Token::Uint(BigUint::from(lottery_id)),
                Token::Uint(BigUint::from(from)),
                Token::Uint(BigUint::from(to)),
            ],
        );
        let out = self.eth_call(&self.lottery_address, data).await?;
        abi::address_array(&out)
            .ok_or_else(|| ChainError::Decode("getLotteryTickets: bad address array".to_string()))
    }

    async fn random_seed(&self, lottery_id: u64) -> Result<BigUint, ChainError> {
        let data = abi::call_data(
            "randomSeeds(uint256)",
            &[Token::Uint(BigUint::from(lottery_id))],
        );
        let out = self.eth_call(&self.lottery_address, data).await?;
        abi::uint_at(&out, 0).ok_or_else(|| ChainError::Decode("randomSeeds: no word".to_string()))
    }

    async fn request_random_number(&self, lottery_id: u64) -> Result<String, ChainError> {
        let data = abi::call_data(
            "requestRandomNumber(uint256)",
            &[Token::Uint(BigUint::from(lottery_id))],
        );
        let (tx_hash, _) = self.transact(&self.lottery_address, data).await?;
        Ok(tx_hash)
    }

    async fn cancel_lottery(&self, lottery_id: u64) -> Result<String, ChainError> {
        let data = abi::call_data(
            "cancelLottery(uint256)",
            &[Token::Uint(BigUint::from(lottery_id))],
        );
        let (tx_hash, _) = self.transact(&self.lottery_address, data).await?;
        Ok(tx_hash)
    }

    async fn prize_merkle_root(&self, lottery_id: u64) -> Result<[u8; 32], ChainError> {
        let data = abi::call_data(
            "prizeMerkleRoots(uint256)",
            &[Token::Uint(BigUint::from(lottery_id))],
        );
        let out = self.eth_call(&self.lottery_address, data).await?;
        abi::word_at(&out, 0)
            .ok_or_else(|| ChainError::Decode("prizeMerkleRoots: no word".to_string()))
    }

    async fn set_prize_merkle_root(
        &self,
        lottery_id: u64,
        root: [u8; 32],
    ) -> Result<String, ChainError> {
        let data = abi::call_data(
            "setPrizeMerkleRoot(uint256,bytes32)",
            &[
                Token::Uint(BigUint::from(lottery_id)),
                Token::FixedBytes(root),
            ],
        );
        let (tx_hash, _) = self.transact(&self.lottery_address, data).await?;
        Ok(tx_hash)
    }

    async fn refund(
        &self,
        buyer: &Address,
        lottery_id: u64,
        amount_wei: &BigUint,
    ) -> Result<SettledTx, ChainError> {
        let data = abi::call_data(
            "refund(address,uint256,uint256)",
            &[
                Token::Address(*buyer),
                Token::Uint(BigUint::from(lottery_id)),
                Token::Uint(amount_wei.clone()),
            ],
        );
        let (tx_hash, block_number) = self.transact(&self.lottery_address, data).await?;
        let block_timestamp = self.block_timestamp(block_number).await?;
        Ok(SettledTx {
            tx_hash,
            block_timestamp,
        })
    }
}

#[async_trait]
impl AuctionContract for EthRpc {
    async fn auction(&self, auction_id: u64) -> Result<AuctionInfo, ChainError> {
        let data = abi::call_data(
            "getAuction(uint256)",
            &[Token::Uint(BigUint::from(auction_id))],
        );
        let out = self.eth_call(&self.auction_address, data).await?;
        decode_auction_info(&out)
    }
}

#[async_trait]
impl GasPriceSource for EthRpc {
    async fn gas_price_gwei(&self) -> Result<u64, ChainError> {
        let result = self.request("eth_gasPrice", serde_json::json!([])).await?;
        let wei = result
            .as_str()
            .and_then(parse_wide_quantity)
            .ok_or_else(|| ChainError::Decode("eth_gasPrice: bad quantity".to_string()))?;
        Ok((wei / 1_000_000_000) as u64)
    }
}

// ── Return layout decoding ──────────────────────────────────────

/// `getLotteryInfo` return layout (5 static words):
/// 0 lotteryId, 1 status, 2 closeTime, 3 ticketCostTokens,
/// 4 numberOfTicketsSold.
fn decode_lottery_info(out: &[u8]) -> Result<LotteryInfo, ChainError> {
    let lottery_id = abi::u64_at(out, 0).ok_or_else(|| field_err("lotteryId"))?;
    let status_code = abi::u64_at(out, 1).ok_or_else(|| field_err("status"))?;
    let status = LotteryStatus::from_code(status_code)
        .ok_or_else(|| ChainError::Decode(format!("unknown lottery status {status_code}")))?;
    let close_time = abi::u64_at(out, 2).ok_or_else(|| field_err("closeTime"))? as i64;
    let ticket_cost_tokens = abi::uint_at(out, 3).ok_or_else(|| field_err("ticketCostTokens"))?;
    let tickets_sold = abi::u64_at(out, 4).ok_or_else(|| field_err("numberOfTicketsSold"))?;
    Ok(LotteryInfo {
        lottery_id,
        status,
        close_time,
        ticket_cost_tokens,
        tickets_sold,
    })
}

/// `getAuction` return layout (2 static words): 0 endTime, 1 highestBidder.
fn decode_auction_info(out: &[u8]) -> Result<AuctionInfo, ChainError> {
    let end_time = abi::u64_at(out, 0).ok_or_else(|| field_err("endTime"))? as i64;
    let highest_bidder = abi::address_at(out, 1).ok_or_else(|| field_err("highestBidder"))?;
    Ok(AuctionInfo {
        end_time,
        highest_bidder: (!highest_bidder.is_zero()).then_some(highest_bidder),
    })
}

fn field_err(field: &str) -> ChainError {
    ChainError::Decode(format!("missing or overflowing field {field}"))
}

fn decode_hex(payload: &str) -> Result<Vec<u8>, ChainError> {
    hex::decode(payload.strip_prefix("0x").unwrap_or(payload))
        .map_err(|err| ChainError::Decode(format!("bad hex payload: {err}")))
}

fn parse_quantity(payload: &str) -> Option<u64> {
    u64::from_str_radix(payload.strip_prefix("0x")?, 16).ok()
}

fn parse_wide_quantity(payload: &str) -> Option<u128> {
    u128::from_str_radix(payload.strip_prefix("0x")?, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prize_draw::abi::{address_word, uint_word};

    #[test]
    fn test_decode_lottery_info() {
        let mut out = Vec::new();
        out.extend_from_slice(&uint_word(&BigUint::from(7u8)));
        out.extend_from_slice(&uint_word(&BigUint::from(3u8)));
        out.extend_from_slice(&uint_word(&BigUint::from(1_700_000_000u64)));
        out.extend_from_slice(&uint_word(&BigUint::from(2_000_000_000_000_000_000u64)));
        out.extend_from_slice(&uint_word(&BigUint::from(5u8)));

        let info = decode_lottery_info(&out).unwrap();
        assert_eq!(info.lottery_id, 7);
        assert_eq!(info.status, LotteryStatus::Completed);
        assert_eq!(info.close_time, 1_700_000_000);
        assert_eq!(
            info.ticket_cost_tokens,
            BigUint::from(2_000_000_000_000_000_000u64)
        );
        assert_eq!(info.tickets_sold, 5);
    }

    #[test]
    fn test_decode_lottery_info_rejects_unknown_status() {
        let mut out = Vec::new();
        out.extend_from_slice(&uint_word(&BigUint::from(1u8)));
        out.extend_from_slice(&uint_word(&BigUint::from(9u8)));
        out.extend_from_slice(&[0u8; 96]);
        assert!(decode_lottery_info(&out).is_err());
    }

    #[test]
    fn test_decode_auction_info_zero_bidder_is_none() {
        let mut out = Vec::new();
        out.extend_from_slice(&uint_word(&BigUint::from(1_650_000_000u64)));
        out.extend_from_slice(&[0u8; 32]);
        let info = decode_auction_info(&out).unwrap();
        assert_eq!(info.end_time, 1_650_000_000);
        assert!(info.highest_bidder.is_none());

        let bidder: Address = "0x00112233445566778899aabbccddeeff00112233"
            .parse()
            .unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(&uint_word(&BigUint::from(1_650_000_000u64)));
        out.extend_from_slice(&address_word(&bidder));
        let info = decode_auction_info(&out).unwrap();
        assert_eq!(info.highest_bidder, Some(bidder));
    }

    #[test]
    fn test_parse_quantities() {
        assert_eq!(parse_quantity("0x10"), Some(16));
        assert_eq!(parse_quantity("10"), None);
        assert_eq!(
            parse_wide_quantity("0x174876e800"),
            Some(100_000_000_000u128)
        );
    }
}
