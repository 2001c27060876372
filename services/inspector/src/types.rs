//! Typed records at the chain and datastore boundaries.
//!
//! On-chain return tuples are converted into these explicit record types at
//! the RPC layer; nothing downstream touches raw ABI words.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use prize_draw::merkle;
use prize_draw::Address;

/// On-chain lottery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotteryStatus {
    Open,
    Canceled,
    ClosedAwaitingRandomness,
    Completed,
}

impl LotteryStatus {
    /// Decode the contract's status discriminant.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Open),
            1 => Some(Self::Canceled),
            2 => Some(Self::ClosedAwaitingRandomness),
            3 => Some(Self::Completed),
            _ => None,
        }
    }
}

/// `getLotteryInfo` result. Re-fetched on every inspection of a lottery.
#[derive(Debug, Clone)]
pub struct LotteryInfo {
    pub lottery_id: u64,
    pub status: LotteryStatus,
    /// Unix seconds.
    pub close_time: i64,
    /// Ticket cost in wei.
    pub ticket_cost_tokens: BigUint,
    pub tickets_sold: u64,
}

/// `getAuction` result.
#[derive(Debug, Clone)]
pub struct AuctionInfo {
    /// Unix seconds; zero means the auction never started.
    pub end_time: i64,
    /// None when no bid was placed (zero address on chain).
    pub highest_bidder: Option<Address>,
}

/// Datastore lottery row: approval and distribution bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// Unix seconds; the worker only inspects lotteries past this.
    pub end_time: i64,
    #[serde(default)]
    pub approved_at: Option<i64>,
    /// Distribution idempotency marker.
    #[serde(default)]
    pub prizes_awarded_at: Option<i64>,
    #[serde(default)]
    pub canceled: bool,
}

/// Datastore auction row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub approved_at: Option<i64>,
    #[serde(default)]
    pub claimed_at: Option<i64>,
    #[serde(default)]
    pub winner_address: Option<Address>,
}

/// One prize row; consumed in ascending-id order during distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeRecord {
    pub id: u64,
    pub lottery_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    pub metadata_uri: String,
}

/// One winner/prize assignment; doubles as the persisted proof row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerAssignment {
    pub lottery_id: u64,
    pub winner_address: Address,
    /// 0-based ticket position. At most one assignment per position per
    /// lottery.
    pub ticket_number: u64,
    pub prize_id: u64,
    pub metadata_uri: String,
    /// Comma-joined 0x-hex sibling digests; empty until computed.
    #[serde(default)]
    pub proof: String,
    /// Unix seconds.
    pub created_at: i64,
}

impl WinnerAssignment {
    /// Leaf digest exactly as the claim contract re-derives it.
    pub fn leaf_digest(&self) -> [u8; 32] {
        merkle::leaf_digest(
            self.lottery_id,
            &self.winner_address,
            self.ticket_number,
            &self.metadata_uri,
        )
    }
}

/// Aggregated refund owed to one buyer for one lottery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    /// Assigned by the store on insert.
    #[serde(default)]
    pub id: u64,
    pub lottery_id: u64,
    pub buyer: Address,
    /// Whole tokens across every losing ticket of this buyer.
    pub refundable_tokens: u64,
    /// Set once the payout transaction confirms; the payment guard.
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub block_timestamp: Option<i64>,
}

/// Platform user, looked up by wallet to address notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub wallet_address: Address,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(LotteryStatus::from_code(0), Some(LotteryStatus::Open));
        assert_eq!(LotteryStatus::from_code(1), Some(LotteryStatus::Canceled));
        assert_eq!(
            LotteryStatus::from_code(2),
            Some(LotteryStatus::ClosedAwaitingRandomness)
        );
        assert_eq!(LotteryStatus::from_code(3), Some(LotteryStatus::Completed));
        assert_eq!(LotteryStatus::from_code(4), None);
    }

    #[test]
    fn test_assignment_digest_tracks_metadata() {
        let winner: Address = "0x1111111111111111111111111111111111111111"
            .parse()
            .unwrap();
        let assignment = WinnerAssignment {
            lottery_id: 9,
            winner_address: winner,
            ticket_number: 3,
            prize_id: 1,
            metadata_uri: "ar://one".to_string(),
            proof: String::new(),
            created_at: 0,
        };
        let mut relabeled = assignment.clone();
        relabeled.metadata_uri = "ar://two".to_string();
        assert_ne!(assignment.leaf_digest(), relabeled.leaf_digest());
    }
}
