//! Repository boundary over the game datastore.
//!
//! The worker only needs filtered reads, batch inserts, and a handful of
//! single-field updates that serve as idempotency guards. The production
//! implementation keeps the whole database as one JSON document on disk,
//! rewritten after each mutation; deployments front it with the platform's
//! sync tooling.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use prize_draw::Address;

use crate::types::{
    AuctionRecord, LotteryRecord, PrizeRecord, RefundRecord, UserRecord, WinnerAssignment,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{entity} #{id} not found")]
    NotFound { entity: &'static str, id: u64 },
}

#[async_trait]
pub trait GameStore: Send + Sync {
    async fn approved_lotteries(&self) -> Result<Vec<LotteryRecord>, StoreError>;
    async fn approved_auctions(&self) -> Result<Vec<AuctionRecord>, StoreError>;
    /// Prize rows for one lottery, ascending id.
    async fn prizes_for_lottery(&self, lottery_id: u64) -> Result<Vec<PrizeRecord>, StoreError>;
    async fn update_prize(
        &self,
        prize_id: u64,
        name: &str,
        metadata_uri: &str,
    ) -> Result<(), StoreError>;
    async fn has_prize_proofs(&self, lottery_id: u64) -> Result<bool, StoreError>;
    async fn insert_prize_proofs(&self, rows: &[WinnerAssignment]) -> Result<usize, StoreError>;
    /// Distribution idempotency marker.
    async fn mark_prizes_awarded(&self, lottery_id: u64, awarded_at: i64)
        -> Result<(), StoreError>;
    async fn has_refunds(&self, lottery_id: u64) -> Result<bool, StoreError>;
    async fn insert_refunds(&self, rows: &[RefundRecord]) -> Result<(), StoreError>;
    /// Refund rows whose payout transaction hash is still unset.
    async fn pending_refunds(&self) -> Result<Vec<RefundRecord>, StoreError>;
    async fn settle_refund(
        &self,
        refund_id: u64,
        tx_hash: &str,
        block_timestamp: i64,
    ) -> Result<(), StoreError>;
    async fn set_auction_winner(&self, auction_id: u64, winner: &Address)
        -> Result<(), StoreError>;
    async fn user_by_address(&self, address: &Address) -> Result<Option<UserRecord>, StoreError>;
}

// ── JSON file store ─────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct GameDb {
    #[serde(default)]
    lotteries: Vec<LotteryRecord>,
    #[serde(default)]
    auctions: Vec<AuctionRecord>,
    #[serde(default)]
    prizes: Vec<PrizeRecord>,
    #[serde(default)]
    prize_proofs: Vec<WinnerAssignment>,
    #[serde(default)]
    refunds: Vec<RefundRecord>,
    #[serde(default)]
    users: Vec<UserRecord>,
}

pub struct JsonFileStore {
    path: PathBuf,
    db: Mutex<GameDb>,
}

impl JsonFileStore {
    /// Load the database file; a missing file is an empty database.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let db = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == ErrorKind::NotFound => GameDb::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            db: Mutex::new(db),
        })
    }

    fn flush(&self, db: &GameDb) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(db)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[async_trait]
impl GameStore for JsonFileStore {
    async fn approved_lotteries(&self) -> Result<Vec<LotteryRecord>, StoreError> {
        let db = self.db.lock();
        Ok(db
            .lotteries
            .iter()
            .filter(|record| record.approved_at.is_some())
            .cloned()
            .collect())
    }

    async fn approved_auctions(&self) -> Result<Vec<AuctionRecord>, StoreError> {
        let db = self.db.lock();
        Ok(db
            .auctions
            .iter()
            .filter(|record| record.approved_at.is_some())
            .cloned()
            .collect())
    }

    async fn prizes_for_lottery(&self, lottery_id: u64) -> Result<Vec<PrizeRecord>, StoreError> {
        let db = self.db.lock();
        let mut prizes: Vec<PrizeRecord> = db
            .prizes
            .iter()
            .filter(|prize| prize.lottery_id == lottery_id)
            .cloned()
            .collect();
        prizes.sort_by_key(|prize| prize.id);
        Ok(prizes)
    }

    async fn update_prize(
        &self,
        prize_id: u64,
        name: &str,
        metadata_uri: &str,
    ) -> Result<(), StoreError> {
        let mut db = self.db.lock();
        let prize = db
            .prizes
            .iter_mut()
            .find(|prize| prize.id == prize_id)
            .ok_or(StoreError::NotFound {
                entity: "prize",
                id: prize_id,
            })?;
        prize.name = name.to_string();
        prize.metadata_uri = metadata_uri.to_string();
        self.flush(&db)
    }

    async fn has_prize_proofs(&self, lottery_id: u64) -> Result<bool, StoreError> {
        let db = self.db.lock();
        Ok(db
            .prize_proofs
            .iter()
            .any(|row| row.lottery_id == lottery_id))
    }

    async fn insert_prize_proofs(&self, rows: &[WinnerAssignment]) -> Result<usize, StoreError> {
        let mut db = self.db.lock();
        db.prize_proofs.extend_from_slice(rows);
        self.flush(&db)?;
        Ok(rows.len())
    }

    async fn mark_prizes_awarded(
        &self,
        lottery_id: u64,
        awarded_at: i64,
    ) -> Result<(), StoreError> {
        let mut db = self.db.lock();
        let lottery = db
            .lotteries
            .iter_mut()
            .find(|record| record.id == lottery_id)
            .ok_or(StoreError::NotFound {
                entity: "lottery",
                id: lottery_id,
            })?;
        lottery.prizes_awarded_at = Some(awarded_at);
        self.flush(&db)
    }

    async fn has_refunds(&self, lottery_id: u64) -> Result<bool, StoreError> {
        let db = self.db.lock();
        Ok(db.refunds.iter().any(|row| row.lottery_id == lottery_id))
    }

    async fn insert_refunds(&self, rows: &[RefundRecord]) -> Result<(), StoreError> {
        let mut db = self.db.lock();
        let mut next_id = db.refunds.iter().map(|row| row.id).max().unwrap_or(0) + 1;
        for row in rows {
            let mut row = row.clone();
            row.id = next_id;
            next_id += 1;
            db.refunds.push(row);
        }
        self.flush(&db)
    }

    async fn pending_refunds(&self) -> Result<Vec<RefundRecord>, StoreError> {
        let db = self.db.lock();
        Ok(db
            .refunds
            .iter()
            .filter(|row| row.tx_hash.is_none())
            .cloned()
            .collect())
    }

    async fn settle_refund(
        &self,
        refund_id: u64,
        tx_hash: &str,
        block_timestamp: i64,
    ) -> Result<(), StoreError> {
        let mut db = self.db.lock();
        let row = db
            .refunds
            .iter_mut()
            .find(|row| row.id == refund_id)
            .ok_or(StoreError::NotFound {
                entity: "refund",
                id: refund_id,
            })?;
        row.tx_hash = Some(tx_hash.to_string());
        row.block_timestamp = Some(block_timestamp);
        self.flush(&db)
    }

    async fn set_auction_winner(
        &self,
        auction_id: u64,
        winner: &Address,
    ) -> Result<(), StoreError> {
        let mut db = self.db.lock();
        let auction = db
            .auctions
            .iter_mut()
            .find(|record| record.id == auction_id)
            .ok_or(StoreError::NotFound {
                entity: "auction",
                id: auction_id,
            })?;
        auction.winner_address = Some(*winner);
        self.flush(&db)
    }

    async fn user_by_address(&self, address: &Address) -> Result<Option<UserRecord>, StoreError> {
        let db = self.db.lock();
        Ok(db
            .users
            .iter()
            .find(|user| user.wallet_address == *address)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "inspector-store-{}-{}.json",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn refund(lottery_id: u64, tokens: u64) -> RefundRecord {
        RefundRecord {
            id: 0,
            lottery_id,
            buyer: "0x1111111111111111111111111111111111111111"
                .parse()
                .unwrap(),
            refundable_tokens: tokens,
            tx_hash: None,
            block_timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_db() {
        let store = JsonFileStore::open(temp_path("empty")).unwrap();
        assert!(store.approved_lotteries().await.unwrap().is_empty());
        assert!(store.pending_refunds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refund_settlement_persists_across_reopen() {
        let path = temp_path("settle");
        let store = JsonFileStore::open(&path).unwrap();
        store
            .insert_refunds(&[refund(1, 3), refund(1, 5)])
            .await
            .unwrap();

        let pending = store.pending_refunds().await.unwrap();
        assert_eq!(pending.len(), 2);
        // Store assigns sequential ids.
        assert_eq!(pending[0].id, 1);
        assert_eq!(pending[1].id, 2);

        store.settle_refund(1, "0xabc", 7_000).await.unwrap();
        assert_eq!(store.pending_refunds().await.unwrap().len(), 1);

        let reopened = JsonFileStore::open(&path).unwrap();
        let pending = reopened.pending_refunds().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 2);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_mark_prizes_awarded() {
        let path = temp_path("awarded");
        let store = JsonFileStore::open(&path).unwrap();
        {
            let mut db = store.db.lock();
            db.lotteries.push(LotteryRecord {
                id: 4,
                name: "drop".to_string(),
                contract_address: None,
                end_time: 0,
                approved_at: Some(1),
                prizes_awarded_at: None,
                canceled: false,
            });
        }
        store.mark_prizes_awarded(4, 9_000).await.unwrap();
        let lotteries = store.approved_lotteries().await.unwrap();
        assert_eq!(lotteries[0].prizes_awarded_at, Some(9_000));

        assert!(matches!(
            store.mark_prizes_awarded(99, 1).await,
            Err(StoreError::NotFound { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_prizes_sorted_by_id() {
        let path = temp_path("prizes");
        let store = JsonFileStore::open(&path).unwrap();
        {
            let mut db = store.db.lock();
            for id in [3u64, 1, 2] {
                db.prizes.push(PrizeRecord {
                    id,
                    lottery_id: 1,
                    name: format!("prize {id}"),
                    description: String::new(),
                    image_url: String::new(),
                    metadata_uri: format!("ar://{id}"),
                });
            }
        }
        let prizes = store.prizes_for_lottery(1).await.unwrap();
        let ids: Vec<u64> = prizes.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        let _ = std::fs::remove_file(&path);
    }
}
