//! Worker-level error type; each boundary folds in via `From`.

use thiserror::Error;

use crate::chain::ChainError;
use crate::metadata::MetadataError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("merkle error: {0}")]
    Merkle(#[from] prize_draw::merkle::MerkleError),
    #[error("lottery {lottery_id}: ticket list has {got} entries, chain reports {expected} sold")]
    TicketListMismatch {
        lottery_id: u64,
        got: usize,
        expected: u64,
    },
}
