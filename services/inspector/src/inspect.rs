//! The inspection pass: lottery state transitions, prize distribution,
//! auction reconciliation, and refund payouts.
//!
//! One pass runs to completion and the process exits; scheduling is
//! external. The worker never owns on-chain state — it observes status and
//! drives the off-chain side effects of each transition. Idempotency
//! markers (`prizes_awarded_at`, proof rows, refund `tx_hash`) are checked
//! immediately before every externally-visible action, so a pass re-run
//! after a partial failure is safe.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use tracing::{error, info, warn};

use prize_draw::merkle::{self, MerkleTree};
use prize_draw::selection;
use prize_draw::Address;

use crate::chain::{AuctionContract, GasPriceSource, LotteryContract};
use crate::config::InspectorConfig;
use crate::error::InspectError;
use crate::metadata::MetadataPublisher;
use crate::notifier::{Notification, Notifier};
use crate::store::GameStore;
use crate::types::{
    AuctionRecord, LotteryInfo, LotteryRecord, LotteryStatus, PrizeRecord, RefundRecord,
    WinnerAssignment,
};

/// Tokens are 18-decimal; refund rows keep whole-token amounts.
const TOKEN_SCALE_WEI: u64 = 1_000_000_000_000_000_000;

/// Everything one pass needs, constructed once and threaded through.
pub struct Inspector {
    pub lottery: Arc<dyn LotteryContract>,
    pub auction: Arc<dyn AuctionContract>,
    pub gas: Arc<dyn GasPriceSource>,
    pub store: Arc<dyn GameStore>,
    pub notifier: Arc<dyn Notifier>,
    pub metadata: Arc<dyn MetadataPublisher>,
    pub config: InspectorConfig,
}

impl Inspector {
    /// One full inspection pass. A failure on an individual lottery,
    /// auction, or refund is logged and skipped; only the pass-level
    /// listings are fatal.
    pub async fn run_pass(&self) -> Result<(), InspectError> {
        let now = unix_now();
        self.update_lotteries(now).await?;
        self.update_auctions(now).await?;
        self.pay_refunds().await?;
        Ok(())
    }

    async fn update_lotteries(&self, now: i64) -> Result<(), InspectError> {
        info!("searching for lotteries that require action");
        let lotteries = self.store.approved_lotteries().await?;
        for record in lotteries {
            if record.prizes_awarded_at.is_some()
                || record.canceled
                || record.contract_address.is_none()
            {
                continue;
            }
            if now < record.end_time {
                continue;
            }
            if let Err(err) = self.inspect_lottery(&record, now).await {
                error!(lottery_id = record.id, error = %err, "lottery inspection failed");
            }
        }
        Ok(())
    }

    async fn inspect_lottery(&self, record: &LotteryRecord, now: i64) -> Result<(), InspectError> {
        let info = self.lottery.lottery_info(record.id).await?;

        // Finished on the clock but still open on chain: close it out.
        if info.status == LotteryStatus::Open && info.close_time < now {
            if info.tickets_sold > 0 {
                info!(lottery_id = record.id, "lottery is closed, requesting random number");
                if self.config.dry_run {
                    info!(lottery_id = record.id, "dry run, randomness request not sent");
                    return Ok(());
                }
                self.lottery.request_random_number(record.id).await?;
            } else {
                info!(
                    lottery_id = record.id,
                    "lottery closed without participants, canceling"
                );
                if self.config.dry_run {
                    info!(lottery_id = record.id, "dry run, cancellation not sent");
                    return Ok(());
                }
                self.lottery.cancel_lottery(record.id).await?;
            }
            return Ok(());
        }

        if info.status == LotteryStatus::Completed && info.tickets_sold > 0 {
            self.distribute_prizes(record, &info, now).await?;
        }
        Ok(())
    }

    async fn distribute_prizes(
        &self,
        record: &LotteryRecord,
        info: &LotteryInfo,
        now: i64,
    ) -> Result<(), InspectError> {
        info!(lottery_id = record.id, "lottery is complete but has no prizes awarded yet");

        let tickets = self
            .lottery
            .lottery_tickets(record.id, 0, info.tickets_sold - 1)
            .await?;
        if tickets.len() as u64 != info.tickets_sold {
            return Err(InspectError::TicketListMismatch {
                lottery_id: record.id,
                got: tickets.len(),
                expected: info.tickets_sold,
            });
        }
        info!(
            lottery_id = record.id,
            tickets = tickets.len(),
            "fetched ticket list"
        );

        let random_seed = self.lottery.random_seed(record.id).await?;
        info!(lottery_id = record.id, seed = %random_seed, "random seed stored for this lottery");

        let prizes = self.store.prizes_for_lottery(record.id).await?;
        let total_prizes = (prizes.len() as u64).min(info.tickets_sold);
        if total_prizes == 0 {
            info!(lottery_id = record.id, "no prizes for this lottery");
            return Ok(());
        }
        info!(lottery_id = record.id, total_prizes, "starting prize distribution");

        if self.config.dry_run {
            let positions =
                selection::draw_winners(&random_seed, total_prizes, info.tickets_sold);
            info!(
                lottery_id = record.id,
                ?positions,
                "dry run, computed winner positions only"
            );
            return Ok(());
        }

        let mut winner_positions: BTreeSet<u64> = BTreeSet::new();
        let mut assignments: Vec<WinnerAssignment> = Vec::with_capacity(total_prizes as usize);
        for award_index in 0..total_prizes {
            let position = selection::select_winner_position(
                &random_seed,
                award_index,
                info.tickets_sold,
                &winner_positions,
            );
            winner_positions.insert(position);
            let prize = &prizes[award_index as usize];
            let winner = tickets[position as usize];
            info!(
                lottery_id = record.id,
                award = award_index + 1,
                total_prizes,
                winner = %winner,
                position,
                "awarded prize"
            );

            let metadata_uri = if prizes.len() > 1 {
                // Every edition gets its own label and metadata document.
                let edition_name = format!("{} {}/{}", prize.name, award_index + 1, total_prizes);
                let uri = self
                    .metadata
                    .publish(&edition_name, &prize.description, &prize.image_url)
                    .await?;
                self.store.update_prize(prize.id, &edition_name, &uri).await?;
                uri
            } else {
                prize.metadata_uri.clone()
            };

            assignments.push(WinnerAssignment {
                lottery_id: record.id,
                winner_address: winner,
                ticket_number: position,
                prize_id: prize.id,
                metadata_uri,
                proof: String::new(),
                created_at: now,
            });
        }

        info!(lottery_id = record.id, "all prizes awarded, building the merkle tree");
        let leaves: Vec<[u8; 32]> = assignments
            .iter()
            .map(WinnerAssignment::leaf_digest)
            .collect();
        let tree = MerkleTree::from_leaves(leaves)?;
        let root = tree.root();

        let stored_root = self.lottery.prize_merkle_root(record.id).await?;
        if stored_root == root {
            info!(lottery_id = record.id, "merkle root already stored on chain");
        } else {
            info!(
                lottery_id = record.id,
                root = %format!("0x{}", hex::encode(root)),
                "storing the merkle root in the contract"
            );
            self.lottery.set_prize_merkle_root(record.id, root).await?;
        }

        if self.store.has_prize_proofs(record.id).await? {
            info!(lottery_id = record.id, "proofs already present, skipping generation");
        } else {
            for (assignment, proof) in assignments.iter_mut().zip(tree.proofs()) {
                assignment.proof = merkle::serialize_proof(&proof);
                info!(
                    prize_id = assignment.prize_id,
                    winner = %assignment.winner_address,
                    uri = %assignment.metadata_uri,
                    "generated inclusion proof"
                );
            }
            let created = self.store.insert_prize_proofs(&assignments).await?;
            info!(lottery_id = record.id, rows = created, "proof rows created");
        }

        self.store.mark_prizes_awarded(record.id, now).await?;

        self.create_refund_records(record.id, info, &tickets, &winner_positions)
            .await?;

        self.notify_winners(&assignments, &prizes).await;

        info!(
            lottery_id = record.id,
            prizes = assignments.len(),
            "prize distribution finished"
        );
        Ok(())
    }

    /// One refund row per buyer, accumulating the ticket cost of every
    /// losing position. Created at most once per lottery.
    async fn create_refund_records(
        &self,
        lottery_id: u64,
        info: &LotteryInfo,
        tickets: &[Address],
        winner_positions: &BTreeSet<u64>,
    ) -> Result<(), InspectError> {
        if self.store.has_refunds(lottery_id).await? {
            info!(lottery_id, "refund records already exist");
            return Ok(());
        }
        let ticket_cost = whole_tokens(&info.ticket_cost_tokens);
        if ticket_cost == 0 {
            return Ok(());
        }

        let mut per_buyer: BTreeMap<Address, u64> = BTreeMap::new();
        for (position, buyer) in tickets.iter().enumerate() {
            if !winner_positions.contains(&(position as u64)) {
                *per_buyer.entry(*buyer).or_insert(0) += ticket_cost;
            }
        }
        if per_buyer.is_empty() {
            return Ok(());
        }

        let rows: Vec<RefundRecord> = per_buyer
            .into_iter()
            .map(|(buyer, refundable_tokens)| RefundRecord {
                id: 0, // assigned by the store
                lottery_id,
                buyer,
                refundable_tokens,
                tx_hash: None,
                block_timestamp: None,
            })
            .collect();
        self.store.insert_refunds(&rows).await?;
        info!(lottery_id, rows = rows.len(), "created refund records");

        for row in &rows {
            let notification = self
                .notification_for(&row.buyer, |user| Notification {
                    wallet_address: row.buyer.to_string(),
                    email: user,
                    subject: "A refund is waiting for you".to_string(),
                    header: String::new(),
                    message: "You have a refund for your non-winning tickets. The funds will \
                              go out in batches soon; if you prefer, you can claim them now."
                        .to_string(),
                    image_url: None,
                    link: format!("{}profile?notifications", self.config.base_url),
                    action_label: "Claim refund".to_string(),
                })
                .await;
            self.deliver(notification).await;
        }
        Ok(())
    }

    async fn notify_winners(&self, assignments: &[WinnerAssignment], prizes: &[PrizeRecord]) {
        for assignment in assignments {
            let image_url = prizes
                .iter()
                .find(|prize| prize.id == assignment.prize_id)
                .map(|prize| prize.image_url.clone());
            let notification = self
                .notification_for(&assignment.winner_address, |user| Notification {
                    wallet_address: assignment.winner_address.to_string(),
                    email: user,
                    subject: "You won an NFT prize!".to_string(),
                    header: "NFT Game Prize".to_string(),
                    message: "Your ticket was selected for minting an NFT!".to_string(),
                    image_url: image_url.clone(),
                    link: format!("{}profile?notifications", self.config.base_url),
                    action_label: "Claim NFT".to_string(),
                })
                .await;
            self.deliver(notification).await;
        }
    }

    /// Build a notification for the user behind `address`, or None when no
    /// user record exists (wallet never registered on the site).
    async fn notification_for(
        &self,
        address: &Address,
        build: impl FnOnce(Option<String>) -> Notification,
    ) -> Option<Notification> {
        match self.store.user_by_address(address).await {
            Ok(Some(user)) => Some(build(user.email)),
            Ok(None) => {
                info!(wallet = %address, "no user record, skipping notification");
                None
            }
            Err(err) => {
                warn!(wallet = %address, error = %err, "user lookup failed");
                None
            }
        }
    }

    async fn deliver(&self, notification: Option<Notification>) {
        let Some(notification) = notification else {
            return;
        };
        if let Err(err) = self.notifier.send(&notification).await {
            warn!(
                wallet = %notification.wallet_address,
                error = %err,
                "notification delivery failed"
            );
        }
    }

    async fn update_auctions(&self, now: i64) -> Result<(), InspectError> {
        info!("searching for auctions that require action");
        let auctions = self.store.approved_auctions().await?;
        for record in auctions {
            if record.claimed_at.is_some()
                || record.winner_address.is_some()
                || record.contract_address.is_none()
            {
                continue;
            }
            if let Err(err) = self.reconcile_auction(&record, now).await {
                error!(auction_id = record.id, error = %err, "auction reconciliation failed");
            }
        }
        Ok(())
    }

    /// Single-field reconciliation: copy the on-chain highest bidder into
    /// the local record once the auction is over.
    async fn reconcile_auction(
        &self,
        record: &AuctionRecord,
        now: i64,
    ) -> Result<(), InspectError> {
        let info = self.auction.auction(record.id).await?;
        if info.end_time == 0 || now < info.end_time {
            return Ok(());
        }
        let Some(highest_bidder) = info.highest_bidder else {
            return Ok(());
        };
        if record.winner_address.as_ref() != Some(&highest_bidder) {
            info!(
                auction_id = record.id,
                winner = %highest_bidder,
                "updating auction with highest bidder"
            );
            self.store
                .set_auction_winner(record.id, &highest_bidder)
                .await?;
        }
        Ok(())
    }

    /// Pay out queued refunds whose transaction hash is still unset. The
    /// whole cycle is deferred while gas is above the ceiling.
    async fn pay_refunds(&self) -> Result<(), InspectError> {
        info!("checking pending refunds");
        let pending = self.store.pending_refunds().await?;
        if pending.is_empty() {
            return Ok(());
        }

        let gas_price = self.gas.gas_price_gwei().await?;
        if gas_price > self.config.gas_ceiling_gwei {
            info!(
                gas_price,
                ceiling = self.config.gas_ceiling_gwei,
                "gas above ceiling, deferring refund payouts"
            );
            return Ok(());
        }

        for refund in &pending {
            // Guard again right before paying.
            if refund.tx_hash.is_some() {
                continue;
            }
            info!(
                gas_price,
                tokens = refund.refundable_tokens,
                buyer = %refund.buyer,
                "sending refund"
            );
            if self.config.dry_run {
                info!(refund_id = refund.id, "dry run, refund not sent");
                continue;
            }
            let amount_wei = BigUint::from(refund.refundable_tokens) * BigUint::from(TOKEN_SCALE_WEI);
            let settled = match self
                .lottery
                .refund(&refund.buyer, refund.lottery_id, &amount_wei)
                .await
            {
                Ok(settled) => settled,
                Err(err) => {
                    error!(
                        refund_id = refund.id,
                        buyer = %refund.buyer,
                        error = %err,
                        "refund payment failed"
                    );
                    continue;
                }
            };
            self.store
                .settle_refund(refund.id, &settled.tx_hash, settled.block_timestamp)
                .await?;

            let link = format!("{}{}", self.config.explorer_tx_base, settled.tx_hash);
            let notification = self
                .notification_for(&refund.buyer, |user| Notification {
                    wallet_address: refund.buyer.to_string(),
                    email: user,
                    subject: "You received a refund!".to_string(),
                    header: "We just sent you a refund".to_string(),
                    message: "Your ticket was not selected for minting, so we sent you a refund!"
                        .to_string(),
                    image_url: None,
                    link,
                    action_label: "Check the transaction".to_string(),
                })
                .await;
            self.deliver(notification).await;
        }
        Ok(())
    }
}

/// Convert a wei amount into whole tokens. Ticket costs are whole-token
/// denominated; a nonzero remainder is dropped, but never silently.
fn whole_tokens(amount_wei: &BigUint) -> u64 {
    let scale = BigUint::from(TOKEN_SCALE_WEI);
    let whole = amount_wei / &scale;
    if amount_wei % &scale != BigUint::default() {
        warn!(%amount_wei, "token amount is not whole-token aligned, dropping remainder");
    }
    match u64::try_from(&whole) {
        Ok(tokens) => tokens,
        Err(_) => {
            warn!(%amount_wei, "token amount exceeds u64 whole tokens, clamping");
            u64::MAX
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
