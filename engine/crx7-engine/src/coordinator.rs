//! Distribution execution and bounded, idempotent retry.
//!
//! The distribution record, not the ledger, is the source of truth for
//! what still needs retrying: the ledger has no compensating
//! transaction, so an already-submitted category is never reversed and
//! never resubmitted.

use std::collections::HashSet;

use chrono::Utc;
use crx7_common::identity::short_address;
use crx7_common::types::{validate_address, DistributionStatus, PayoutCategory};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bundler::TransactionBundler;
use crate::calculator::{split_prize_pool, winner_shares, PayoutPolicy};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gateway::{
    FeeEstimator, LedgerClient, RoundStore, TransferInstruction, WinnerPayment,
};
use crate::state::{DistributionRecord, Winner};

/// Round a distribution is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRef {
    pub round_id: String,
    pub round_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionOutcome {
    pub record: DistributionRecord,
    pub winners_count: usize,
    pub total_priority_fees: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingWinnersSummary {
    pub count: usize,
    /// Sum of recorded prize amounts of pending winners (base units).
    pub total_amount: u64,
    pub winners: Vec<Winner>,
}

pub struct DistributionCoordinator<L, F, S> {
    bundler: TransactionBundler<L, F>,
    store: S,
    config: EngineConfig,
    /// Single-flight guard: at most one retry in progress per
    /// distribution id.
    retries_in_flight: Mutex<HashSet<String>>,
}

impl<L: LedgerClient, F: FeeEstimator, S: RoundStore> DistributionCoordinator<L, F, S> {
    pub fn new(ledger: L, fees: F, store: S, config: EngineConfig) -> Self {
        let bundler = TransactionBundler::new(ledger, fees, &config);
        DistributionCoordinator {
            bundler,
            store,
            config,
            retries_in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Execute a full distribution of `total_amount` across winners,
    /// holding and charity.
    ///
    /// A pending record is persisted before any submission, then
    /// updated with whichever transaction references succeeded and
    /// which categories failed. Categories are submitted sequentially;
    /// one category's failure does not abort the others.
    pub async fn execute(
        &self,
        total_amount: u64,
        executed_by: &str,
        policy: &PayoutPolicy,
        round: Option<RoundRef>,
    ) -> Result<DistributionOutcome, EngineError> {
        self.config.split.validate()?;
        self.config.wallets.validate()?;

        let pending = self.store.pending_winners().await?;
        if pending.is_empty() {
            return Err(EngineError::NoPendingWinners);
        }
        for winner in &pending {
            validate_address(&winner.wallet_address).map_err(|source| {
                EngineError::InvalidAddress {
                    context: format!("winner {}", short_address(&winner.wallet_address)),
                    source,
                }
            })?;
        }

        let split = split_prize_pool(total_amount, &self.config.split)?;
        let Some(shares) = winner_shares(split.winners, pending.len(), policy)? else {
            return Err(EngineError::NoPendingWinners);
        };

        info!(
            winners = pending.len(),
            total_amount,
            winners_amount = split.winners,
            holding_amount = split.holding,
            charity_amount = split.charity,
            "starting distribution"
        );

        let mut record = DistributionRecord {
            id: Uuid::new_v4().to_string(),
            round_id: round.as_ref().map(|r| r.round_id.clone()),
            round_number: round.as_ref().map(|r| r.round_number),
            total_amount,
            winners_amount: split.winners,
            holding_amount: split.holding,
            charity_amount: split.charity,
            winners_transaction_hash: None,
            holding_transaction_hash: None,
            charity_transaction_hash: None,
            failure_reason: None,
            failed_categories: vec![],
            retry_count: 0,
            last_retry_at: None,
            executed_by: executed_by.to_string(),
            executed_at: Utc::now(),
            status: DistributionStatus::Pending,
            notes: None,
        };
        self.store.create_distribution(&record).await?;

        let mut total_priority_fees = 0;
        for category in record.applicable_categories() {
            let transfers = self.category_transfers(category, &record, &pending, &shares.amounts);
            total_priority_fees += self
                .run_category(&mut record, category, transfers, &pending, &shares.amounts)
                .await;
        }

        record.resolve_status();
        self.store.update_distribution(&record).await?;

        info!(
            distribution_id = %record.id,
            status = ?record.status,
            failed = ?record.failed_categories,
            "distribution finished"
        );

        Ok(DistributionOutcome {
            winners_count: pending.len(),
            total_priority_fees,
            record,
        })
    }

    /// Retry the still-failing categories of a distribution.
    ///
    /// Only categories whose transaction reference is null are ever
    /// resubmitted, even when explicitly requested; newly succeeded
    /// references are merged into the existing record and the status
    /// recomputed from the union.
    pub async fn retry(
        &self,
        distribution_id: &str,
        categories: Option<&[PayoutCategory]>,
    ) -> Result<DistributionRecord, EngineError> {
        {
            let mut in_flight = self.retries_in_flight.lock().await;
            if !in_flight.insert(distribution_id.to_string()) {
                return Err(EngineError::RetryInProgress {
                    distribution_id: distribution_id.to_string(),
                });
            }
        }
        let result = self.retry_inner(distribution_id, categories).await;
        self.retries_in_flight.lock().await.remove(distribution_id);
        result
    }

    async fn retry_inner(
        &self,
        distribution_id: &str,
        categories: Option<&[PayoutCategory]>,
    ) -> Result<DistributionRecord, EngineError> {
        let mut record = self.store.load_distribution(distribution_id).await?;

        if record.retry_count >= self.config.max_distribution_retries {
            return Err(EngineError::RetryLimitExceeded {
                distribution_id: distribution_id.to_string(),
                retry_count: record.retry_count,
                max_retries: self.config.max_distribution_retries,
            });
        }

        let unsettled = record.unsettled_categories();
        let targets: Vec<PayoutCategory> = match categories {
            Some(requested) => unsettled
                .into_iter()
                .filter(|c| requested.contains(c))
                .collect(),
            None => unsettled,
        };

        if targets.is_empty() {
            info!(distribution_id, "nothing to retry: requested categories already settled");
            return Ok(record);
        }

        record.status = DistributionStatus::Retrying;
        record.retry_count += 1;
        record.last_retry_at = Some(Utc::now());
        self.store.update_distribution(&record).await?;

        info!(
            distribution_id,
            retry = record.retry_count,
            targets = ?targets,
            "retrying failed categories"
        );

        // Re-derive winner shares from the recorded allocation and the
        // winners that are still unpaid.
        let pending = self.store.pending_winners().await?;
        let shares = match winner_shares(record.winners_amount, pending.len(), &PayoutPolicy::EqualSplit)? {
            Some(shares) => shares.amounts,
            None => vec![],
        };

        for category in targets {
            if category == PayoutCategory::Winners && pending.is_empty() {
                warn!(distribution_id, "winners retry skipped: no pending winners remain");
                continue;
            }
            let transfers = self.category_transfers(category, &record, &pending, &shares);
            self.run_category(&mut record, category, transfers, &pending, &shares)
                .await;
        }

        record.resolve_status();
        self.store.update_distribution(&record).await?;

        info!(
            distribution_id,
            status = ?record.status,
            retry_count = record.retry_count,
            "retry finished"
        );

        Ok(record)
    }

    /// Count and total of winners still awaiting payment.
    pub async fn pending_summary(&self) -> Result<PendingWinnersSummary, EngineError> {
        let winners = self.store.pending_winners().await?;
        Ok(PendingWinnersSummary {
            count: winners.len(),
            total_amount: winners.iter().map(|w| w.prize_amount).sum(),
            winners,
        })
    }

    fn category_transfers(
        &self,
        category: PayoutCategory,
        record: &DistributionRecord,
        pending: &[Winner],
        shares: &[u64],
    ) -> Vec<TransferInstruction> {
        match category {
            PayoutCategory::Winners => pending
                .iter()
                .zip(shares)
                .map(|(winner, amount)| TransferInstruction {
                    to: winner.wallet_address.clone(),
                    amount: *amount,
                })
                .collect(),
            PayoutCategory::Holding => vec![TransferInstruction {
                to: self.config.wallets.holding.clone(),
                amount: record.holding_amount,
            }],
            PayoutCategory::Charity => vec![TransferInstruction {
                to: self.config.wallets.charity.clone(),
                amount: record.charity_amount,
            }],
        }
    }

    /// Submit one category bundle and fold the outcome into the
    /// record. Returns the priority fee paid (zero on failure).
    async fn run_category(
        &self,
        record: &mut DistributionRecord,
        category: PayoutCategory,
        transfers: Vec<TransferInstruction>,
        pending: &[Winner],
        shares: &[u64],
    ) -> u64 {
        match self.bundler.send_category_bundle(category, transfers).await {
            Ok(outcome) => {
                record.set_transaction_hash(category, outcome.signature.clone());
                if category == PayoutCategory::Winners {
                    self.settle_winners(pending, shares, &outcome.signature).await;
                }
                outcome.priority_fee
            }
            Err(err) => {
                error!(
                    category = category.as_str(),
                    %err,
                    "category bundle failed"
                );
                record.failure_reason =
                    Some(format!("{} transaction failed: {err}", category.as_str()));
                0
            }
        }
    }

    /// Stamp paid winners with the bundle signature. Persistence
    /// failure here is recoverable (the distribution record still
    /// carries the signature), so it is logged rather than propagated.
    async fn settle_winners(&self, pending: &[Winner], shares: &[u64], signature: &str) {
        let payments: Vec<WinnerPayment> = pending
            .iter()
            .zip(shares)
            .map(|(winner, amount)| WinnerPayment {
                winner_id: winner.id.clone(),
                amount: *amount,
            })
            .collect();
        if let Err(err) = self
            .store
            .mark_winners_paid(&payments, signature, Utc::now())
            .await
        {
            warn!(signature, %err, "failed to mark winners paid");
        }
    }
}
