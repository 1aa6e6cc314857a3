use chrono::{DateTime, Utc};
use crx7_common::types::{DistributionStatus, DrawStage, PayoutCategory, RoundStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One full lottery cycle of up to `winners_per_round` sequential
/// winner selections followed by a prize-pool distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: String,
    /// Monotonic, unique across all rounds.
    pub round_number: u32,
    pub status: RoundStatus,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set on completion (base units).
    pub total_prize_pool: Option<u64>,
    pub round_duration_ms: Option<u64>,
    pub stage: DrawStage,
    /// 1-based index of the draw in progress.
    pub current_draw: u8,
}

impl Round {
    pub fn start_now(round_number: u32) -> Self {
        let now = Utc::now();
        Round {
            id: Uuid::new_v4().to_string(),
            round_number,
            status: RoundStatus::Active,
            scheduled_at: now,
            executed_at: Some(now),
            completed_at: None,
            total_prize_pool: None,
            round_duration_ms: None,
            stage: DrawStage::RoundStart,
            current_draw: 1,
        }
    }
}

/// A holder that appeared in a candidate set of this round. Owned by
/// the round and bulk-replaced whenever the round is re-persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub round_id: String,
    pub wallet_address: String,
    /// Balance snapshot at selection time (base units).
    pub token_balance: u64,
    pub identity_name: String,
    pub identity_emoji: String,
    pub joined_at: DateTime<Utc>,
}

/// The outcome of one sub-draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub id: String,
    pub round_id: String,
    /// May be None when selection bypassed participant persistence.
    pub participant_id: Option<String>,
    pub wallet_address: String,
    /// Base units. Zero until the distribution assigns shares.
    pub prize_amount: u64,
    /// Which draw (1..=7) produced this winner.
    pub draw_sequence: u8,
    /// Overall order across the round, contiguous from 1.
    pub sequence_number: u8,
    pub identity_name: String,
    pub identity_emoji: String,
    pub won_at: DateTime<Utc>,
    /// The sole payment-status signal: pending while None, paid once set.
    pub transaction_hash: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Winner {
    pub fn is_pending(&self) -> bool {
        self.transaction_hash.is_none()
    }

    pub fn identity_display(&self) -> String {
        format!("{} {}", self.identity_emoji, self.identity_name)
    }
}

/// One payout attempt for a round's full prize pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub id: String,
    pub round_id: Option<String>,
    /// Denormalized for easier querying.
    pub round_number: Option<u32>,
    pub total_amount: u64,
    pub winners_amount: u64,
    pub holding_amount: u64,
    pub charity_amount: u64,
    pub winners_transaction_hash: Option<String>,
    pub holding_transaction_hash: Option<String>,
    pub charity_transaction_hash: Option<String>,
    pub failure_reason: Option<String>,
    pub failed_categories: Vec<PayoutCategory>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    /// Operator wallet that triggered the distribution.
    pub executed_by: String,
    pub executed_at: DateTime<Utc>,
    pub status: DistributionStatus,
    pub notes: Option<String>,
}

impl DistributionRecord {
    pub fn amount_for(&self, category: PayoutCategory) -> u64 {
        match category {
            PayoutCategory::Winners => self.winners_amount,
            PayoutCategory::Holding => self.holding_amount,
            PayoutCategory::Charity => self.charity_amount,
        }
    }

    pub fn transaction_hash_for(&self, category: PayoutCategory) -> Option<&str> {
        match category {
            PayoutCategory::Winners => self.winners_transaction_hash.as_deref(),
            PayoutCategory::Holding => self.holding_transaction_hash.as_deref(),
            PayoutCategory::Charity => self.charity_transaction_hash.as_deref(),
        }
    }

    pub fn set_transaction_hash(&mut self, category: PayoutCategory, signature: String) {
        let slot = match category {
            PayoutCategory::Winners => &mut self.winners_transaction_hash,
            PayoutCategory::Holding => &mut self.holding_transaction_hash,
            PayoutCategory::Charity => &mut self.charity_transaction_hash,
        };
        *slot = Some(signature);
    }

    /// Categories that carry a non-zero amount and therefore must land
    /// for the distribution to count as completed.
    pub fn applicable_categories(&self) -> Vec<PayoutCategory> {
        PayoutCategory::ALL
            .into_iter()
            .filter(|c| self.amount_for(*c) > 0)
            .collect()
    }

    /// Applicable categories whose transaction reference is still null.
    /// These are the only valid retry targets.
    pub fn unsettled_categories(&self) -> Vec<PayoutCategory> {
        self.applicable_categories()
            .into_iter()
            .filter(|c| self.transaction_hash_for(*c).is_none())
            .collect()
    }

    /// Recompute status and the failed-category list from the union of
    /// recorded transaction references.
    pub fn resolve_status(&mut self) {
        let applicable = self.applicable_categories();
        let unsettled = self.unsettled_categories();

        self.status = if unsettled.is_empty() {
            DistributionStatus::Completed
        } else if unsettled.len() < applicable.len() {
            DistributionStatus::PartialSuccess
        } else {
            DistributionStatus::Failed
        };
        self.failed_categories = unsettled;
        if self.status == DistributionStatus::Completed {
            self.failure_reason = None;
        }
    }
}
