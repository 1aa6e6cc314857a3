//! Collaborator contracts consumed by the engine.
//!
//! Persistence, holder enumeration, fee estimation and ledger
//! submission are external services. The engine only depends on these
//! traits; production adapters and test mocks both implement them.
//! Trait methods return `impl Future + Send` so implementations can be
//! written as plain `async fn`s.

use std::future::Future;

use chrono::{DateTime, Utc};
use crx7_common::types::DrawStage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{DistributionRecord, Participant, Round, Winner};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger definitively rejected the transaction.
    #[error("transaction rejected: {reason}")]
    Rejected { reason: String },

    /// The confirmation wait expired and a direct status query could
    /// not show the transaction as landed. Ambiguous, not a proven
    /// rejection.
    #[error("confirmation timed out for signature {signature}")]
    ConfirmationTimeout { signature: String },

    /// Transient transport failure; safe to retry submission.
    #[error("ledger network error: {0}")]
    Network(String),
}

#[derive(Error, Debug)]
#[error("fee estimation unavailable: {0}")]
pub struct FeeError(pub String);

/// A token holder with its balance snapshot (base units).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderBalance {
    pub address: String,
    pub balance: u64,
}

/// One transfer inside a category bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub to: String,
    /// Base units, already rounded down to the smallest ledger unit.
    pub amount: u64,
}

/// All transfers of one payout category, submitted as a single atomic
/// ledger operation: either every transfer in the bundle lands or none
/// do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBundle {
    pub transfers: Vec<TransferInstruction>,
    /// Priority fee directive (micro-units per compute unit).
    pub priority_fee: u64,
    /// Human-readable label for logs, e.g. "winners".
    pub label: String,
}

impl TransferBundle {
    pub fn total_amount(&self) -> u64 {
        self.transfers.iter().map(|t| t.amount).sum()
    }
}

/// Final prize amount for one winner, applied when the winners bundle
/// lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerPayment {
    pub winner_id: String,
    /// Base units actually transferred.
    pub amount: u64,
}

/// Recent block reference a submission is anchored to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAnchor {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

/// Result of a point-in-time signature status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureStatus {
    Confirmed,
    Finalized,
    Pending,
    Unknown,
}

impl SignatureStatus {
    /// Whether the transaction has demonstrably landed.
    pub fn is_landed(&self) -> bool {
        matches!(self, SignatureStatus::Confirmed | SignatureStatus::Finalized)
    }
}

/// Durable storage of rounds, participants, winners and distribution
/// records, keyed by opaque string ids.
pub trait RoundStore: Send + Sync {
    fn next_round_number(&self) -> impl Future<Output = Result<u32, StoreError>> + Send;

    fn find_active_round(&self) -> impl Future<Output = Result<Option<Round>, StoreError>> + Send;

    fn create_round(&self, round: &Round) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn update_round(&self, round: &Round) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist a stage/draw transition. Callers treat failures here as
    /// non-fatal: the in-memory state stays authoritative.
    fn update_round_stage(
        &self,
        round_id: &str,
        stage: DrawStage,
        current_draw: u8,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn replace_participants(
        &self,
        round_id: &str,
        participants: &[Participant],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn replace_winners(
        &self,
        round_id: &str,
        winners: &[Winner],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Winners across all rounds whose transaction hash is still null,
    /// ordered by won_at.
    fn pending_winners(&self) -> impl Future<Output = Result<Vec<Winner>, StoreError>> + Send;

    /// Record the winners-bundle signature, paid-at time and final
    /// prize amount on each listed winner.
    fn mark_winners_paid(
        &self,
        payments: &[WinnerPayment],
        transaction_hash: &str,
        paid_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn create_distribution(
        &self,
        record: &DistributionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn update_distribution(
        &self,
        record: &DistributionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load_distribution(
        &self,
        distribution_id: &str,
    ) -> impl Future<Output = Result<DistributionRecord, StoreError>> + Send;
}

/// Complete snapshot of holders of the token of interest.
pub trait HolderService: Send + Sync {
    fn token_holders(&self)
        -> impl Future<Output = Result<Vec<HolderBalance>, LedgerError>> + Send;
}

/// Priority-fee estimation for a serializable bundle. May be
/// unavailable; callers fall back to a minimal fee and never block on
/// estimation.
pub trait FeeEstimator: Send + Sync {
    fn estimate_priority_fee(
        &self,
        bundle: &TransferBundle,
    ) -> impl Future<Output = Result<u64, FeeError>> + Send;
}

/// Signing and submission of transfer bundles against the external
/// ledger. The operator key lives behind this trait.
pub trait LedgerClient: Send + Sync {
    fn latest_anchor(&self) -> impl Future<Output = Result<BlockAnchor, LedgerError>> + Send;

    /// Sign and submit the bundle, returning its signature.
    fn submit_bundle(
        &self,
        bundle: &TransferBundle,
        anchor: &BlockAnchor,
    ) -> impl Future<Output = Result<String, LedgerError>> + Send;

    /// Wait until the signature is confirmed relative to the anchor.
    fn await_confirmation(
        &self,
        signature: &str,
        anchor: &BlockAnchor,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Point query used to resolve ambiguous confirmation timeouts.
    fn signature_status(
        &self,
        signature: &str,
    ) -> impl Future<Output = Result<SignatureStatus, LedgerError>> + Send;
}
