//! CRX7 lottery engine.
//!
//! Drives the recurring reward lottery end to end: the round lifecycle
//! state machine ([`round`]), candidate selection ([`selector`]),
//! wheel-based winner resolution, prize-pool splitting ([`calculator`])
//! and the distribution pipeline with bounded, idempotent retry
//! ([`coordinator`], [`bundler`]).
//!
//! The engine talks to the outside world (persistence, holder
//! snapshots, fee estimation, ledger submission) only through the
//! traits in [`gateway`].

pub mod bundler;
pub mod calculator;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod round;
pub mod selector;
pub mod state;

pub use bundler::{BundleOutcome, TransactionBundler, MIN_PRIORITY_FEE};
pub use calculator::{split_prize_pool, winner_shares, DistributionSplit, PayoutPolicy, WinnerShares};
pub use config::{EngineConfig, PayoutWallets, SplitPercentages};
pub use coordinator::{
    DistributionCoordinator, DistributionOutcome, PendingWinnersSummary, RoundRef,
};
pub use error::EngineError;
pub use gateway::{
    BlockAnchor, FeeEstimator, HolderBalance, HolderService, LedgerClient, LedgerError,
    RoundStore, SignatureStatus, StoreError, TransferBundle, TransferInstruction, WinnerPayment,
};
pub use round::{RoundController, RoundSignal, RoundState, StartedRound};
pub use selector::{select_candidates, Candidate};
pub use state::{DistributionRecord, Participant, Round, Winner};
