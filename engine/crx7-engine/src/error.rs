use crx7_common::types::AddressError;
use crx7_common::wheel::WheelError;
use thiserror::Error;

use crate::gateway::{LedgerError, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("round {round_id} is already active")]
    RoundAlreadyActive { round_id: String },

    #[error("no active round")]
    NoActiveRound,

    #[error("distribution percentages must sum to 100: {winners}+{holding}+{charity}={sum}")]
    InvalidPercentages {
        winners: u8,
        holding: u8,
        charity: u8,
        sum: u16,
    },

    #[error("payout wallet not configured: {wallet}")]
    WalletNotConfigured { wallet: String },

    #[error("invalid wallet address for {context}: {source}")]
    InvalidAddress {
        context: String,
        source: AddressError,
    },

    #[error(transparent)]
    Wheel(#[from] WheelError),

    #[error("no pending winners to distribute")]
    NoPendingWinners,

    #[error("custom payout amounts ({given}) do not match winner count ({winners})")]
    CustomAmountsMismatch { given: usize, winners: usize },

    #[error("custom payout amounts sum {sum} exceeds winners allocation {allocation}")]
    CustomAmountsExceedAllocation { sum: u64, allocation: u64 },

    #[error("distribution {distribution_id} reached the retry limit ({retry_count}/{max_retries})")]
    RetryLimitExceeded {
        distribution_id: String,
        retry_count: u32,
        max_retries: u32,
    },

    #[error("a retry is already in progress for distribution {distribution_id}")]
    RetryInProgress { distribution_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
