use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fractional digits in the ledger's native fixed-point unit.
pub const NATIVE_DECIMALS: u32 = 9;

/// Base units per whole token (10^9).
pub const UNITS_PER_TOKEN: u64 = 1_000_000_000;

/// The lifecycle status of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl RoundStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundStatus::Completed | RoundStatus::Cancelled)
    }
}

/// The presentation stage a round is currently in. Forward progress
/// through the draw stages is driven by winner count, never by
/// counting stage transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawStage {
    Idle,
    RoundStart,
    DrawPrep,
    Spinning,
    WinnerReveal,
    Intermission,
    RoundComplete,
    Distribution,
}

impl DrawStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawStage::Idle => "IDLE",
            DrawStage::RoundStart => "ROUND_START",
            DrawStage::DrawPrep => "DRAW_PREP",
            DrawStage::Spinning => "SPINNING",
            DrawStage::WinnerReveal => "WINNER_REVEAL",
            DrawStage::Intermission => "INTERMISSION",
            DrawStage::RoundComplete => "ROUND_COMPLETE",
            DrawStage::Distribution => "DISTRIBUTION",
        }
    }
}

/// One of the three payout destinations of a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutCategory {
    Winners,
    Holding,
    Charity,
}

impl PayoutCategory {
    pub const ALL: [PayoutCategory; 3] = [
        PayoutCategory::Winners,
        PayoutCategory::Holding,
        PayoutCategory::Charity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutCategory::Winners => "winners",
            PayoutCategory::Holding => "holding",
            PayoutCategory::Charity => "charity",
        }
    }
}

/// The outcome status of a distribution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Pending,
    Completed,
    Failed,
    PartialSuccess,
    Retrying,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("wallet address is empty")]
    Empty,

    #[error("wallet address contains whitespace: {address}")]
    ContainsWhitespace { address: String },

    #[error("wallet address length {len} outside expected range [{min}, {max}]")]
    BadLength { len: usize, min: usize, max: usize },
}

const MIN_ADDRESS_LEN: usize = 32;
const MAX_ADDRESS_LEN: usize = 44;

/// Validate an opaque ledger wallet address before it is used as a
/// transfer destination. Format is not interpreted beyond basic shape.
pub fn validate_address(address: &str) -> Result<(), AddressError> {
    if address.is_empty() {
        return Err(AddressError::Empty);
    }
    if address.chars().any(char::is_whitespace) {
        return Err(AddressError::ContainsWhitespace {
            address: address.to_string(),
        });
    }
    let len = address.len();
    if !(MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&len) {
        return Err(AddressError::BadLength {
            len,
            min: MIN_ADDRESS_LEN,
            max: MAX_ADDRESS_LEN,
        });
    }
    Ok(())
}

/// Format a base-unit amount as a decimal token amount, trimming
/// trailing zeros but always keeping one fractional digit.
pub fn format_amount(base_units: u64) -> String {
    let whole = base_units / UNITS_PER_TOKEN;
    let frac = base_units % UNITS_PER_TOKEN;
    let mut frac_str = format!("{frac:09}");
    while frac_str.len() > 1 && frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{whole}.{frac_str}")
}
