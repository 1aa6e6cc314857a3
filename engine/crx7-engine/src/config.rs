use std::time::Duration;

use crx7_common::types::{validate_address, UNITS_PER_TOKEN};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Percentage split of the prize pool across the three payout
/// categories. Must sum to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPercentages {
    pub winners: u8,
    pub holding: u8,
    pub charity: u8,
}

impl SplitPercentages {
    pub fn validate(&self) -> Result<(), EngineError> {
        let sum = self.winners as u16 + self.holding as u16 + self.charity as u16;
        if sum != 100 {
            return Err(EngineError::InvalidPercentages {
                winners: self.winners,
                holding: self.holding,
                charity: self.charity,
                sum,
            });
        }
        Ok(())
    }
}

impl Default for SplitPercentages {
    fn default() -> Self {
        SplitPercentages {
            winners: 50,
            holding: 40,
            charity: 10,
        }
    }
}

/// Destination wallets for the holding and charity categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutWallets {
    pub holding: String,
    pub charity: String,
}

impl PayoutWallets {
    /// Reject placeholder or malformed destinations before any funds
    /// move. An unconfigured wallet aborts the distribution instead of
    /// paying a placeholder address.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, address) in [("holding", &self.holding), ("charity", &self.charity)] {
            if address.contains("PLACEHOLDER") {
                return Err(EngineError::WalletNotConfigured {
                    wallet: name.to_string(),
                });
            }
            validate_address(address).map_err(|source| EngineError::InvalidAddress {
                context: format!("{name} wallet"),
                source,
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub split: SplitPercentages,
    pub wallets: PayoutWallets,
    /// Number of candidates shown on the spinning wheel per draw.
    pub candidates_per_spin: usize,
    /// Winners per round; the round completes once this many exist.
    pub winners_per_round: u8,
    /// Minimum token balance (base units) to be draw-eligible.
    pub minimum_token_balance: u64,
    /// Visual spin duration; SPINNING is the only auto-advancing stage.
    pub spin_duration_ms: u64,
    /// Upper bound on a single confirmation wait.
    pub confirm_timeout_ms: u64,
    /// Network-level submit retries per bundle (distinct from
    /// category-level distribution retries).
    pub max_submit_retries: u32,
    /// Category-level retries per distribution record.
    pub max_distribution_retries: u32,
}

impl EngineConfig {
    pub fn spin_duration(&self) -> Duration {
        Duration::from_millis(self.spin_duration_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            split: SplitPercentages::default(),
            wallets: PayoutWallets {
                holding: "PLACEHOLDER_HOLDING_WALLET_ADDRESS".to_string(),
                charity: "PLACEHOLDER_CHARITY_WALLET_ADDRESS".to_string(),
            },
            candidates_per_spin: 7,
            winners_per_round: 7,
            minimum_token_balance: 1000 * UNITS_PER_TOKEN,
            spin_duration_ms: 4000,
            confirm_timeout_ms: 30_000,
            max_submit_retries: 3,
            max_distribution_retries: 3,
        }
    }
}
