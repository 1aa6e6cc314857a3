//! Prize-pool splitting.
//!
//! All final transfer amounts are integer base units (9 fractional
//! digits); the split never uses floating point, so the three category
//! amounts always sum to the total exactly. The holding (reserve)
//! category absorbs the integer rounding remainder.

use serde::{Deserialize, Serialize};

use crate::config::SplitPercentages;
use crate::error::EngineError;

/// The three category amounts for one distribution (base units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSplit {
    pub total: u64,
    pub winners: u64,
    pub holding: u64,
    pub charity: u64,
}

/// How the winners allocation maps to individual prize amounts.
/// Callers declare the policy explicitly; it is never inferred from
/// the presence of optional inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutPolicy {
    /// Equal division of the winners allocation, floored to the
    /// smallest ledger unit; the remainder stays with the operator.
    EqualSplit,
    /// Caller-specified per-winner amounts, one per winner, summing to
    /// at most the winners allocation.
    Custom(Vec<u64>),
}

/// Per-winner prize amounts plus the undistributed rounding remainder.
/// `amounts.sum() + remainder == winners_amount` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerShares {
    pub amounts: Vec<u64>,
    pub remainder: u64,
}

/// Split the total prize pool across the three payout categories.
pub fn split_prize_pool(
    total: u64,
    split: &SplitPercentages,
) -> Result<DistributionSplit, EngineError> {
    split.validate()?;

    let winners = percentage_of(total, split.winners);
    let charity = percentage_of(total, split.charity);
    // Reserve takes the rest so the parts always sum to the total.
    let holding = total - winners - charity;

    Ok(DistributionSplit {
        total,
        winners,
        holding,
        charity,
    })
}

fn percentage_of(total: u64, pct: u8) -> u64 {
    (total as u128 * pct as u128 / 100) as u64
}

/// Compute per-winner prize amounts under the declared policy.
///
/// Returns `None` when `winner_count` is zero: the division is
/// undefined and callers must guard; the calculator does not treat it
/// as an error.
pub fn winner_shares(
    winners_amount: u64,
    winner_count: usize,
    policy: &PayoutPolicy,
) -> Result<Option<WinnerShares>, EngineError> {
    if winner_count == 0 {
        return Ok(None);
    }

    let shares = match policy {
        PayoutPolicy::EqualSplit => {
            let per_winner = winners_amount / winner_count as u64;
            let remainder = winners_amount - per_winner * winner_count as u64;
            WinnerShares {
                amounts: vec![per_winner; winner_count],
                remainder,
            }
        }
        PayoutPolicy::Custom(amounts) => {
            if amounts.len() != winner_count {
                return Err(EngineError::CustomAmountsMismatch {
                    given: amounts.len(),
                    winners: winner_count,
                });
            }
            let sum: u64 = amounts.iter().sum();
            if sum > winners_amount {
                return Err(EngineError::CustomAmountsExceedAllocation {
                    sum,
                    allocation: winners_amount,
                });
            }
            WinnerShares {
                amounts: amounts.clone(),
                remainder: winners_amount - sum,
            }
        }
    };

    Ok(Some(shares))
}
