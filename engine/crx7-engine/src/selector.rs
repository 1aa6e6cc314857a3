use std::collections::HashSet;

use crx7_common::identity::{identity_for_wallet, Identity};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use crate::gateway::HolderBalance;

/// A holder selected onto the wheel for one sub-draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub wallet_address: String,
    /// Balance snapshot at selection time (base units).
    pub token_balance: u64,
    pub identity: &'static Identity,
}

/// Build the candidate set for a sub-draw.
///
/// Holders below `minimum_balance` and holders that already won in
/// this round are excluded; the remaining pool is shuffled and the
/// first `requested` entries taken. Identities are assigned by the
/// canonical address hash, so the same wallet always carries the same
/// identity.
///
/// A pool smaller than `requested` is degraded service, not an error:
/// the caller gets every eligible holder.
pub fn select_candidates<R: Rng>(
    holders: &[HolderBalance],
    prior_winners: &HashSet<String>,
    requested: usize,
    minimum_balance: u64,
    rng: &mut R,
) -> Vec<Candidate> {
    let mut pool: Vec<&HolderBalance> = holders
        .iter()
        .filter(|h| h.balance >= minimum_balance)
        .filter(|h| !prior_winners.contains(&h.address))
        .collect();

    if pool.len() < requested {
        warn!(
            eligible = pool.len(),
            requested, "candidate shortfall: returning all eligible holders"
        );
    }

    pool.shuffle(rng);
    pool.into_iter()
        .take(requested)
        .map(|h| Candidate {
            wallet_address: h.address.clone(),
            token_balance: h.balance,
            identity: identity_for_wallet(&h.address),
        })
        .collect()
}
