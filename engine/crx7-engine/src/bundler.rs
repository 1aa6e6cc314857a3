use std::time::Duration;

use crx7_common::types::{format_amount, PayoutCategory};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::gateway::{
    FeeEstimator, LedgerClient, LedgerError, TransferBundle, TransferInstruction,
};

/// Minimal priority fee used when estimation is unavailable.
pub const MIN_PRIORITY_FEE: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutcome {
    pub signature: String,
    pub priority_fee: u64,
}

/// Builds and submits one atomic multi-transfer operation per payout
/// category. The bundle is the atomicity unit: all transfers of a
/// category land together or none do. Nothing here spans categories.
pub struct TransactionBundler<L, F> {
    ledger: L,
    fees: F,
    confirm_timeout: Duration,
    max_submit_retries: u32,
}

impl<L: LedgerClient, F: FeeEstimator> TransactionBundler<L, F> {
    pub fn new(ledger: L, fees: F, config: &EngineConfig) -> Self {
        TransactionBundler {
            ledger,
            fees,
            confirm_timeout: config.confirm_timeout(),
            max_submit_retries: config.max_submit_retries,
        }
    }

    /// Submit all transfers of one category as a single bundle and
    /// wait for confirmation.
    ///
    /// An elapsed confirmation wait is ambiguous, not a failure: the
    /// signature status is queried directly before classifying, so a
    /// transaction that landed after the wait expired is reported as a
    /// success and is never resubmitted by a later retry.
    pub async fn send_category_bundle(
        &self,
        category: PayoutCategory,
        transfers: Vec<TransferInstruction>,
    ) -> Result<BundleOutcome, LedgerError> {
        let mut bundle = TransferBundle {
            transfers,
            priority_fee: MIN_PRIORITY_FEE,
            label: category.as_str().to_string(),
        };

        info!(
            category = category.as_str(),
            transfer_count = bundle.transfers.len(),
            total = %format_amount(bundle.total_amount()),
            "building category bundle"
        );

        // Fee estimation must never block the payout.
        match self.fees.estimate_priority_fee(&bundle).await {
            Ok(fee) => bundle.priority_fee = fee.max(MIN_PRIORITY_FEE),
            Err(err) => {
                warn!(category = category.as_str(), %err, "using minimal priority fee");
            }
        }

        let anchor = self.ledger.latest_anchor().await?;
        let signature = self.submit_with_retries(&bundle, &anchor).await?;

        let confirmed = tokio::time::timeout(
            self.confirm_timeout,
            self.ledger.await_confirmation(&signature, &anchor),
        )
        .await;

        match confirmed {
            Ok(Ok(())) => {}
            Ok(Err(LedgerError::ConfirmationTimeout { .. })) | Err(_) => {
                self.resolve_ambiguous_timeout(category, &signature).await?;
            }
            Ok(Err(err)) => return Err(err),
        }

        info!(
            category = category.as_str(),
            %signature, "category bundle confirmed"
        );

        Ok(BundleOutcome {
            signature,
            priority_fee: bundle.priority_fee,
        })
    }

    async fn submit_with_retries(
        &self,
        bundle: &TransferBundle,
        anchor: &crate::gateway::BlockAnchor,
    ) -> Result<String, LedgerError> {
        let mut attempt = 0;
        loop {
            match self.ledger.submit_bundle(bundle, anchor).await {
                Ok(signature) => return Ok(signature),
                Err(LedgerError::Network(reason)) if attempt < self.max_submit_retries => {
                    attempt += 1;
                    warn!(
                        label = %bundle.label,
                        attempt,
                        max = self.max_submit_retries,
                        %reason,
                        "transient submit failure, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// A timed-out confirmation wait does not prove the transfer
    /// failed. Query the status directly; only an unlanded signature
    /// is classified as a timeout failure.
    async fn resolve_ambiguous_timeout(
        &self,
        category: PayoutCategory,
        signature: &str,
    ) -> Result<(), LedgerError> {
        warn!(
            category = category.as_str(),
            signature, "confirmation wait elapsed, querying signature status"
        );
        match self.ledger.signature_status(signature).await {
            Ok(status) if status.is_landed() => {
                info!(
                    category = category.as_str(),
                    signature, "transaction landed despite confirmation timeout"
                );
                Ok(())
            }
            Ok(_) => Err(LedgerError::ConfirmationTimeout {
                signature: signature.to_string(),
            }),
            Err(err) => {
                warn!(signature, %err, "status query failed after timeout");
                Err(LedgerError::ConfirmationTimeout {
                    signature: signature.to_string(),
                })
            }
        }
    }
}
