//! Submit-then-confirm for every state-changing call the operator makes.

use crate::constants::{
    DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_RECEIPT_POLL_INTERVAL, DEFAULT_RPC_TIMEOUT,
};
use crate::gateway::{with_timeout, ChainGateway, ContractCall, GatewayError, TxReceipt};
use alloy_primitives::TxHash;
use operator_logging::{debug, warn};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: TxHash },
    #[error("Transaction {tx_hash} not mined after {elapsed:?}")]
    Timeout { tx_hash: TxHash, elapsed: Duration },
}

impl TxError {
    /// Whether the failure happened before any receipt was observed.
    ///
    /// A reverted transaction was mined; sending it again will not change the outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Reverted { .. })
    }
}

/// Time limits applied to every gateway interaction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPolicy {
    /// Upper bound for a single RPC round trip
    pub rpc_timeout: Duration,
    pub receipt_poll_interval: Duration,
    /// Upper bound for the whole wait between submission and receipt
    pub confirmation_timeout: Duration,
}

impl Default for TxPolicy {
    fn default() -> Self {
        Self {
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

/// Submits `call` and blocks until it is mined.
///
/// # Errors
/// - [`TxError::Gateway`] if the submission fails or times out
/// - [`TxError::Reverted`] if the transaction was mined with a failure status
/// - [`TxError::Timeout`] if no receipt shows up within the confirmation timeout
pub async fn submit_and_confirm<G: ChainGateway + ?Sized>(
    gateway: &G,
    call: ContractCall,
    policy: &TxPolicy,
) -> Result<TxReceipt, TxError> {
    let name = call.name();
    let tx_hash = with_timeout(name, policy.rpc_timeout, gateway.submit(call)).await?;
    debug!("Submitted {name} in transaction {tx_hash}");
    confirm(gateway, tx_hash, policy).await
}

/// Polls for the receipt of `tx_hash` until it is mined or the confirmation timeout expires.
///
/// Failed receipt lookups are treated like a not-yet-mined transaction.
///
/// # Errors
/// - [`TxError::Reverted`] if the receipt status is not success
/// - [`TxError::Timeout`] if no receipt shows up in time
pub async fn confirm<G: ChainGateway + ?Sized>(
    gateway: &G,
    tx_hash: TxHash,
    policy: &TxPolicy,
) -> Result<TxReceipt, TxError> {
    let wait = async {
        loop {
            match with_timeout(
                "eth_getTransactionReceipt",
                policy.rpc_timeout,
                gateway.transaction_receipt(tx_hash),
            )
            .await
            {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => {}
                Err(e) => warn!("Receipt lookup for {tx_hash} failed: {e}"),
            }
            tokio::time::sleep(policy.receipt_poll_interval).await;
        }
    };

    let receipt = tokio::time::timeout(policy.confirmation_timeout, wait)
        .await
        .map_err(|_| TxError::Timeout {
            tx_hash,
            elapsed: policy.confirmation_timeout,
        })?;

    if receipt.success {
        debug!(
            "Transaction {tx_hash} confirmed in block {:?}",
            receipt.block_number
        );
        Ok(receipt)
    } else {
        Err(TxError::Reverted { tx_hash })
    }
}
