//! The narrow surface the operator needs from a chain node and the contracts behind it.
//!
//! Registration, monitoring and responding only ever talk to a [`ChainGateway`];
//! [`crate::evm::EvmGateway`] is the alloy backed implementation.

use crate::monitor::TaskEvent;
use crate::registration::RegistrationSignature;
use crate::responder::SignedResponse;
use alloy_primitives::{Address, TxHash, B256, U256};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Contract error: {0}")]
    Contract(String),
    #[error("Gateway call `{call}` timed out after {elapsed:?}")]
    Timeout {
        call: &'static str,
        elapsed: Duration,
    },
}

/// Operator details declared to the delegation manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorDetails {
    pub earnings_receiver: Address,
    pub delegation_approver: Address,
    pub staker_opt_out_window_blocks: u32,
}

/// A state-changing call, signed and submitted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// `DelegationManager.registerAsOperator`
    RegisterAsOperator {
        details: OperatorDetails,
        metadata_url: String,
    },
    /// `ECDSAStakeRegistry.registerOperatorWithSignature`
    RegisterOperatorWithSignature {
        operator: Address,
        signature: RegistrationSignature,
    },
    /// `HelloWorldServiceManager.respondToTask`
    RespondToTask(SignedResponse),
}

impl ContractCall {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterAsOperator { .. } => "registerAsOperator",
            Self::RegisterOperatorWithSignature { .. } => "registerOperatorWithSignature",
            Self::RespondToTask(_) => "respondToTask",
        }
    }
}

/// Inputs of `AVSDirectory.calculateOperatorAVSRegistrationDigestHash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestRequest {
    pub operator: Address,
    pub avs: Address,
    pub salt: B256,
    pub expiry: U256,
}

/// The parts of a transaction receipt the operator cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

#[async_trait]
pub trait ChainGateway: Send + Sync + 'static {
    async fn chain_id(&self) -> Result<u64, GatewayError>;

    /// Signs and broadcasts `call`, returning as soon as the node accepted it.
    async fn submit(&self, call: ContractCall) -> Result<TxHash, GatewayError>;

    /// Read-only call into the AVS directory.
    async fn registration_digest_hash(&self, request: DigestRequest)
        -> Result<B256, GatewayError>;

    /// `None` while the transaction is not mined yet.
    async fn transaction_receipt(&self, tx_hash: TxHash)
        -> Result<Option<TxReceipt>, GatewayError>;

    /// Every `NewTaskCreated` event from `from_block` up to the latest block,
    /// in chain order.
    async fn new_task_events(&self, from_block: u64) -> Result<Vec<TaskEvent>, GatewayError>;
}

/// Bounds a single gateway call by `limit`.
///
/// # Errors
/// - [`GatewayError::Timeout`] if `fut` does not resolve in time
/// - whatever error `fut` itself resolves to
pub async fn with_timeout<T, F>(
    call: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| GatewayError::Timeout {
            call,
            elapsed: limit,
        })?
}
