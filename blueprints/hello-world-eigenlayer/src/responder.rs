//! Signs observed tasks and drives each response through submit and confirm.
//!
//! Per task: `observed -> signing -> submitted -> confirmed | failed`. A failed task is
//! only attempted again when [`ResponsePolicy::max_attempts`] allows it and the failure
//! happened before a receipt was seen.

use crate::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF, TASK_MESSAGE_PREFIX};
use crate::gateway::{with_timeout, ChainGateway, ContractCall, TxReceipt};
use crate::identity::{Identity, IdentityError};
use crate::monitor::TaskEvent;
use crate::queue::TaskReceiver;
use crate::tx::{confirm, TxError, TxPolicy};
use alloy_primitives::{keccak256, Bytes, B256};
use operator_logging::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// `"Hello, {name}"`, the message an operator attests to for a task
#[must_use]
pub fn task_message(task_name: &str) -> String {
    format!("{TASK_MESSAGE_PREFIX}{task_name}")
}

#[must_use]
pub fn task_message_hash(task_name: &str) -> B256 {
    keccak256(task_message(task_name))
}

/// A task response ready to be sent to the service manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedResponse {
    pub task_index: u32,
    pub task_name: String,
    pub task_created_block: u32,
    pub signature: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Observed,
    Signing,
    Submitted,
    Confirmed,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Observed => "observed",
            Self::Signing => "signing",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        f.write_str(state)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("Failed to sign task {task_index}: {source}")]
    Sign {
        task_index: u32,
        #[source]
        source: IdentityError,
    },
    #[error("Failed to respond to task {task_index}: {source}")]
    Transaction {
        task_index: u32,
        #[source]
        source: TxError,
    },
}

impl ResponseError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sign { .. } => false,
            Self::Transaction { source, .. } => source.is_retryable(),
        }
    }
}

/// How many times a task is attempted before it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePolicy {
    /// `1` drops a task on its first failure
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

#[derive(Debug)]
pub enum TaskOutcome {
    Confirmed { receipt: TxReceipt, attempts: u32 },
    Failed { error: ResponseError, attempts: u32 },
}

impl TaskOutcome {
    #[must_use]
    pub fn state(&self) -> TaskState {
        match self {
            Self::Confirmed { .. } => TaskState::Confirmed,
            Self::Failed { .. } => TaskState::Failed,
        }
    }
}

/// Tasks handled by [`TaskResponder::run`] until its queue closed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponderStats {
    pub confirmed: u64,
    pub failed: u64,
    /// Tasks evicted from a full queue before the responder saw them
    pub dropped: u64,
}

pub struct TaskResponder<G: ?Sized> {
    gateway: Arc<G>,
    identity: Arc<Identity>,
    tx_policy: TxPolicy,
    policy: ResponsePolicy,
}

impl<G: ChainGateway + ?Sized> TaskResponder<G> {
    #[must_use]
    pub fn new(
        gateway: Arc<G>,
        identity: Arc<Identity>,
        tx_policy: TxPolicy,
        policy: ResponsePolicy,
    ) -> Self {
        Self {
            gateway,
            identity,
            tx_policy,
            policy,
        }
    }

    /// Signs the keccak256 hash of the task's message.
    ///
    /// # Errors
    /// - [`IdentityError`] if signing fails
    pub fn sign(&self, event: &TaskEvent) -> Result<SignedResponse, IdentityError> {
        let hash = task_message_hash(&event.task_name);
        let signature = self.identity.sign_hash(&hash)?;
        Ok(SignedResponse {
            task_index: event.task_index,
            task_name: event.task_name.clone(),
            task_created_block: event.task_created_block,
            signature: Bytes::copy_from_slice(&signature.as_bytes()),
        })
    }

    /// A single attempt at answering `event`.
    ///
    /// # Errors
    /// - [`ResponseError::Sign`] if the task could not be signed
    /// - [`ResponseError::Transaction`] if submission or confirmation failed
    pub async fn respond(&self, event: &TaskEvent) -> Result<TxReceipt, ResponseError> {
        let task_index = event.task_index;
        transition(task_index, TaskState::Observed, TaskState::Signing);
        let response = self
            .sign(event)
            .map_err(|source| ResponseError::Sign { task_index, source })?;

        let to_tx_error = |source: TxError| ResponseError::Transaction { task_index, source };
        let tx_hash = with_timeout(
            "respondToTask",
            self.tx_policy.rpc_timeout,
            self.gateway.submit(ContractCall::RespondToTask(response)),
        )
        .await
        .map_err(|e| to_tx_error(e.into()))?;
        transition(task_index, TaskState::Signing, TaskState::Submitted);
        debug!("Response to task {task_index} sent in transaction {tx_hash}");

        confirm(&*self.gateway, tx_hash, &self.tx_policy)
            .await
            .map_err(to_tx_error)
    }

    /// Answers `event`, retrying according to the [`ResponsePolicy`].
    pub async fn handle(&self, event: &TaskEvent) -> TaskOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 1;
        loop {
            match self.respond(event).await {
                Ok(receipt) => {
                    transition(event.task_index, TaskState::Submitted, TaskState::Confirmed);
                    info!(
                        "Responded to task {} ({}) in transaction {}",
                        event.task_index, event.task_name, receipt.tx_hash
                    );
                    return TaskOutcome::Confirmed { receipt, attempts };
                }
                Err(e) if attempts < max_attempts && e.is_retryable() => {
                    warn!(
                        "Attempt {attempts}/{max_attempts} for task {} failed, retrying in {:?}: {e}",
                        event.task_index, self.policy.retry_backoff
                    );
                    tokio::time::sleep(self.policy.retry_backoff).await;
                    attempts += 1;
                }
                Err(e) => {
                    error!(
                        "Dropping task {} after {attempts} attempt(s): {e}",
                        event.task_index
                    );
                    return TaskOutcome::Failed { error: e, attempts };
                }
            }
        }
    }

    /// Handles delivered tasks strictly one at a time, in delivery order, until the queue closes.
    ///
    /// A failed task never stops the loop.
    pub async fn run(&self, mut receiver: TaskReceiver) -> ResponderStats {
        let mut stats = ResponderStats::default();
        while let Some(event) = receiver.recv().await {
            info!(
                "New task created: {} (index {}, block {})",
                event.task_name, event.task_index, event.task_created_block
            );
            match self.handle(&event).await {
                TaskOutcome::Confirmed { .. } => stats.confirmed += 1,
                TaskOutcome::Failed { .. } => stats.failed += 1,
            }
        }
        stats.dropped = receiver.dropped();
        stats
    }
}

fn transition(task_index: u32, from: TaskState, to: TaskState) {
    debug!("Task {task_index}: {from} -> {to}");
}
