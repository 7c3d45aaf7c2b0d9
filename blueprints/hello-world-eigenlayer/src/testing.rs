//! A scripted in-memory [`ChainGateway`] that records every call made against it.

use crate::gateway::{ChainGateway, ContractCall, DigestRequest, GatewayError, TxReceipt};
use crate::identity::Identity;
use crate::monitor::TaskEvent;
use crate::tx::TxPolicy;
use alloy_primitives::{keccak256, TxHash, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

pub const ANVIL_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const CHAIN_ID: u64 = 31337;

/// What happens to the next submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Reverted,
    /// Mined successfully once the receipt has been polled this many times
    MinedAfter(u32),
    NeverMined,
    SubmitFails,
}

/// What the next log-filter query returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    Events(Vec<TaskEvent>),
    Fails,
    Hangs,
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Mined { polls_left: u32, success: bool },
    Never,
}

#[derive(Default)]
struct State {
    outcomes: VecDeque<Outcome>,
    scans: VecDeque<Scan>,
    pending: HashMap<TxHash, Pending>,
    submissions: Vec<ContractCall>,
    digest_requests: Vec<DigestRequest>,
    scan_requests: Vec<u64>,
    receipt_polls: usize,
    next_tx: u64,
    digest_fails: bool,
}

#[derive(Default)]
pub struct MockGateway {
    state: Mutex<State>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.state.lock().outcomes.extend(outcomes);
        self
    }

    pub fn with_scans(self, scans: impl IntoIterator<Item = Scan>) -> Self {
        self.state.lock().scans.extend(scans);
        self
    }

    pub fn failing_digest(self) -> Self {
        self.state.lock().digest_fails = true;
        self
    }

    pub fn submissions(&self) -> Vec<ContractCall> {
        self.state.lock().submissions.clone()
    }

    pub fn digest_requests(&self) -> Vec<DigestRequest> {
        self.state.lock().digest_requests.clone()
    }

    pub fn scan_requests(&self) -> Vec<u64> {
        self.state.lock().scan_requests.clone()
    }

    pub fn receipt_polls(&self) -> usize {
        self.state.lock().receipt_polls
    }

    /// The digest the mock directory returns for `request`
    pub fn digest_for(request: &DigestRequest) -> B256 {
        let mut preimage = Vec::with_capacity(20 + 20 + 32 + 32);
        preimage.extend_from_slice(request.operator.as_slice());
        preimage.extend_from_slice(request.avs.as_slice());
        preimage.extend_from_slice(request.salt.as_slice());
        preimage.extend_from_slice(&request.expiry.to_be_bytes::<32>());
        keccak256(preimage)
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn chain_id(&self) -> Result<u64, GatewayError> {
        Ok(CHAIN_ID)
    }

    async fn submit(&self, call: ContractCall) -> Result<TxHash, GatewayError> {
        let mut state = self.state.lock();
        let outcome = state.outcomes.pop_front().unwrap_or(Outcome::Success);
        let pending = match outcome {
            Outcome::SubmitFails => {
                return Err(GatewayError::Transport("connection reset".into()));
            }
            Outcome::Success => Pending::Mined {
                polls_left: 0,
                success: true,
            },
            Outcome::Reverted => Pending::Mined {
                polls_left: 0,
                success: false,
            },
            Outcome::MinedAfter(polls) => Pending::Mined {
                polls_left: polls,
                success: true,
            },
            Outcome::NeverMined => Pending::Never,
        };

        state.next_tx += 1;
        let tx_hash = TxHash::left_padding_from(&state.next_tx.to_be_bytes());
        state.pending.insert(tx_hash, pending);
        state.submissions.push(call);
        Ok(tx_hash)
    }

    async fn registration_digest_hash(
        &self,
        request: DigestRequest,
    ) -> Result<B256, GatewayError> {
        let mut state = self.state.lock();
        state.digest_requests.push(request);
        if state.digest_fails {
            return Err(GatewayError::Contract("execution reverted".into()));
        }
        Ok(Self::digest_for(&request))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TxReceipt>, GatewayError> {
        let mut state = self.state.lock();
        state.receipt_polls += 1;
        let block_number = state.next_tx;
        match state.pending.get_mut(&tx_hash) {
            Some(Pending::Mined { polls_left, .. }) if *polls_left > 0 => {
                *polls_left -= 1;
                Ok(None)
            }
            Some(Pending::Mined { success, .. }) => Ok(Some(TxReceipt {
                tx_hash,
                block_number: Some(block_number),
                success: *success,
            })),
            Some(Pending::Never) | None => Ok(None),
        }
    }

    async fn new_task_events(&self, from_block: u64) -> Result<Vec<TaskEvent>, GatewayError> {
        let scan = {
            let mut state = self.state.lock();
            state.scan_requests.push(from_block);
            state.scans.pop_front()
        };
        match scan {
            None => Ok(Vec::new()),
            Some(Scan::Events(events)) => Ok(events),
            Some(Scan::Fails) => Err(GatewayError::Transport("502 Bad Gateway".into())),
            Some(Scan::Hangs) => futures::future::pending().await,
        }
    }
}

pub fn test_identity() -> Identity {
    Identity::from_hex(ANVIL_KEY).unwrap()
}

pub fn task(task_index: u32, task_created_block: u32, task_name: &str) -> TaskEvent {
    TaskEvent {
        task_index,
        task_created_block,
        task_name: task_name.to_string(),
    }
}

pub fn fast_tx_policy() -> TxPolicy {
    TxPolicy {
        rpc_timeout: Duration::from_millis(200),
        receipt_poll_interval: Duration::from_millis(5),
        confirmation_timeout: Duration::from_millis(150),
    }
}
