//! Periodic scanning for `NewTaskCreated` events.
//!
//! The scanner owns a [`Watermark`], the next block it will scan from. After every
//! delivered event the watermark moves past that event's block, so within one
//! process run no block range is delivered twice. The watermark is not persisted:
//! a restarted operator scans from its configured start block again.

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_RPC_TIMEOUT};
use crate::gateway::{with_timeout, ChainGateway, GatewayError};
use crate::queue::{task_queue, Backpressure, QueueClosed, TaskReceiver, TaskSender};
use operator_logging::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A task announced by the service manager. Unique by `(task_index, task_created_block)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskEvent {
    pub task_index: u32,
    pub task_created_block: u32,
    pub task_name: String,
}

/// The next block height the scanner resumes from. Never decreases.
///
/// Held one bit wider than event block numbers so that the block after
/// `u32::MAX` is still representable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(u64);

impl Watermark {
    #[must_use]
    pub fn new(next_block: u32) -> Self {
        Self(u64::from(next_block))
    }

    #[must_use]
    pub const fn next_block(self) -> u64 {
        self.0
    }

    /// Moves the watermark to `block + 1` unless it is already further.
    pub fn advance_past(&mut self, block: u32) {
        self.0 = self.0.max(u64::from(block) + 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Upper bound for one log-filter query
    pub rpc_timeout: Duration,
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
    pub start_block: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: Backpressure::default(),
            start_block: 0,
        }
    }
}

pub struct TaskMonitor<G: ?Sized> {
    gateway: Arc<G>,
    config: MonitorConfig,
    watermark: Watermark,
    consecutive_failures: u32,
}

impl<G: ChainGateway + ?Sized> TaskMonitor<G> {
    #[must_use]
    pub fn new(gateway: Arc<G>, config: MonitorConfig) -> Self {
        Self {
            gateway,
            watermark: Watermark::new(config.start_block),
            config,
            consecutive_failures: 0,
        }
    }

    #[must_use]
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Queries `[watermark, latest]` without touching the watermark.
    ///
    /// Events below the watermark are discarded; the rest are returned in block order,
    /// keeping chain order within a block.
    async fn fetch(&self) -> Result<Vec<TaskEvent>, GatewayError> {
        let floor = self.watermark.next_block();
        let mut events = with_timeout(
            "eth_getLogs",
            self.config.rpc_timeout,
            self.gateway.new_task_events(floor),
        )
        .await?;

        events.retain(|event| u64::from(event.task_created_block) >= floor);
        events.sort_by_key(|event| event.task_created_block);
        Ok(events)
    }

    /// Runs a single scan tick and advances the watermark past every returned event.
    ///
    /// # Errors
    /// - [`GatewayError`] if the query fails or times out; the watermark is left untouched
    pub async fn poll(&mut self) -> Result<Vec<TaskEvent>, GatewayError> {
        let events = self.fetch().await?;
        for event in &events {
            self.watermark.advance_past(event.task_created_block);
            debug!(
                "Observed task {} at block {}, watermark now {}",
                event.task_index,
                event.task_created_block,
                self.watermark.next_block()
            );
        }
        Ok(events)
    }

    /// Scans every `poll_interval` and hands new tasks to `sender`, one at a time.
    ///
    /// A failed tick is logged and retried with the same range on the next tick.
    /// Returns once the receiving side of the queue is gone.
    pub async fn run(mut self, sender: TaskSender) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Monitoring for new tasks from block {}",
            self.watermark.next_block()
        );
        loop {
            ticker.tick().await;

            let from = self.watermark.next_block();
            let events = match self.poll().await {
                Ok(events) => {
                    self.consecutive_failures = 0;
                    events
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    warn!(
                        "Task scan from block {from} failed ({} in a row): {e}",
                        self.consecutive_failures
                    );
                    continue;
                }
            };

            for event in events {
                if let Err(QueueClosed(event)) = sender.send(event).await {
                    warn!(
                        "Responder is gone, stopping the task monitor before task {}",
                        event.task_index
                    );
                    return;
                }
            }
        }
    }

    /// Starts the scanner on its own task and returns the consuming end of its queue.
    pub fn spawn(self) -> (JoinHandle<()>, TaskReceiver)
    where
        G: 'static,
    {
        let (sender, receiver) = task_queue(self.config.queue_capacity, self.config.backpressure);
        (tokio::spawn(self.run(sender)), receiver)
    }
}
