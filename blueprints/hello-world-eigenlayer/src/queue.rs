//! Bounded, ordered hand-off between the task scanner and the responder.
//!
//! Single producer, single consumer. When the queue is full the scanner either
//! waits for the responder ([`Backpressure::Block`], an `mpsc` channel) or the
//! oldest queued task is overwritten and counted ([`Backpressure::DropOldest`],
//! a `broadcast` channel with one subscriber).

use crate::monitor::TaskEvent;
use operator_logging::warn;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// The scanner waits until the responder frees a slot
    #[default]
    Block,
    /// The oldest queued task is discarded to make room
    DropOldest,
}

#[derive(Debug, thiserror::Error)]
#[error("Task queue closed, task {} not delivered", .0.task_index)]
pub struct QueueClosed(pub TaskEvent);

/// Creates a queue holding at most `capacity` undelivered tasks (at least one).
///
/// With [`Backpressure::DropOldest`] the capacity is rounded up to a power of two.
#[must_use]
pub fn task_queue(capacity: usize, policy: Backpressure) -> (TaskSender, TaskReceiver) {
    let capacity = capacity.max(1);
    match policy {
        Backpressure::Block => {
            let (tx, rx) = mpsc::channel(capacity);
            (TaskSender::Block(tx), TaskReceiver::new(Inbox::Block(rx)))
        }
        Backpressure::DropOldest => {
            let (tx, rx) = broadcast::channel(capacity);
            (
                TaskSender::DropOldest(tx),
                TaskReceiver::new(Inbox::DropOldest(rx)),
            )
        }
    }
}

pub enum TaskSender {
    Block(mpsc::Sender<TaskEvent>),
    DropOldest(broadcast::Sender<TaskEvent>),
}

impl TaskSender {
    /// Enqueues `event`, applying the queue's [`Backpressure`] policy when full.
    ///
    /// # Errors
    /// - [`QueueClosed`] if the receiver is gone
    pub async fn send(&self, event: TaskEvent) -> Result<(), QueueClosed> {
        match self {
            Self::Block(tx) => tx
                .send(event)
                .await
                .map_err(|mpsc::error::SendError(event)| QueueClosed(event)),
            Self::DropOldest(tx) => tx
                .send(event)
                .map(drop)
                .map_err(|broadcast::error::SendError(event)| QueueClosed(event)),
        }
    }
}

enum Inbox {
    Block(mpsc::Receiver<TaskEvent>),
    DropOldest(broadcast::Receiver<TaskEvent>),
}

pub struct TaskReceiver {
    inbox: Inbox,
    dropped: u64,
}

impl TaskReceiver {
    fn new(inbox: Inbox) -> Self {
        Self { inbox, dropped: 0 }
    }

    /// Waits for the next task. Returns `None` once the sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        match &mut self.inbox {
            Inbox::Block(rx) => rx.recv().await,
            Inbox::DropOldest(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        self.dropped += missed;
                        warn!(
                            "Task queue full, dropped {missed} task(s) ({} dropped so far)",
                            self.dropped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Number of tasks evicted by [`Backpressure::DropOldest`] that this receiver skipped
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::task;
    use std::time::Duration;

    async fn drain(mut rx: TaskReceiver) -> Vec<TaskEvent> {
        let mut delivered = Vec::new();
        while let Some(event) = rx.recv().await {
            delivered.push(event);
        }
        delivered
    }

    #[tokio::test]
    async fn delivers_in_order() {
        for policy in [Backpressure::Block, Backpressure::DropOldest] {
            let (tx, mut rx) = task_queue(8, policy);
            for block in [100, 105, 107] {
                tx.send(task(block, block, "t")).await.unwrap();
            }

            for block in [100, 105, 107] {
                assert_eq!(rx.recv().await.unwrap().task_created_block, block);
            }
            assert_eq!(rx.dropped(), 0);
        }
    }

    #[tokio::test]
    async fn block_policy_waits_for_a_free_slot() {
        let (tx, mut rx) = task_queue(1, Backpressure::Block);
        tx.send(task(0, 1, "first")).await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), tx.send(task(1, 2, "second"))).await;
        assert!(blocked.is_err(), "send should wait while the queue is full");

        let producer = tokio::spawn(async move {
            tx.send(task(1, 2, "second")).await.unwrap();
        });
        assert_eq!(rx.recv().await.unwrap().task_name, "first");
        producer.await.unwrap();
        assert_eq!(rx.recv().await.unwrap().task_name, "second");
        assert_eq!(rx.dropped(), 0);
    }

    #[tokio::test]
    async fn drop_oldest_policy_evicts_and_counts() {
        let (tx, mut rx) = task_queue(2, Backpressure::DropOldest);
        for index in 0..5 {
            tx.send(task(index, index, "t")).await.unwrap();
        }

        assert_eq!(rx.recv().await.unwrap().task_index, 3);
        assert_eq!(rx.dropped(), 3);
        assert_eq!(rx.recv().await.unwrap().task_index, 4);
    }

    #[tokio::test]
    async fn drains_before_reporting_closed() {
        for policy in [Backpressure::Block, Backpressure::DropOldest] {
            let (tx, rx) = task_queue(4, policy);
            tx.send(task(1, 10, "a")).await.unwrap();
            tx.send(task(2, 11, "b")).await.unwrap();
            drop(tx);

            assert_eq!(drain(rx).await, vec![task(1, 10, "a"), task(2, 11, "b")]);
        }
    }

    #[tokio::test]
    async fn sending_without_receiver_fails() {
        for policy in [Backpressure::Block, Backpressure::DropOldest] {
            let (tx, rx) = task_queue(4, policy);
            drop(rx);

            let QueueClosed(event) = tx.send(task(7, 70, "lost")).await.unwrap_err();
            assert_eq!(event.task_index, 7);
        }
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped() {
        for policy in [Backpressure::Block, Backpressure::DropOldest] {
            let (tx, mut rx) = task_queue(0, policy);
            tx.send(task(1, 1, "only")).await.unwrap();
            assert_eq!(rx.recv().await.unwrap().task_name, "only");
        }
    }
}
