//! A single subscriber's bounded event buffer and the graded overflow
//! policy from spec §4.4: drop the oldest `node.output` first, then
//! coalesce consecutive `node.status` events for the same node, and only
//! disconnect (with `Overflow`) if an `execution.status` transition would
//! otherwise be lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::event::StreamEvent;

/// Default per-subscriber buffer size (spec §4.4).
pub const DEFAULT_BUFFER_SIZE: usize = 256;

pub(crate) struct Subscriber {
    queue: Mutex<VecDeque<StreamEvent>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl Subscriber {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Push `event` onto the queue, applying the overflow policy if the
    /// buffer is already at capacity. Returns `true` if the subscriber is
    /// still connected afterwards.
    pub(crate) fn push(&self, event: StreamEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut queue = self.queue.lock();
        if queue.len() < self.capacity {
            queue.push_back(event);
            drop(queue);
            self.notify.notify_one();
            return true;
        }

        // 1. Drop the oldest node.output event to make room.
        if let Some(pos) = queue.iter().position(StreamEvent::is_node_output) {
            queue.remove(pos);
            queue.push_back(event);
            drop(queue);
            self.notify.notify_one();
            return true;
        }

        // 2. Coalesce with an existing node.status event for the same node.
        if let StreamEvent::NodeStatus { node_id, .. } = &event {
            if let Some(existing) = queue
                .iter_mut()
                .find(|e| matches!(e, StreamEvent::NodeStatus { node_id: n, .. } if n == node_id))
            {
                *existing = event;
                drop(queue);
                self.notify.notify_one();
                return true;
            }
        }

        // 3. An execution.status transition must never be silently lost.
        if event.is_execution_status() {
            let execution_id = event.execution_id();
            queue.clear();
            queue.push_back(StreamEvent::Overflow { execution_id });
            drop(queue);
            self.closed.store(true, Ordering::Release);
            self.notify.notify_one();
            return false;
        }

        // Anything else (a node.status that can't coalesce, with no
        // output event available to evict) is dropped.
        tracing::warn!("stream subscriber buffer full, dropping event");
        true
    }

    async fn recv(self: &Arc<Self>) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.queue.lock().pop_front() {
                return Some(event);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn try_recv(&self) -> Option<StreamEvent> {
        self.queue.lock().pop_front()
    }
}

/// A live handle to one subscription's event stream.
pub struct Subscription {
    pub(crate) inner: Arc<Subscriber>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the subscriber has been
    /// disconnected (an `Overflow` event is always delivered first).
    pub async fn recv(&self) -> Option<StreamEvent> {
        self.inner.recv().await
    }

    /// Non-blocking poll.
    #[must_use]
    pub fn try_recv(&self) -> Option<StreamEvent> {
        self.inner.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n3n_core::{ExecutionId, NodeId};
    use n3n_execution::{ExecutionStatus, NodeStatus};

    fn node_status(execution_id: ExecutionId, node_id: NodeId) -> StreamEvent {
        StreamEvent::NodeStatus {
            execution_id,
            node_id,
            status: NodeStatus::Running,
            started_at: None,
            completed_at: None,
            attempts: 1,
        }
    }

    #[test]
    fn push_under_capacity_succeeds() {
        let sub = Subscriber::new(4);
        assert!(sub.push(node_status(ExecutionId::v4(), NodeId::v4())));
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn overflow_drops_oldest_output_first() {
        let sub = Subscriber::new(2);
        let execution_id = ExecutionId::v4();
        let node = NodeId::v4();
        sub.push(StreamEvent::node_output(execution_id, node, &serde_json::json!(1)));
        sub.push(node_status(execution_id, NodeId::v4()));
        assert!(sub.push(node_status(execution_id, NodeId::v4())));
        // The output event should have been evicted, the two status events remain.
        let first = sub.try_recv().unwrap();
        assert!(first.is_node_status());
    }

    #[test]
    fn overflow_coalesces_same_node_status() {
        let sub = Subscriber::new(1);
        let execution_id = ExecutionId::v4();
        let node = NodeId::v4();
        sub.push(node_status(execution_id, node));
        assert!(sub.push(node_status(execution_id, node)));
        assert_eq!(sub.queue.lock().len(), 1);
    }

    #[test]
    fn overflow_disconnects_on_execution_status_loss() {
        let sub = Subscriber::new(1);
        let execution_id = ExecutionId::v4();
        sub.push(node_status(execution_id, NodeId::v4()));
        let connected = sub.push(StreamEvent::ExecutionStatus {
            execution_id,
            status: ExecutionStatus::Running,
            duration_ms: None,
            error_message: None,
        });
        assert!(!connected);
        assert!(sub.is_closed());
        let event = sub.try_recv().unwrap();
        assert!(matches!(event, StreamEvent::Overflow { .. }));
    }

    #[tokio::test]
    async fn recv_waits_for_notification() {
        let sub = Subscriber::new(4);
        let waiter = sub.clone();
        let handle = tokio::spawn(async move { waiter.recv().await });
        tokio::task::yield_now().await;
        sub.push(node_status(ExecutionId::v4(), NodeId::v4()));
        let event = handle.await.unwrap();
        assert!(event.is_some());
    }
}
