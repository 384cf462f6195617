//! The Execution Stream Hub (spec component C4): an in-process pub/sub that
//! mirrors engine state transitions to subscribers without blocking the
//! engine. Grounded on the teacher's `EventBus` (`tokio::sync::broadcast`),
//! extended per-subscriber with the bounded, gradeful-overflow relay a bare
//! broadcast channel cannot express (see [`crate::subscriber`]).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use n3n_core::{ExecutionId, NodeId};
use parking_lot::RwLock;

use crate::event::StreamEvent;
use crate::subscriber::{Subscriber, Subscription, DEFAULT_BUFFER_SIZE};

#[derive(Default)]
struct Snapshot {
    execution_status: Option<StreamEvent>,
    node_status: HashMap<NodeId, StreamEvent>,
    terminal: bool,
}

struct ExecutionChannel {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    snapshot: RwLock<Snapshot>,
}

impl ExecutionChannel {
    fn new() -> Self {
        Self { subscribers: RwLock::new(Vec::new()), snapshot: RwLock::new(Snapshot::default()) }
    }
}

/// In-process pub/sub hub: publishes engine state transitions and lets
/// callers subscribe to one execution's events or to every execution's
/// events process-wide.
pub struct StreamHub {
    executions: DashMap<ExecutionId, Arc<ExecutionChannel>>,
    global: Arc<ExecutionChannel>,
    buffer_size: usize,
}

impl StreamHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self { executions: DashMap::new(), global: Arc::new(ExecutionChannel::new()), buffer_size }
    }

    fn channel_for(&self, execution_id: ExecutionId) -> Arc<ExecutionChannel> {
        self.executions.entry(execution_id).or_insert_with(|| Arc::new(ExecutionChannel::new())).clone()
    }

    /// Publish an event for its execution. Updates the per-execution
    /// snapshot used to catch up late subscribers, then fans out to both
    /// the per-execution subscriber list and the process-wide one.
    pub fn publish(&self, event: StreamEvent) {
        let execution_id = event.execution_id();
        let channel = self.channel_for(execution_id);
        update_snapshot(&channel.snapshot, &event);
        fan_out(&channel.subscribers, &event);
        fan_out(&self.global.subscribers, &event);
    }

    /// Subscribe to one execution. If the execution is already in flight,
    /// the subscription first receives a synthetic snapshot
    /// (`execution.status` + the latest `node.status` per node) before live
    /// events; if the execution has already reached a terminal status, only
    /// the snapshot and an immediate `execution.completed` are delivered.
    #[must_use]
    pub fn subscribe(&self, execution_id: ExecutionId) -> Subscription {
        let channel = self.channel_for(execution_id);
        let subscriber = Subscriber::new(self.buffer_size);
        deliver_snapshot(&channel.snapshot, &subscriber);
        channel.subscribers.write().push(subscriber.clone());
        Subscription { inner: subscriber }
    }

    /// Subscribe to every execution's events, process-wide.
    #[must_use]
    pub fn subscribe_all(&self) -> Subscription {
        let subscriber = Subscriber::new(self.buffer_size);
        self.global.subscribers.write().push(subscriber.clone());
        Subscription { inner: subscriber }
    }

    /// Drop the channel's subscriber list and snapshot. Intended for the
    /// housekeeping collaborator once an execution passes its retention
    /// window; not otherwise called by the engine.
    pub fn forget(&self, execution_id: ExecutionId) {
        self.executions.remove(&execution_id);
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

fn update_snapshot(snapshot: &RwLock<Snapshot>, event: &StreamEvent) {
    let mut snapshot = snapshot.write();
    match event {
        StreamEvent::ExecutionStatus { .. } => {
            snapshot.execution_status = Some(event.clone());
        }
        StreamEvent::NodeStatus { node_id, .. } => {
            snapshot.node_status.insert(*node_id, event.clone());
        }
        StreamEvent::ExecutionCompleted { .. } => {
            snapshot.execution_status = Some(event.clone());
            snapshot.terminal = true;
        }
        _ => {}
    }
}

fn deliver_snapshot(snapshot: &RwLock<Snapshot>, subscriber: &Arc<Subscriber>) {
    let snapshot = snapshot.read();
    if let Some(status) = &snapshot.execution_status {
        subscriber.push(status.clone());
    }
    for node_event in snapshot.node_status.values() {
        subscriber.push(node_event.clone());
    }
    if snapshot.terminal {
        if let Some(StreamEvent::ExecutionCompleted { execution_id, status }) = &snapshot.execution_status {
            subscriber.push(StreamEvent::ExecutionCompleted { execution_id: *execution_id, status: *status });
        }
    }
}

/// Fan out to a snapshot of the subscriber list (copy-on-write semantics:
/// publishing never blocks on subscribe/unsubscribe); prune disconnected
/// subscribers afterwards.
fn fan_out(subscribers: &RwLock<Vec<Arc<Subscriber>>>, event: &StreamEvent) {
    let snapshot: Vec<Arc<Subscriber>> = subscribers.read().clone();
    if snapshot.is_empty() {
        return;
    }
    let mut any_closed = false;
    for subscriber in &snapshot {
        if !subscriber.push(event.clone()) {
            any_closed = true;
        }
    }
    if any_closed {
        subscribers.write().retain(|s| !s.is_closed());
    }
}
