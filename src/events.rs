//! Event Bus (§4.9, component C9): per-run fan-out of [`BusEvent`]s to any
//! number of subscribers over a `tokio::sync::broadcast` channel. Each
//! subscriber gets its own lagging cursor into the same ring buffer rather
//! than its own buffer, so a slow subscriber never starves a fast one and
//! never blocks the publisher (the Run Executor). A subscriber that falls
//! more than `buffer_size` events behind loses the oldest ones; `recv()`
//! turns that loss into a synthetic `buffer_overflow` marker instead of
//! silently skipping past the gap. The bus never persists events itself —
//! that's the Run Store's job. Grounded on
//! `cook/execution/events/event_logger.rs`'s buffered-fanout shape,
//! adapted from a logging sink to a live per-run broadcast bus.

use crate::model::{BusEvent, BusEventPayload, RunId, WorkOrderId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// A subscriber's cursor into one run's event stream. `recv()` yields
/// every event in order, synthesizing a `BufferOverflow` marker the
/// first time this subscription falls behind the bus's ring buffer.
pub struct Subscription {
    pub work_order_id: WorkOrderId,
    pub run_id: RunId,
    receiver: broadcast::Receiver<BusEvent>,
}

impl Subscription {
    /// Next event, or `None` once the publishing side (and every sender
    /// clone) has been dropped and the channel drained.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(dropped)) => Some(BusEvent {
                work_order_id: self.work_order_id,
                run_id: self.run_id,
                sequence: 0,
                timestamp: chrono::Utc::now(),
                payload: BusEventPayload::BufferOverflow { dropped },
            }),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

/// Fan-out hub, one instance shared across all runs for a work order's
/// lifetime (or process lifetime, for a single-tenant deployment). One
/// `broadcast::Sender` is created per `run_id` on first publish or first
/// subscribe, and torn down by [`EventBus::unsubscribe_all`].
pub struct EventBus {
    buffer_size: usize,
    sequence: AtomicU64,
    channels: Mutex<HashMap<RunId, broadcast::Sender<BusEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            sequence: AtomicU64::new(0),
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn channel_for(&self, run_id: RunId) -> broadcast::Sender<BusEvent> {
        self.channels
            .lock()
            .expect("event bus mutex poisoned")
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }

    pub fn subscribe(&self, work_order_id: WorkOrderId, run_id: RunId) -> Subscription {
        let sender = self.channel_for(run_id);
        Subscription { work_order_id, run_id, receiver: sender.subscribe() }
    }

    /// Publish one payload to every subscriber of `run_id`. A send with
    /// no receivers is a silent no-op — `broadcast::Sender::send` errors
    /// in that case, which is not a failure worth surfacing.
    pub fn publish(&self, work_order_id: WorkOrderId, run_id: RunId, payload: BusEventPayload) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let event = BusEvent { work_order_id, run_id, sequence, timestamp: chrono::Utc::now(), payload };
        let sender = self.channel_for(run_id);
        let _ = sender.send(event);
    }

    pub fn unsubscribe_all(&self, run_id: RunId) {
        self.channels.lock().expect("event bus mutex poisoned").remove(&run_id);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = EventBus::new();
        let run_id = RunId::new();
        let mut sub = bus.subscribe(WorkOrderId::new(), run_id);
        bus.publish(WorkOrderId::new(), run_id, BusEventPayload::RunStarted);
        let event = sub.recv().await.unwrap();
        assert!(matches!(event.payload, BusEventPayload::RunStarted));
    }

    #[tokio::test]
    async fn publishing_to_an_unsubscribed_run_is_a_silent_no_op() {
        let bus = EventBus::new();
        bus.publish(WorkOrderId::new(), RunId::new(), BusEventPayload::RunStarted);
    }

    #[tokio::test]
    async fn overflow_inserts_a_synthetic_marker() {
        let bus = EventBus::with_buffer_size(1);
        let run_id = RunId::new();
        let wo = WorkOrderId::new();
        let mut sub = bus.subscribe(wo, run_id);
        bus.publish(wo, run_id, BusEventPayload::RunStarted);
        bus.publish(wo, run_id, BusEventPayload::Progress { percent: 10 });

        let first = sub.recv().await.unwrap();
        assert!(matches!(first.payload, BusEventPayload::BufferOverflow { dropped: 1 }));
        let second = sub.recv().await.unwrap();
        assert!(matches!(second.payload, BusEventPayload::Progress { percent: 10 }));
    }

    #[tokio::test]
    async fn two_subscribers_each_get_every_event_independently() {
        let bus = EventBus::new();
        let run_id = RunId::new();
        let wo = WorkOrderId::new();
        let mut sub_a = bus.subscribe(wo, run_id);
        let mut sub_b = bus.subscribe(wo, run_id);
        bus.publish(wo, run_id, BusEventPayload::RunStarted);
        assert!(matches!(sub_a.recv().await.unwrap().payload, BusEventPayload::RunStarted));
        assert!(matches!(sub_b.recv().await.unwrap().payload, BusEventPayload::RunStarted));
    }
}
