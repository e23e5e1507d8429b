//! Change-notification event types for the stepdoc engine
//!
//! Provides the shared `StepEvent` definition and the `EventBus` used to fan
//! notifications out to SSE streams and sync bridges.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What happened to a step document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepEventKind {
    /// A draft payload was persisted
    Saved,
    /// The step was marked submitted (read-only)
    Submitted,
    /// The step was returned to draft
    Withdrawn,
}

impl StepEventKind {
    /// Event kind as string, used as the SSE event tag
    pub fn as_str(&self) -> &'static str {
        match self {
            StepEventKind::Saved => "StepSaved",
            StepEventKind::Submitted => "StepSubmitted",
            StepEventKind::Withdrawn => "StepWithdrawn",
        }
    }
}

/// A payload-less change notification.
///
/// Carries only the key of what changed and the kind of change. Subscribers
/// that need the new document content must reload it from the repository;
/// the notification deliberately never carries a diff or the document itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepEvent {
    /// Project whose step changed
    pub project_id: Uuid,
    /// Which step changed (1-based position in the fixed sequence)
    pub step_number: i64,
    /// Kind of change
    pub kind: StepEventKind,
}

/// Central event distribution bus for step change notifications
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// The channel is scoped to the whole engine; consumers filter by
/// `(project_id, step_number)` themselves.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StepEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StepEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if none are listening.
    pub fn emit(&self, event: StepEvent) -> Result<usize, broadcast::error::SendError<StepEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Change notifications are advisory; an engine with no connected
    /// editors has nobody to notify and that is fine.
    pub fn emit_lossy(&self, event: StepEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: StepEventKind) -> StepEvent {
        StepEvent {
            project_id: Uuid::new_v4(),
            step_number: 3,
            kind,
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_delivers_to_subscribers() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(event(StepEventKind::Saved)).expect("emit should succeed");

        let received = rx.try_recv().expect("Should receive event");
        assert_eq!(received.step_number, 3);
        assert_eq!(received.kind, StepEventKind::Saved);
    }

    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(event(StepEventKind::Submitted)).expect("emit should succeed");

        assert_eq!(rx1.try_recv().unwrap().kind, StepEventKind::Submitted);
        assert_eq!(rx2.try_recv().unwrap().kind, StepEventKind::Submitted);
    }

    #[test]
    fn test_emit_lossy_without_subscribers_does_not_panic() {
        let bus = EventBus::new(2);
        for _ in 0..10 {
            bus.emit_lossy(event(StepEventKind::Withdrawn));
        }
        assert_eq!(bus.capacity(), 2);
    }

    #[test]
    fn test_event_kind_strings() {
        assert_eq!(StepEventKind::Saved.as_str(), "StepSaved");
        assert_eq!(StepEventKind::Submitted.as_str(), "StepSubmitted");
        assert_eq!(StepEventKind::Withdrawn.as_str(), "StepWithdrawn");
    }

    #[test]
    fn test_event_serialization_is_payload_less() {
        let e = StepEvent {
            project_id: Uuid::from_u128(1),
            step_number: 8,
            kind: StepEventKind::Saved,
        };
        let json = serde_json::to_value(&e).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(obj.contains_key("project_id"));
        assert!(obj.contains_key("step_number"));
        assert!(obj.contains_key("kind"));
    }
}
