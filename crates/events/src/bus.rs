//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for job lifecycle
//! [`PlatformEvent`]s. It is shared via `Arc<EventBus>` between the
//! orchestrator and the notification service.

use chrono::{DateTime, Utc};
use expressr_core::types::JobId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Canonical event names.
pub mod event_types {
    pub const TRAINING_STARTED: &str = "job.training_started";
    pub const TRAINING_FAILED: &str = "job.training_failed";
    pub const FREE_PACK_READY: &str = "job.free_pack_ready";
    pub const PAYMENT_RECEIVED: &str = "job.payment_received";
    pub const FULL_PACK_READY: &str = "job.full_pack_ready";
    pub const GENERATION_STALLED: &str = "job.generation_stalled";
}

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// A job lifecycle event.
///
/// Constructed via [`PlatformEvent::new`] and enriched with
/// [`for_job`](PlatformEvent::for_job) and
/// [`with_payload`](PlatformEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"job.free_pack_ready"`.
    pub event_type: String,

    /// Job the event refers to.
    pub job_id: Option<JobId>,

    /// Submitter identity (email) of that job.
    pub submitter: Option<String>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            job_id: None,
            submitter: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the job and its submitter.
    pub fn for_job(mut self, job_id: JobId, submitter: impl Into<String>) -> Self {
        self.job_id = Some(job_id);
        self.submitter = Some(submitter.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no active subscribers the event is silently dropped.
    pub fn publish(&self, event: PlatformEvent) {
        tracing::debug!(event_type = %event.event_type, job_id = ?event.job_id, "Publishing event");
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let job_id = uuid::Uuid::now_v7();

        bus.publish(
            PlatformEvent::new(event_types::FREE_PACK_READY)
                .for_job(job_id, "a@b.test")
                .with_payload(serde_json::json!({"count": 3})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "job.free_pack_ready");
        assert_eq!(received.job_id, Some(job_id));
        assert_eq!(received.submitter.as_deref(), Some("a@b.test"));
        assert_eq!(received.payload["count"], 3);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlatformEvent::new(event_types::PAYMENT_RECEIVED));

        assert_eq!(rx1.recv().await.unwrap().event_type, "job.payment_received");
        assert_eq!(rx2.recv().await.unwrap().event_type, "job.payment_received");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(PlatformEvent::new("orphan.event"));
    }
}
