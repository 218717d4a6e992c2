use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::lifecycle::{RequestAction, RequestStatus};
use crate::config::EventDeliveryConfig;
use crate::workflows::approval::domain::{
    EmployeeId, RequestId, RequestType, WorkflowStepId, WorkflowTemplateId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "REQUEST_SUBMITTED")]
    Submitted,
    #[serde(rename = "REQUEST_APPROVED")]
    Approved,
    #[serde(rename = "REQUEST_REJECTED")]
    Rejected,
    #[serde(rename = "REQUEST_RETURNED")]
    Returned,
    #[serde(rename = "REQUEST_CANCELLED")]
    Cancelled,
    #[serde(rename = "REQUEST_WITHDRAWN")]
    Withdrawn,
}

impl EventType {
    pub const fn label(self) -> &'static str {
        match self {
            EventType::Submitted => "REQUEST_SUBMITTED",
            EventType::Approved => "REQUEST_APPROVED",
            EventType::Rejected => "REQUEST_REJECTED",
            EventType::Returned => "REQUEST_RETURNED",
            EventType::Cancelled => "REQUEST_CANCELLED",
            EventType::Withdrawn => "REQUEST_WITHDRAWN",
        }
    }

    pub const fn for_action(action: RequestAction) -> Self {
        match action {
            RequestAction::Submit => EventType::Submitted,
            RequestAction::ApproveStep | RequestAction::Complete => EventType::Approved,
            RequestAction::RejectStep => EventType::Rejected,
            RequestAction::ReturnForEdit => EventType::Returned,
            RequestAction::Cancel => EventType::Cancelled,
            RequestAction::Withdraw => EventType::Withdrawn,
        }
    }
}

/// Notification that a request changed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_type: EventType,
    pub request_type: RequestType,
    pub request_id: RequestId,
    /// Engine correlation key of the round the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_key: Option<RequestId>,
    pub workflow_template_id: Option<WorkflowTemplateId>,
    pub current_step_id: Option<WorkflowStepId>,
    pub actor_id: EmployeeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub resulting_status: RequestStatus,
    pub timestamp: DateTime<Utc>,
}

pub type DedupKey = (RequestId, EventType, DateTime<Utc>);

impl LifecycleEvent {
    /// Key consumers use to drop redelivered copies.
    pub fn dedup_key(&self) -> DedupKey {
        (self.request_id.clone(), self.event_type, self.timestamp)
    }
}

/// At-least-once transport for lifecycle events.
pub trait EventChannel: Send + Sync {
    fn publish(&self, event: &LifecycleEvent) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("event channel unavailable: {0}")]
    Unavailable(String),
}

/// Whether an event reached the channel or was parked in the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Delivery {
    Delivered { attempts: u32 },
    Deferred { attempts: u32 },
}

impl Delivery {
    pub const fn is_delivered(self) -> bool {
        matches!(self, Delivery::Delivered { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RedeliveryReport {
    pub delivered: usize,
    pub remaining: usize,
}

/// Publishes through an [`EventChannel`] with bounded retries and
/// exponential backoff. Events that exhaust their attempts are kept in an
/// outbox until [`RetryingPublisher::redeliver`] succeeds.
pub struct RetryingPublisher {
    channel: Arc<dyn EventChannel>,
    policy: EventDeliveryConfig,
    outbox: Mutex<Vec<LifecycleEvent>>,
}

impl RetryingPublisher {
    pub fn new(channel: Arc<dyn EventChannel>, policy: EventDeliveryConfig) -> Self {
        Self {
            channel,
            policy,
            outbox: Mutex::new(Vec::new()),
        }
    }

    pub fn publish(&self, event: LifecycleEvent) -> Delivery {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff;

        for attempt in 1..=max_attempts {
            match self.channel.publish(&event) {
                Ok(()) => {
                    debug!(
                        event_type = event.event_type.label(),
                        request_id = %event.request_id,
                        attempt,
                        "lifecycle event delivered"
                    );
                    return Delivery::Delivered { attempts: attempt };
                }
                Err(err) if attempt < max_attempts => {
                    debug!(
                        event_type = event.event_type.label(),
                        request_id = %event.request_id,
                        attempt,
                        error = %err,
                        "lifecycle event delivery failed, retrying"
                    );
                    if !backoff.is_zero() {
                        thread::sleep(backoff);
                    }
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => {
                    warn!(
                        event_type = event.event_type.label(),
                        request_id = %event.request_id,
                        attempts = max_attempts,
                        error = %err,
                        "lifecycle event parked in outbox"
                    );
                }
            }
        }

        self.outbox_guard().push(event);
        Delivery::Deferred {
            attempts: max_attempts,
        }
    }

    /// One delivery attempt per parked event, in the order they were parked.
    pub fn redeliver(&self) -> RedeliveryReport {
        let parked = std::mem::take(&mut *self.outbox_guard());
        let mut report = RedeliveryReport::default();
        let mut still_parked = Vec::new();

        for event in parked {
            match self.channel.publish(&event) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    debug!(
                        event_type = event.event_type.label(),
                        request_id = %event.request_id,
                        error = %err,
                        "redelivery failed"
                    );
                    still_parked.push(event);
                }
            }
        }

        let mut outbox = self.outbox_guard();
        // Events parked while we were redelivering go after the older ones.
        still_parked.append(&mut outbox);
        *outbox = still_parked;
        report.remaining = outbox.len();

        info!(
            delivered = report.delivered,
            remaining = report.remaining,
            "event outbox redelivered"
        );
        report
    }

    pub fn outbox(&self) -> Vec<LifecycleEvent> {
        self.outbox_guard().clone()
    }

    fn outbox_guard(&self) -> std::sync::MutexGuard<'_, Vec<LifecycleEvent>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    seen: HashSet<DedupKey>,
    events: Vec<LifecycleEvent>,
}

/// In-process channel that records events once per dedup key.
#[derive(Debug)]
pub struct InMemoryEventChannel {
    available: AtomicBool,
    state: Mutex<ChannelState>,
}

impl Default for InMemoryEventChannel {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            state: Mutex::new(ChannelState::default()),
        }
    }
}

impl InMemoryEventChannel {
    /// Toggle availability to simulate a broker outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.state
            .lock()
            .map(|state| state.events.clone())
            .unwrap_or_default()
    }
}

impl EventChannel for InMemoryEventChannel {
    fn publish(&self, event: &LifecycleEvent) -> Result<(), DeliveryError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unavailable("channel offline".to_string()));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| DeliveryError::Unavailable("channel lock poisoned".to_string()))?;
        if state.seen.insert(event.dedup_key()) {
            state.events.push(event.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;

    fn event(event_type: EventType) -> LifecycleEvent {
        LifecycleEvent {
            event_type,
            request_type: RequestType::Offer,
            request_id: RequestId("offer-1".to_string()),
            correlation_key: Some(RequestId("offer-1/r1".to_string())),
            workflow_template_id: Some(WorkflowTemplateId(1)),
            current_step_id: None,
            actor_id: EmployeeId("emp-1".to_string()),
            notes: None,
            resulting_status: RequestStatus::Pending,
            timestamp: Utc
                .with_ymd_and_hms(2026, 3, 2, 9, 30, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    fn no_backoff(max_attempts: u32) -> EventDeliveryConfig {
        EventDeliveryConfig {
            max_attempts,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Fails the first `failures` publishes, then delegates.
    struct Flaky {
        failures: AtomicU32,
        inner: InMemoryEventChannel,
    }

    impl EventChannel for Flaky {
        fn publish(&self, event: &LifecycleEvent) -> Result<(), DeliveryError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(DeliveryError::Unavailable("flaky".to_string()));
            }
            self.inner.publish(event)
        }
    }

    #[test]
    fn serializes_event_types_with_request_prefix() {
        let json = serde_json::to_value(event(EventType::Withdrawn)).expect("serialize");
        assert_eq!(json["event_type"], "REQUEST_WITHDRAWN");
        assert_eq!(json["resulting_status"], "PENDING");
        assert_eq!(json["request_type"], "OFFER");
    }

    #[test]
    fn channel_drops_duplicates_by_key() {
        let channel = InMemoryEventChannel::default();
        channel.publish(&event(EventType::Submitted)).expect("first");
        channel.publish(&event(EventType::Submitted)).expect("redelivered");
        channel.publish(&event(EventType::Approved)).expect("different type");

        assert_eq!(channel.events().len(), 2);
    }

    #[test]
    fn retries_until_delivered() {
        let channel = Arc::new(Flaky {
            failures: AtomicU32::new(2),
            inner: InMemoryEventChannel::default(),
        });
        let publisher = RetryingPublisher::new(channel.clone(), no_backoff(3));

        let delivery = publisher.publish(event(EventType::Submitted));

        assert_eq!(delivery, Delivery::Delivered { attempts: 3 });
        assert!(publisher.outbox().is_empty());
        assert_eq!(channel.inner.events().len(), 1);
    }

    #[test]
    fn exhausted_events_wait_in_outbox_until_redelivered() {
        let channel = Arc::new(InMemoryEventChannel::default());
        channel.set_available(false);
        let publisher = RetryingPublisher::new(channel.clone(), no_backoff(2));

        let delivery = publisher.publish(event(EventType::Cancelled));
        assert_eq!(delivery, Delivery::Deferred { attempts: 2 });
        assert_eq!(publisher.outbox().len(), 1);

        let report = publisher.redeliver();
        assert_eq!(report, RedeliveryReport { delivered: 0, remaining: 1 });

        channel.set_available(true);
        let report = publisher.redeliver();
        assert_eq!(report, RedeliveryReport { delivered: 1, remaining: 0 });
        assert_eq!(channel.events()[0].event_type, EventType::Cancelled);
    }
}
