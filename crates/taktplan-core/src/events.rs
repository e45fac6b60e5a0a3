//! Typed domain events and the in-process event bus.
//!
//! Every meaningful state change fans out as a [`DomainEvent`]. Handlers
//! subscribe by event kind or by predicate; a failing handler is logged and
//! isolated so the remaining handlers still run. The bus keeps a bounded,
//! strictly chronological ring buffer of recent events for diagnostic
//! replay.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::priority::Priority;
use crate::skill::{SkillCode, SkillLevel};
use crate::status::{JobStatus, MachineStatus, TaskStatus};
use crate::time::TimeWindow;
use crate::{JobId, MachineId, OperatorId, ScheduleId, TaskId};

/// Default ring-buffer capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 10_000;

/// Discriminant of a domain event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    JobCreated,
    JobStatusChanged,
    JobCompleted,
    JobDelayed,
    TaskScheduled,
    TaskStarted,
    TaskCompleted,
    TaskDelayed,
    TaskStatusChanged,
    TaskAssignmentChanged,
    MachineAllocated,
    MachineReleased,
    MachineStatusChanged,
    OperatorAssigned,
    OperatorReleased,
    SchedulePublished,
    ScheduleUpdated,
    ResourceConflictDetected,
    CriticalPathChanged,
    ConstraintViolated,
    DeadlineMissed,
    SkillRequirementNotMet,
    MaintenanceScheduled,
    PriorityChanged,
}

/// Event body; one variant per [`EventKind`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    JobCreated { job_id: JobId, job_number: String },
    JobStatusChanged { job_id: JobId, from: JobStatus, to: JobStatus },
    JobCompleted { job_id: JobId, job_number: String, completed_at: DateTime<Utc> },
    JobDelayed { job_id: JobId, job_number: String, delay_minutes: i64 },
    TaskScheduled {
        task_id: TaskId,
        machine_id: MachineId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    TaskStarted { task_id: TaskId, started_at: DateTime<Utc> },
    TaskCompleted { task_id: TaskId, completed_at: DateTime<Utc> },
    TaskDelayed { task_id: TaskId, delay_minutes: i64 },
    TaskStatusChanged { task_id: TaskId, from: TaskStatus, to: TaskStatus },
    TaskAssignmentChanged {
        task_id: TaskId,
        machine_id: Option<MachineId>,
        operator_ids: Vec<OperatorId>,
    },
    MachineAllocated { machine_id: MachineId, task_id: TaskId },
    MachineReleased { machine_id: MachineId, task_id: TaskId },
    MachineStatusChanged { machine_id: MachineId, from: MachineStatus, to: MachineStatus },
    OperatorAssigned { operator_id: OperatorId, task_id: TaskId },
    OperatorReleased { operator_id: OperatorId, task_id: TaskId },
    SchedulePublished { schedule_id: ScheduleId, version: u32 },
    ScheduleUpdated { schedule_id: ScheduleId, version: u32 },
    ResourceConflictDetected {
        schedule_id: ScheduleId,
        resource: String,
        task_ids: Vec<TaskId>,
    },
    CriticalPathChanged { schedule_id: ScheduleId, task_ids: Vec<TaskId> },
    ConstraintViolated { constraint: String, message: String },
    DeadlineMissed {
        job_id: JobId,
        job_number: String,
        due_date: DateTime<Utc>,
        completion: DateTime<Utc>,
    },
    SkillRequirementNotMet {
        operator_id: OperatorId,
        skill_code: SkillCode,
        required_level: SkillLevel,
    },
    MaintenanceScheduled { machine_id: MachineId, window: TimeWindow },
    PriorityChanged { job_id: JobId, from: Priority, to: Priority },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::JobCreated { .. } => EventKind::JobCreated,
            Self::JobStatusChanged { .. } => EventKind::JobStatusChanged,
            Self::JobCompleted { .. } => EventKind::JobCompleted,
            Self::JobDelayed { .. } => EventKind::JobDelayed,
            Self::TaskScheduled { .. } => EventKind::TaskScheduled,
            Self::TaskStarted { .. } => EventKind::TaskStarted,
            Self::TaskCompleted { .. } => EventKind::TaskCompleted,
            Self::TaskDelayed { .. } => EventKind::TaskDelayed,
            Self::TaskStatusChanged { .. } => EventKind::TaskStatusChanged,
            Self::TaskAssignmentChanged { .. } => EventKind::TaskAssignmentChanged,
            Self::MachineAllocated { .. } => EventKind::MachineAllocated,
            Self::MachineReleased { .. } => EventKind::MachineReleased,
            Self::MachineStatusChanged { .. } => EventKind::MachineStatusChanged,
            Self::OperatorAssigned { .. } => EventKind::OperatorAssigned,
            Self::OperatorReleased { .. } => EventKind::OperatorReleased,
            Self::SchedulePublished { .. } => EventKind::SchedulePublished,
            Self::ScheduleUpdated { .. } => EventKind::ScheduleUpdated,
            Self::ResourceConflictDetected { .. } => EventKind::ResourceConflictDetected,
            Self::CriticalPathChanged { .. } => EventKind::CriticalPathChanged,
            Self::ConstraintViolated { .. } => EventKind::ConstraintViolated,
            Self::DeadlineMissed { .. } => EventKind::DeadlineMissed,
            Self::SkillRequirementNotMet { .. } => EventKind::SkillRequirementNotMet,
            Self::MaintenanceScheduled { .. } => EventKind::MaintenanceScheduled,
            Self::PriorityChanged { .. } => EventKind::PriorityChanged,
        }
    }
}

static LAST_NANOS: AtomicI64 = AtomicI64::new(0);

/// Wall clock forced strictly monotonic across the process, so events order
/// correctly even when emitted within the same clock tick.
fn monotonic_now() -> DateTime<Utc> {
    let wall = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    let mut prev = LAST_NANOS.load(Ordering::Relaxed);
    loop {
        let next = wall.max(prev + 1);
        match LAST_NANOS.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return Utc.timestamp_nanos(next),
            Err(actual) => prev = actual,
        }
    }
}

/// An immutable event record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub aggregate_id: Uuid,
    pub payload: EventPayload,
}

impl DomainEvent {
    pub fn new(aggregate_id: Uuid, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: monotonic_now(),
            aggregate_id,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Failure reported by an event handler; logged, never propagated.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// An event consumer.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

type Predicate = Arc<dyn Fn(&DomainEvent) -> bool + Send + Sync>;

#[derive(Clone)]
enum Matcher {
    Kind(EventKind),
    Predicate(Predicate),
}

impl Matcher {
    fn matches(&self, event: &DomainEvent) -> bool {
        match self {
            Self::Kind(kind) => event.kind() == *kind,
            Self::Predicate(pred) => pred(event),
        }
    }
}

/// Opaque subscription identity returned by `subscribe`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

#[derive(Clone)]
struct Subscription {
    handle: SubscriptionHandle,
    matcher: Matcher,
    handler: Arc<dyn EventHandler>,
}

/// In-process event bus with sync and concurrent publish.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscription>>,
    buffer: Mutex<VecDeque<DomainEvent>>,
    capacity: usize,
    next_handle: AtomicU64,
    write_index: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            next_handle: AtomicU64::new(1),
            write_index: AtomicU64::new(0),
        }
    }

    /// Subscribe a handler to one event kind. Registering the same handler
    /// for the same kind again returns the existing subscription.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionHandle {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = subs.iter().find(|s| {
            Arc::ptr_eq(&s.handler, &handler) && matches!(s.matcher, Matcher::Kind(k) if k == kind)
        }) {
            return existing.handle;
        }
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        subs.push(Subscription { handle, matcher: Matcher::Kind(kind), handler });
        handle
    }

    /// Subscribe a handler with an arbitrary predicate. The same handler
    /// instance is coalesced to a single predicate subscription.
    pub fn subscribe_where<F>(&self, predicate: F, handler: Arc<dyn EventHandler>) -> SubscriptionHandle
    where
        F: Fn(&DomainEvent) -> bool + Send + Sync + 'static,
    {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = subs.iter().find(|s| {
            Arc::ptr_eq(&s.handler, &handler) && matches!(s.matcher, Matcher::Predicate(_))
        }) {
            return existing.handle;
        }
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        subs.push(Subscription {
            handle,
            matcher: Matcher::Predicate(Arc::new(predicate)),
            handler,
        });
        handle
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|s| s.handle != handle);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn matching(&self, event: &DomainEvent) -> Vec<Subscription> {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.matcher.matches(event))
            .cloned()
            .collect()
    }

    fn record(&self, event: &DomainEvent) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event.clone());
        self.write_index.fetch_add(1, Ordering::Release);
    }

    fn run_handler(subscription: &Subscription, event: &DomainEvent) {
        let outcome = catch_unwind(AssertUnwindSafe(|| subscription.handler.handle(event)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(kind = ?event.kind(), %err, "event handler failed");
            }
            Err(_) => {
                tracing::error!(kind = ?event.kind(), "event handler panicked");
            }
        }
    }

    /// Publish inline: every handler runs, in registration order, before
    /// this returns.
    pub fn publish_sync(&self, event: DomainEvent) {
        self.record(&event);
        for subscription in self.matching(&event) {
            Self::run_handler(&subscription, &event);
        }
    }

    /// Publish a batch inline, preserving emission order.
    pub fn publish_all_sync(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish_sync(event);
        }
    }

    /// Publish with handler concurrency: per event, all matching handlers
    /// run on their own threads and are joined before the next event is
    /// dispatched, so events stay visible in emission order while handlers
    /// of one event may block independently.
    pub fn publish_concurrent(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.record(&event);
            let subscriptions = self.matching(&event);
            let event_ref = &event;
            std::thread::scope(|scope| {
                for subscription in &subscriptions {
                    scope.spawn(move || Self::run_handler(subscription, event_ref));
                }
            });
        }
    }

    /// Last `n` recorded events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<DomainEvent> {
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        let skip = buffer.len().saturating_sub(n);
        buffer.iter().skip(skip).cloned().collect()
    }

    /// Total events ever recorded (monotonically advancing write index).
    pub fn events_recorded(&self) -> u64 {
        self.write_index.load(Ordering::Acquire)
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
    use pretty_assertions::assert_eq;

    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self { seen: Mutex::new(Vec::new()) })
        }

        fn kinds(&self) -> Vec<EventKind> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl EventHandler for Recorder {
        fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.kind());
            Ok(())
        }
    }

    struct Failing;

    impl EventHandler for Failing {
        fn handle(&self, _event: &DomainEvent) -> Result<(), HandlerError> {
            Err(HandlerError("simulated failure".into()))
        }
    }

    struct Panicking;

    impl EventHandler for Panicking {
        fn handle(&self, _event: &DomainEvent) -> Result<(), HandlerError> {
            panic!("boom");
        }
    }

    fn job_created() -> DomainEvent {
        let id = Uuid::new_v4();
        DomainEvent::new(id, EventPayload::JobCreated { job_id: id, job_number: "J-1".into() })
    }

    #[test]
    fn sync_publish_reaches_kind_subscribers() {
        let bus = EventBus::new();
        let recorder = Recorder::new();
        bus.subscribe(EventKind::JobCreated, recorder.clone());
        bus.publish_sync(job_created());
        assert_eq!(recorder.kinds(), vec![EventKind::JobCreated]);
    }

    #[test]
    fn non_matching_kind_is_skipped() {
        let bus = EventBus::new();
        let recorder = Recorder::new();
        bus.subscribe(EventKind::TaskScheduled, recorder.clone());
        bus.publish_sync(job_created());
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn predicate_subscription() {
        let bus = EventBus::new();
        let recorder = Recorder::new();
        bus.subscribe_where(
            |e| matches!(e.payload, EventPayload::JobCreated { ref job_number, .. } if job_number == "J-1"),
            recorder.clone(),
        );
        bus.publish_sync(job_created());
        assert_eq!(recorder.kinds().len(), 1);
    }

    #[test]
    fn duplicate_registration_coalesced() {
        let bus = EventBus::new();
        let recorder = Recorder::new();
        let first = bus.subscribe(EventKind::JobCreated, recorder.clone());
        let second = bus.subscribe(EventKind::JobCreated, recorder.clone());
        assert_eq!(first, second);
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish_sync(job_created());
        assert_eq!(recorder.kinds().len(), 1);
    }

    #[test]
    fn distinct_kinds_are_separate_subscriptions() {
        let bus = EventBus::new();
        let recorder = Recorder::new();
        let a = bus.subscribe(EventKind::JobCreated, recorder.clone());
        let b = bus.subscribe(EventKind::ScheduleUpdated, recorder.clone());
        assert_ne!(a, b);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn unsubscribe_removes() {
        let bus = EventBus::new();
        let recorder = Recorder::new();
        let handle = bus.subscribe(EventKind::JobCreated, recorder.clone());
        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));
        bus.publish_sync(job_created());
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        let recorder = Recorder::new();
        bus.subscribe(EventKind::JobCreated, Arc::new(Failing));
        bus.subscribe(EventKind::JobCreated, Arc::new(Panicking));
        bus.subscribe(EventKind::JobCreated, recorder.clone());
        bus.publish_sync(job_created());
        assert_eq!(recorder.kinds().len(), 1);
    }

    #[test]
    fn concurrent_publish_runs_all_handlers() {
        let bus = EventBus::new();
        let first = Recorder::new();
        let second = Recorder::new();
        bus.subscribe(EventKind::JobCreated, first.clone());
        bus.subscribe(EventKind::JobCreated, second.clone());
        bus.subscribe(EventKind::JobCreated, Arc::new(Panicking));

        bus.publish_concurrent(vec![job_created(), job_created()]);
        assert_eq!(first.kinds().len(), 2);
        assert_eq!(second.kinds().len(), 2);
    }

    #[test]
    fn ring_buffer_is_bounded_and_chronological() {
        let bus = EventBus::with_capacity(3);
        for _ in 0..5 {
            bus.publish_sync(job_created());
        }
        let recent = bus.recent(10);
        assert_eq!(recent.len(), 3);
        assert!(recent.windows(2).all(|w| w[0].occurred_at < w[1].occurred_at));
        assert_eq!(bus.events_recorded(), 5);
    }

    #[test]
    fn occurred_at_is_strictly_monotonic() {
        let events: Vec<_> = (0..50).map(|_| job_created()).collect();
        assert!(events.windows(2).all(|w| w[0].occurred_at < w[1].occurred_at));
    }

    #[test]
    fn payload_kind_round_trip() {
        let event = job_created();
        assert_eq!(event.kind(), EventKind::JobCreated);
    }

    #[test]
    fn event_serde_round_trip() {
        let event = job_created();
        let json = serde_json::to_string(&event).unwrap();
        let back: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
