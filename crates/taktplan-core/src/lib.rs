//! # taktplan-core
//!
//! Core domain model, events and repository ports for the taktplan
//! job-shop scheduling engine.
//!
//! This crate provides:
//! - Value objects: [`Duration`], [`TimeWindow`], [`SkillRequirement`],
//!   [`Priority`], the lifecycle status enums
//! - Entities: [`Job`], [`Task`], [`Operation`], [`Machine`], [`Operator`],
//!   [`ProductionZone`], [`Schedule`], [`ScheduleAssignment`]
//! - Repository ports consumed by the engine
//! - Typed domain events and the in-process [`EventBus`]
//! - The schedule state machine ([`ScheduleLifecycle`])
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use taktplan_core::{Duration, Job, Priority, Task};
//! use uuid::Uuid;
//!
//! let due = Utc.with_ymd_and_hms(2026, 3, 6, 16, 0, 0).unwrap();
//! let mut job = Job::new("J-1042", due).priority(Priority::High).quantity(25);
//! let milling = Uuid::new_v4();
//! job.add_task(
//!     Task::new(job.id, milling, 10)
//!         .planned_duration(Duration::minutes(90))
//!         .setup_duration(Duration::minutes(15)),
//! )
//! .unwrap();
//! assert_eq!(job.tasks().len(), 1);
//! ```

use uuid::Uuid;

pub mod error;
pub mod events;
pub mod job;
pub mod lifecycle;
pub mod operation;
pub mod priority;
pub mod repository;
pub mod resources;
pub mod schedule;
pub mod skill;
pub mod status;
pub mod time;

// ============================================================================
// Identifier Aliases
// ============================================================================

/// Unique identifier for a job.
pub type JobId = Uuid;

/// Unique identifier for a task.
pub type TaskId = Uuid;

/// Unique identifier for an operation catalogue entry.
pub type OperationId = Uuid;

/// Unique identifier for a machine.
pub type MachineId = Uuid;

/// Unique identifier for an operator.
pub type OperatorId = Uuid;

/// Unique identifier for a production zone.
pub type ZoneId = Uuid;

/// Unique identifier for a schedule.
pub type ScheduleId = Uuid;

pub use error::{Remediation, SchedulingError};
pub use events::{
    DomainEvent, EventBus, EventHandler, EventKind, EventPayload, HandlerError,
    SubscriptionHandle, DEFAULT_EVENT_BUFFER,
};
pub use job::{Job, Task};
pub use lifecycle::{ScheduleLifecycle, SolveSummary};
pub use operation::{Operation, RoutingOption};
pub use priority::Priority;
pub use repository::{
    JobRepository, MachineRepository, OperatorRepository, RepoResult, RepositoryError,
    ScheduleRepository, TaskRepository,
};
pub use resources::{AutomationLevel, Machine, Operator, ProductionZone};
pub use schedule::{Schedule, ScheduleAssignment};
pub use skill::{OperatorSkill, SkillCode, SkillLevel, SkillRequirement};
pub use status::{JobStatus, MachineStatus, OperatorStatus, ScheduleStatus, TaskStatus};
pub use time::{Duration, TimeWindow, TimeWindowError, MINUTES_PER_DAY};
