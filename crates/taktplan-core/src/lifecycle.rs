//! The schedule state machine.
//!
//! Each operation validates everything it needs up front, then mutates state
//! and emits its events as one ordered batch: either the transition happens
//! and every event is published, or nothing changes.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::SchedulingError;
use crate::events::{DomainEvent, EventBus, EventPayload};
use crate::job::Job;
use crate::schedule::{Schedule, ScheduleAssignment};
use crate::status::{JobStatus, ScheduleStatus};
use crate::time::{Duration, TimeWindow};
use crate::{ScheduleId, TaskId};

/// Objective figures handed over when an optimization run finishes.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveSummary {
    pub makespan: Duration,
    pub total_cost: Decimal,
    pub solver_status: String,
    pub solve_seconds: f64,
}

/// Drives schedule lifecycle transitions and their event fan-out.
pub struct ScheduleLifecycle {
    bus: Arc<EventBus>,
    unresolved_conflicts: RwLock<HashSet<ScheduleId>>,
}

impl ScheduleLifecycle {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus, unresolved_conflicts: RwLock::new(HashSet::new()) }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// New draft schedule. Emits nothing.
    pub fn create_schedule(
        &self,
        name: impl Into<String>,
        horizon: TimeWindow,
        job_ids: Vec<crate::JobId>,
        user: Option<String>,
    ) -> Schedule {
        Schedule::new(name, horizon, job_ids, user)
    }

    /// Draft -> Optimizing.
    pub fn begin_optimization(&self, schedule: &mut Schedule) -> Result<(), SchedulingError> {
        schedule.transition(ScheduleStatus::Optimizing)?;
        tracing::debug!(schedule = %schedule.id, "optimization started");
        Ok(())
    }

    /// Optimizing -> Draft, installing the solution.
    ///
    /// Emits one `TaskScheduled` per assignment (chronological) followed by
    /// one `ScheduleUpdated`.
    pub fn complete_optimization(
        &self,
        schedule: &mut Schedule,
        assignments: Vec<ScheduleAssignment>,
        summary: &SolveSummary,
    ) -> Result<(), SchedulingError> {
        if schedule.status != ScheduleStatus::Optimizing {
            return Err(SchedulingError::BusinessRuleViolation {
                entity: "schedule",
                from: schedule.status.to_string(),
                to: ScheduleStatus::Draft.to_string(),
            });
        }
        schedule.transition(ScheduleStatus::Draft)?;
        schedule.install_assignments(assignments, summary.makespan, summary.total_cost);

        let mut events = Vec::with_capacity(schedule.assignment_count() + 1);
        for assignment in schedule.assignments_by_start() {
            events.push(DomainEvent::new(
                schedule.id,
                EventPayload::TaskScheduled {
                    task_id: assignment.task_id,
                    machine_id: assignment.machine_id,
                    start: assignment.start,
                    end: assignment.end,
                },
            ));
        }
        events.push(DomainEvent::new(
            schedule.id,
            EventPayload::ScheduleUpdated { schedule_id: schedule.id, version: schedule.version },
        ));

        tracing::info!(
            schedule = %schedule.id,
            assignments = schedule.assignment_count(),
            status = %summary.solver_status,
            seconds = summary.solve_seconds,
            "optimization completed"
        );
        self.bus.publish_all_sync(events);
        Ok(())
    }

    /// Draft -> Published, releasing referenced planned jobs.
    ///
    /// Preconditions: every referenced job is present and not cancelled, no
    /// unresolved resource conflict is pending against this schedule, and at
    /// least one assignment exists.
    pub fn publish(&self, schedule: &mut Schedule, jobs: &mut [Job]) -> Result<(), SchedulingError> {
        if !schedule.status.can_transition_to(ScheduleStatus::Published) {
            return Err(SchedulingError::BusinessRuleViolation {
                entity: "schedule",
                from: schedule.status.to_string(),
                to: ScheduleStatus::Published.to_string(),
            });
        }
        if !schedule.has_assignments() {
            return Err(SchedulingError::validation(
                "assignments",
                "cannot publish a schedule without assignments",
            ));
        }
        if self.has_unresolved_conflict(schedule.id) {
            return Err(SchedulingError::ResourceConflict {
                resource: format!("schedule {}", schedule.id),
                message: "unresolved resource conflicts are pending".into(),
            });
        }
        for job_id in &schedule.job_ids {
            let job = jobs
                .iter()
                .find(|j| j.id == *job_id)
                .ok_or_else(|| SchedulingError::not_found("job", job_id))?;
            if job.status == JobStatus::Cancelled {
                return Err(SchedulingError::validation(
                    "job_ids",
                    format!("job {} is cancelled", job.job_number),
                ));
            }
        }

        schedule.transition(ScheduleStatus::Published)?;

        let mut events = vec![DomainEvent::new(
            schedule.id,
            EventPayload::SchedulePublished { schedule_id: schedule.id, version: schedule.version },
        )];
        for job_id in &schedule.job_ids {
            let Some(job) = jobs.iter_mut().find(|j| j.id == *job_id) else {
                continue;
            };
            if job.status == JobStatus::Planned {
                job.transition(JobStatus::Released)?;
                events.push(DomainEvent::new(
                    job.id,
                    EventPayload::JobStatusChanged {
                        job_id: job.id,
                        from: JobStatus::Planned,
                        to: JobStatus::Released,
                    },
                ));
            }
        }

        tracing::info!(schedule = %schedule.id, version = schedule.version, "schedule published");
        self.bus.publish_all_sync(events);
        Ok(())
    }

    /// Published -> Active.
    pub fn activate(
        &self,
        schedule: &mut Schedule,
        at: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        schedule.transition(ScheduleStatus::Active)?;
        schedule.activated_at = Some(at);
        self.bus.publish_sync(DomainEvent::new(
            schedule.id,
            EventPayload::ScheduleUpdated { schedule_id: schedule.id, version: schedule.version },
        ));
        Ok(())
    }

    /// Archive a schedule from Draft, Optimizing or Published.
    pub fn cancel(&self, schedule: &mut Schedule, reason: &str) -> Result<(), SchedulingError> {
        if !matches!(
            schedule.status,
            ScheduleStatus::Draft | ScheduleStatus::Optimizing | ScheduleStatus::Published
        ) {
            return Err(SchedulingError::BusinessRuleViolation {
                entity: "schedule",
                from: schedule.status.to_string(),
                to: ScheduleStatus::Archived.to_string(),
            });
        }
        schedule.transition(ScheduleStatus::Archived)?;
        tracing::info!(schedule = %schedule.id, reason, "schedule cancelled");
        self.bus.publish_sync(DomainEvent::new(
            schedule.id,
            EventPayload::ScheduleUpdated { schedule_id: schedule.id, version: schedule.version },
        ));
        Ok(())
    }

    /// Flag a conflict against a schedule and emit `ResourceConflictDetected`.
    /// Publishing is blocked until [`Self::resolve_conflicts`] clears it.
    pub fn record_conflict(
        &self,
        schedule_id: ScheduleId,
        resource: impl Into<String>,
        task_ids: Vec<TaskId>,
    ) {
        self.unresolved_conflicts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(schedule_id);
        self.bus.publish_sync(DomainEvent::new(
            schedule_id,
            EventPayload::ResourceConflictDetected {
                schedule_id,
                resource: resource.into(),
                task_ids,
            },
        ));
    }

    pub fn resolve_conflicts(&self, schedule_id: ScheduleId) {
        self.unresolved_conflicts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&schedule_id);
    }

    pub fn has_unresolved_conflict(&self, schedule_id: ScheduleId) -> bool {
        self.unresolved_conflicts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&schedule_id)
    }
}
