//! Work orders and their tasks.
//!
//! A [`Job`] owns its [`Task`]s: tasks are created into a job, ordered by
//! `sequence_in_job`, and die with it. Task sequences are unique within a
//! job; any strict order is accepted (multiples of 10 by shop convention).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::priority::Priority;
use crate::status::{JobStatus, TaskStatus};
use crate::time::Duration;
use crate::{JobId, MachineId, OperationId, OperatorId, TaskId};

/// A schedulable unit of work within a job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub operation_id: OperationId,
    pub sequence_in_job: u32,
    /// Processing span, excluding setup.
    pub planned_duration: Duration,
    pub setup_duration: Duration,
    pub status: TaskStatus,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub assigned_machine: Option<MachineId>,
    pub assigned_operators: Vec<OperatorId>,
    pub is_critical_path: bool,
}

impl Task {
    pub fn new(job_id: JobId, operation_id: OperationId, sequence_in_job: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            operation_id,
            sequence_in_job,
            planned_duration: Duration::zero(),
            setup_duration: Duration::zero(),
            status: TaskStatus::default(),
            planned_start: None,
            planned_end: None,
            actual_start: None,
            actual_end: None,
            assigned_machine: None,
            assigned_operators: Vec::new(),
            is_critical_path: false,
        }
    }

    pub fn planned_duration(mut self, duration: Duration) -> Self {
        self.planned_duration = duration;
        self
    }

    pub fn setup_duration(mut self, duration: Duration) -> Self {
        self.setup_duration = duration;
        self
    }

    pub fn transition(&mut self, next: TaskStatus) -> Result<(), SchedulingError> {
        if !self.status.can_transition_to(next) {
            return Err(SchedulingError::BusinessRuleViolation {
                entity: "task",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Install the solver's placement on this task and mark it scheduled.
    ///
    /// The planned end must equal start + setup + processing.
    pub fn apply_assignment(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        machine: MachineId,
        operators: Vec<OperatorId>,
    ) -> Result<(), SchedulingError> {
        let expected =
            start + chrono::Duration::minutes(
                self.setup_duration.as_minutes() + self.planned_duration.as_minutes(),
            );
        if end != expected {
            return Err(SchedulingError::validation(
                "planned_end",
                format!("expected {expected}, got {end}"),
            ));
        }
        if self.status == TaskStatus::Pending {
            self.transition(TaskStatus::Ready)?;
        }
        self.transition(TaskStatus::Scheduled)?;
        self.planned_start = Some(start);
        self.planned_end = Some(end);
        self.assigned_machine = Some(machine);
        self.assigned_operators = operators;
        Ok(())
    }

    /// Record actual execution instants; the end may not precede the start.
    pub fn record_actual(
        &mut self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(), SchedulingError> {
        if let Some(end) = end {
            if end < start {
                return Err(SchedulingError::validation(
                    "actual_end",
                    "must not precede actual_start",
                ));
            }
        }
        self.actual_start = Some(start);
        self.actual_end = end;
        Ok(())
    }

    /// Minutes the task started behind plan; never negative.
    pub fn start_delay_minutes(&self) -> i64 {
        match (self.planned_start, self.actual_start) {
            (Some(planned), Some(actual)) => (actual - planned).num_minutes().max(0),
            _ => 0,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.setup_duration + self.planned_duration
    }
}

/// A manufacturing work order: an ordered sequence of tasks against a due
/// date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_number: String,
    pub customer_name: Option<String>,
    pub part_number: Option<String>,
    pub notes: Option<String>,
    pub quantity: u32,
    pub priority: Priority,
    pub status: JobStatus,
    pub release_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    tasks: Vec<Task>,
}

impl Job {
    pub fn new(job_number: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_number: job_number.into(),
            customer_name: None,
            part_number: None,
            notes: None,
            quantity: 1,
            priority: Priority::default(),
            status: JobStatus::default(),
            release_date: None,
            due_date,
            created_at: Utc::now(),
            tasks: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity.max(1);
        self
    }

    pub fn customer(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn part_number(mut self, part: impl Into<String>) -> Self {
        self.part_number = Some(part.into());
        self
    }

    pub fn release_date(mut self, at: DateTime<Utc>) -> Self {
        self.release_date = Some(at);
        self
    }

    /// Add a task, keeping tasks ordered by sequence and sequences unique.
    pub fn add_task(&mut self, mut task: Task) -> Result<&Task, SchedulingError> {
        if self.tasks.iter().any(|t| t.sequence_in_job == task.sequence_in_job) {
            return Err(SchedulingError::validation(
                "sequence_in_job",
                format!(
                    "duplicate sequence {} in job {}",
                    task.sequence_in_job, self.job_number
                ),
            ));
        }
        task.job_id = self.id;
        let pos = self
            .tasks
            .partition_point(|t| t.sequence_in_job < task.sequence_in_job);
        self.tasks.insert(pos, task);
        Ok(&self.tasks[pos])
    }

    /// Tasks in sequence order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn task_by_sequence(&self, sequence: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.sequence_in_job == sequence)
    }

    pub fn transition(&mut self, next: JobStatus) -> Result<(), SchedulingError> {
        if !self.status.can_transition_to(next) {
            return Err(SchedulingError::BusinessRuleViolation {
                entity: "job",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// A job is complete exactly when every task is complete.
    pub fn is_complete(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }

    /// Tardiness against the due date for a given completion instant.
    pub fn tardiness_at(&self, completion: DateTime<Utc>) -> Duration {
        Duration::minutes((completion - self.due_date).num_minutes())
    }
}
