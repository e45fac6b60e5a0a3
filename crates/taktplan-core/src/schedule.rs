//! The schedule aggregate and its assignments.
//!
//! A [`Schedule`] exclusively owns its assignment map; jobs are referenced
//! by id only. Cross-aggregate lookups go through the repositories.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::status::ScheduleStatus;
use crate::time::{Duration, TimeWindow};
use crate::{JobId, MachineId, OperatorId, ScheduleId, TaskId};

/// A task's placement in a schedule: machine, operators and instants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAssignment {
    pub task_id: TaskId,
    pub machine_id: MachineId,
    pub operator_ids: Vec<OperatorId>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub setup_duration: Duration,
    pub processing_duration: Duration,
    pub is_critical_path: bool,
    /// Position of the chosen machine in the operation's candidate list.
    pub routing_option_index: usize,
}

impl ScheduleAssignment {
    /// Construct, enforcing `end - start == setup + processing`.
    pub fn new(
        task_id: TaskId,
        machine_id: MachineId,
        operator_ids: Vec<OperatorId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        setup_duration: Duration,
        processing_duration: Duration,
        routing_option_index: usize,
    ) -> Result<Self, SchedulingError> {
        let span = (end - start).num_minutes();
        let expected = setup_duration.as_minutes() + processing_duration.as_minutes();
        if span != expected {
            return Err(SchedulingError::validation(
                "assignment",
                format!("interval spans {span}min but setup+processing is {expected}min"),
            ));
        }
        Ok(Self {
            task_id,
            machine_id,
            operator_ids,
            start,
            end,
            setup_duration,
            processing_duration,
            is_critical_path: false,
            routing_option_index,
        })
    }

    pub fn total_duration(&self) -> Duration {
        self.setup_duration + self.processing_duration
    }
}

/// A versioned plan over a planning horizon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub name: String,
    /// Monotonic; bumped by [`Schedule::next_version`].
    pub version: u32,
    pub status: ScheduleStatus,
    /// Absolute window the plan must fit in.
    pub planning_horizon: TimeWindow,
    pub job_ids: Vec<JobId>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub makespan: Option<Duration>,
    pub total_cost: Option<Decimal>,
    assignments: HashMap<TaskId, ScheduleAssignment>,
}

impl Schedule {
    pub fn new(
        name: impl Into<String>,
        planning_horizon: TimeWindow,
        job_ids: Vec<JobId>,
        created_by: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: 1,
            status: ScheduleStatus::default(),
            planning_horizon,
            job_ids,
            created_by,
            created_at: Utc::now(),
            activated_at: None,
            makespan: None,
            total_cost: None,
            assignments: HashMap::new(),
        }
    }

    pub fn transition(&mut self, next: ScheduleStatus) -> Result<(), SchedulingError> {
        if !self.status.can_transition_to(next) {
            return Err(SchedulingError::BusinessRuleViolation {
                entity: "schedule",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Replace the assignment map and cached objective figures.
    pub fn install_assignments(
        &mut self,
        assignments: Vec<ScheduleAssignment>,
        makespan: Duration,
        total_cost: Decimal,
    ) {
        self.assignments = assignments.into_iter().map(|a| (a.task_id, a)).collect();
        self.makespan = Some(makespan);
        self.total_cost = Some(total_cost);
    }

    pub fn assignment(&self, task_id: TaskId) -> Option<&ScheduleAssignment> {
        self.assignments.get(&task_id)
    }

    pub fn assignment_mut(&mut self, task_id: TaskId) -> Option<&mut ScheduleAssignment> {
        self.assignments.get_mut(&task_id)
    }

    pub fn assignments(&self) -> impl Iterator<Item = &ScheduleAssignment> {
        self.assignments.values()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn has_assignments(&self) -> bool {
        !self.assignments.is_empty()
    }

    /// Assignments ordered by start instant (task id breaks ties).
    pub fn assignments_by_start(&self) -> Vec<&ScheduleAssignment> {
        let mut out: Vec<_> = self.assignments.values().collect();
        out.sort_by_key(|a| (a.start, a.task_id));
        out
    }

    /// A fresh draft copy with a bumped version and no activation stamp.
    pub fn next_version(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        copy.version = self.version + 1;
        copy.status = ScheduleStatus::Draft;
        copy.activated_at = None;
        copy
    }
}
