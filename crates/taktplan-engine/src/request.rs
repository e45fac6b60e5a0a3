//! The solve request: the engine's principal input contract.
//!
//! Closed, fully-enumerated structures; every field is validated before the
//! solver sees the request, and unknown fields fail deserialization rather
//! than being ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taktplan_core::{MachineId, OperatorId, Priority, SchedulingError};

/// Solver tuning parameters exposed to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OptimizationParameters {
    /// 10..=3600 seconds of solver budget.
    pub max_time_seconds: u32,
    /// 1..=16 parallel search workers.
    pub num_workers: u32,
    /// 1..=90 days of planning horizon.
    pub horizon_days: u16,
    /// Two-phase objective pursuit (tardiness+makespan, then cost).
    pub enable_hierarchical_optimization: bool,
    /// 1..=10, weight of tardiness against makespan.
    pub primary_objective_weight: u8,
    /// 0.0..=0.5 slack allowed on the primary objective in the cost phase.
    pub cost_optimization_tolerance: f64,
    /// Treat the horizon as a hard makespan cap instead of objective-only.
    pub makespan_is_hard_cap: bool,
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        Self {
            max_time_seconds: 300,
            num_workers: 8,
            horizon_days: 30,
            enable_hierarchical_optimization: true,
            primary_objective_weight: 2,
            cost_optimization_tolerance: 0.1,
            makespan_is_hard_cap: false,
        }
    }
}

impl OptimizationParameters {
    pub fn validate(&self) -> Result<(), SchedulingError> {
        if !(10..=3600).contains(&self.max_time_seconds) {
            return Err(SchedulingError::validation("max_time_seconds", "must be 10..=3600"));
        }
        if !(1..=16).contains(&self.num_workers) {
            return Err(SchedulingError::validation("num_workers", "must be 1..=16"));
        }
        if !(1..=90).contains(&self.horizon_days) {
            return Err(SchedulingError::validation("horizon_days", "must be 1..=90"));
        }
        if !(1..=10).contains(&self.primary_objective_weight) {
            return Err(SchedulingError::validation(
                "primary_objective_weight",
                "must be 1..=10",
            ));
        }
        if !(0.0..=0.5).contains(&self.cost_optimization_tolerance) {
            return Err(SchedulingError::validation(
                "cost_optimization_tolerance",
                "must be 0.0..=0.5",
            ));
        }
        Ok(())
    }
}

/// Working-hour rules for the request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BusinessConstraints {
    /// 0..=23.
    pub work_start_hour: u8,
    /// 1..=24, after `work_start_hour`.
    pub work_end_hour: u8,
    pub lunch_start_hour: u8,
    /// 15..=120.
    pub lunch_duration_minutes: u16,
    /// 1-indexed holiday days within the horizon, unique.
    pub holiday_days: Vec<u16>,
    pub enforce_business_hours: bool,
}

impl Default for BusinessConstraints {
    fn default() -> Self {
        Self {
            work_start_hour: 7,
            work_end_hour: 16,
            lunch_start_hour: 12,
            lunch_duration_minutes: 45,
            holiday_days: Vec::new(),
            enforce_business_hours: true,
        }
    }
}

impl BusinessConstraints {
    pub fn validate(&self, horizon_days: u16) -> Result<(), SchedulingError> {
        let mut seen = std::collections::HashSet::new();
        for &day in &self.holiday_days {
            if !seen.insert(day) {
                return Err(SchedulingError::validation(
                    "holiday_days",
                    format!("day {day} listed twice"),
                ));
            }
        }
        self.to_hours().validate(horizon_days)
    }

    pub fn to_hours(&self) -> taktplan_solver::BusinessHours {
        taktplan_solver::BusinessHours {
            work_start_hour: self.work_start_hour,
            work_end_hour: self.work_end_hour,
            lunch_start_hour: self.lunch_start_hour,
            lunch_duration_minutes: self.lunch_duration_minutes,
            holiday_days: self.holiday_days.clone(),
            enforce: self.enforce_business_hours,
        }
    }
}

/// One job to schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolveJobRequest {
    pub job_number: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Operation sequence numbers, 1..=100, unique.
    pub task_sequences: Vec<u32>,
}

fn default_quantity() -> u32 {
    1
}

impl SolveJobRequest {
    pub fn new(job_number: impl Into<String>, task_sequences: Vec<u32>) -> Self {
        Self {
            job_number: job_number.into(),
            priority: Priority::default(),
            due_date: None,
            quantity: 1,
            customer_name: None,
            part_number: None,
            notes: None,
            task_sequences,
        }
    }

    fn validate(&self, schedule_start: DateTime<Utc>) -> Result<(), SchedulingError> {
        if self.job_number.is_empty() || self.job_number.len() > 50 {
            return Err(SchedulingError::validation("job_number", "must be 1..=50 characters"));
        }
        if !(1..=10_000).contains(&self.quantity) {
            return Err(SchedulingError::validation("quantity", "must be 1..=10000"));
        }
        if self.task_sequences.is_empty() || self.task_sequences.len() > 100 {
            return Err(SchedulingError::validation(
                "task_sequences",
                "must list 1..=100 operations",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for &sequence in &self.task_sequences {
            if !(1..=100).contains(&sequence) {
                return Err(SchedulingError::validation(
                    "task_sequences",
                    format!("sequence {sequence} outside 1..=100"),
                ));
            }
            if !seen.insert(sequence) {
                return Err(SchedulingError::validation(
                    "task_sequences",
                    format!("sequence {sequence} listed twice"),
                ));
            }
        }
        if let Some(due) = self.due_date {
            if due < schedule_start {
                return Err(SchedulingError::validation(
                    "due_date",
                    format!("job {} is due before the schedule start", self.job_number),
                ));
            }
        }
        Ok(())
    }
}

/// A complete scheduling problem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolveRequest {
    #[serde(default = "default_problem_name")]
    pub problem_name: String,
    pub schedule_start: DateTime<Utc>,
    pub jobs: Vec<SolveJobRequest>,
    /// Restrict the machine pool; `None` means all available machines.
    #[serde(default)]
    pub available_machine_ids: Option<Vec<MachineId>>,
    /// Restrict the operator pool; `None` means all available operators.
    #[serde(default)]
    pub available_operator_ids: Option<Vec<OperatorId>>,
    #[serde(default)]
    pub optimization_parameters: OptimizationParameters,
    #[serde(default)]
    pub business_constraints: BusinessConstraints,
}

fn default_problem_name() -> String {
    "Scheduling Problem".into()
}

const MAX_START_AGE_DAYS: i64 = 30;

impl SolveRequest {
    pub fn new(schedule_start: DateTime<Utc>, jobs: Vec<SolveJobRequest>) -> Self {
        Self {
            problem_name: default_problem_name(),
            schedule_start,
            jobs,
            available_machine_ids: None,
            available_operator_ids: None,
            optimization_parameters: OptimizationParameters::default(),
            business_constraints: BusinessConstraints::default(),
        }
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), SchedulingError> {
        if self.problem_name.is_empty() || self.problem_name.len() > 255 {
            return Err(SchedulingError::validation(
                "problem_name",
                "must be 1..=255 characters",
            ));
        }
        if (now - self.schedule_start).num_days() > MAX_START_AGE_DAYS {
            return Err(SchedulingError::validation(
                "schedule_start",
                "must not lie more than 30 days in the past",
            ));
        }
        if self.jobs.is_empty() || self.jobs.len() > 50 {
            return Err(SchedulingError::validation("jobs", "must list 1..=50 jobs"));
        }
        let mut numbers = std::collections::HashSet::new();
        for job in &self.jobs {
            if !numbers.insert(job.job_number.as_str()) {
                return Err(SchedulingError::validation(
                    "jobs",
                    format!("job number {} listed twice", job.job_number),
                ));
            }
            job.validate(self.schedule_start)?;
        }
        self.optimization_parameters.validate()?;
        self.business_constraints
            .validate(self.optimization_parameters.horizon_days)?;
        Ok(())
    }
}
