//! The solve response: assignments, per-job rollups and solution metrics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use taktplan_core::{MachineId, OperatorId, ScheduleId, SchedulingError};
use taktplan_solver::SolveStatus;

/// One task's placement as returned to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignmentDto {
    pub job_number: String,
    pub operation_sequence: u32,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub setup_minutes: i64,
    pub processing_minutes: i64,
    pub machine_id: MachineId,
    pub operator_ids: Vec<OperatorId>,
    pub is_critical_path: bool,
    pub routing_option: usize,
}

/// Per-job rollup of the solution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSolution {
    pub job_number: String,
    pub completion_time: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub tardiness_minutes: i64,
    pub total_processing_minutes: i64,
    pub is_on_time: bool,
    pub assignments: Vec<TaskAssignmentDto>,
}

/// Whole-solution quality metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolutionMetrics {
    pub makespan_minutes: i64,
    pub total_tardiness_minutes: i64,
    pub total_operator_cost: Decimal,
    pub machine_utilization_pct: f64,
    pub operator_utilization_pct: f64,
    pub jobs_on_time: usize,
    pub jobs_late: usize,
    pub critical_path_jobs: usize,
    pub solve_time_seconds: f64,
    pub solver_status: String,
    pub gap_pct: Option<f64>,
}

/// Complete response of one solve call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub problem_name: String,
    pub status: SolveStatus,
    pub success: bool,
    pub message: Option<String>,
    pub jobs: Vec<JobSolution>,
    pub metrics: Option<SolutionMetrics>,
    pub schedule_id: Option<ScheduleId>,
    pub schedule_start: Option<DateTime<Utc>>,
    pub schedule_end: Option<DateTime<Utc>>,
    pub total_jobs: usize,
    pub total_tasks: usize,
    pub error_code: Option<String>,
    pub error_details: BTreeMap<String, String>,
    pub processing_time_seconds: f64,
}

impl SolveResponse {
    /// Failure response from an engine error, with its stable code and
    /// details map.
    pub fn failure(
        problem_name: impl Into<String>,
        error: &SchedulingError,
        processing_time_seconds: f64,
    ) -> Self {
        let status = match error {
            SchedulingError::NoFeasibleSolution { .. } => SolveStatus::Infeasible,
            SchedulingError::OptimizationTimeout { .. } => SolveStatus::Timeout,
            _ => SolveStatus::Error,
        };
        Self {
            problem_name: problem_name.into(),
            status,
            success: false,
            message: Some(error.to_string()),
            jobs: Vec::new(),
            metrics: None,
            schedule_id: None,
            schedule_start: None,
            schedule_end: None,
            total_jobs: 0,
            total_tasks: 0,
            error_code: Some(error.code().to_string()),
            error_details: error.details(),
            processing_time_seconds,
        }
    }
}
