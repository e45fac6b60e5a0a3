//! Constraint model builder.
//!
//! Translates jobs, the operation catalogue and the resource pool into a
//! [`CpModel`]: per task, one optional interval per candidate machine
//! (exactly one is chosen), chained precedence within each job, no-overlap
//! groups per machine and operator, skill-gated operator eligibility,
//! business-hour masks, due-date terms, WIP-zone capacities and the horizon
//! bound. All times are integer minutes from the schedule start.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use taktplan_core::{
    Job, JobId, Machine, MachineId, Operation, OperationId, Operator, OperatorId, ProductionZone,
    Remediation, SchedulingError, TaskId, ZoneId, MINUTES_PER_DAY,
};

use crate::calendar::{BusinessCalendar, BusinessHours};

/// How much of a task an assigned operator must cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorCoverage {
    /// Attended machines: the whole interval.
    FullDuration,
    /// Unattended machines: only the setup prefix.
    SetupOnly,
}

/// One optional interval: this task on this candidate machine.
#[derive(Clone, Debug)]
pub struct RouteOption {
    pub machine_index: usize,
    pub machine_id: MachineId,
    /// Position in the operation's candidate list.
    pub routing_option_index: usize,
    pub setup_minutes: i64,
    pub processing_minutes: i64,
    pub attended: bool,
    pub coverage: OperatorCoverage,
    pub zone_index: Option<usize>,
    /// Operators whose skills qualify them for this machine and operation.
    pub eligible_operators: Vec<usize>,
    pub required_operators: usize,
}

impl RouteOption {
    pub const fn total_minutes(&self) -> i64 {
        self.setup_minutes + self.processing_minutes
    }

    /// Minutes an operator must be present when this option is chosen.
    pub const fn coverage_minutes(&self) -> i64 {
        match self.coverage {
            OperatorCoverage::FullDuration => self.setup_minutes + self.processing_minutes,
            OperatorCoverage::SetupOnly => self.setup_minutes,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelTask {
    pub task_id: TaskId,
    pub job_index: usize,
    pub sequence: u32,
    pub operation_id: OperationId,
    pub options: Vec<RouteOption>,
    pub predecessors: Vec<usize>,
    pub successors: Vec<usize>,
}

impl ModelTask {
    pub fn min_total_minutes(&self) -> i64 {
        self.options.iter().map(RouteOption::total_minutes).min().unwrap_or(0)
    }
}

#[derive(Clone, Debug)]
pub struct ModelJob {
    pub job_id: JobId,
    pub job_number: String,
    pub priority_weight: i64,
    pub due_minutes: Option<i64>,
    pub release_minutes: i64,
    pub task_indices: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct ModelMachine {
    pub machine_id: MachineId,
    pub code: String,
    pub capacity: u32,
}

#[derive(Clone, Debug)]
pub struct ModelOperator {
    pub operator_id: OperatorId,
    /// Availability segments in horizon offsets: daily shift minus lunch,
    /// intersected with the business calendar when enforced.
    pub segments: Vec<(i64, i64)>,
    pub rate_per_minute: Decimal,
}

impl ModelOperator {
    /// Whether `[start, start+len)` lies inside one availability segment.
    pub fn covers(&self, start: i64, len: i64) -> bool {
        if len == 0 {
            return true;
        }
        self.segments.iter().any(|&(s, e)| s <= start && start + len <= e)
    }

    /// Earliest `t >= earliest` at which a `len`-minute span is covered.
    pub fn next_fit(&self, earliest: i64, len: i64) -> Option<i64> {
        if len == 0 {
            return Some(earliest);
        }
        self.segments
            .iter()
            .filter(|&&(s, e)| e - s >= len)
            .filter_map(|&(s, e)| {
                let candidate = earliest.max(s);
                (candidate + len <= e).then_some(candidate)
            })
            .min()
    }
}

#[derive(Clone, Debug)]
pub struct ModelZone {
    pub zone_id: ZoneId,
    pub code: String,
    pub wip_limit: u32,
}

/// The built constraint model.
#[derive(Clone, Debug)]
pub struct CpModel {
    pub problem_name: String,
    pub schedule_start: DateTime<Utc>,
    pub horizon_minutes: i64,
    /// When set, makespan is a hard cap instead of an objective-only term.
    pub makespan_cap: Option<i64>,
    pub jobs: Vec<ModelJob>,
    pub tasks: Vec<ModelTask>,
    pub machines: Vec<ModelMachine>,
    pub operators: Vec<ModelOperator>,
    pub zones: Vec<ModelZone>,
    pub calendar: BusinessCalendar,
}

impl CpModel {
    /// Number of optional intervals, the size measure for parameter tuning.
    pub fn interval_count(&self) -> usize {
        self.tasks.iter().map(|t| t.options.len()).sum()
    }

    pub fn has_precedence(&self) -> bool {
        self.tasks.iter().any(|t| !t.predecessors.is_empty())
    }

    pub fn has_resources(&self) -> bool {
        !self.operators.is_empty() || !self.zones.is_empty()
    }

    pub fn has_time_windows(&self) -> bool {
        self.calendar.is_enforced()
    }

    pub fn instant_at(&self, offset_minutes: i64) -> DateTime<Utc> {
        self.schedule_start + chrono::Duration::minutes(offset_minutes)
    }
}

/// Builds a [`CpModel`] from domain objects.
pub struct ModelBuilder<'a> {
    pub problem_name: String,
    pub schedule_start: DateTime<Utc>,
    pub horizon_days: u16,
    pub hours: BusinessHours,
    pub jobs: &'a [Job],
    pub operations: &'a HashMap<OperationId, Operation>,
    pub machines: &'a [Machine],
    pub operators: &'a [Operator],
    pub zones: &'a [ProductionZone],
    pub makespan_is_hard: bool,
}

impl<'a> ModelBuilder<'a> {
    pub fn build(self) -> Result<CpModel, SchedulingError> {
        if self.jobs.is_empty() {
            return Err(SchedulingError::validation("jobs", "at least one job is required"));
        }
        self.hours.validate(self.horizon_days)?;

        let horizon_minutes = i64::from(self.horizon_days) * MINUTES_PER_DAY;
        let calendar = BusinessCalendar::build(&self.hours, self.horizon_days, self.schedule_start);

        for job in self.jobs {
            if job.due_date < self.schedule_start {
                return Err(SchedulingError::validation(
                    "due_date",
                    format!("job {} is due before the schedule start", job.job_number),
                ));
            }
        }

        let machine_index: HashMap<MachineId, usize> =
            self.machines.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        let zone_index: HashMap<ZoneId, usize> =
            self.zones.iter().enumerate().map(|(i, z)| (z.id, i)).collect();

        let model_machines: Vec<ModelMachine> = self
            .machines
            .iter()
            .map(|m| ModelMachine { machine_id: m.id, code: m.code.clone(), capacity: 1 })
            .collect();

        let model_operators = self.build_operator_availability(&calendar, horizon_minutes);

        let model_zones: Vec<ModelZone> = self
            .zones
            .iter()
            .map(|z| ModelZone { zone_id: z.id, code: z.code.clone(), wip_limit: z.wip_limit })
            .collect();

        let as_of = self.schedule_start.date_naive();
        let mut model_jobs = Vec::with_capacity(self.jobs.len());
        let mut model_tasks: Vec<ModelTask> = Vec::new();

        for (job_index, job) in self.jobs.iter().enumerate() {
            let release_minutes = job
                .release_date
                .map(|r| (r - self.schedule_start).num_minutes().max(0))
                .unwrap_or(0);
            let due_minutes = Some((job.due_date - self.schedule_start).num_minutes());

            let mut task_indices: Vec<usize> = Vec::with_capacity(job.tasks().len());
            for task in job.tasks() {
                let operation = self.operations.get(&task.operation_id).ok_or_else(|| {
                    SchedulingError::not_found("operation", task.operation_id)
                })?;

                let options =
                    self.build_route_options(job, operation, &machine_index, &zone_index, as_of)?;
                if options.is_empty() {
                    return Err(SchedulingError::NoFeasibleSolution {
                        reason: "no_candidate_machine",
                        message: format!(
                            "operation {} of job {} has no candidate machine in the resource pool",
                            operation.code, job.job_number
                        ),
                        conflicting_jobs: vec![job.job_number.clone()],
                        suggestions: vec![Remediation::ExtendHorizon],
                    });
                }

                let index = model_tasks.len();
                let predecessors = task_indices.last().copied().map(|p| vec![p]).unwrap_or_default();
                if let Some(&prev) = task_indices.last() {
                    model_tasks[prev].successors.push(index);
                }
                model_tasks.push(ModelTask {
                    task_id: task.id,
                    job_index,
                    sequence: task.sequence_in_job,
                    operation_id: task.operation_id,
                    options,
                    predecessors,
                    successors: Vec::new(),
                });
                task_indices.push(index);
            }

            model_jobs.push(ModelJob {
                job_id: job.id,
                job_number: job.job_number.clone(),
                priority_weight: job.priority.weight(),
                due_minutes,
                release_minutes,
                task_indices,
            });
        }

        let model = CpModel {
            problem_name: self.problem_name,
            schedule_start: self.schedule_start,
            horizon_minutes,
            makespan_cap: self.makespan_is_hard.then_some(horizon_minutes),
            jobs: model_jobs,
            tasks: model_tasks,
            machines: model_machines,
            operators: model_operators,
            zones: model_zones,
            calendar,
        };

        tracing::debug!(
            tasks = model.tasks.len(),
            intervals = model.interval_count(),
            machines = model.machines.len(),
            operators = model.operators.len(),
            "constraint model built"
        );
        Ok(model)
    }

    fn build_route_options(
        &self,
        job: &Job,
        operation: &Operation,
        machine_index: &HashMap<MachineId, usize>,
        zone_index: &HashMap<ZoneId, usize>,
        as_of: chrono::NaiveDate,
    ) -> Result<Vec<RouteOption>, SchedulingError> {
        let mut options = Vec::new();
        for (routing_option_index, routing) in operation.routing_options.iter().enumerate() {
            let Some(&machine_idx) = machine_index.get(&routing.machine_id) else {
                continue; // machine not in the resource pool
            };
            let machine = &self.machines[machine_idx];

            let processing_minutes = scaled_processing(
                routing.processing_per_unit.as_minutes(),
                job.quantity,
                machine.efficiency_factor,
            )?;
            let setup_minutes = routing.setup.as_minutes();
            let attended = machine.is_attended();
            let coverage = if attended {
                OperatorCoverage::FullDuration
            } else {
                OperatorCoverage::SetupOnly
            };

            // Skill gate: the machine's requirements plus the operation's.
            let mut requirements = machine.required_skills.clone();
            requirements.extend(operation.required_skills.iter().cloned());
            let eligible_operators: Vec<usize> = self
                .operators
                .iter()
                .enumerate()
                .filter(|(_, o)| o.is_active && o.satisfies_all(&requirements, as_of))
                .map(|(i, _)| i)
                .collect();

            let total = setup_minutes + processing_minutes;
            let needs_coverage = match coverage {
                OperatorCoverage::FullDuration => total > 0,
                OperatorCoverage::SetupOnly => setup_minutes > 0,
            };
            let required_operators =
                if needs_coverage { usize::from(operation.required_operator_count) } else { 0 };

            options.push(RouteOption {
                machine_index: machine_idx,
                machine_id: routing.machine_id,
                routing_option_index,
                setup_minutes,
                processing_minutes,
                attended,
                coverage,
                zone_index: machine.production_zone.and_then(|z| zone_index.get(&z).copied()),
                eligible_operators,
                required_operators,
            });
        }
        Ok(options)
    }

    /// Per-operator availability segments: shift minus lunch each horizon
    /// day, intersected with the business calendar when it is enforced.
    fn build_operator_availability(
        &self,
        calendar: &BusinessCalendar,
        horizon_minutes: i64,
    ) -> Vec<ModelOperator> {
        use taktplan_core::TimeWindow;

        let start_mod = {
            use chrono::Timelike;
            i64::from(self.schedule_start.hour()) * 60 + i64::from(self.schedule_start.minute())
        };

        self.operators
            .iter()
            .map(|operator| {
                let (shift_start, shift_end) = match operator.shift {
                    TimeWindow::Relative { start_minute, end_minute } => {
                        (i64::from(start_minute), i64::from(end_minute))
                    }
                    TimeWindow::Absolute { .. } => (0, MINUTES_PER_DAY),
                };
                let (lunch_start, lunch_end) = match operator.lunch {
                    TimeWindow::Relative { start_minute, end_minute } => {
                        (i64::from(start_minute), i64::from(end_minute))
                    }
                    TimeWindow::Absolute { .. } => (0, 0),
                };

                let mut daily: Vec<(i64, i64)> = Vec::new();
                if lunch_end <= shift_start || lunch_start >= shift_end {
                    daily.push((shift_start, shift_end));
                } else {
                    if shift_start < lunch_start {
                        daily.push((shift_start, lunch_start));
                    }
                    if lunch_end < shift_end {
                        daily.push((lunch_end, shift_end));
                    }
                }

                let mut segments = Vec::new();
                let day_count = horizon_minutes / MINUTES_PER_DAY + 2;
                for day in -1..day_count {
                    for &(s, e) in &daily {
                        let seg = (
                            (day * MINUTES_PER_DAY + s - start_mod).max(0),
                            (day * MINUTES_PER_DAY + e - start_mod).min(horizon_minutes),
                        );
                        if seg.0 >= seg.1 {
                            continue;
                        }
                        if calendar.is_enforced() {
                            // Clip against attended calendar segments.
                            for &(cs, ce) in calendar.segments() {
                                let clipped = (seg.0.max(cs), seg.1.min(ce));
                                if clipped.0 < clipped.1 {
                                    segments.push(clipped);
                                }
                            }
                        } else {
                            segments.push(seg);
                        }
                    }
                }
                segments.sort_unstable();
                segments.dedup();

                ModelOperator {
                    operator_id: operator.id,
                    segments,
                    rate_per_minute: operator.hourly_rate / Decimal::new(60, 0),
                }
            })
            .collect()
    }
}

/// `ceil(per_unit * quantity / efficiency)` in whole minutes.
fn scaled_processing(
    per_unit_minutes: i64,
    quantity: u32,
    efficiency: Decimal,
) -> Result<i64, SchedulingError> {
    if efficiency <= Decimal::ZERO {
        return Err(SchedulingError::validation("efficiency_factor", "must be positive"));
    }
    let raw = Decimal::from(per_unit_minutes) * Decimal::from(quantity) / efficiency;
    raw.ceil()
        .to_i64()
        .ok_or_else(|| SchedulingError::validation("processing_time", "overflows minute range"))
}
