//! The scheduling service: request in, optimized schedule and events out.
//!
//! One solve call assembles the domain from the repositories, builds the
//! constraint model, drives the hierarchical optimizer, decodes the winning
//! solution into assignments, annotates the critical path, walks the
//! schedule through its state machine and records the performance profile.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use taktplan_core::{
    DomainEvent, Duration, EventBus, EventPayload, Job, JobRepository, MachineId,
    MachineRepository, Operation, OperationId, Operator, OperatorId, OperatorRepository,
    ProductionZone, Schedule, ScheduleAssignment, ScheduleLifecycle, ScheduleRepository,
    SchedulingError, SolveSummary, TaskId, TaskRepository, TimeWindow,
};
use taktplan_solver::{
    bottleneck_machine, complete_partial, decode_assignments, detect_resource_conflicts,
    hierarchy, CachedSolution, CallbackSignal, CancelToken, ConfigOverrides,
    CriticalPathAnalyzer, HierarchicalOutcome, HierarchyParams, ModelBuilder, PathTask,
    PerformanceRegistry, ProblemFingerprint, ProblemSignature, ResourceInterval, ResourceKind,
    SolveProgress, SolverConfig, SolverPerformanceProfile,
};

use crate::config::EngineConfig;
use crate::request::{OptimizationParameters, SolveRequest};
use crate::response::{JobSolution, SolutionMetrics, SolveResponse, TaskAssignmentDto};

/// Operation catalogue: maps request sequence numbers to operation types.
#[derive(Default)]
pub struct OperationCatalog {
    operations: HashMap<OperationId, Operation>,
    by_sequence: HashMap<u32, OperationId>,
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under a task sequence number.
    pub fn register(&mut self, sequence: u32, operation: Operation) {
        self.by_sequence.insert(sequence, operation.id);
        self.operations.insert(operation.id, operation);
    }

    pub fn by_sequence(&self, sequence: u32) -> Option<&Operation> {
        self.by_sequence.get(&sequence).and_then(|id| self.operations.get(id))
    }

    pub fn operations(&self) -> &HashMap<OperationId, Operation> {
        &self.operations
    }
}

/// The engine facade over repositories, solver and event bus.
pub struct SchedulingService {
    jobs: Box<dyn JobRepository>,
    tasks: Box<dyn TaskRepository>,
    machines: Box<dyn MachineRepository>,
    operators: Box<dyn OperatorRepository>,
    schedules: Box<dyn ScheduleRepository>,
    catalogue: OperationCatalog,
    zones: Vec<ProductionZone>,
    lifecycle: ScheduleLifecycle,
    analyzer: CriticalPathAnalyzer,
    perf: Arc<PerformanceRegistry>,
    config: EngineConfig,
}

impl SchedulingService {
    pub fn new(
        jobs: Box<dyn JobRepository>,
        tasks: Box<dyn TaskRepository>,
        machines: Box<dyn MachineRepository>,
        operators: Box<dyn OperatorRepository>,
        schedules: Box<dyn ScheduleRepository>,
        catalogue: OperationCatalog,
        zones: Vec<ProductionZone>,
        config: EngineConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::with_capacity(config.event_buffer_size));
        let perf = Arc::new(PerformanceRegistry::new(config.warm_cache_size, config.auto_tune));
        Self {
            jobs,
            tasks,
            machines,
            operators,
            schedules,
            catalogue,
            zones,
            lifecycle: ScheduleLifecycle::new(bus),
            analyzer: CriticalPathAnalyzer::new(),
            perf,
            config,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.lifecycle.bus()
    }

    pub fn lifecycle(&self) -> &ScheduleLifecycle {
        &self.lifecycle
    }

    pub fn performance(&self) -> &Arc<PerformanceRegistry> {
        &self.perf
    }

    pub fn schedule_repository(&self) -> &dyn ScheduleRepository {
        self.schedules.as_ref()
    }

    pub fn job_repository(&self) -> &dyn JobRepository {
        self.jobs.as_ref()
    }

    /// Solver parameters seeded from the engine's operational defaults.
    pub fn default_parameters(&self) -> OptimizationParameters {
        OptimizationParameters {
            max_time_seconds: self.config.default_budget_seconds,
            num_workers: self.config.default_workers,
            ..OptimizationParameters::default()
        }
    }

    /// Run a solve to completion.
    pub fn solve(&mut self, request: &SolveRequest) -> SolveResponse {
        self.solve_with_cancel(request, &CancelToken::new())
    }

    /// Run a solve under a caller-owned cancel token.
    pub fn solve_with_cancel(
        &mut self,
        request: &SolveRequest,
        cancel: &CancelToken,
    ) -> SolveResponse {
        let started = Instant::now();
        match self.solve_inner(request, cancel) {
            Ok(mut response) => {
                response.processing_time_seconds = started.elapsed().as_secs_f64();
                response
            }
            Err(error) => {
                tracing::warn!(code = error.code(), %error, "solve failed");
                SolveResponse::failure(
                    request.problem_name.clone(),
                    &error,
                    started.elapsed().as_secs_f64(),
                )
            }
        }
    }

    fn solve_inner(
        &mut self,
        request: &SolveRequest,
        cancel: &CancelToken,
    ) -> Result<SolveResponse, SchedulingError> {
        request.validate(Utc::now())?;
        let params = &request.optimization_parameters;
        let schedule_start = request.schedule_start;
        let horizon_end = schedule_start + chrono::Duration::days(i64::from(params.horizon_days));

        // Resource pool.
        let machines = match &request.available_machine_ids {
            Some(ids) => ids
                .iter()
                .map(|&id| self.machines.get_by_id(id))
                .collect::<Result<Vec<_>, _>>()?,
            None => self.machines.find_available()?,
        };
        let operators = match &request.available_operator_ids {
            Some(ids) => ids
                .iter()
                .map(|&id| self.operators.get_by_id(id))
                .collect::<Result<Vec<_>, _>>()?,
            None => self.operators.find_available()?,
        };

        // Domain jobs from the request and the operation catalogue.
        let mut domain_jobs = self.build_jobs(request, horizon_end)?;

        let model = ModelBuilder {
            problem_name: request.problem_name.clone(),
            schedule_start,
            horizon_days: params.horizon_days,
            hours: request.business_constraints.to_hours(),
            jobs: &domain_jobs,
            operations: self.catalogue.operations(),
            machines: &machines,
            operators: &operators,
            zones: &self.zones,
            makespan_is_hard: params.makespan_is_hard_cap,
        }
        .build()?;

        // Solver configuration: learned pattern or size table, caller wins.
        let signature = ProblemSignature::of(&model);
        let mut solver_config = self.perf.best_config(signature).unwrap_or_else(|| {
            let mut base = SolverConfig::for_model(&model);
            base.relative_gap_limit = base.relative_gap_limit.max(self.config.default_gap_limit);
            base
        });
        solver_config.apply_overrides(&ConfigOverrides {
            max_time_seconds: Some(params.max_time_seconds),
            num_search_workers: Some(params.num_workers),
            ..ConfigOverrides::default()
        });
        solver_config.validate()?;

        // Warm start from the cache of earlier, fingerprint-identical solves.
        let fingerprint = ProblemFingerprint::of(&model);
        let hint = if solver_config.use_warm_start {
            self.perf.warm_start(fingerprint).and_then(|cached| {
                let partial = cached.adapt(&model);
                complete_partial(&model, &partial)
            })
        } else {
            None
        };
        if hint.is_some() {
            tracing::debug!("warm-start hint adapted from cache");
        }

        let hierarchy_params = HierarchyParams {
            enabled: params.enable_hierarchical_optimization,
            primary_weight: i64::from(params.primary_objective_weight),
            cost_tolerance: params.cost_optimization_tolerance,
        };

        let solve_started_at = Utc::now();
        let mut callback = |progress: &SolveProgress| {
            tracing::debug!(
                objective = progress.objective_value,
                bound = progress.best_bound,
                solutions = progress.solutions_found,
                seconds = progress.wall_time_seconds,
                "incumbent improved"
            );
            CallbackSignal::Continue
        };
        let outcome = hierarchy::optimize(
            &model,
            &solver_config,
            &hierarchy_params,
            hint.as_ref(),
            cancel,
            &mut callback,
        )?;

        let mut assignments = decode_assignments(&model, &outcome.solution)?;

        // Critical path over precedence plus schedule-induced resource edges.
        self.annotate_critical_path(&model, &mut assignments)?;

        // Sanity scan; a clean solve never trips this.
        let intervals = resource_intervals(&model, &assignments, &machines);
        let conflicts = detect_resource_conflicts(&intervals);

        // Bottleneck flag on the machine carrying the most critical minutes.
        let critical_ids: HashSet<TaskId> = assignments
            .iter()
            .filter(|a| a.is_critical_path)
            .map(|a| a.task_id)
            .collect();
        if let Some(bottleneck) = bottleneck_machine(&intervals, &critical_ids) {
            if let Ok(mut machine) = self.machines.get_by_id(bottleneck) {
                machine.is_bottleneck = true;
                self.machines.save(&machine)?;
            }
        }

        // Operator cost at per-minute granularity.
        let total_cost = operator_cost(&assignments, &operators, &machines);

        // Schedule lifecycle: draft, optimize, install, leave in draft.
        let horizon_window = TimeWindow::absolute(schedule_start, horizon_end)
            .map_err(|e| SchedulingError::validation("planning_horizon", e.to_string()))?;
        let mut schedule = self.lifecycle.create_schedule(
            request.problem_name.clone(),
            horizon_window,
            domain_jobs.iter().map(|j| j.id).collect(),
            None,
        );
        self.lifecycle.begin_optimization(&mut schedule)?;
        let summary = SolveSummary {
            makespan: Duration::minutes(outcome.evaluation.makespan),
            total_cost,
            solver_status: outcome.status.as_str().to_string(),
            solve_seconds: outcome.stats.wall_time_seconds,
        };
        self.lifecycle
            .complete_optimization(&mut schedule, assignments.clone(), &summary)?;
        self.bus().publish_sync(DomainEvent::new(
            schedule.id,
            EventPayload::CriticalPathChanged {
                schedule_id: schedule.id,
                task_ids: critical_ids.iter().copied().collect(),
            },
        ));
        for conflict in &conflicts {
            self.lifecycle.record_conflict(
                schedule.id,
                format!("{:?} {}", conflict.kind, conflict.resource_id),
                vec![conflict.first_task, conflict.second_task],
            );
        }

        // Push placements back onto the owned tasks and persist everything.
        self.apply_to_jobs(&mut domain_jobs, &assignments)?;
        self.schedules.save(&schedule)?;

        // Learn from this solve.
        let profile = SolverPerformanceProfile::from_stats(
            &model,
            &solver_config,
            outcome.status,
            solve_started_at,
            &outcome.stats,
        );
        let cached = CachedSolution::capture(
            &model,
            &outcome.solution,
            outcome.evaluation.primary_value,
        );
        self.perf.record(profile, signature, fingerprint, Some(cached));

        Ok(self.build_response(
            request,
            &model,
            &outcome,
            &assignments,
            total_cost,
            &schedule,
            &machines,
            &operators,
        ))
    }

    fn build_jobs(
        &self,
        request: &SolveRequest,
        horizon_end: chrono::DateTime<Utc>,
    ) -> Result<Vec<Job>, SchedulingError> {
        let mut jobs = Vec::with_capacity(request.jobs.len());
        let mut created_events = Vec::new();
        for job_request in &request.jobs {
            let due = job_request.due_date.unwrap_or(horizon_end);
            let mut job = Job::new(job_request.job_number.clone(), due)
                .priority(job_request.priority)
                .quantity(job_request.quantity);
            job.customer_name = job_request.customer_name.clone();
            job.part_number = job_request.part_number.clone();
            job.notes = job_request.notes.clone();

            let mut sequences = job_request.task_sequences.clone();
            sequences.sort_unstable();
            for sequence in sequences {
                let operation = self.catalogue.by_sequence(sequence).ok_or_else(|| {
                    SchedulingError::not_found("operation", format!("sequence {sequence}"))
                })?;
                job.add_task(taktplan_core::Task::new(job.id, operation.id, sequence))?;
            }
            created_events.push(DomainEvent::new(
                job.id,
                EventPayload::JobCreated { job_id: job.id, job_number: job.job_number.clone() },
            ));
            jobs.push(job);
        }
        self.bus().publish_all_sync(created_events);
        Ok(jobs)
    }

    fn annotate_critical_path(
        &self,
        model: &taktplan_solver::CpModel,
        assignments: &mut [ScheduleAssignment],
    ) -> Result<(), SchedulingError> {
        let path_tasks: Vec<PathTask> = model
            .tasks
            .iter()
            .zip(assignments.iter())
            .map(|(task, assignment)| PathTask {
                task_id: task.task_id,
                duration_minutes: assignment.total_duration().as_minutes(),
            })
            .collect();

        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (index, task) in model.tasks.iter().enumerate() {
            for &pred in &task.predecessors {
                edges.push((pred, index));
            }
        }
        // Resource-induced edges: consecutive assignments on one machine or
        // operator chain through the schedule as firmly as precedence does.
        // Operator chains only cover attended tasks; unattended processing
        // overlaps freely and must not be serialized in the analysis.
        let mut by_machine: HashMap<MachineId, Vec<usize>> = HashMap::new();
        let mut by_operator: HashMap<OperatorId, Vec<usize>> = HashMap::new();
        for (index, (task, assignment)) in model.tasks.iter().zip(assignments.iter()).enumerate() {
            by_machine.entry(assignment.machine_id).or_default().push(index);
            let attended = task
                .options
                .iter()
                .find(|o| o.machine_id == assignment.machine_id)
                .is_some_and(|o| o.attended);
            if attended {
                for &operator in &assignment.operator_ids {
                    by_operator.entry(operator).or_default().push(index);
                }
            }
        }
        for group in by_machine.values_mut().chain(by_operator.values_mut()) {
            group.sort_by_key(|&i| assignments[i].start);
            for pair in group.windows(2) {
                edges.push((pair[0], pair[1]));
            }
        }

        let analysis = self
            .analyzer
            .analyze(&path_tasks, &edges)
            .map_err(|e| SchedulingError::Optimization { message: e.to_string() })?;
        for (index, assignment) in assignments.iter_mut().enumerate() {
            assignment.is_critical_path = analysis.critical[index];
        }
        Ok(())
    }

    fn apply_to_jobs(
        &mut self,
        jobs: &mut [Job],
        assignments: &[ScheduleAssignment],
    ) -> Result<(), SchedulingError> {
        let by_task: HashMap<TaskId, &ScheduleAssignment> =
            assignments.iter().map(|a| (a.task_id, a)).collect();
        for job in jobs.iter_mut() {
            for task in job.tasks_mut() {
                let Some(assignment) = by_task.get(&task.id) else { continue };
                task.setup_duration = assignment.setup_duration;
                task.planned_duration = assignment.processing_duration;
                task.apply_assignment(
                    assignment.start,
                    assignment.end,
                    assignment.machine_id,
                    assignment.operator_ids.clone(),
                )?;
                task.is_critical_path = assignment.is_critical_path;
                self.tasks.save(task)?;
            }
            self.jobs.save(job)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_response(
        &self,
        request: &SolveRequest,
        model: &taktplan_solver::CpModel,
        outcome: &HierarchicalOutcome,
        assignments: &[ScheduleAssignment],
        total_cost: Decimal,
        schedule: &Schedule,
        machines: &[taktplan_core::Machine],
        operators: &[Operator],
    ) -> SolveResponse {
        let eval = &outcome.evaluation;
        let makespan = eval.makespan;

        // Per-job rollups in request order.
        let mut job_solutions = Vec::with_capacity(request.jobs.len());
        let mut jobs_on_time = 0;
        let mut jobs_late = 0;
        let mut critical_path_jobs = 0;
        for (job_index, job_request) in request.jobs.iter().enumerate() {
            let model_job = &model.jobs[job_index];
            let mut dtos = Vec::with_capacity(model_job.task_indices.len());
            let mut completion = request.schedule_start;
            let mut processing_total = 0;
            let mut any_critical = false;
            for &task_index in &model_job.task_indices {
                let assignment = &assignments[task_index];
                completion = completion.max(assignment.end);
                processing_total += assignment.processing_duration.as_minutes();
                any_critical |= assignment.is_critical_path;
                dtos.push(TaskAssignmentDto {
                    job_number: job_request.job_number.clone(),
                    operation_sequence: model.tasks[task_index].sequence,
                    planned_start: assignment.start,
                    planned_end: assignment.end,
                    setup_minutes: assignment.setup_duration.as_minutes(),
                    processing_minutes: assignment.processing_duration.as_minutes(),
                    machine_id: assignment.machine_id,
                    operator_ids: assignment.operator_ids.clone(),
                    is_critical_path: assignment.is_critical_path,
                    routing_option: assignment.routing_option_index,
                });
            }
            let tardiness = job_request
                .due_date
                .map(|due| (completion - due).num_minutes().max(0))
                .unwrap_or(0);
            if tardiness > 0 {
                jobs_late += 1;
            } else {
                jobs_on_time += 1;
            }
            if any_critical {
                critical_path_jobs += 1;
            }
            job_solutions.push(JobSolution {
                job_number: job_request.job_number.clone(),
                completion_time: completion,
                due_date: job_request.due_date,
                tardiness_minutes: tardiness,
                total_processing_minutes: processing_total,
                is_on_time: tardiness == 0,
                assignments: dtos,
            });
        }

        let busy_minutes: i64 =
            assignments.iter().map(|a| a.total_duration().as_minutes()).sum();
        let coverage_minutes: i64 = model
            .tasks
            .iter()
            .zip(assignments.iter())
            .map(|(task, assignment)| {
                task.options
                    .iter()
                    .find(|o| o.machine_id == assignment.machine_id)
                    .map_or(0, |o| o.coverage_minutes() * assignment.operator_ids.len() as i64)
            })
            .sum();

        let utilization = |used: i64, pool: usize| {
            if makespan == 0 || pool == 0 {
                0.0
            } else {
                (used as f64 / (makespan as f64 * pool as f64) * 100.0).clamp(0.0, 100.0)
            }
        };

        let metrics = SolutionMetrics {
            makespan_minutes: makespan,
            total_tardiness_minutes: eval.total_tardiness,
            total_operator_cost: total_cost,
            machine_utilization_pct: utilization(busy_minutes, machines.len()),
            operator_utilization_pct: utilization(coverage_minutes, operators.len()),
            jobs_on_time,
            jobs_late,
            critical_path_jobs,
            solve_time_seconds: outcome.stats.wall_time_seconds,
            solver_status: outcome.status.as_str().to_string(),
            gap_pct: Some(outcome.stats.gap * 100.0),
        };

        SolveResponse {
            problem_name: request.problem_name.clone(),
            status: outcome.status,
            success: true,
            message: Some(format!("{} solution found", outcome.status)),
            jobs: job_solutions,
            metrics: Some(metrics),
            schedule_id: Some(schedule.id),
            schedule_start: Some(request.schedule_start),
            schedule_end: Some(request.schedule_start + chrono::Duration::minutes(makespan)),
            total_jobs: request.jobs.len(),
            total_tasks: assignments.len(),
            error_code: None,
            error_details: Default::default(),
            processing_time_seconds: 0.0,
        }
    }
}

/// Machine and operator booked intervals for the conflict scan, in minute
/// offsets from the schedule start.
fn resource_intervals(
    model: &taktplan_solver::CpModel,
    assignments: &[ScheduleAssignment],
    machines: &[taktplan_core::Machine],
) -> Vec<ResourceInterval> {
    let attended: HashMap<MachineId, bool> =
        machines.iter().map(|m| (m.id, m.is_attended())).collect();
    let mut intervals = Vec::new();
    for assignment in assignments {
        let start = (assignment.start - model.schedule_start).num_minutes();
        let end = (assignment.end - model.schedule_start).num_minutes();
        intervals.push(ResourceInterval {
            kind: ResourceKind::Machine,
            resource_id: assignment.machine_id,
            task_id: assignment.task_id,
            start,
            end,
        });
        let coverage_end = if attended.get(&assignment.machine_id).copied().unwrap_or(true) {
            end
        } else {
            start + assignment.setup_duration.as_minutes()
        };
        for &operator in &assignment.operator_ids {
            if coverage_end > start {
                intervals.push(ResourceInterval {
                    kind: ResourceKind::Operator,
                    resource_id: operator,
                    task_id: assignment.task_id,
                    start,
                    end: coverage_end,
                });
            }
        }
    }
    intervals
}

/// Total operator cost: per-minute rate times covered minutes.
fn operator_cost(
    assignments: &[ScheduleAssignment],
    operators: &[Operator],
    machines: &[taktplan_core::Machine],
) -> Decimal {
    let rates: HashMap<OperatorId, Decimal> = operators
        .iter()
        .map(|o| (o.id, o.hourly_rate / Decimal::new(60, 0)))
        .collect();
    let attended: HashMap<MachineId, bool> =
        machines.iter().map(|m| (m.id, m.is_attended())).collect();

    let mut total = Decimal::ZERO;
    for assignment in assignments {
        let coverage = if attended.get(&assignment.machine_id).copied().unwrap_or(true) {
            assignment.total_duration().as_minutes()
        } else {
            assignment.setup_duration.as_minutes()
        };
        for operator in &assignment.operator_ids {
            if let Some(rate) = rates.get(operator) {
                total += *rate * Decimal::from(coverage);
            }
        }
    }
    total
}
