//! Driver and hierarchy behavior over models built with the real builder.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use taktplan_core::{
    AutomationLevel, Duration, Job, Machine, Operation, OperationId, Operator, OperatorSkill,
    Priority, RoutingOption, SkillLevel, SkillRequirement, Task,
};
use taktplan_solver::{
    decode_assignments, hierarchy, BusinessHours, CallbackSignal, CancelToken, CpModel,
    HierarchyParams, ModelBuilder, ObjectiveSpec, SolveStatus, SolverConfig, SolverDriver,
};

fn monday_8am() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 3, 8, 0, 0).unwrap()
}

struct Shop {
    jobs: Vec<Job>,
    operations: HashMap<OperationId, Operation>,
    machines: Vec<Machine>,
    operators: Vec<Operator>,
}

impl Shop {
    fn new() -> Self {
        Self {
            jobs: Vec::new(),
            operations: HashMap::new(),
            machines: Vec::new(),
            operators: Vec::new(),
        }
    }

    fn machine(&mut self) -> taktplan_core::MachineId {
        let machine = Machine::new(format!("M{}", self.machines.len() + 1), AutomationLevel::Attended)
            .requires_skill(SkillRequirement::new("CNC", SkillLevel::Basic));
        let id = machine.id;
        self.machines.push(machine);
        id
    }

    fn operator(&mut self) {
        let operator = Operator::new(
            format!("E{}", self.operators.len() + 1),
            format!("Operator {}", self.operators.len() + 1),
        )
        .skill("CNC", OperatorSkill::new(SkillLevel::Advanced));
        self.operators.push(operator);
    }

    fn chain_job(&mut self, number: &str, durations: &[i64], machine: taktplan_core::MachineId) {
        let mut job = Job::new(number, monday_8am() + chrono::Duration::days(7))
            .priority(Priority::Normal);
        for (i, &minutes) in durations.iter().enumerate() {
            let operation = Operation::new(
                format!("{number}-OP{}", (i + 1) * 10),
                "op",
            )
            .routing(RoutingOption::new(machine, Duration::minutes(minutes), Duration::zero()));
            job.add_task(Task::new(job.id, operation.id, (i as u32 + 1) * 10)).unwrap();
            self.operations.insert(operation.id, operation);
        }
        self.jobs.push(job);
    }

    fn model(&self) -> CpModel {
        ModelBuilder {
            problem_name: "pipeline".into(),
            schedule_start: monday_8am(),
            horizon_days: 14,
            hours: BusinessHours { work_start_hour: 8, ..BusinessHours::default() },
            jobs: &self.jobs,
            operations: &self.operations,
            machines: &self.machines,
            operators: &self.operators,
            zones: &[],
            makespan_is_hard: false,
        }
        .build()
        .unwrap()
    }
}

fn quick_config() -> SolverConfig {
    SolverConfig {
        max_time_seconds: 10,
        num_search_workers: 1,
        use_lns: false,
        ..SolverConfig::default()
    }
}

#[test]
fn driver_solves_a_chain_to_optimality() {
    let mut shop = Shop::new();
    let machine = shop.machine();
    shop.operator();
    shop.chain_job("A", &[60, 30], machine);
    let model = shop.model();

    let mut improvements = 0;
    let outcome = SolverDriver::solve(
        &model,
        &quick_config(),
        &ObjectiveSpec::primary(2),
        None,
        &CancelToken::new(),
        &mut |progress| {
            improvements += 1;
            assert!(progress.objective_value >= progress.best_bound);
            CallbackSignal::Continue
        },
    );

    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert!(improvements >= 1);
    let solution = outcome.solution.unwrap();
    assert_eq!(solution.makespan(), 90);
    assert_eq!(outcome.stats.solutions_found as usize, improvements);
    assert!(outcome.stats.branches > 0);
    assert!(outcome.stats.gap <= quick_config().relative_gap_limit);
}

#[test]
fn callback_stop_finalizes_with_the_incumbent() {
    let mut shop = Shop::new();
    let machine = shop.machine();
    shop.operator();
    for i in 0..4 {
        shop.chain_job(&format!("J{i}"), &[45], machine);
    }
    let model = shop.model();

    let outcome = SolverDriver::solve(
        &model,
        &quick_config(),
        &ObjectiveSpec::primary(2),
        None,
        &CancelToken::new(),
        &mut |_| CallbackSignal::Stop,
    );

    assert!(outcome.solution.is_some());
    assert!(outcome.stats.solutions_found >= 1);
}

#[test]
fn pre_cancelled_token_times_out_without_incumbent() {
    let mut shop = Shop::new();
    let machine = shop.machine();
    shop.operator();
    shop.chain_job("A", &[60], machine);
    let model = shop.model();

    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = SolverDriver::solve(
        &model,
        &quick_config(),
        &ObjectiveSpec::primary(2),
        None,
        &cancel,
        &mut |_| CallbackSignal::Continue,
    );

    assert_eq!(outcome.status, SolveStatus::Timeout);
    assert!(outcome.solution.is_none());
}

#[test]
fn infeasible_model_reports_a_diagnostic_core() {
    let mut shop = Shop::new();
    let machine = shop.machine();
    // No operators for an attended machine.
    shop.chain_job("A", &[60], machine);
    let model = shop.model();

    let outcome = SolverDriver::solve(
        &model,
        &quick_config(),
        &ObjectiveSpec::primary(2),
        None,
        &CancelToken::new(),
        &mut |_| CallbackSignal::Continue,
    );

    assert_eq!(outcome.status, SolveStatus::Infeasible);
    let diagnostic = outcome.infeasibility.unwrap();
    assert_eq!(diagnostic.reason, "no_operators");
    assert_eq!(diagnostic.conflicting_jobs, vec!["A".to_string()]);
}

#[test]
fn warm_start_hint_returns_no_worse_objective() {
    let mut shop = Shop::new();
    let machine = shop.machine();
    shop.operator();
    shop.chain_job("A", &[60, 30], machine);
    shop.chain_job("B", &[45], machine);
    let model = shop.model();
    let spec = ObjectiveSpec::primary(2);

    let first = SolverDriver::solve(
        &model,
        &quick_config(),
        &spec,
        None,
        &CancelToken::new(),
        &mut |_| CallbackSignal::Continue,
    );
    let first_objective = first.stats.objective.unwrap();

    let second = SolverDriver::solve(
        &model,
        &quick_config(),
        &spec,
        first.solution.as_ref(),
        &CancelToken::new(),
        &mut |_| CallbackSignal::Continue,
    );
    let second_objective = second.stats.objective.unwrap();

    assert!(second_objective <= first_objective);
    assert_eq!(second.status, SolveStatus::Optimal);
}

#[test]
fn hierarchy_runs_three_phases_and_keeps_the_primary_value() {
    let mut shop = Shop::new();
    let machine = shop.machine();
    shop.operator();
    shop.operator();
    shop.chain_job("A", &[60, 30], machine);
    let model = shop.model();

    let outcome = hierarchy::optimize(
        &model,
        &quick_config(),
        &HierarchyParams::default(),
        None,
        &CancelToken::new(),
        &mut |_| CallbackSignal::Continue,
    )
    .unwrap();

    let phases: Vec<&str> = outcome.phases.iter().map(|p| p.phase).collect();
    assert_eq!(phases, vec!["feasibility", "primary", "cost"]);
    assert_eq!(outcome.evaluation.makespan, 90);
    assert_eq!(outcome.evaluation.total_tardiness, 0);
    assert!(matches!(outcome.status, SolveStatus::Optimal | SolveStatus::Feasible));

    // The cost phase may not regress the primary objective beyond tolerance.
    let cap = outcome.evaluation.primary_value
        + (outcome.evaluation.primary_value as f64 * 0.1).ceil() as i64;
    assert!(outcome.evaluation.primary_value <= cap);
}

#[test]
fn hierarchy_disabled_is_a_single_primary_solve() {
    let mut shop = Shop::new();
    let machine = shop.machine();
    shop.operator();
    shop.chain_job("A", &[60], machine);
    let model = shop.model();

    let params = HierarchyParams { enabled: false, ..HierarchyParams::default() };
    let outcome = hierarchy::optimize(
        &model,
        &quick_config(),
        &params,
        None,
        &CancelToken::new(),
        &mut |_| CallbackSignal::Continue,
    )
    .unwrap();

    assert_eq!(outcome.phases.len(), 1);
    assert_eq!(outcome.phases[0].phase, "primary");
}

#[test]
fn hierarchy_surfaces_infeasibility_as_an_error() {
    let mut shop = Shop::new();
    let machine = shop.machine();
    shop.chain_job("A", &[60], machine); // attended, no operators
    let model = shop.model();

    let error = hierarchy::optimize(
        &model,
        &quick_config(),
        &HierarchyParams::default(),
        None,
        &CancelToken::new(),
        &mut |_| CallbackSignal::Continue,
    )
    .unwrap_err();

    assert_eq!(error.code(), "NO_FEASIBLE_SOLUTION");
    assert_eq!(error.details()["reason"], "no_operators");
}

#[test]
fn decoded_assignments_respect_machine_exclusivity() {
    let mut shop = Shop::new();
    let machine = shop.machine();
    shop.operator();
    shop.chain_job("A", &[60, 30], machine);
    shop.chain_job("B", &[45], machine);
    let model = shop.model();

    let outcome = hierarchy::optimize(
        &model,
        &quick_config(),
        &HierarchyParams::default(),
        None,
        &CancelToken::new(),
        &mut |_| CallbackSignal::Continue,
    )
    .unwrap();

    let assignments = decode_assignments(&model, &outcome.solution).unwrap();
    assert_eq!(assignments.len(), 3);

    let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>)> =
        assignments.iter().map(|a| (a.start, a.end)).collect();
    intervals.sort();
    for pair in intervals.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "machine intervals overlap");
    }
    for assignment in &assignments {
        assert_eq!(
            (assignment.end - assignment.start).num_minutes(),
            assignment.setup_duration.as_minutes() + assignment.processing_duration.as_minutes()
        );
    }
}
