//! End-to-end solve scenarios through the scheduling service.

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use taktplan_core::{
    AutomationLevel, Duration, Machine, Operation, Operator, OperatorSkill, ProductionZone,
    RoutingOption, SkillLevel, SkillRequirement,
};
use taktplan_engine::{
    EngineConfig, InMemoryJobRepository, InMemoryMachineRepository, InMemoryOperatorRepository,
    InMemoryScheduleRepository, InMemoryTaskRepository, OperationCatalog, SchedulingService,
    SolveJobRequest, SolveRequest, SolveResponse,
};
use taktplan_solver::SolveStatus;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn monday_8am() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 3, 8, 0, 0).unwrap()
}

fn at(offset_minutes: i64) -> DateTime<Utc> {
    monday_8am() + chrono::Duration::minutes(offset_minutes)
}

struct ShopBuilder {
    machines: Vec<Machine>,
    operators: Vec<Operator>,
    catalogue: OperationCatalog,
    zones: Vec<ProductionZone>,
}

impl ShopBuilder {
    fn new() -> Self {
        Self {
            machines: Vec::new(),
            operators: Vec::new(),
            catalogue: OperationCatalog::new(),
            zones: Vec::new(),
        }
    }

    fn machine(&mut self, code: &str, automation: AutomationLevel, skill: &str) -> Machine {
        let machine = Machine::new(code, automation)
            .requires_skill(SkillRequirement::new(skill, SkillLevel::Basic));
        self.machines.push(machine.clone());
        machine
    }

    fn operator(&mut self, employee_id: &str, rate: rust_decimal::Decimal, skills: &[&str]) -> Operator {
        let mut operator = Operator::new(employee_id, employee_id).rate(rate);
        for skill in skills {
            operator = operator.skill(*skill, OperatorSkill::new(SkillLevel::Advanced));
        }
        self.operators.push(operator.clone());
        operator
    }

    fn operation(&mut self, sequence: u32, minutes: i64, setup: i64, machines: &[&Machine]) {
        let mut operation = Operation::new(format!("OP-{sequence}"), format!("op {sequence}"));
        for machine in machines {
            operation = operation.routing(RoutingOption::new(
                machine.id,
                Duration::minutes(minutes),
                Duration::minutes(setup),
            ));
        }
        self.catalogue.register(sequence, operation);
    }

    fn service(self) -> SchedulingService {
        SchedulingService::new(
            Box::new(InMemoryJobRepository::new()),
            Box::new(InMemoryTaskRepository::new()),
            Box::new(InMemoryMachineRepository::with_machines(self.machines)),
            Box::new(InMemoryOperatorRepository::with_operators(self.operators)),
            Box::new(InMemoryScheduleRepository::new()),
            self.catalogue,
            self.zones,
            EngineConfig::default(),
        )
    }
}

fn request_8_to_16(jobs: Vec<SolveJobRequest>) -> SolveRequest {
    let mut request = SolveRequest::new(monday_8am(), jobs);
    request.business_constraints.work_start_hour = 8;
    request.business_constraints.work_end_hour = 16;
    request.optimization_parameters.max_time_seconds = 10;
    // One worker keeps the dispatch deterministic for exact-time assertions.
    request.optimization_parameters.num_workers = 1;
    request
}

/// Spec invariants that must hold on every successful response.
fn assert_schedule_invariants(request: &SolveRequest, response: &SolveResponse) {
    assert!(response.success, "expected success, got {:?}", response.error_code);
    let horizon_end = request.schedule_start
        + chrono::Duration::days(i64::from(request.optimization_parameters.horizon_days));

    let mut per_machine: std::collections::HashMap<_, Vec<(DateTime<Utc>, DateTime<Utc>)>> =
        std::collections::HashMap::new();
    let mut per_operator: std::collections::HashMap<_, Vec<(DateTime<Utc>, DateTime<Utc>)>> =
        std::collections::HashMap::new();

    for job in &response.jobs {
        let mut previous_end: Option<DateTime<Utc>> = None;
        for assignment in &job.assignments {
            // Duration identity.
            assert_eq!(
                (assignment.planned_end - assignment.planned_start).num_minutes(),
                assignment.setup_minutes + assignment.processing_minutes,
            );
            // Precedence within the job.
            if let Some(prev) = previous_end {
                assert!(assignment.planned_start >= prev, "precedence violated");
            }
            previous_end = Some(assignment.planned_end);
            // Horizon containment.
            assert!(assignment.planned_start >= request.schedule_start);
            assert!(assignment.planned_end <= horizon_end);

            per_machine
                .entry(assignment.machine_id)
                .or_default()
                .push((assignment.planned_start, assignment.planned_end));
            for &operator in &assignment.operator_ids {
                per_operator
                    .entry(operator)
                    .or_default()
                    .push((assignment.planned_start, assignment.planned_end));
            }
        }
    }

    // Machine and operator exclusivity.
    for intervals in per_machine.values_mut().chain(per_operator.values_mut()) {
        intervals.sort();
        for pair in intervals.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "resource overlap: {pair:?}");
        }
    }
}

// ----------------------------------------------------------------------------
// S1: two jobs, linear precedence, plenty of capacity.
// ----------------------------------------------------------------------------
#[test]
fn two_jobs_on_one_machine_schedule_back_to_back() {
    init_tracing();
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    shop.operator("O2", dec!(30), &["CNC"]);
    shop.operation(10, 60, 0, &[&m1]);
    shop.operation(20, 30, 0, &[&m1]);
    shop.operation(30, 45, 0, &[&m1]);
    let mut service = shop.service();

    let mut job_a = SolveJobRequest::new("A", vec![10, 20]);
    job_a.due_date = Some(at(2 * 24 * 60));
    let mut job_b = SolveJobRequest::new("B", vec![30]);
    job_b.due_date = Some(at(2 * 24 * 60));
    let request = request_8_to_16(vec![job_a, job_b]);

    let response = service.solve(&request);
    assert_eq!(response.status, SolveStatus::Optimal);
    assert_schedule_invariants(&request, &response);

    let metrics = response.metrics.as_ref().unwrap();
    assert_eq!(metrics.makespan_minutes, 135);
    assert_eq!(metrics.total_tardiness_minutes, 0);
    assert_eq!(metrics.jobs_on_time, 2);
    assert_eq!(metrics.jobs_late, 0);

    let job_a = &response.jobs[0];
    assert_eq!(job_a.assignments[0].planned_start, at(0));
    assert_eq!(job_a.assignments[0].planned_end, at(60));
    assert_eq!(job_a.assignments[1].planned_start, at(60));
    assert_eq!(job_a.assignments[1].planned_end, at(90));
    assert!(job_a.is_on_time);

    // B.T3 sits anywhere on M1 without overlapping A.
    let job_b = &response.jobs[1];
    assert_eq!(
        (job_b.assignments[0].planned_end - job_b.assignments[0].planned_start).num_minutes(),
        45
    );

    assert_eq!(response.total_tasks, 3);
    assert!(response.schedule_id.is_some());
}

// ----------------------------------------------------------------------------
// S2: operator-skill scarcity.
// ----------------------------------------------------------------------------
#[test]
fn scarce_skill_pins_the_qualified_operator() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "WELD");
    let m2 = shop.machine("M2", AutomationLevel::Attended, "CNC");
    let o1 = shop.operator("O1", dec!(30), &["WELD", "CNC"]);
    let o2 = shop.operator("O2", dec!(25), &["CNC"]);
    shop.operation(10, 60, 0, &[&m1]);
    shop.operation(30, 45, 0, &[&m2]);
    let mut service = shop.service();

    let request = request_8_to_16(vec![
        SolveJobRequest::new("A", vec![10]),
        SolveJobRequest::new("B", vec![30]),
    ]);
    let response = service.solve(&request);
    assert_eq!(response.status, SolveStatus::Optimal);
    assert_schedule_invariants(&request, &response);

    let a_t1 = &response.jobs[0].assignments[0];
    assert_eq!(a_t1.operator_ids, vec![o1.id]);

    // B runs in parallel on the second machine with the other operator.
    let b_t3 = &response.jobs[1].assignments[0];
    assert_eq!(b_t3.operator_ids, vec![o2.id]);
    assert_eq!(a_t1.planned_start, at(0));
    assert_eq!(b_t3.planned_start, at(0));
}

// ----------------------------------------------------------------------------
// S3: impossible due date stays feasible with positive tardiness.
// ----------------------------------------------------------------------------
#[test]
fn tardiness_is_soft_and_reported() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    shop.operation(10, 120, 0, &[&m1]);
    let mut service = shop.service();

    let mut job = SolveJobRequest::new("A", vec![10]);
    job.due_date = Some(at(30));
    let request = request_8_to_16(vec![job]);

    let response = service.solve(&request);
    assert!(response.success);
    assert!(matches!(response.status, SolveStatus::Feasible | SolveStatus::Optimal));

    let metrics = response.metrics.as_ref().unwrap();
    assert!(metrics.total_tardiness_minutes >= 90);
    assert_eq!(metrics.jobs_late, 1);
    assert_eq!(metrics.jobs_on_time, 0);
    assert!(!response.jobs[0].is_on_time);
    assert_eq!(response.jobs[0].tardiness_minutes, 90);
}

// ----------------------------------------------------------------------------
// S4: WIP zone limit bounds concurrency.
// ----------------------------------------------------------------------------
#[test]
fn wip_zone_limits_simultaneous_tasks() {
    let mut shop = ShopBuilder::new();
    let zone = ProductionZone::new("Z1", 2);
    let zone_id = zone.id;
    shop.zones.push(zone);

    let mut machines = Vec::new();
    for i in 0..3 {
        let mut machine = shop.machine(&format!("M{i}"), AutomationLevel::Attended, "CNC");
        machine.production_zone = Some(zone_id);
        *shop.machines.last_mut().unwrap() = machine.clone();
        machines.push(machine);
        shop.operator(&format!("O{i}"), dec!(30), &["CNC"]);
    }
    let machine_refs: Vec<&Machine> = machines.iter().collect();
    shop.operation(10, 60, 0, &[machine_refs[0]]);
    shop.operation(20, 60, 0, &[machine_refs[1]]);
    shop.operation(30, 60, 0, &[machine_refs[2]]);
    let mut service = shop.service();

    let request = request_8_to_16(vec![
        SolveJobRequest::new("A", vec![10]),
        SolveJobRequest::new("B", vec![20]),
        SolveJobRequest::new("C", vec![30]),
    ]);
    let response = service.solve(&request);
    assert!(response.success);
    assert_schedule_invariants(&request, &response);

    // Sweep concurrency: never three at once, so the makespan exceeds one
    // task's duration.
    let mut events: Vec<(DateTime<Utc>, i32)> = Vec::new();
    for job in &response.jobs {
        for assignment in &job.assignments {
            events.push((assignment.planned_start, 1));
            events.push((assignment.planned_end, -1));
        }
    }
    events.sort();
    let mut active = 0;
    let mut peak = 0;
    for (_, delta) in events {
        active += delta;
        peak = peak.max(active);
    }
    assert!(peak <= 2);
    assert!(response.metrics.unwrap().makespan_minutes > 60);
}

// ----------------------------------------------------------------------------
// S5: a warm-started re-solve never regresses.
// ----------------------------------------------------------------------------
#[test]
fn warm_start_resolve_is_no_worse() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    shop.operator("O2", dec!(30), &["CNC"]);
    shop.operation(10, 60, 0, &[&m1]);
    shop.operation(20, 30, 0, &[&m1]);
    shop.operation(30, 45, 0, &[&m1]);
    let mut service = shop.service();

    let request = request_8_to_16(vec![
        SolveJobRequest::new("A", vec![10, 20]),
        SolveJobRequest::new("B", vec![30]),
    ]);

    let first = service.solve(&request);
    assert!(first.success);
    let first_metrics = first.metrics.as_ref().unwrap();

    let second = service.solve(&request);
    assert!(second.success);
    let second_metrics = second.metrics.as_ref().unwrap();

    assert!(second_metrics.makespan_minutes <= first_metrics.makespan_minutes);
    assert!(second_metrics.total_tardiness_minutes <= first_metrics.total_tardiness_minutes);
    assert_eq!(service.performance().history_len(), 2);
}

// ----------------------------------------------------------------------------
// Boundary cases
// ----------------------------------------------------------------------------

#[test]
fn single_task_single_machine_single_operator() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    shop.operation(10, 90, 0, &[&m1]);
    let mut service = shop.service();

    let request = request_8_to_16(vec![SolveJobRequest::new("A", vec![10])]);
    let response = service.solve(&request);
    assert_eq!(response.status, SolveStatus::Optimal);

    let assignment = &response.jobs[0].assignments[0];
    assert_eq!(assignment.planned_start, monday_8am());
    assert_eq!(assignment.planned_end, at(90));
    assert!(assignment.is_critical_path);
    assert_eq!(response.metrics.unwrap().critical_path_jobs, 1);
}

#[test]
fn due_date_before_schedule_start_is_a_validation_error() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    shop.operation(10, 60, 0, &[&m1]);
    let mut service = shop.service();

    let mut job = SolveJobRequest::new("A", vec![10]);
    job.due_date = Some(monday_8am() - chrono::Duration::minutes(1));
    let request = request_8_to_16(vec![job]);

    let response = service.solve(&request);
    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("VALIDATION_ERROR"));
    assert_eq!(response.error_details["field"], "due_date");
}

#[test]
fn no_qualified_operators_is_infeasible() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &[]); // present but unqualified
    shop.operation(10, 60, 0, &[&m1]);
    let mut service = shop.service();

    let request = request_8_to_16(vec![SolveJobRequest::new("A", vec![10])]);
    let response = service.solve(&request);
    assert_eq!(response.status, SolveStatus::Infeasible);
    assert_eq!(response.error_code.as_deref(), Some("NO_FEASIBLE_SOLUTION"));
    assert_eq!(response.error_details["reason"], "no_operators");
    assert_eq!(response.error_details["suggested_actions"], "add_operator_skill");
}

#[test]
fn all_holidays_is_infeasible_for_attended_work() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    shop.operation(10, 60, 0, &[&m1]);
    let mut service = shop.service();

    let mut request = request_8_to_16(vec![SolveJobRequest::new("A", vec![10])]);
    request.optimization_parameters.horizon_days = 2;
    request.business_constraints.holiday_days = vec![1, 2];

    let response = service.solve(&request);
    assert_eq!(response.status, SolveStatus::Infeasible);
    assert_eq!(response.error_details["reason"], "no_working_days");
    assert_eq!(response.error_details["suggested_actions"], "extend_horizon");
}

#[test]
fn zero_duration_task_is_an_instantaneous_event() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    shop.operation(10, 0, 0, &[&m1]);
    let mut service = shop.service();

    let request = request_8_to_16(vec![SolveJobRequest::new("A", vec![10])]);
    let response = service.solve(&request);
    assert!(response.success);

    let assignment = &response.jobs[0].assignments[0];
    assert_eq!(assignment.planned_start, assignment.planned_end);
    assert!(assignment.operator_ids.is_empty());
}

#[test]
fn inverted_work_hours_is_a_configuration_error() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    shop.operation(10, 60, 0, &[&m1]);
    let mut service = shop.service();

    let mut request = request_8_to_16(vec![SolveJobRequest::new("A", vec![10])]);
    request.business_constraints.work_end_hour = 8;
    let response = service.solve(&request);
    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("CONFIGURATION_ERROR"));
}

#[test]
fn unknown_operation_sequence_is_not_found() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    shop.operation(10, 60, 0, &[&m1]);
    let mut service = shop.service();

    let request = request_8_to_16(vec![SolveJobRequest::new("A", vec![10, 99])]);
    let response = service.solve(&request);
    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("ENTITY_NOT_FOUND"));
}

#[test]
fn attended_setup_respects_business_hours_and_lunch() {
    let mut shop = ShopBuilder::new();
    let m1 = shop.machine("M1", AutomationLevel::Attended, "CNC");
    shop.operator("O1", dec!(30), &["CNC"]);
    // Five one-hour jobs overflow the four-hour morning block.
    for sequence in [10, 20, 30, 40, 50] {
        shop.operation(sequence, 60, 0, &[&m1]);
    }
    let mut service = shop.service();

    let request = request_8_to_16(vec![
        SolveJobRequest::new("A", vec![10]),
        SolveJobRequest::new("B", vec![20]),
        SolveJobRequest::new("C", vec![30]),
        SolveJobRequest::new("D", vec![40]),
        SolveJobRequest::new("E", vec![50]),
    ]);
    let response = service.solve(&request);
    assert!(response.success);
    assert_schedule_invariants(&request, &response);

    let lunch_start = at(4 * 60); // 12:00
    let lunch_end = at(4 * 60 + 45); // 12:45
    for job in &response.jobs {
        for assignment in &job.assignments {
            let crosses_lunch =
                assignment.planned_start < lunch_end && lunch_start < assignment.planned_end;
            assert!(!crosses_lunch, "attended task crosses lunch: {assignment:?}");
        }
    }
}
