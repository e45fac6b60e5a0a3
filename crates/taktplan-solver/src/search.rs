//! Search machinery behind the solver driver: randomized-dispatch
//! construction, warm-start repair and LNS neighborhoods.
//!
//! A solution places every task: one routing option, a start minute and the
//! covering operators. Construction walks jobs in dispatch order and places
//! each task at the earliest instant that satisfies every model constraint;
//! the driver runs many diversified constructions and LNS repairs under its
//! time budget.

use rand::rngs::SmallRng;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::model::{CpModel, RouteOption};

/// A task's placement in a candidate solution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Index into the task's routing options.
    pub option: usize,
    pub start: i64,
    pub end: i64,
    /// Operator indices covering the task.
    pub operators: Vec<usize>,
}

/// A complete variable assignment: one placement per model task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    pub placements: Vec<Placement>,
}

impl Solution {
    pub fn makespan(&self) -> i64 {
        self.placements.iter().map(|p| p.end).max().unwrap_or(0)
    }
}

/// Which term the current phase minimizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectivePhase {
    /// Objective fixed to zero; any feasible solution wins.
    Feasibility,
    /// Weighted tardiness plus makespan.
    Primary,
    /// Operator cost, with the primary value capped.
    Cost { primary_cap: i64 },
}

/// Objective weights shared by all phases.
#[derive(Clone, Copy, Debug)]
pub struct ObjectiveSpec {
    pub tardiness_weight: i64,
    pub makespan_weight: i64,
    pub phase: ObjectivePhase,
}

impl ObjectiveSpec {
    pub fn feasibility() -> Self {
        Self { tardiness_weight: 2, makespan_weight: 1, phase: ObjectivePhase::Feasibility }
    }

    pub fn primary(tardiness_weight: i64) -> Self {
        Self { tardiness_weight, makespan_weight: 1, phase: ObjectivePhase::Primary }
    }

    pub fn cost(tardiness_weight: i64, primary_cap: i64) -> Self {
        Self {
            tardiness_weight,
            makespan_weight: 1,
            phase: ObjectivePhase::Cost { primary_cap },
        }
    }
}

/// Objective figures for one solution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub makespan: i64,
    /// Unweighted tardiness summed across jobs.
    pub total_tardiness: i64,
    /// Priority-weighted tardiness.
    pub weighted_tardiness: i64,
    /// Operator coverage cost in rate-cents.
    pub operator_cost_cents: i64,
    /// `w_t * weighted_tardiness + w_m * makespan`.
    pub primary_value: i64,
    /// Phase objective, the value the search minimizes.
    pub objective: i64,
}

const REJECTED: i64 = i64::MAX / 4;

pub fn evaluate(model: &CpModel, solution: &Solution, spec: &ObjectiveSpec) -> Evaluation {
    let makespan = solution.makespan();

    let mut total_tardiness = 0;
    let mut weighted_tardiness = 0;
    for job in &model.jobs {
        let completion = job
            .task_indices
            .iter()
            .map(|&t| solution.placements[t].end)
            .max()
            .unwrap_or(0);
        if let Some(due) = job.due_minutes {
            let tardiness = (completion - due).max(0);
            total_tardiness += tardiness;
            weighted_tardiness += job.priority_weight * tardiness;
        }
    }

    let mut cost = Decimal::ZERO;
    for (task, placement) in model.tasks.iter().zip(&solution.placements) {
        let option = &task.options[placement.option];
        let coverage = Decimal::from(option.coverage_minutes());
        for &oi in &placement.operators {
            cost += model.operators[oi].rate_per_minute * coverage;
        }
    }
    let operator_cost_cents =
        (cost * Decimal::new(100, 0)).round().to_i64().unwrap_or(i64::MAX / 8);

    let primary_value =
        spec.tardiness_weight * weighted_tardiness + spec.makespan_weight * makespan;

    let objective = match spec.phase {
        ObjectivePhase::Feasibility => 0,
        ObjectivePhase::Primary => primary_value,
        ObjectivePhase::Cost { primary_cap } => {
            if primary_value > primary_cap {
                REJECTED
            } else {
                operator_cost_cents
            }
        }
    };

    Evaluation {
        makespan,
        total_tardiness,
        weighted_tardiness,
        operator_cost_cents,
        primary_value,
        objective,
    }
}

/// Placement attempt and backtrack counters, reported through the callback.
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchCounters {
    pub branches: u64,
    pub conflicts: u64,
}

// ============================================================================
// Timelines
// ============================================================================

/// Busy intervals per resource while a solution is under construction.
#[derive(Clone, Debug)]
pub(crate) struct Timelines {
    machine: Vec<Vec<(i64, i64)>>,
    operator: Vec<Vec<(i64, i64)>>,
    zone: Vec<Vec<(i64, i64)>>,
}

impl Timelines {
    pub(crate) fn new(model: &CpModel) -> Self {
        Self {
            machine: vec![Vec::new(); model.machines.len()],
            operator: vec![Vec::new(); model.operators.len()],
            zone: vec![Vec::new(); model.zones.len()],
        }
    }

    fn insert(list: &mut Vec<(i64, i64)>, interval: (i64, i64)) {
        let pos = list.partition_point(|&(s, _)| s < interval.0);
        list.insert(pos, interval);
    }

    /// First conflict of `[start, end)` on a sorted disjoint busy list;
    /// returns the conflicting interval's end as the next candidate start.
    fn conflict(list: &[(i64, i64)], start: i64, end: i64) -> Option<i64> {
        let from = list.partition_point(|&(_, e)| e <= start);
        list.get(from).and_then(|&(s, e)| (s < end).then_some(e))
    }

    pub(crate) fn machine_conflict(&self, machine: usize, start: i64, end: i64) -> Option<i64> {
        Self::conflict(&self.machine[machine], start, end)
    }

    pub(crate) fn operator_conflict(&self, operator: usize, start: i64, end: i64) -> Option<i64> {
        Self::conflict(&self.operator[operator], start, end)
    }

    /// Whether inserting `[start, end)` would push concurrency in the zone
    /// to `limit` or beyond at any instant; returns a later candidate start.
    pub(crate) fn zone_conflict(
        &self,
        zone: usize,
        limit: usize,
        start: i64,
        end: i64,
    ) -> Option<i64> {
        let overlapping: Vec<(i64, i64)> = self.zone[zone]
            .iter()
            .filter(|&&(s, e)| s < end && start < e)
            .copied()
            .collect();
        if overlapping.len() < limit {
            return None;
        }
        // Sweep concurrency over the candidate span.
        let mut events: Vec<(i64, i32)> = Vec::with_capacity(overlapping.len() * 2);
        for &(s, e) in &overlapping {
            events.push((s.max(start), 1));
            events.push((e.min(end), -1));
        }
        events.sort_unstable();
        let mut active = 0;
        for (_, delta) in events {
            active += delta;
            if active as usize >= limit {
                let next = overlapping.iter().map(|&(_, e)| e).min().unwrap_or(end);
                return Some(next.max(start + 1));
            }
        }
        None
    }

    pub(crate) fn commit(&mut self, model: &CpModel, task: usize, placement: &Placement) {
        if placement.end == placement.start {
            return; // instantaneous tasks occupy nothing
        }
        let option = &model.tasks[task].options[placement.option];
        Self::insert(&mut self.machine[option.machine_index], (placement.start, placement.end));
        let coverage = option.coverage_minutes();
        if coverage > 0 {
            for &oi in &placement.operators {
                Self::insert(
                    &mut self.operator[oi],
                    (placement.start, placement.start + coverage),
                );
            }
        }
        if let Some(zi) = option.zone_index {
            Self::insert(&mut self.zone[zi], (placement.start, placement.end));
        }
    }
}

// ============================================================================
// Placement
// ============================================================================

/// Why a task can never be placed, even on an empty shop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlacementBlock {
    NoEligibleOperators,
    NoAttendedWindow,
    HorizonTooTight,
}

fn choose_operators(
    model: &CpModel,
    option: &RouteOption,
    start: i64,
    coverage: i64,
    timelines: &Timelines,
) -> Result<Vec<usize>, Option<i64>> {
    if coverage == 0 || option.required_operators == 0 {
        return Ok(Vec::new());
    }
    let mut free: Vec<(Decimal, usize)> = Vec::new();
    let mut later: Vec<i64> = Vec::new();
    for &oi in &option.eligible_operators {
        let operator = &model.operators[oi];
        if !operator.covers(start, coverage) {
            if let Some(t) = operator.next_fit(start, coverage) {
                later.push(t);
            }
            continue;
        }
        if let Some(next) = timelines.operator_conflict(oi, start, start + coverage) {
            later.push(next);
            continue;
        }
        free.push((operator.rate_per_minute, oi));
    }
    if free.len() >= option.required_operators {
        free.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        return Ok(free.into_iter().take(option.required_operators).map(|(_, i)| i).collect());
    }
    if later.is_empty() {
        return Err(None);
    }
    later.sort_unstable();
    let missing = option.required_operators - free.len();
    let bump = later
        .get(missing - 1)
        .or_else(|| later.last())
        .copied()
        .unwrap_or(start + 1);
    Err(Some(bump.max(start + 1)))
}

/// Earliest feasible start for one routing option at or after `earliest`.
fn earliest_for_option(
    model: &CpModel,
    option: &RouteOption,
    earliest: i64,
    timelines: &Timelines,
    counters: &mut SearchCounters,
) -> Option<(i64, Vec<usize>)> {
    let total = option.total_minutes();
    let cap = model.makespan_cap.unwrap_or(model.horizon_minutes);
    let mut start = earliest.max(0);

    // Bounded: every bump strictly advances `start`.
    for _ in 0..50_000 {
        if start + total > cap {
            return None;
        }
        if model.calendar.is_enforced() {
            let attended_span = if option.attended { total } else { option.setup_minutes };
            if attended_span > 0 {
                match model.calendar.next_fit(start, attended_span) {
                    Some(t) if t == start => {}
                    Some(t) => {
                        start = t;
                        continue;
                    }
                    None => return None,
                }
            }
        }
        if start + total > cap {
            return None;
        }
        if let Some(next) = timelines.machine_conflict(option.machine_index, start, start + total) {
            counters.conflicts += 1;
            start = next;
            continue;
        }
        if let Some(zi) = option.zone_index {
            let limit = model.zones[zi].wip_limit as usize;
            if let Some(next) = timelines.zone_conflict(zi, limit, start, start + total) {
                counters.conflicts += 1;
                start = next;
                continue;
            }
        }
        match choose_operators(model, option, start, option.coverage_minutes(), timelines) {
            Ok(operators) => return Some((start, operators)),
            Err(Some(next)) => {
                counters.conflicts += 1;
                start = next;
            }
            Err(None) => return None,
        }
    }
    None
}

/// Place one task at the earliest feasible instant across its options;
/// ties prefer the earlier routing option.
fn place_task(
    model: &CpModel,
    task: usize,
    earliest: i64,
    timelines: &Timelines,
    counters: &mut SearchCounters,
) -> Option<Placement> {
    let mut best: Option<Placement> = None;
    let mut best_key = (i64::MAX, usize::MAX);
    for (oi, option) in model.tasks[task].options.iter().enumerate() {
        if let Some((start, operators)) =
            earliest_for_option(model, option, earliest, timelines, counters)
        {
            let end = start + option.total_minutes();
            let key = (end, option.routing_option_index);
            if key < best_key {
                best_key = key;
                best = Some(Placement { option: oi, start, end, operators });
            }
        }
    }
    counters.branches += 1;
    best
}

/// Dispatch-order construction. `hints` pins placements taken verbatim when
/// they are still feasible; everything else is placed fresh. Returns the
/// index of the first unplaceable task on failure.
pub(crate) fn construct(
    model: &CpModel,
    job_order: &[usize],
    hints: Option<&[Option<Placement>]>,
    counters: &mut SearchCounters,
) -> Result<Solution, usize> {
    let mut timelines = Timelines::new(model);
    let mut placements: Vec<Option<Placement>> = vec![None; model.tasks.len()];

    for &job_index in job_order {
        let job = &model.jobs[job_index];
        let mut earliest = job.release_minutes;
        for &task in &job.task_indices {
            let hint = hints.and_then(|h| h[task].as_ref());
            let placement = match hint {
                Some(p) if hint_is_valid(model, task, p, earliest, &timelines) => p.clone(),
                _ => place_task(model, task, earliest, &timelines, counters).ok_or(task)?,
            };
            timelines.commit(model, task, &placement);
            earliest = placement.end;
            placements[task] = Some(placement);
        }
    }

    let mut complete = Vec::with_capacity(placements.len());
    for (task, placement) in placements.into_iter().enumerate() {
        match placement {
            Some(placement) => complete.push(placement),
            None => return Err(task),
        }
    }
    Ok(Solution { placements: complete })
}

fn hint_is_valid(
    model: &CpModel,
    task: usize,
    placement: &Placement,
    earliest: i64,
    timelines: &Timelines,
) -> bool {
    let Some(option) = model.tasks[task].options.get(placement.option) else {
        return false;
    };
    let total = option.total_minutes();
    if placement.start < earliest || placement.end != placement.start + total {
        return false;
    }
    let cap = model.makespan_cap.unwrap_or(model.horizon_minutes);
    if placement.end > cap {
        return false;
    }
    if model.calendar.is_enforced() {
        let attended_span = if option.attended { total } else { option.setup_minutes };
        if attended_span > 0 && !model.calendar.fits(placement.start, attended_span) {
            return false;
        }
    }
    if timelines.machine_conflict(option.machine_index, placement.start, placement.end).is_some() {
        return false;
    }
    if let Some(zi) = option.zone_index {
        let limit = model.zones[zi].wip_limit as usize;
        if timelines.zone_conflict(zi, limit, placement.start, placement.end).is_some() {
            return false;
        }
    }
    let coverage = option.coverage_minutes();
    if coverage > 0 {
        if placement.operators.len() < option.required_operators {
            return false;
        }
        for &oi in &placement.operators {
            let Some(operator) = model.operators.get(oi) else { return false };
            if !option.eligible_operators.contains(&oi)
                || !operator.covers(placement.start, coverage)
                || timelines
                    .operator_conflict(oi, placement.start, placement.start + coverage)
                    .is_some()
            {
                return false;
            }
        }
    }
    true
}

/// Complete a partial placement map into a full solution. Fixed placements
/// that are still feasible are kept verbatim; the rest are placed at their
/// earliest feasible slot.
pub fn complete_partial(model: &CpModel, partial: &[Option<Placement>]) -> Option<Solution> {
    if partial.len() != model.tasks.len() {
        return None;
    }
    let order = dispatch_order(model, None);
    let mut counters = SearchCounters::default();
    construct(model, &order, Some(partial), &mut counters).ok()
}

// ============================================================================
// Dispatch order and neighborhoods
// ============================================================================

/// Jobs in dispatch order: priority weight descending, then due date, then
/// input order. `jitter` perturbs the key for portfolio diversification.
pub(crate) fn dispatch_order(model: &CpModel, rng: Option<&mut SmallRng>) -> Vec<usize> {
    let mut keys: Vec<(i64, i64, usize)> = model
        .jobs
        .iter()
        .enumerate()
        .map(|(i, job)| {
            (
                -job.priority_weight,
                job.due_minutes.unwrap_or(i64::MAX),
                i,
            )
        })
        .collect();
    if let Some(rng) = rng {
        for key in &mut keys {
            key.1 = key.1.saturating_add(rng.random_range(-240..=240));
        }
        // Fisher-Yates nudge: occasionally swap neighbors for extra variety.
        for i in (1..keys.len()).rev() {
            if rng.random_range(0..4) == 0 {
                let j = rng.random_range(0..=i);
                keys.swap(i, j);
            }
        }
    }
    keys.sort_unstable();
    keys.into_iter().map(|(_, _, i)| i).collect()
}

/// LNS destroy step: clear the placements of a random subset of jobs
/// (roughly a quarter), keeping the rest as verbatim hints.
pub(crate) fn destroy_neighborhood(
    model: &CpModel,
    incumbent: &Solution,
    rng: &mut SmallRng,
) -> Vec<Option<Placement>> {
    let mut hints: Vec<Option<Placement>> =
        incumbent.placements.iter().cloned().map(Some).collect();
    let job_count = model.jobs.len();
    let remove = (job_count / 4).max(1);
    for _ in 0..remove {
        let job = &model.jobs[rng.random_range(0..job_count)];
        for &task in &job.task_indices {
            hints[task] = None;
        }
    }
    hints
}

// ============================================================================
// Bounds and static feasibility
// ============================================================================

/// Lower bound on the makespan: the longest job chain or the heaviest
/// single-machine load among tasks with only one routing choice.
pub(crate) fn makespan_lower_bound(model: &CpModel) -> i64 {
    let chain = model
        .jobs
        .iter()
        .map(|job| {
            job.release_minutes
                + job
                    .task_indices
                    .iter()
                    .map(|&t| model.tasks[t].min_total_minutes())
                    .sum::<i64>()
        })
        .max()
        .unwrap_or(0);

    let mut machine_load = vec![0i64; model.machines.len()];
    for task in &model.tasks {
        if task.options.len() == 1 {
            let option = &task.options[0];
            machine_load[option.machine_index] += option.total_minutes();
        }
    }
    chain.max(machine_load.into_iter().max().unwrap_or(0))
}

/// Objective lower bound for gap computation.
pub(crate) fn objective_lower_bound(model: &CpModel, spec: &ObjectiveSpec) -> i64 {
    match spec.phase {
        ObjectivePhase::Feasibility => 0,
        ObjectivePhase::Primary => spec.makespan_weight * makespan_lower_bound(model),
        ObjectivePhase::Cost { .. } => 0,
    }
}

/// Check each task can be placed on an empty shop; the first blocked task
/// explains why the whole request is infeasible.
pub(crate) fn static_block(model: &CpModel) -> Option<(usize, PlacementBlock)> {
    let timelines = Timelines::new(model);
    let mut counters = SearchCounters::default();
    for (ti, task) in model.tasks.iter().enumerate() {
        let mut blocked = PlacementBlock::HorizonTooTight;
        let mut feasible = false;
        for option in &task.options {
            if option.required_operators > 0
                && option.coverage_minutes() > 0
                && option.eligible_operators.is_empty()
            {
                blocked = PlacementBlock::NoEligibleOperators;
                continue;
            }
            let needs_window = if option.attended {
                option.total_minutes() > 0
            } else {
                option.setup_minutes > 0
            };
            if model.calendar.is_enforced() && needs_window && !model.calendar.has_attended_capacity()
            {
                blocked = PlacementBlock::NoAttendedWindow;
                continue;
            }
            if earliest_for_option(model, option, 0, &timelines, &mut counters).is_some() {
                feasible = true;
                break;
            }
        }
        if !feasible {
            return Some((ti, blocked));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::BusinessHours;
    use crate::model::ModelBuilder;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use taktplan_core::{
        AutomationLevel, Duration, Job, Machine, Operation, Operator, OperatorSkill, Priority,
        ProductionZone, RoutingOption, SkillLevel, SkillRequirement, Task,
    };

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    struct Shop {
        jobs: Vec<Job>,
        operations: HashMap<taktplan_core::OperationId, Operation>,
        machines: Vec<Machine>,
        operators: Vec<Operator>,
        zones: Vec<ProductionZone>,
        hours: BusinessHours,
    }

    impl Shop {
        fn new() -> Self {
            Self {
                jobs: vec![],
                operations: HashMap::new(),
                machines: vec![],
                operators: vec![],
                zones: vec![],
                hours: BusinessHours {
                    work_start_hour: 8,
                    work_end_hour: 16,
                    ..BusinessHours::default()
                },
            }
        }

        fn machine(&mut self, automation: AutomationLevel) -> taktplan_core::MachineId {
            let machine = Machine::new(format!("M{}", self.machines.len() + 1), automation)
                .requires_skill(SkillRequirement::new("CNC", SkillLevel::Basic));
            let id = machine.id;
            self.machines.push(machine);
            id
        }

        fn operator(&mut self) -> taktplan_core::OperatorId {
            let operator = Operator::new(
                format!("E{}", self.operators.len() + 1),
                format!("Op {}", self.operators.len() + 1),
            )
            .skill("CNC", OperatorSkill::new(SkillLevel::Advanced));
            let id = operator.id;
            self.operators.push(operator);
            id
        }

        fn operation(&mut self, minutes: i64, setup: i64, machines: &[taktplan_core::MachineId]) -> Operation {
            let mut op = Operation::new(
                format!("OP-{}", self.operations.len() + 1),
                "op",
            );
            for &m in machines {
                op = op.routing(RoutingOption::new(
                    m,
                    Duration::minutes(minutes),
                    Duration::minutes(setup),
                ));
            }
            self.operations.insert(op.id, op.clone());
            op
        }

        fn job(&mut self, number: &str, ops: &[&Operation]) -> usize {
            let mut job = Job::new(number, start() + chrono::Duration::days(7))
                .priority(Priority::Normal);
            for (i, op) in ops.iter().enumerate() {
                job.add_task(Task::new(job.id, op.id, (i as u32 + 1) * 10)).unwrap();
            }
            self.jobs.push(job);
            self.jobs.len() - 1
        }

        fn build(&self) -> CpModel {
            ModelBuilder {
                problem_name: "search-test".into(),
                schedule_start: start(),
                horizon_days: 14,
                hours: self.hours.clone(),
                jobs: &self.jobs,
                operations: &self.operations,
                machines: &self.machines,
                operators: &self.operators,
                zones: &self.zones,
                makespan_is_hard: false,
            }
            .build()
            .unwrap()
        }
    }

    fn solve_greedy(model: &CpModel) -> Solution {
        let order = dispatch_order(model, None);
        let mut counters = SearchCounters::default();
        construct(model, &order, None, &mut counters).unwrap()
    }

    #[test]
    fn single_task_starts_at_schedule_start() {
        let mut shop = Shop::new();
        let m = shop.machine(AutomationLevel::Attended);
        shop.operator();
        let op = shop.operation(60, 0, &[m]);
        shop.job("J-1", &[&op]);

        let model = shop.build();
        let solution = solve_greedy(&model);
        assert_eq!(solution.placements[0].start, 0);
        assert_eq!(solution.placements[0].end, 60);
        assert_eq!(solution.makespan(), 60);
    }

    #[test]
    fn precedence_serializes_job_tasks() {
        let mut shop = Shop::new();
        let m = shop.machine(AutomationLevel::Attended);
        shop.operator();
        let op1 = shop.operation(60, 0, &[m]);
        let op2 = shop.operation(30, 0, &[m]);
        shop.job("J-1", &[&op1, &op2]);

        let model = shop.build();
        let solution = solve_greedy(&model);
        assert!(solution.placements[0].end <= solution.placements[1].start);
    }

    #[test]
    fn machine_no_overlap_across_jobs() {
        let mut shop = Shop::new();
        let m = shop.machine(AutomationLevel::Attended);
        shop.operator();
        shop.operator();
        let op = shop.operation(45, 0, &[m]);
        shop.job("J-1", &[&op]);
        shop.job("J-2", &[&op]);

        let model = shop.build();
        let solution = solve_greedy(&model);
        let a = &solution.placements[0];
        let b = &solution.placements[1];
        assert!(a.end <= b.start || b.end <= a.start);
    }

    #[test]
    fn scarce_operator_serializes_parallel_machines() {
        let mut shop = Shop::new();
        let m1 = shop.machine(AutomationLevel::Attended);
        let m2 = shop.machine(AutomationLevel::Attended);
        shop.operator(); // one operator for two attended machines
        let op1 = shop.operation(60, 0, &[m1]);
        let op2 = shop.operation(60, 0, &[m2]);
        shop.job("J-1", &[&op1]);
        shop.job("J-2", &[&op2]);

        let model = shop.build();
        let solution = solve_greedy(&model);
        let a = &solution.placements[0];
        let b = &solution.placements[1];
        assert!(a.end <= b.start || b.end <= a.start);
        assert_eq!(solution.makespan(), 120);
    }

    #[test]
    fn unattended_processing_releases_operator() {
        let mut shop = Shop::new();
        let m1 = shop.machine(AutomationLevel::Unattended);
        let m2 = shop.machine(AutomationLevel::Unattended);
        shop.operator();
        let op1 = shop.operation(120, 15, &[m1]);
        let op2 = shop.operation(120, 15, &[m2]);
        shop.job("J-1", &[&op1]);
        shop.job("J-2", &[&op2]);

        let model = shop.build();
        let solution = solve_greedy(&model);
        let a = &solution.placements[0];
        let b = &solution.placements[1];
        // Only the 15-minute setups contend for the operator; processing
        // overlaps freely.
        let setup_a = (a.start, a.start + 15);
        let setup_b = (b.start, b.start + 15);
        assert!(setup_a.1 <= setup_b.0 || setup_b.1 <= setup_a.0);
        assert!(solution.makespan() < 240);
    }

    #[test]
    fn zone_wip_limits_concurrency() {
        let mut shop = Shop::new();
        let zone = ProductionZone::new("Z1", 2);
        let zone_id = zone.id;
        shop.zones.push(zone);
        let mut ids = vec![];
        for _ in 0..3 {
            let id = shop.machine(AutomationLevel::Attended);
            shop.machines.last_mut().unwrap().production_zone = Some(zone_id);
            ids.push(id);
            shop.operator();
        }
        let ops: Vec<Operation> =
            ids.iter().map(|&m| shop.operation(60, 0, &[m])).collect();
        shop.job("J-1", &[&ops[0]]);
        shop.job("J-2", &[&ops[1]]);
        shop.job("J-3", &[&ops[2]]);

        let model = shop.build();
        let solution = solve_greedy(&model);
        // At most two of the three overlap at any instant.
        let mut events: Vec<(i64, i32)> = Vec::new();
        for p in &solution.placements {
            events.push((p.start, 1));
            events.push((p.end, -1));
        }
        events.sort_unstable();
        let mut active = 0;
        let mut peak = 0;
        for (_, d) in events {
            active += d;
            peak = peak.max(active);
        }
        assert!(peak <= 2);
        assert!(solution.makespan() > 60);
    }

    #[test]
    fn attended_task_avoids_lunch() {
        let mut shop = Shop::new();
        let m = shop.machine(AutomationLevel::Attended);
        shop.operator();
        // 09:30 + 180min would cross the 12:00 lunch; 4 jobs of 60min fill
        // the morning and push the last one past lunch.
        let op = shop.operation(60, 0, &[m]);
        let ops: Vec<&Operation> = vec![&op];
        for i in 0..5 {
            shop.job(&format!("J-{i}"), &ops);
        }

        let model = shop.build();
        let solution = solve_greedy(&model);
        for p in &solution.placements {
            assert!(model.calendar.fits(p.start, p.end - p.start), "placement crossed lunch");
        }
    }

    #[test]
    fn evaluation_tardiness_and_makespan() {
        let mut shop = Shop::new();
        let m = shop.machine(AutomationLevel::Attended);
        shop.operator();
        let op = shop.operation(120, 0, &[m]);
        let idx = shop.job("J-late", &[&op]);
        shop.jobs[idx].due_date = start() + chrono::Duration::minutes(30);

        let model = shop.build();
        let solution = solve_greedy(&model);
        let eval = evaluate(&model, &solution, &ObjectiveSpec::primary(2));
        assert_eq!(eval.makespan, 120);
        assert_eq!(eval.total_tardiness, 90);
        // Normal priority weight is 2.
        assert_eq!(eval.weighted_tardiness, 180);
        assert_eq!(eval.primary_value, 2 * 180 + 120);
    }

    #[test]
    fn cost_phase_rejects_primary_regressions() {
        let mut shop = Shop::new();
        let m = shop.machine(AutomationLevel::Attended);
        shop.operator();
        let op = shop.operation(60, 0, &[m]);
        shop.job("J-1", &[&op]);

        let model = shop.build();
        let solution = solve_greedy(&model);
        let tight = evaluate(&model, &solution, &ObjectiveSpec::cost(2, 10));
        assert_eq!(tight.objective, super::REJECTED);
        let loose = evaluate(&model, &solution, &ObjectiveSpec::cost(2, 10_000));
        assert_eq!(loose.objective, loose.operator_cost_cents);
    }

    #[test]
    fn static_block_reports_missing_operators() {
        let mut shop = Shop::new();
        let m = shop.machine(AutomationLevel::Attended);
        // No operators at all.
        let op = shop.operation(60, 10, &[m]);
        shop.job("J-1", &[&op]);

        let model = shop.build();
        let block = static_block(&model);
        assert_eq!(block, Some((0, PlacementBlock::NoEligibleOperators)));
    }

    #[test]
    fn static_block_reports_no_working_days() {
        let mut shop = Shop::new();
        shop.hours.holiday_days = (1..=14).collect();
        let m = shop.machine(AutomationLevel::Attended);
        shop.operator();
        let op = shop.operation(60, 0, &[m]);
        shop.job("J-1", &[&op]);

        let model = shop.build();
        let block = static_block(&model);
        assert_eq!(block, Some((0, PlacementBlock::NoAttendedWindow)));
    }

    #[test]
    fn hint_reuse_is_verbatim() {
        let mut shop = Shop::new();
        let m = shop.machine(AutomationLevel::Attended);
        shop.operator();
        let op = shop.operation(60, 0, &[m]);
        shop.job("J-1", &[&op]);
        shop.job("J-2", &[&op]);

        let model = shop.build();
        let solution = solve_greedy(&model);
        let hints: Vec<Option<Placement>> =
            solution.placements.iter().cloned().map(Some).collect();
        let order = dispatch_order(&model, None);
        let mut counters = SearchCounters::default();
        let replay = construct(&model, &order, Some(&hints), &mut counters).unwrap();
        assert_eq!(replay, solution);
    }

    #[test]
    fn lower_bound_never_exceeds_constructed_makespan() {
        let mut shop = Shop::new();
        let m = shop.machine(AutomationLevel::Attended);
        shop.operator();
        shop.operator();
        let op1 = shop.operation(60, 0, &[m]);
        let op2 = shop.operation(30, 0, &[m]);
        shop.job("A", &[&op1, &op2]);
        shop.job("B", &[&op2]);

        let model = shop.build();
        let solution = solve_greedy(&model);
        assert!(makespan_lower_bound(&model) <= solution.makespan());
    }
}
