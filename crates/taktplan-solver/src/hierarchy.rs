//! Hierarchical optimization: feasibility, then tardiness + makespan, then
//! operator cost.
//!
//! Phase 1 proves a solution exists on a sliver of the budget. Phase 2
//! minimizes `w_t * tardiness + w_m * makespan`. Phase 3 pins the primary
//! objective to its best value plus a tolerance and minimizes operator cost.
//! Every transition warm-starts from the previous incumbent; a later phase
//! that fails keeps the earlier solution instead of failing the solve.

use taktplan_core::{Remediation, SchedulingError};

use crate::driver::{
    CallbackSignal, CancelToken, SolveOutcome, SolveProgress, SolveStats, SolveStatus,
    SolverConfig, SolverDriver,
};
use crate::model::CpModel;
use crate::search::{evaluate, Evaluation, ObjectiveSpec, Solution};

/// Knobs for the phase ladder.
#[derive(Clone, Debug, PartialEq)]
pub struct HierarchyParams {
    pub enabled: bool,
    /// `w_t`, the tardiness weight in the primary objective.
    pub primary_weight: i64,
    /// Allowed primary-objective slack in the cost phase (0.0..=0.5).
    pub cost_tolerance: f64,
}

impl Default for HierarchyParams {
    fn default() -> Self {
        Self { enabled: true, primary_weight: 2, cost_tolerance: 0.1 }
    }
}

/// One phase's terminal state, for diagnostics and profiling.
#[derive(Clone, Debug)]
pub struct PhaseReport {
    pub phase: &'static str,
    pub status: SolveStatus,
    pub objective: Option<i64>,
    pub wall_seconds: f64,
}

/// Final result of the phase ladder.
#[derive(Clone, Debug)]
pub struct HierarchicalOutcome {
    pub solution: Solution,
    /// Figures under the primary objective, whatever phase won.
    pub evaluation: Evaluation,
    pub status: SolveStatus,
    pub stats: SolveStats,
    pub phases: Vec<PhaseReport>,
}

const MIN_PHASE_SECONDS: u32 = 10;

fn phase_config(base: &SolverConfig, budget_seconds: u32) -> SolverConfig {
    SolverConfig { max_time_seconds: budget_seconds.max(MIN_PHASE_SECONDS), ..base.clone() }
}

fn merge_stats(total: &mut SolveStats, phase: &SolveStats) {
    let offset = total.wall_time_seconds;
    total.wall_time_seconds += phase.wall_time_seconds;
    total.user_time_seconds += phase.user_time_seconds;
    total.branches += phase.branches;
    total.conflicts += phase.conflicts;
    total.solutions_found += phase.solutions_found;
    total.gap = phase.gap;
    total.best_bound = phase.best_bound;
    if phase.objective.is_some() {
        total.objective = phase.objective;
    }
    total
        .objective_history
        .extend(phase.objective_history.iter().map(|&(t, o)| (offset + t, o)));
    total.memory_estimate_mb = total.memory_estimate_mb.max(phase.memory_estimate_mb);
}

fn no_solution_error(outcome: &SolveOutcome) -> SchedulingError {
    match &outcome.infeasibility {
        Some(diag) => SchedulingError::NoFeasibleSolution {
            reason: diag.reason,
            message: diag.message.clone(),
            conflicting_jobs: diag.conflicting_jobs.clone(),
            suggestions: diag.suggestions.clone(),
        },
        None => SchedulingError::NoFeasibleSolution {
            reason: "feasibility_budget_exhausted",
            message: "no solution was found within the feasibility budget".into(),
            conflicting_jobs: Vec::new(),
            suggestions: vec![Remediation::ExtendHorizon, Remediation::RelaxDueDate],
        },
    }
}

/// Run the phase ladder and return the best solution found.
pub fn optimize(
    model: &CpModel,
    config: &SolverConfig,
    params: &HierarchyParams,
    hint: Option<&Solution>,
    cancel: &CancelToken,
    callback: &mut dyn FnMut(&SolveProgress) -> CallbackSignal,
) -> Result<HierarchicalOutcome, SchedulingError> {
    let primary_spec = ObjectiveSpec::primary(params.primary_weight);
    let mut stats = SolveStats::default();
    let mut phases = Vec::new();

    if !params.enabled {
        let outcome = SolverDriver::solve(model, config, &primary_spec, hint, cancel, callback);
        phases.push(PhaseReport {
            phase: "primary",
            status: outcome.status,
            objective: outcome.stats.objective,
            wall_seconds: outcome.stats.wall_time_seconds,
        });
        merge_stats(&mut stats, &outcome.stats);
        let Some(solution) = outcome.solution else {
            return Err(no_solution_error(&outcome));
        };
        let evaluation = evaluate(model, &solution, &primary_spec);
        return Ok(HierarchicalOutcome {
            solution,
            evaluation,
            status: outcome.status,
            stats,
            phases,
        });
    }

    let total_budget = config.max_time_seconds;

    // Phase 1: feasibility on at most 10% of the budget.
    let feasibility_budget = (total_budget / 10).max(MIN_PHASE_SECONDS);
    let feasibility_spec = ObjectiveSpec::feasibility();
    tracing::debug!(budget = feasibility_budget, "feasibility phase");
    let phase1 = SolverDriver::solve(
        model,
        &phase_config(config, feasibility_budget),
        &feasibility_spec,
        hint,
        cancel,
        callback,
    );
    phases.push(PhaseReport {
        phase: "feasibility",
        status: phase1.status,
        objective: phase1.stats.objective,
        wall_seconds: phase1.stats.wall_time_seconds,
    });
    merge_stats(&mut stats, &phase1.stats);
    let Some(feasible) = phase1.solution else {
        return Err(no_solution_error(&phase1));
    };

    // Phase 2: primary objective on 60% of the remaining budget.
    let remaining = total_budget.saturating_sub(stats.wall_time_seconds as u32);
    let primary_budget = (remaining * 6 / 10).max(MIN_PHASE_SECONDS);
    tracing::debug!(budget = primary_budget, "primary phase");
    let phase2 = SolverDriver::solve(
        model,
        &phase_config(config, primary_budget),
        &primary_spec,
        Some(&feasible),
        cancel,
        callback,
    );
    phases.push(PhaseReport {
        phase: "primary",
        status: phase2.status,
        objective: phase2.stats.objective,
        wall_seconds: phase2.stats.wall_time_seconds,
    });
    merge_stats(&mut stats, &phase2.stats);

    // A failed primary phase keeps the feasibility solution.
    let (mut best_solution, mut final_status) = match phase2.solution {
        Some(solution) => (solution, phase2.status),
        None => (feasible, SolveStatus::Feasible),
    };
    let mut best_eval = evaluate(model, &best_solution, &primary_spec);

    // Phase 3: operator cost under a capped primary objective.
    let cap_slack = (best_eval.primary_value as f64 * params.cost_tolerance).ceil() as i64;
    let cost_spec = ObjectiveSpec::cost(params.primary_weight, best_eval.primary_value + cap_slack);
    let remaining = total_budget.saturating_sub(stats.wall_time_seconds as u32);
    let cost_budget = remaining.max(MIN_PHASE_SECONDS);
    tracing::debug!(budget = cost_budget, cap = best_eval.primary_value + cap_slack, "cost phase");
    let phase3 = SolverDriver::solve(
        model,
        &phase_config(config, cost_budget),
        &cost_spec,
        Some(&best_solution),
        cancel,
        callback,
    );
    phases.push(PhaseReport {
        phase: "cost",
        status: phase3.status,
        objective: phase3.stats.objective,
        wall_seconds: phase3.stats.wall_time_seconds,
    });
    merge_stats(&mut stats, &phase3.stats);

    if let Some(solution) = phase3.solution {
        let candidate_eval = evaluate(model, &solution, &primary_spec);
        // Accept only if the cost phase honored the primary cap.
        if candidate_eval.primary_value <= best_eval.primary_value + cap_slack
            && candidate_eval.operator_cost_cents <= best_eval.operator_cost_cents
        {
            best_solution = solution;
            best_eval = candidate_eval;
        }
    }

    if cancel.is_cancelled() {
        final_status = SolveStatus::Timeout;
    } else if !matches!(final_status, SolveStatus::Optimal) {
        final_status = SolveStatus::Feasible;
    }

    tracing::info!(
        status = %final_status,
        makespan = best_eval.makespan,
        tardiness = best_eval.total_tardiness,
        cost_cents = best_eval.operator_cost_cents,
        "hierarchical optimization finished"
    );

    Ok(HierarchicalOutcome {
        solution: best_solution,
        evaluation: best_eval,
        status: final_status,
        stats,
        phases,
    })
}
