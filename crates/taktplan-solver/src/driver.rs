//! Solver driver: configuration, the worker portfolio and the solve loop.
//!
//! `solve` runs an anytime search: every worker repeatedly builds
//! diversified constructions and, when LNS is enabled, destroys and repairs
//! the shared incumbent. Improving incumbents stream to the caller's
//! callback in wall-time order; the callback may request a cooperative stop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use taktplan_core::{Remediation, SchedulingError};

use crate::model::CpModel;
use crate::search::{
    construct, destroy_neighborhood, dispatch_order, evaluate, objective_lower_bound,
    static_block, Evaluation, ObjectiveSpec, PlacementBlock, SearchCounters, Solution,
};

/// Search strategy selector, CP-SAT style.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SearchBranching {
    Automatic,
    Fixed,
    Portfolio,
}

/// What the LNS loop optimizes for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LnsFocus {
    /// Small neighborhoods around the incumbent.
    Improvement,
    /// Frequent full restarts with fresh dispatch orders.
    QuickRestart,
}

/// Solver parameters. All fields are closed and validated; unknown knobs do
/// not exist.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SolverConfig {
    /// 10..=3600 seconds.
    pub max_time_seconds: u32,
    /// 1..=16 parallel workers.
    pub num_search_workers: u32,
    pub search_branching: SearchBranching,
    pub use_lns: bool,
    pub lns_focus: LnsFocus,
    /// 0..=2.
    pub linearization_level: u8,
    /// 0..=3.
    pub probing_level: u8,
    /// 0..=3.
    pub symmetry_level: u8,
    /// 0.0..=1.0.
    pub relative_gap_limit: f64,
    pub absolute_gap_limit: f64,
    pub use_warm_start: bool,
    pub max_memory_mb: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_time_seconds: 300,
            num_search_workers: 8,
            search_branching: SearchBranching::Automatic,
            use_lns: true,
            lns_focus: LnsFocus::Improvement,
            linearization_level: 2,
            probing_level: 2,
            symmetry_level: 2,
            relative_gap_limit: 0.01,
            absolute_gap_limit: 1.0,
            use_warm_start: true,
            max_memory_mb: 2048,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), SchedulingError> {
        if !(10..=3600).contains(&self.max_time_seconds) {
            return Err(SchedulingError::configuration("max_time_seconds", "must be 10..=3600"));
        }
        if !(1..=16).contains(&self.num_search_workers) {
            return Err(SchedulingError::configuration("num_search_workers", "must be 1..=16"));
        }
        if self.linearization_level > 2 {
            return Err(SchedulingError::configuration("linearization_level", "must be 0..=2"));
        }
        if self.probing_level > 3 {
            return Err(SchedulingError::configuration("probing_level", "must be 0..=3"));
        }
        if self.symmetry_level > 3 {
            return Err(SchedulingError::configuration("symmetry_level", "must be 0..=3"));
        }
        if !(0.0..=1.0).contains(&self.relative_gap_limit) {
            return Err(SchedulingError::configuration("relative_gap_limit", "must be 0..=1"));
        }
        if self.absolute_gap_limit < 0.0 {
            return Err(SchedulingError::configuration("absolute_gap_limit", "must be >= 0"));
        }
        if self.max_memory_mb == 0 {
            return Err(SchedulingError::configuration("max_memory_mb", "must be positive"));
        }
        Ok(())
    }

    /// Parameter pattern table keyed by problem size and structure.
    pub fn for_model(model: &CpModel) -> Self {
        let mut config = Self::default();
        let intervals = model.interval_count();

        if intervals < 100 {
            config.max_time_seconds = 60;
            config.num_search_workers = 4;
            config.use_lns = false;
            config.search_branching = SearchBranching::Fixed;
        } else if intervals < 1000 {
            config.max_time_seconds = 180;
            config.num_search_workers = 8;
            config.use_lns = true;
            config.lns_focus = LnsFocus::Improvement;
            config.search_branching = SearchBranching::Automatic;
        } else {
            config.max_time_seconds = 300;
            config.num_search_workers = 16;
            config.use_lns = true;
            config.lns_focus = LnsFocus::QuickRestart;
            config.search_branching = SearchBranching::Portfolio;
            config.relative_gap_limit = 0.05;
        }

        if model.has_precedence() {
            config.probing_level = 3;
            config.linearization_level = 2;
        }
        if model.has_resources() {
            config.symmetry_level = 3;
            config.use_warm_start = true;
        }
        if model.has_time_windows() {
            config.search_branching = SearchBranching::Fixed;
        }
        config
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = overrides.max_time_seconds {
            self.max_time_seconds = v;
        }
        if let Some(v) = overrides.num_search_workers {
            self.num_search_workers = v;
        }
        if let Some(v) = overrides.search_branching {
            self.search_branching = v;
        }
        if let Some(v) = overrides.use_lns {
            self.use_lns = v;
        }
        if let Some(v) = overrides.lns_focus {
            self.lns_focus = v;
        }
        if let Some(v) = overrides.relative_gap_limit {
            self.relative_gap_limit = v;
        }
        if let Some(v) = overrides.use_warm_start {
            self.use_warm_start = v;
        }
        if let Some(v) = overrides.max_memory_mb {
            self.max_memory_mb = v;
        }
    }
}

/// Caller-supplied parameter overrides; set fields win over the pattern
/// table.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub max_time_seconds: Option<u32>,
    pub num_search_workers: Option<u32>,
    pub search_branching: Option<SearchBranching>,
    pub use_lns: Option<bool>,
    pub lns_focus: Option<LnsFocus>,
    pub relative_gap_limit: Option<f64>,
    pub use_warm_start: Option<bool>,
    pub max_memory_mb: Option<u32>,
}

/// Cooperative cancellation token shared with the caller.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Snapshot delivered to the callback on every improving solution.
#[derive(Clone, Copy, Debug)]
pub struct SolveProgress {
    pub objective_value: i64,
    pub best_bound: i64,
    pub solutions_found: u32,
    pub wall_time_seconds: f64,
    pub branches: u64,
    pub conflicts: u64,
}

/// Callback verdict; `Stop` finalizes the solve cooperatively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackSignal {
    Continue,
    Stop,
}

/// Final solver statistics.
#[derive(Clone, Debug, Default)]
pub struct SolveStats {
    pub wall_time_seconds: f64,
    pub user_time_seconds: f64,
    pub branches: u64,
    pub conflicts: u64,
    pub solutions_found: u32,
    pub gap: f64,
    pub best_bound: i64,
    pub objective: Option<i64>,
    /// `(wall_seconds, objective)` at each improvement.
    pub objective_history: Vec<(f64, i64)>,
    /// Rough peak of the model + search working set.
    pub memory_estimate_mb: f64,
}

/// Terminal solver status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Timeout,
    Error,
}

impl SolveStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Optimal => "OPTIMAL",
            Self::Feasible => "FEASIBLE",
            Self::Infeasible => "INFEASIBLE",
            Self::Timeout => "TIMEOUT",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the model admits no solution.
#[derive(Clone, Debug)]
pub struct InfeasibilityDiagnostic {
    pub reason: &'static str,
    pub message: String,
    pub conflicting_jobs: Vec<String>,
    pub suggestions: Vec<Remediation>,
}

/// Result of one solve call.
#[derive(Clone, Debug)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub solution: Option<Solution>,
    pub evaluation: Option<Evaluation>,
    pub stats: SolveStats,
    pub infeasibility: Option<InfeasibilityDiagnostic>,
    pub error: Option<String>,
}

struct SharedBest {
    solution: Option<(Solution, Evaluation)>,
    solutions_found: u32,
}

/// The CP solver driver.
pub struct SolverDriver;

impl SolverDriver {
    /// Run the search. `hint` seeds the incumbent when
    /// `config.use_warm_start` is set; placements that remain feasible are
    /// taken verbatim and the rest are repaired.
    pub fn solve(
        model: &CpModel,
        config: &SolverConfig,
        spec: &ObjectiveSpec,
        hint: Option<&Solution>,
        cancel: &CancelToken,
        callback: &mut dyn FnMut(&SolveProgress) -> CallbackSignal,
    ) -> SolveOutcome {
        let started = Instant::now();
        let mut stats = SolveStats {
            memory_estimate_mb: estimate_memory_mb(model),
            ..SolveStats::default()
        };

        if let Err(err) = config.validate() {
            return SolveOutcome {
                status: SolveStatus::Error,
                solution: None,
                evaluation: None,
                stats,
                infeasibility: None,
                error: Some(err.to_string()),
            };
        }

        if let Some((task, block)) = static_block(model) {
            let job = &model.jobs[model.tasks[task].job_index];
            let diagnostic = diagnose_block(&block, &job.job_number);
            stats.wall_time_seconds = started.elapsed().as_secs_f64();
            tracing::info!(reason = diagnostic.reason, job = %job.job_number, "model is infeasible");
            return SolveOutcome {
                status: SolveStatus::Infeasible,
                solution: None,
                evaluation: None,
                stats,
                infeasibility: Some(diagnostic),
                error: None,
            };
        }

        let bound = objective_lower_bound(model, spec);
        let deadline = started + StdDuration::from_secs(u64::from(config.max_time_seconds));

        // Seed the incumbent from the warm-start hint.
        let shared = Mutex::new(SharedBest { solution: None, solutions_found: 0 });
        if config.use_warm_start {
            if let Some(hint) = hint {
                if let Some((solution, eval)) = repair_hint(model, hint, spec) {
                    stats.objective_history.push((0.0, eval.objective));
                    let mut best = shared.lock().unwrap_or_else(|e| e.into_inner());
                    best.solutions_found = 1;
                    best.solution = Some((solution, eval));
                }
            }
        }

        // Hint already proves optimality: skip the search entirely.
        {
            let best = shared.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((_, eval)) = &best.solution {
                if gap_closed(eval.objective, bound, config) {
                    let eval = *eval;
                    let solution = best.solution.as_ref().map(|(s, _)| s.clone());
                    drop(best);
                    stats.solutions_found = 1;
                    stats.wall_time_seconds = started.elapsed().as_secs_f64();
                    stats.user_time_seconds = stats.wall_time_seconds;
                    stats.gap = gap_of(eval.objective, bound);
                    stats.best_bound = bound;
                    stats.objective = Some(eval.objective);
                    return SolveOutcome {
                        status: SolveStatus::Optimal,
                        solution,
                        evaluation: Some(eval),
                        stats,
                        infeasibility: None,
                        error: None,
                    };
                }
            }
        }

        let branches = AtomicU64::new(0);
        let conflicts = AtomicU64::new(0);
        let active_workers = Arc::new(AtomicU64::new(0));
        let stop = CancelToken::new();
        let (progress_tx, progress_rx) = mpsc::channel::<(i64, u32)>();

        let worker_count = config.num_search_workers.max(1) as usize;
        let externally_cancelled = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for worker in 0..worker_count {
                let progress_tx = progress_tx.clone();
                let active = Arc::clone(&active_workers);
                let shared = &shared;
                let branches = &branches;
                let conflicts = &conflicts;
                let stop = stop.clone();
                let cancel = cancel.clone();
                active.fetch_add(1, Ordering::AcqRel);
                scope.spawn(move || {
                    worker_loop(
                        model,
                        config,
                        spec,
                        worker,
                        deadline,
                        &stop,
                        &cancel,
                        shared,
                        branches,
                        conflicts,
                        &progress_tx,
                    );
                    active.fetch_sub(1, Ordering::AcqRel);
                });
            }
            drop(progress_tx);

            // Callback thread: deliver improvements in wall-time order.
            loop {
                match progress_rx.recv_timeout(StdDuration::from_millis(20)) {
                    Ok((objective, solutions_found)) => {
                        let wall = started.elapsed().as_secs_f64();
                        stats.objective_history.push((wall, objective));
                        let progress = SolveProgress {
                            objective_value: objective,
                            best_bound: bound,
                            solutions_found,
                            wall_time_seconds: wall,
                            branches: branches.load(Ordering::Relaxed),
                            conflicts: conflicts.load(Ordering::Relaxed),
                        };
                        if callback(&progress) == CallbackSignal::Stop {
                            stop.cancel();
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if cancel.is_cancelled() {
                            externally_cancelled.store(true, Ordering::Release);
                            stop.cancel();
                        }
                        if active_workers.load(Ordering::Acquire) == 0 {
                            break;
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        let wall = started.elapsed().as_secs_f64();
        stats.wall_time_seconds = wall;
        stats.user_time_seconds = wall * worker_count as f64;
        stats.branches = branches.load(Ordering::Relaxed);
        stats.conflicts = conflicts.load(Ordering::Relaxed);
        stats.best_bound = bound;

        let best = shared.into_inner().unwrap_or_else(|e| e.into_inner());
        stats.solutions_found = best.solutions_found;

        match best.solution {
            Some((solution, eval)) => {
                stats.objective = Some(eval.objective);
                stats.gap = gap_of(eval.objective, bound);
                let status = if gap_closed(eval.objective, bound, config) {
                    SolveStatus::Optimal
                } else if externally_cancelled.load(Ordering::Acquire) {
                    SolveStatus::Timeout
                } else {
                    SolveStatus::Feasible
                };
                tracing::info!(
                    status = %status,
                    objective = eval.objective,
                    gap = stats.gap,
                    seconds = wall,
                    "solve finished"
                );
                SolveOutcome {
                    status,
                    solution: Some(solution),
                    evaluation: Some(eval),
                    stats,
                    infeasibility: None,
                    error: None,
                }
            }
            None => {
                stats.gap = 1.0;
                tracing::warn!(seconds = wall, "solve exhausted budget without a solution");
                SolveOutcome {
                    status: SolveStatus::Timeout,
                    solution: None,
                    evaluation: None,
                    stats,
                    infeasibility: None,
                    error: None,
                }
            }
        }
    }
}

fn gap_of(objective: i64, bound: i64) -> f64 {
    if objective <= 0 {
        return 0.0;
    }
    ((objective - bound).max(0) as f64) / objective as f64
}

fn gap_closed(objective: i64, bound: i64, config: &SolverConfig) -> bool {
    gap_of(objective, bound) <= config.relative_gap_limit
        || ((objective - bound).max(0) as f64) <= config.absolute_gap_limit
}

fn diagnose_block(block: &PlacementBlock, job_number: &str) -> InfeasibilityDiagnostic {
    match block {
        PlacementBlock::NoEligibleOperators => InfeasibilityDiagnostic {
            reason: "no_operators",
            message: format!("no qualified operator is available for job {job_number}"),
            conflicting_jobs: vec![job_number.to_string()],
            suggestions: vec![Remediation::AddOperatorSkill],
        },
        PlacementBlock::NoAttendedWindow => InfeasibilityDiagnostic {
            reason: "no_working_days",
            message: "every day in the horizon is masked by holidays".into(),
            conflicting_jobs: vec![job_number.to_string()],
            suggestions: vec![Remediation::ExtendHorizon],
        },
        PlacementBlock::HorizonTooTight => InfeasibilityDiagnostic {
            reason: "horizon_exhausted",
            message: format!("job {job_number} cannot fit inside the planning horizon"),
            conflicting_jobs: vec![job_number.to_string()],
            suggestions: vec![Remediation::ExtendHorizon, Remediation::ReduceQuantity],
        },
    }
}

/// Validate a warm-start hint against the model, repairing stale placements.
fn repair_hint(
    model: &CpModel,
    hint: &Solution,
    spec: &ObjectiveSpec,
) -> Option<(Solution, Evaluation)> {
    if hint.placements.len() != model.tasks.len() {
        return None;
    }
    let hints: Vec<Option<crate::search::Placement>> =
        hint.placements.iter().cloned().map(Some).collect();
    let order = dispatch_order(model, None);
    let mut counters = SearchCounters::default();
    construct(model, &order, Some(&hints), &mut counters)
        .ok()
        .map(|solution| {
            let eval = evaluate(model, &solution, spec);
            (solution, eval)
        })
}

fn estimate_memory_mb(model: &CpModel) -> f64 {
    let intervals = model.interval_count();
    let segments: usize = model.operators.iter().map(|o| o.segments.len()).sum();
    ((intervals * 160 + segments * 16 + model.tasks.len() * 96) as f64) / 1_000_000.0
}

fn worker_loop(
    model: &CpModel,
    config: &SolverConfig,
    spec: &ObjectiveSpec,
    worker: usize,
    deadline: Instant,
    stop: &CancelToken,
    cancel: &CancelToken,
    shared: &Mutex<SharedBest>,
    branches: &AtomicU64,
    conflicts: &AtomicU64,
    progress: &mpsc::Sender<(i64, u32)>,
) {
    let mut rng = SmallRng::seed_from_u64(0x5EED_0000 + worker as u64 * 7919);
    let mut iterations_without_improvement = 0u32;

    loop {
        if stop.is_cancelled() || cancel.is_cancelled() || Instant::now() >= deadline {
            break;
        }

        let mut counters = SearchCounters::default();
        let candidate = next_candidate(model, config, spec, worker, &mut rng, shared, &mut counters);
        branches.fetch_add(counters.branches, Ordering::Relaxed);
        conflicts.fetch_add(counters.conflicts, Ordering::Relaxed);

        let Some((solution, eval)) = candidate else {
            iterations_without_improvement += 1;
            if should_rest(config, iterations_without_improvement) {
                break;
            }
            continue;
        };

        let mut best = shared.lock().unwrap_or_else(|e| e.into_inner());
        let improved = best
            .solution
            .as_ref()
            .map_or(true, |(_, incumbent)| eval.objective < incumbent.objective);
        if improved {
            best.solutions_found += 1;
            let found = best.solutions_found;
            best.solution = Some((solution, eval));
            drop(best);
            iterations_without_improvement = 0;
            let _ = progress.send((eval.objective, found));
            // A feasibility-phase solution is terminal: objective is fixed.
            if matches!(spec.phase, crate::search::ObjectivePhase::Feasibility) {
                stop.cancel();
                break;
            }
        } else {
            drop(best);
            iterations_without_improvement += 1;
            if should_rest(config, iterations_without_improvement) {
                break;
            }
        }
    }
}

/// Without LNS the portfolio is finite; stop a worker after enough fruitless
/// restarts instead of burning the whole budget.
fn should_rest(config: &SolverConfig, fruitless: u32) -> bool {
    let limit = if config.use_lns { 5_000 } else { 50 };
    fruitless >= limit
}

fn next_candidate(
    model: &CpModel,
    config: &SolverConfig,
    spec: &ObjectiveSpec,
    worker: usize,
    rng: &mut SmallRng,
    shared: &Mutex<SharedBest>,
    counters: &mut SearchCounters,
) -> Option<(Solution, Evaluation)> {
    let incumbent = {
        let best = shared.lock().unwrap_or_else(|e| e.into_inner());
        best.solution.as_ref().map(|(s, _)| s.clone())
    };

    let solution = match (&incumbent, config.use_lns) {
        (Some(incumbent), true) if matches!(config.lns_focus, LnsFocus::Improvement) => {
            let hints = destroy_neighborhood(model, incumbent, rng);
            let order = dispatch_order(model, Some(rng));
            construct(model, &order, Some(&hints), counters).ok()?
        }
        _ => {
            // Fresh construction; worker 0 stays deterministic so the
            // baseline dispatch solution is always in the portfolio.
            let order = if worker == 0 && incumbent.is_none() {
                dispatch_order(model, None)
            } else {
                dispatch_order(model, Some(rng))
            };
            construct(model, &order, None, counters).ok()?
        }
    };

    let eval = evaluate(model, &solution, spec);
    Some((solution, eval))
}
