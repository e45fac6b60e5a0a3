//! Solve profiling, adaptive parameter tuning and the warm-start cache.
//!
//! Each solve leaves a [`SolverPerformanceProfile`]. The registry keeps a
//! bounded history, learns the best configuration per problem pattern, and
//! caches solutions keyed by a problem fingerprint so similar requests can
//! warm-start. The pattern table and warm cache are process-wide: many
//! readers, one rare writer per completed solve.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use taktplan_core::{MachineId, OperationId, OperatorId};
use uuid::Uuid;

use crate::driver::{SolveStats, SolveStatus, SolverConfig};
use crate::model::CpModel;
use crate::search::{Placement, Solution};

/// Problem size class for the pattern table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
}

impl SizeBucket {
    pub fn of(interval_count: usize) -> Self {
        if interval_count < 100 {
            Self::Small
        } else if interval_count < 1000 {
            Self::Medium
        } else {
            Self::Large
        }
    }
}

/// Structural key for learned configurations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProblemSignature {
    pub bucket: SizeBucket,
    pub has_precedence: bool,
    pub has_resources: bool,
    pub has_time_windows: bool,
}

impl ProblemSignature {
    pub fn of(model: &CpModel) -> Self {
        Self {
            bucket: SizeBucket::of(model.interval_count()),
            has_precedence: model.has_precedence(),
            has_resources: model.has_resources(),
            has_time_windows: model.has_time_windows(),
        }
    }
}

/// Size figures recorded with each profile.
#[derive(Clone, Debug, Default)]
pub struct ProblemSizeVector {
    pub jobs: usize,
    pub tasks: usize,
    pub intervals: usize,
    pub machines: usize,
    pub operators: usize,
}

impl ProblemSizeVector {
    pub fn of(model: &CpModel) -> Self {
        Self {
            jobs: model.jobs.len(),
            tasks: model.tasks.len(),
            intervals: model.interval_count(),
            machines: model.machines.len(),
            operators: model.operators.len(),
        }
    }
}

/// Record of one solver execution.
#[derive(Clone, Debug)]
pub struct SolverPerformanceProfile {
    pub solve_id: Uuid,
    pub problem: ProblemSizeVector,
    pub config: SolverConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: SolveStatus,
    pub wall_time_seconds: f64,
    pub user_time_seconds: f64,
    pub branches: u64,
    pub conflicts: u64,
    pub solutions_found: u32,
    pub gap: f64,
    pub memory_peak_mb: f64,
    /// `(wall_seconds, objective)` per improving solution.
    pub objective_history: Vec<(f64, i64)>,
}

impl SolverPerformanceProfile {
    pub fn from_stats(
        model: &CpModel,
        config: &SolverConfig,
        status: SolveStatus,
        started_at: DateTime<Utc>,
        stats: &SolveStats,
    ) -> Self {
        Self {
            solve_id: Uuid::new_v4(),
            problem: ProblemSizeVector::of(model),
            config: config.clone(),
            started_at,
            finished_at: Utc::now(),
            status,
            wall_time_seconds: stats.wall_time_seconds,
            user_time_seconds: stats.user_time_seconds,
            branches: stats.branches,
            conflicts: stats.conflicts,
            solutions_found: stats.solutions_found,
            gap: stats.gap,
            memory_peak_mb: stats.memory_estimate_mb,
            objective_history: stats.objective_history.clone(),
        }
    }
}

/// Convergence figures over the objective history.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceReport {
    pub total_improvement: i64,
    pub average_improvement_rate: f64,
    /// Fraction of the last ten improvements below 0.1% relative change.
    pub stagnation_ratio: f64,
    pub best_objective: i64,
}

/// Findings of one profile analysis.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PerformanceFlag {
    TimeLimitReached,
    HighMemory,
    NoSolutionFound,
    Stagnating,
    HighConflictRate,
    LowThroughput,
}

#[derive(Clone, Debug, Default)]
pub struct ProfileAnalysis {
    pub flags: Vec<PerformanceFlag>,
    pub recommendations: Vec<String>,
    pub convergence: Option<ConvergenceReport>,
    pub branches_per_second: f64,
}

const STAGNATION_THRESHOLD: f64 = 0.001;

pub fn analyze_profile(profile: &SolverPerformanceProfile) -> ProfileAnalysis {
    let mut analysis = ProfileAnalysis::default();

    if profile.wall_time_seconds >= f64::from(profile.config.max_time_seconds) {
        analysis.flags.push(PerformanceFlag::TimeLimitReached);
        analysis
            .recommendations
            .push("increase the time limit or use more aggressive heuristics".into());
    }
    if profile.memory_peak_mb > f64::from(profile.config.max_memory_mb) * 0.9 {
        analysis.flags.push(PerformanceFlag::HighMemory);
        analysis
            .recommendations
            .push("reduce the problem size or lower the worker count".into());
    }
    if profile.solutions_found == 0 {
        analysis.flags.push(PerformanceFlag::NoSolutionFound);
        analysis
            .recommendations
            .push("check constraint consistency or relax constraints".into());
    }

    if profile.wall_time_seconds > 0.0 {
        analysis.branches_per_second = profile.branches as f64 / profile.wall_time_seconds;
        if profile.branches > 1000 && analysis.branches_per_second < 10.0 {
            analysis.flags.push(PerformanceFlag::LowThroughput);
        }
        if profile.branches > 0 {
            let conflict_rate = profile.conflicts as f64 / profile.branches as f64;
            if conflict_rate > 10.0 {
                analysis.flags.push(PerformanceFlag::HighConflictRate);
                analysis
                    .recommendations
                    .push("high conflict rate; improve constraint propagation".into());
            }
        }
    }

    if profile.objective_history.len() >= 2 {
        let convergence = convergence_of(&profile.objective_history);
        if convergence.stagnation_ratio > 0.5 {
            analysis.flags.push(PerformanceFlag::Stagnating);
            analysis
                .recommendations
                .push("solver stagnating; consider LNS or restart strategies".into());
        }
        analysis.convergence = Some(convergence);
    }

    analysis
}

fn convergence_of(history: &[(f64, i64)]) -> ConvergenceReport {
    let objectives: Vec<i64> = history.iter().map(|&(_, o)| o).collect();
    let mut improvements = Vec::new();
    for window in objectives.windows(2) {
        if window[0] != 0 {
            improvements
                .push(((window[1] - window[0]).abs() as f64) / (window[0].abs() as f64));
        }
    }
    let recent: &[f64] =
        if improvements.len() >= 10 { &improvements[improvements.len() - 10..] } else { &improvements };
    let stagnant = recent.iter().filter(|&&i| i < STAGNATION_THRESHOLD).count();
    let stagnation_ratio =
        if recent.is_empty() { 0.0 } else { stagnant as f64 / recent.len() as f64 };

    ConvergenceReport {
        total_improvement: (objectives.first().copied().unwrap_or(0)
            - objectives.last().copied().unwrap_or(0))
        .abs(),
        average_improvement_rate: if improvements.is_empty() {
            0.0
        } else {
            improvements.iter().sum::<f64>() / improvements.len() as f64
        },
        stagnation_ratio,
        best_objective: objectives.iter().copied().min().unwrap_or(0),
    }
}

/// Score a finished solve; higher is better. Infeasible and error runs are
/// disqualified outright.
pub fn score_profile(profile: &SolverPerformanceProfile) -> f64 {
    if !matches!(profile.status, SolveStatus::Optimal | SolveStatus::Feasible) {
        return -1000.0;
    }
    let mut score = (1.0 - profile.gap) * 100.0;
    let budget = f64::from(profile.config.max_time_seconds);
    if profile.wall_time_seconds < budget {
        score += (1.0 - profile.wall_time_seconds / budget) * 50.0;
    }
    score += f64::from(profile.solutions_found.min(10)) * 5.0;
    if profile.memory_peak_mb > 0.0 {
        score -= profile.memory_peak_mb / f64::from(profile.config.max_memory_mb) * 20.0;
    }
    score
}

// ============================================================================
// Warm-start cache
// ============================================================================

/// Content fingerprint of a scheduling problem: the set of
/// `(job_number, task_sequence, operation, due_date)` tuples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProblemFingerprint(u64);

impl ProblemFingerprint {
    pub fn of(model: &CpModel) -> Self {
        let mut items: Vec<(String, u32, OperationId, Option<i64>)> = model
            .tasks
            .iter()
            .map(|task| {
                let job = &model.jobs[task.job_index];
                (job.job_number.clone(), task.sequence, task.operation_id, job.due_minutes)
            })
            .collect();
        items.sort();
        let mut hasher = DefaultHasher::new();
        items.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// A cached placement keyed by stable task identity.
#[derive(Clone, Debug)]
pub struct CachedPlacement {
    pub job_number: String,
    pub sequence: u32,
    pub machine_id: MachineId,
    pub start: i64,
    pub end: i64,
    pub operator_ids: Vec<OperatorId>,
}

/// A cached solution plus the objective it achieved.
#[derive(Clone, Debug)]
pub struct CachedSolution {
    pub placements: Vec<CachedPlacement>,
    pub objective: i64,
}

impl CachedSolution {
    pub fn capture(model: &CpModel, solution: &Solution, objective: i64) -> Self {
        let placements = model
            .tasks
            .iter()
            .zip(&solution.placements)
            .map(|(task, placement)| {
                let job = &model.jobs[task.job_index];
                let option = &task.options[placement.option];
                CachedPlacement {
                    job_number: job.job_number.clone(),
                    sequence: task.sequence,
                    machine_id: option.machine_id,
                    start: placement.start,
                    end: placement.end,
                    operator_ids: placement
                        .operators
                        .iter()
                        .map(|&oi| model.operators[oi].operator_id)
                        .collect(),
                }
            })
            .collect();
        Self { placements, objective }
    }

    /// Rehydrate against a (possibly different) model. Matching tasks take
    /// their cached placement verbatim; unknown tasks are left for the
    /// driver to place at their earliest feasible slot.
    pub fn adapt(&self, model: &CpModel) -> Vec<Option<Placement>> {
        let by_key: HashMap<(&str, u32), &CachedPlacement> = self
            .placements
            .iter()
            .map(|p| ((p.job_number.as_str(), p.sequence), p))
            .collect();
        let operator_index: HashMap<OperatorId, usize> = model
            .operators
            .iter()
            .enumerate()
            .map(|(i, o)| (o.operator_id, i))
            .collect();

        model
            .tasks
            .iter()
            .map(|task| {
                let job = &model.jobs[task.job_index];
                let cached = by_key.get(&(job.job_number.as_str(), task.sequence))?;
                let option = task
                    .options
                    .iter()
                    .position(|o| o.machine_id == cached.machine_id)?;
                let operators: Option<Vec<usize>> = cached
                    .operator_ids
                    .iter()
                    .map(|id| operator_index.get(id).copied())
                    .collect();
                Some(Placement {
                    option,
                    start: cached.start,
                    end: cached.end,
                    operators: operators?,
                })
            })
            .collect()
    }
}

struct WarmCache {
    map: HashMap<ProblemFingerprint, CachedSolution>,
    order: VecDeque<ProblemFingerprint>,
    capacity: usize,
}

impl WarmCache {
    fn insert(&mut self, key: ProblemFingerprint, value: CachedSolution) {
        if self.map.insert(key, value).is_none() {
            self.order.push_back(key);
            if self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.map.remove(&evicted);
                }
            }
        }
    }
}

/// Process-wide tuner state: pattern table, warm-start cache, history.
pub struct PerformanceRegistry {
    patterns: RwLock<HashMap<ProblemSignature, (SolverConfig, f64)>>,
    warm: RwLock<WarmCache>,
    history: Mutex<VecDeque<SolverPerformanceProfile>>,
    auto_tune: bool,
}

const HISTORY_LIMIT: usize = 1000;

impl PerformanceRegistry {
    pub fn new(warm_capacity: usize, auto_tune: bool) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            warm: RwLock::new(WarmCache {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity: warm_capacity.max(1),
            }),
            history: Mutex::new(VecDeque::with_capacity(64)),
            auto_tune,
        }
    }

    /// Learned configuration for a problem pattern, if one scored well
    /// before.
    pub fn best_config(&self, signature: ProblemSignature) -> Option<SolverConfig> {
        self.patterns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&signature)
            .map(|(config, _)| config.clone())
    }

    /// Cached warm-start for an identical problem fingerprint.
    pub fn warm_start(&self, fingerprint: ProblemFingerprint) -> Option<CachedSolution> {
        self.warm
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .get(&fingerprint)
            .cloned()
    }

    /// Record a finished solve: history always, pattern table when tuning
    /// is on and the score beats the stored one, warm cache when a solution
    /// exists.
    pub fn record(
        &self,
        profile: SolverPerformanceProfile,
        signature: ProblemSignature,
        fingerprint: ProblemFingerprint,
        solution: Option<CachedSolution>,
    ) {
        let score = score_profile(&profile);

        if self.auto_tune {
            let mut patterns = self.patterns.write().unwrap_or_else(|e| e.into_inner());
            let update = patterns
                .get(&signature)
                .map_or(true, |&(_, best_score)| score > best_score);
            if update {
                tracing::debug!(?signature, score, "pattern table updated");
                patterns.insert(signature, (profile.config.clone(), score));
            }
        }

        if let Some(solution) = solution {
            self.warm
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(fingerprint, solution);
        }

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(profile);
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop all learned state (shutdown path).
    pub fn clear(&self) {
        self.patterns.write().unwrap_or_else(|e| e.into_inner()).clear();
        let mut warm = self.warm.write().unwrap_or_else(|e| e.into_inner());
        warm.map.clear();
        warm.order.clear();
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
