//! # taktplan-solver
//!
//! The solver pipeline of the taktplan scheduling engine: constraint model
//! building, an anytime CP search, hierarchical objectives, critical-path
//! analysis, solution decoding and performance tuning.
//!
//! The pipeline runs in five steps:
//! 1. [`ModelBuilder`] turns jobs and resources into a [`CpModel`]
//! 2. [`hierarchy::optimize`] drives [`SolverDriver`] through the
//!    feasibility, primary and cost phases
//! 3. [`decode_assignments`] converts the winning [`Solution`] into
//!    domain assignments
//! 4. [`CriticalPathAnalyzer`] annotates float and the critical chain
//! 5. [`PerformanceRegistry`] records the profile for tuning and
//!    warm-starts
//!
//! ## Example
//!
//! ```rust,no_run
//! use taktplan_solver::{
//!     hierarchy, CallbackSignal, CancelToken, HierarchyParams, SolverConfig,
//! };
//! # fn model() -> taktplan_solver::CpModel { unimplemented!() }
//!
//! let model = model();
//! let config = SolverConfig::for_model(&model);
//! let cancel = CancelToken::new();
//! let outcome = hierarchy::optimize(
//!     &model,
//!     &config,
//!     &HierarchyParams::default(),
//!     None,
//!     &cancel,
//!     &mut |progress| {
//!         println!("objective {}", progress.objective_value);
//!         CallbackSignal::Continue
//!     },
//! );
//! ```

pub mod calendar;
pub mod cpm;
pub mod decode;
pub mod driver;
pub mod hierarchy;
pub mod model;
pub mod perf;
pub mod search;

pub use calendar::{BusinessCalendar, BusinessHours};
pub use cpm::{
    bottleneck_machine, detect_resource_conflicts, CpmError, CriticalPathAnalysis,
    CriticalPathAnalyzer, PassAlgorithm, PathTask, ResourceConflict, ResourceInterval,
    ResourceKind, DIRECT_LIMIT, PARALLEL_LIMIT,
};
pub use decode::decode_assignments;
pub use driver::{
    CallbackSignal, CancelToken, ConfigOverrides, InfeasibilityDiagnostic, LnsFocus,
    SearchBranching, SolveOutcome, SolveProgress, SolveStats, SolveStatus, SolverConfig,
    SolverDriver,
};
pub use hierarchy::{HierarchicalOutcome, HierarchyParams, PhaseReport};
pub use model::{
    CpModel, ModelBuilder, ModelJob, ModelMachine, ModelOperator, ModelTask, ModelZone,
    OperatorCoverage, RouteOption,
};
pub use perf::{
    analyze_profile, score_profile, CachedPlacement, CachedSolution, ConvergenceReport,
    PerformanceFlag, PerformanceRegistry, ProblemFingerprint, ProblemSignature,
    ProblemSizeVector, ProfileAnalysis, SizeBucket, SolverPerformanceProfile,
};
pub use search::{
    complete_partial, evaluate, Evaluation, ObjectivePhase, ObjectiveSpec, Placement, Solution,
};
