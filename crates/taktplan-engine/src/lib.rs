//! # taktplan-engine
//!
//! The orchestration layer of the taktplan scheduling engine: the solve
//! request/response contract, the [`SchedulingService`] that drives the
//! solver pipeline end to end, operational configuration and reference
//! in-memory repositories.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use taktplan_engine::{
//!     EngineConfig, InMemoryJobRepository, InMemoryMachineRepository,
//!     InMemoryOperatorRepository, InMemoryScheduleRepository,
//!     InMemoryTaskRepository, OperationCatalog, SchedulingService,
//!     SolveJobRequest, SolveRequest,
//! };
//!
//! let mut service = SchedulingService::new(
//!     Box::new(InMemoryJobRepository::new()),
//!     Box::new(InMemoryTaskRepository::new()),
//!     Box::new(InMemoryMachineRepository::new()),
//!     Box::new(InMemoryOperatorRepository::new()),
//!     Box::new(InMemoryScheduleRepository::new()),
//!     OperationCatalog::new(),
//!     Vec::new(),
//!     EngineConfig::from_env(),
//! );
//!
//! let request = SolveRequest::new(
//!     Utc::now(),
//!     vec![SolveJobRequest::new("J-1042", vec![10, 20])],
//! );
//! let response = service.solve(&request);
//! println!("{}: {:?}", response.problem_name, response.status);
//! ```

pub mod config;
pub mod memory;
pub mod request;
pub mod response;
pub mod service;

pub use config::EngineConfig;
pub use memory::{
    InMemoryJobRepository, InMemoryMachineRepository, InMemoryOperatorRepository,
    InMemoryScheduleRepository, InMemoryTaskRepository,
};
pub use request::{BusinessConstraints, OptimizationParameters, SolveJobRequest, SolveRequest};
pub use response::{JobSolution, SolutionMetrics, SolveResponse, TaskAssignmentDto};
pub use service::{OperationCatalog, SchedulingService};
