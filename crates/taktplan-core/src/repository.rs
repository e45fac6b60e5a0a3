//! Repository ports.
//!
//! Storage is an external collaborator; the engine consumes these contracts
//! and never interprets backend error strings. Implementations report
//! `NotFound` and `Storage` as distinct kinds.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::job::{Job, Task};
use crate::resources::{Machine, Operator};
use crate::schedule::Schedule;
use crate::skill::{SkillCode, SkillLevel};
use crate::status::{JobStatus, ScheduleStatus};
use crate::{JobId, MachineId, OperatorId, ScheduleId, TaskId, ZoneId};

/// Failure at a repository port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("storage backend failed: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

pub trait JobRepository: Send + Sync {
    fn get_by_id(&self, id: JobId) -> RepoResult<Job>;
    fn get_by_job_number(&self, job_number: &str) -> RepoResult<Job>;
    fn find_by_status(&self, statuses: &[JobStatus]) -> RepoResult<Vec<Job>>;
    fn find_overdue(&self, as_of: DateTime<Utc>) -> RepoResult<Vec<Job>>;
    fn find_by_customer(&self, name: &str) -> RepoResult<Vec<Job>>;
    fn save(&mut self, job: &Job) -> RepoResult<()>;
    fn delete(&mut self, id: JobId) -> RepoResult<()>;
}

pub trait TaskRepository: Send + Sync {
    fn get_by_id(&self, id: TaskId) -> RepoResult<Task>;
    fn find_by_job(&self, job_id: JobId) -> RepoResult<Vec<Task>>;
    fn save(&mut self, task: &Task) -> RepoResult<()>;
}

pub trait MachineRepository: Send + Sync {
    fn get_by_id(&self, id: MachineId) -> RepoResult<Machine>;
    fn find_available(&self) -> RepoResult<Vec<Machine>>;
    fn find_by_zone(&self, zone: ZoneId) -> RepoResult<Vec<Machine>>;
    fn save(&mut self, machine: &Machine) -> RepoResult<()>;
}

pub trait OperatorRepository: Send + Sync {
    fn get_by_id(&self, id: OperatorId) -> RepoResult<Operator>;
    fn find_available(&self) -> RepoResult<Vec<Operator>>;
    fn find_by_skill(&self, skill: &SkillCode, minimum: SkillLevel) -> RepoResult<Vec<Operator>>;
    fn save(&mut self, operator: &Operator) -> RepoResult<()>;
}

pub trait ScheduleRepository: Send + Sync {
    fn get_by_id(&self, id: ScheduleId) -> RepoResult<Schedule>;
    fn find_active(&self, as_of: DateTime<Utc>) -> RepoResult<Vec<Schedule>>;
    fn find_by_status(&self, statuses: &[ScheduleStatus]) -> RepoResult<Vec<Schedule>>;
    fn save(&mut self, schedule: &Schedule) -> RepoResult<()>;
    /// Persist and return a bumped draft copy of `base`.
    fn create_new_version(&mut self, base: ScheduleId) -> RepoResult<Schedule>;
    /// Schedules whose horizon overlaps `[start, end)`.
    fn find_conflicting(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<Schedule>>;
}
