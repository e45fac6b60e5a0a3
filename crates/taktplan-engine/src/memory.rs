//! In-memory repository implementations.
//!
//! Reference backends for the repository ports: `HashMap` storage, used by
//! the integration tests and as a starting point for embedders. Real
//! deployments substitute their own persistence behind the same traits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use taktplan_core::{
    Job, JobId, JobRepository, JobStatus, Machine, MachineId, MachineRepository, MachineStatus,
    Operator, OperatorId, OperatorRepository, OperatorStatus, RepoResult, RepositoryError,
    Schedule, ScheduleId, ScheduleRepository, ScheduleStatus, SkillCode, SkillLevel, Task,
    TaskId, TaskRepository, TimeWindow, ZoneId,
};

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: HashMap<JobId, Job>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn get_by_id(&self, id: JobId) -> RepoResult<Job> {
        self.jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("job", id))
    }

    fn get_by_job_number(&self, job_number: &str) -> RepoResult<Job> {
        self.jobs
            .values()
            .find(|j| j.job_number == job_number)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("job", job_number))
    }

    fn find_by_status(&self, statuses: &[JobStatus]) -> RepoResult<Vec<Job>> {
        Ok(self
            .jobs
            .values()
            .filter(|j| statuses.contains(&j.status))
            .cloned()
            .collect())
    }

    fn find_overdue(&self, as_of: DateTime<Utc>) -> RepoResult<Vec<Job>> {
        Ok(self
            .jobs
            .values()
            .filter(|j| j.due_date < as_of && !j.status.is_terminal())
            .cloned()
            .collect())
    }

    fn find_by_customer(&self, name: &str) -> RepoResult<Vec<Job>> {
        Ok(self
            .jobs
            .values()
            .filter(|j| j.customer_name.as_deref() == Some(name))
            .cloned()
            .collect())
    }

    fn save(&mut self, job: &Job) -> RepoResult<()> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn delete(&mut self, id: JobId) -> RepoResult<()> {
        self.jobs
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found("job", id))
    }
}

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: HashMap<TaskId, Task>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn get_by_id(&self, id: TaskId) -> RepoResult<Task> {
        self.tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("task", id))
    }

    fn find_by_job(&self, job_id: JobId) -> RepoResult<Vec<Task>> {
        let mut tasks: Vec<Task> =
            self.tasks.values().filter(|t| t.job_id == job_id).cloned().collect();
        tasks.sort_by_key(|t| t.sequence_in_job);
        Ok(tasks)
    }

    fn save(&mut self, task: &Task) -> RepoResult<()> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMachineRepository {
    machines: HashMap<MachineId, Machine>,
}

impl InMemoryMachineRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_machines(machines: impl IntoIterator<Item = Machine>) -> Self {
        Self { machines: machines.into_iter().map(|m| (m.id, m)).collect() }
    }
}

impl MachineRepository for InMemoryMachineRepository {
    fn get_by_id(&self, id: MachineId) -> RepoResult<Machine> {
        self.machines
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("machine", id))
    }

    fn find_available(&self) -> RepoResult<Vec<Machine>> {
        Ok(self
            .machines
            .values()
            .filter(|m| m.status == MachineStatus::Available)
            .cloned()
            .collect())
    }

    fn find_by_zone(&self, zone: ZoneId) -> RepoResult<Vec<Machine>> {
        Ok(self
            .machines
            .values()
            .filter(|m| m.production_zone == Some(zone))
            .cloned()
            .collect())
    }

    fn save(&mut self, machine: &Machine) -> RepoResult<()> {
        self.machines.insert(machine.id, machine.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOperatorRepository {
    operators: HashMap<OperatorId, Operator>,
}

impl InMemoryOperatorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operators(operators: impl IntoIterator<Item = Operator>) -> Self {
        Self { operators: operators.into_iter().map(|o| (o.id, o)).collect() }
    }
}

impl OperatorRepository for InMemoryOperatorRepository {
    fn get_by_id(&self, id: OperatorId) -> RepoResult<Operator> {
        self.operators
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("operator", id))
    }

    fn find_available(&self) -> RepoResult<Vec<Operator>> {
        Ok(self
            .operators
            .values()
            .filter(|o| o.is_active && o.status != OperatorStatus::Absent)
            .cloned()
            .collect())
    }

    fn find_by_skill(&self, skill: &SkillCode, minimum: SkillLevel) -> RepoResult<Vec<Operator>> {
        Ok(self
            .operators
            .values()
            .filter(|o| o.skills.get(skill).is_some_and(|s| s.level >= minimum))
            .cloned()
            .collect())
    }

    fn save(&mut self, operator: &Operator) -> RepoResult<()> {
        self.operators.insert(operator.id, operator.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryScheduleRepository {
    schedules: HashMap<ScheduleId, Schedule>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleRepository for InMemoryScheduleRepository {
    fn get_by_id(&self, id: ScheduleId) -> RepoResult<Schedule> {
        self.schedules
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("schedule", id))
    }

    fn find_active(&self, as_of: DateTime<Utc>) -> RepoResult<Vec<Schedule>> {
        Ok(self
            .schedules
            .values()
            .filter(|s| s.status == ScheduleStatus::Active && s.planning_horizon.contains_instant(as_of))
            .cloned()
            .collect())
    }

    fn find_by_status(&self, statuses: &[ScheduleStatus]) -> RepoResult<Vec<Schedule>> {
        Ok(self
            .schedules
            .values()
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect())
    }

    fn save(&mut self, schedule: &Schedule) -> RepoResult<()> {
        self.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    fn create_new_version(&mut self, base: ScheduleId) -> RepoResult<Schedule> {
        let base = self.get_by_id(base)?;
        let next = base.next_version();
        self.schedules.insert(next.id, next.clone());
        Ok(next)
    }

    fn find_conflicting(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<Schedule>> {
        let probe = TimeWindow::absolute(start, end)
            .map_err(|e| RepositoryError::storage(e.to_string()))?;
        Ok(self
            .schedules
            .values()
            .filter(|s| s.planning_horizon.overlaps(&probe).unwrap_or(false))
            .cloned()
            .collect())
    }
}
