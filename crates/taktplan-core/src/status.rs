//! Lifecycle status enumerations and their transition tables.
//!
//! Every status enum exposes `can_transition_to`, the single source of truth
//! for legal successor states. The state machine and entity setters both
//! consult it; nothing else encodes transitions.

use serde::{Deserialize, Serialize};

/// Work-order lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Planned,
    Released,
    InProgress,
    Completed,
    OnHold,
    Cancelled,
}

impl JobStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Planned, Released)
                | (Planned, OnHold)
                | (Planned, Cancelled)
                | (Released, InProgress)
                | (Released, OnHold)
                | (Released, Cancelled)
                | (InProgress, Completed)
                | (InProgress, OnHold)
                | (InProgress, Cancelled)
                | (OnHold, Released)
                | (OnHold, InProgress)
                | (OnHold, Cancelled)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Lifecycle of a single task within a job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Pending,
    Ready,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Cancelled)
                | (Ready, Scheduled)
                | (Ready, Cancelled)
                | (Scheduled, InProgress)
                | (Scheduled, Ready)
                | (Scheduled, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

/// Lifecycle of a schedule aggregate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleStatus {
    #[default]
    Draft,
    Optimizing,
    Published,
    Active,
    Completed,
    Archived,
}

impl ScheduleStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        use ScheduleStatus::*;
        matches!(
            (self, next),
            (Draft, Optimizing)
                | (Draft, Published)
                | (Draft, Archived)
                | (Optimizing, Draft)
                | (Optimizing, Archived)
                | (Published, Active)
                | (Published, Archived)
                | (Active, Completed)
                | (Completed, Archived)
        )
    }
}

/// Availability of a machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineStatus {
    #[default]
    Available,
    Busy,
    Maintenance,
    Offline,
}

impl MachineStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        use MachineStatus::*;
        matches!(
            (self, next),
            (Available, Busy)
                | (Available, Maintenance)
                | (Available, Offline)
                | (Busy, Available)
                | (Busy, Offline)
                | (Maintenance, Available)
                | (Maintenance, Offline)
                | (Offline, Available)
                | (Offline, Maintenance)
        )
    }
}

/// Availability of an operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorStatus {
    #[default]
    Available,
    Assigned,
    OnBreak,
    Absent,
}

impl OperatorStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        use OperatorStatus::*;
        self != next && !matches!((self, next), (Absent, Assigned))
    }
}

macro_rules! impl_status_display {
    ($($ty:ty),+) => {$(
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:?}", self)
            }
        }
    )+};
}

impl_status_display!(JobStatus, TaskStatus, ScheduleStatus, MachineStatus, OperatorStatus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_happy_path() {
        assert!(JobStatus::Planned.can_transition_to(JobStatus::Released));
        assert!(JobStatus::Released.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn job_terminal_states_are_sinks() {
        for next in [
            JobStatus::Planned,
            JobStatus::Released,
            JobStatus::InProgress,
            JobStatus::OnHold,
        ] {
            assert!(!JobStatus::Completed.can_transition_to(next));
            assert!(!JobStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn job_cannot_skip_release() {
        assert!(!JobStatus::Planned.can_transition_to(JobStatus::InProgress));
        assert!(!JobStatus::Planned.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn task_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Ready));
        assert!(TaskStatus::Ready.can_transition_to(TaskStatus::Scheduled));
        assert!(TaskStatus::Scheduled.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Scheduled));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
    }

    #[test]
    fn schedule_optimization_cycle() {
        assert!(ScheduleStatus::Draft.can_transition_to(ScheduleStatus::Optimizing));
        assert!(ScheduleStatus::Optimizing.can_transition_to(ScheduleStatus::Draft));
        assert!(ScheduleStatus::Draft.can_transition_to(ScheduleStatus::Published));
        assert!(ScheduleStatus::Published.can_transition_to(ScheduleStatus::Active));
        assert!(!ScheduleStatus::Optimizing.can_transition_to(ScheduleStatus::Published));
        assert!(!ScheduleStatus::Archived.can_transition_to(ScheduleStatus::Draft));
    }

    #[test]
    fn machine_offline_round_trip() {
        assert!(MachineStatus::Available.can_transition_to(MachineStatus::Offline));
        assert!(MachineStatus::Offline.can_transition_to(MachineStatus::Available));
        assert!(!MachineStatus::Offline.can_transition_to(MachineStatus::Busy));
    }
}
