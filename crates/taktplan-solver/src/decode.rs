//! Decodes a solver solution into concrete schedule assignments.

use taktplan_core::{Duration, ScheduleAssignment, SchedulingError};

use crate::model::CpModel;
use crate::search::Solution;

/// Turn placements back into domain assignments.
///
/// The returned vector is total over the model's tasks and ordered by task
/// index; instants are minute offsets resolved against the schedule start.
pub fn decode_assignments(
    model: &CpModel,
    solution: &Solution,
) -> Result<Vec<ScheduleAssignment>, SchedulingError> {
    if solution.placements.len() != model.tasks.len() {
        return Err(SchedulingError::Optimization {
            message: format!(
                "solution covers {} of {} tasks",
                solution.placements.len(),
                model.tasks.len()
            ),
        });
    }

    let mut assignments = Vec::with_capacity(model.tasks.len());
    for (task, placement) in model.tasks.iter().zip(&solution.placements) {
        let option = task.options.get(placement.option).ok_or_else(|| {
            SchedulingError::Optimization {
                message: format!("task {} chose routing option {} of {}",
                    task.task_id, placement.option, task.options.len()),
            }
        })?;

        let operator_ids = placement
            .operators
            .iter()
            .map(|&oi| model.operators[oi].operator_id)
            .collect();

        assignments.push(ScheduleAssignment::new(
            task.task_id,
            option.machine_id,
            operator_ids,
            model.instant_at(placement.start),
            model.instant_at(placement.end),
            Duration::minutes(option.setup_minutes),
            Duration::minutes(option.processing_minutes),
            option.routing_option_index,
        )?);
    }
    Ok(assignments)
}
