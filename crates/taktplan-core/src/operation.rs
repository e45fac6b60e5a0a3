//! The operation catalogue: reusable operation types and their routings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::skill::SkillRequirement;
use crate::time::Duration;
use crate::{MachineId, OperationId};

/// One candidate machine for an operation, with machine-specific times.
///
/// Processing time is per unit; the model builder scales it by job quantity
/// and the machine's efficiency factor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingOption {
    pub machine_id: MachineId,
    pub processing_per_unit: Duration,
    pub setup: Duration,
    /// Preferred routing, used for tie-breaks between equally good options.
    pub is_primary: bool,
}

impl RoutingOption {
    pub fn new(machine_id: MachineId, processing_per_unit: Duration, setup: Duration) -> Self {
        Self { machine_id, processing_per_unit, setup, is_primary: false }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }
}

/// Catalogue entry describing a reusable operation type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub code: String,
    pub name: String,
    pub routing_options: Vec<RoutingOption>,
    pub required_skills: Vec<SkillRequirement>,
    /// Operators needed while the operation is attended.
    pub required_operator_count: u8,
}

impl Operation {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            routing_options: Vec::new(),
            required_skills: Vec::new(),
            required_operator_count: 1,
        }
    }

    pub fn routing(mut self, option: RoutingOption) -> Self {
        self.routing_options.push(option);
        self
    }

    pub fn requires_skill(mut self, requirement: SkillRequirement) -> Self {
        self.required_skills.push(requirement);
        self
    }

    pub fn operator_count(mut self, count: u8) -> Self {
        self.required_operator_count = count.max(1);
        self
    }

    pub fn routing_for(&self, machine_id: MachineId) -> Option<(usize, &RoutingOption)> {
        self.routing_options
            .iter()
            .enumerate()
            .find(|(_, r)| r.machine_id == machine_id)
    }
}
