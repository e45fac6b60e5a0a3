//! Production resources: machines, operators and WIP zones.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::skill::{OperatorSkill, SkillCode, SkillRequirement};
use crate::status::{MachineStatus, OperatorStatus};
use crate::time::{TimeWindow, TimeWindowError};
use crate::{MachineId, OperatorId, ZoneId};

/// Whether processing needs continuous operator presence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutomationLevel {
    /// Operator must cover the whole task.
    Attended,
    /// Operator is only needed for the setup phase.
    Unattended,
}

/// A piece of production equipment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub code: String,
    pub name: String,
    pub automation_level: AutomationLevel,
    /// Multiplier on processing speed, 0.1..=2.0. Above 1.0 runs faster.
    pub efficiency_factor: Decimal,
    pub production_zone: Option<ZoneId>,
    pub required_skills: Vec<SkillRequirement>,
    pub status: MachineStatus,
    pub is_bottleneck: bool,
}

impl Machine {
    pub fn new(code: impl Into<String>, automation_level: AutomationLevel) -> Self {
        let code = code.into();
        Self {
            id: Uuid::new_v4(),
            name: code.clone(),
            code,
            automation_level,
            efficiency_factor: Decimal::ONE,
            production_zone: None,
            required_skills: Vec::new(),
            status: MachineStatus::default(),
            is_bottleneck: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_efficiency(mut self, factor: Decimal) -> Result<Self, SchedulingError> {
        let low = Decimal::new(1, 1); // 0.1
        let high = Decimal::new(2, 0);
        if factor < low || factor > high {
            return Err(SchedulingError::validation(
                "efficiency_factor",
                format!("{factor} outside 0.1..=2.0"),
            ));
        }
        self.efficiency_factor = factor;
        Ok(self)
    }

    pub fn in_zone(mut self, zone: ZoneId) -> Self {
        self.production_zone = Some(zone);
        self
    }

    pub fn requires_skill(mut self, requirement: SkillRequirement) -> Self {
        self.required_skills.push(requirement);
        self
    }

    pub fn transition(&mut self, next: MachineStatus) -> Result<(), SchedulingError> {
        if !self.status.can_transition_to(next) {
            return Err(SchedulingError::BusinessRuleViolation {
                entity: "machine",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub const fn is_attended(&self) -> bool {
        matches!(self.automation_level, AutomationLevel::Attended)
    }
}

/// A shop-floor operator with graded skills and a daily shift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub employee_id: String,
    pub name: String,
    pub skills: BTreeMap<SkillCode, OperatorSkill>,
    /// Daily shift as a relative window.
    pub shift: TimeWindow,
    /// Daily lunch break as a relative window.
    pub lunch: TimeWindow,
    pub hourly_rate: Decimal,
    pub is_active: bool,
    pub status: OperatorStatus,
}

impl Operator {
    /// Defaults: 07:00-16:00 shift, 12:00 lunch of 30 minutes.
    pub fn new(employee_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            employee_id: employee_id.into(),
            name: name.into(),
            skills: BTreeMap::new(),
            shift: TimeWindow::Relative { start_minute: 7 * 60, end_minute: 16 * 60 },
            lunch: TimeWindow::Relative { start_minute: 12 * 60, end_minute: 12 * 60 + 30 },
            hourly_rate: Decimal::new(30, 0),
            is_active: true,
            status: OperatorStatus::default(),
        }
    }

    pub fn skill(mut self, code: impl Into<SkillCode>, skill: OperatorSkill) -> Self {
        self.skills.insert(code.into(), skill);
        self
    }

    pub fn shift_window(mut self, start_minute: u16, end_minute: u16) -> Result<Self, TimeWindowError> {
        self.shift = TimeWindow::relative(start_minute, end_minute)?;
        Ok(self)
    }

    pub fn lunch_window(mut self, start_minute: u16, end_minute: u16) -> Result<Self, TimeWindowError> {
        self.lunch = TimeWindow::relative(start_minute, end_minute)?;
        Ok(self)
    }

    pub fn rate(mut self, hourly: Decimal) -> Self {
        self.hourly_rate = hourly;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Whether the operator meets every requirement at the given date.
    pub fn satisfies_all(&self, requirements: &[SkillRequirement], as_of: NaiveDate) -> bool {
        requirements.iter().all(|req| {
            self.skills
                .get(&req.skill_code)
                .is_some_and(|s| s.satisfies(req, as_of))
        })
    }
}

/// A shop-floor zone with a WIP cap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionZone {
    pub id: ZoneId,
    pub code: String,
    pub name: String,
    /// Maximum simultaneously active tasks; at least 1.
    pub wip_limit: u32,
    /// Maintained by the shop floor; the solver only reads it.
    pub current_wip: u32,
}

impl ProductionZone {
    pub fn new(code: impl Into<String>, wip_limit: u32) -> Self {
        let code = code.into();
        Self {
            id: Uuid::new_v4(),
            name: code.clone(),
            code,
            wip_limit: wip_limit.max(1),
            current_wip: 0,
        }
    }
}
