//! Skill grading and matching.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier for a skill in the shop's skill catalogue (e.g. "CNC-MILL").
pub type SkillCode = String;

/// Proficiency grade on the three-level shop scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SkillLevel {
    Basic = 1,
    Intermediate = 2,
    Advanced = 3,
}

impl SkillLevel {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Basic),
            2 => Some(Self::Intermediate),
            3 => Some(Self::Advanced),
            _ => None,
        }
    }
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Advanced => write!(f, "advanced"),
        }
    }
}

/// A minimum proficiency demanded by a machine or operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillRequirement {
    pub skill_code: SkillCode,
    pub minimum_level: SkillLevel,
}

impl SkillRequirement {
    pub fn new(skill_code: impl Into<SkillCode>, minimum_level: SkillLevel) -> Self {
        Self { skill_code: skill_code.into(), minimum_level }
    }
}

/// An operator's proficiency in one skill, optionally time-boxed by a
/// certification expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSkill {
    pub level: SkillLevel,
    pub certified_until: Option<NaiveDate>,
}

impl OperatorSkill {
    pub fn new(level: SkillLevel) -> Self {
        Self { level, certified_until: None }
    }

    pub fn certified_until(mut self, date: NaiveDate) -> Self {
        self.certified_until = Some(date);
        self
    }

    /// Whether the certification still counts on the given date.
    pub fn is_valid(&self, as_of: NaiveDate) -> bool {
        self.certified_until.map_or(true, |expiry| as_of < expiry)
    }

    /// Whether this proficiency satisfies a requirement on the given date.
    pub fn satisfies(&self, requirement: &SkillRequirement, as_of: NaiveDate) -> bool {
        self.is_valid(as_of) && self.level >= requirement.minimum_level
    }
}
