//! Engine-wide error taxonomy.
//!
//! Every kind is distinguishable by callers, carries a stable `code()`
//! string, and can render a `details()` map for the API surface. Messages
//! never leak internals.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::repository::RepositoryError;

/// Fixed vocabulary of remediations suggested on infeasibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Remediation {
    ReduceQuantity,
    ExtendHorizon,
    AddOperatorSkill,
    RelaxDueDate,
}

impl Remediation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReduceQuantity => "reduce_quantity",
            Self::ExtendHorizon => "extend_horizon",
            Self::AddOperatorSkill => "add_operator_skill",
            Self::RelaxDueDate => "relax_due_date",
        }
    }
}

impl std::fmt::Display for Remediation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine's error type.
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("validation failed for `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: &'static str, id: String },

    #[error("illegal {entity} transition: {from} -> {to}")]
    BusinessRuleViolation {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("no feasible solution: {message}")]
    NoFeasibleSolution {
        reason: &'static str,
        message: String,
        conflicting_jobs: Vec<String>,
        suggestions: Vec<Remediation>,
    },

    #[error("optimization budget exhausted after {elapsed_seconds:.1}s without improvement")]
    OptimizationTimeout { elapsed_seconds: f64 },

    #[error("solver failed: {message}")]
    Optimization { message: String },

    #[error("unresolved conflict on {resource}: {message}")]
    ResourceConflict { resource: String, message: String },

    #[error("storage backend failed: {message}")]
    Storage { message: String },

    #[error("inconsistent configuration for `{field}`: {message}")]
    Configuration { field: String, message: String },
}

impl SchedulingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration { field: field.into(), message: message.into() }
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::EntityNotFound { entity, id: id.to_string() }
    }

    /// Stable machine-readable code for the API surface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            Self::BusinessRuleViolation { .. } => "BUSINESS_RULE_VIOLATION",
            Self::NoFeasibleSolution { .. } => "NO_FEASIBLE_SOLUTION",
            Self::OptimizationTimeout { .. } => "OPTIMIZATION_TIMEOUT",
            Self::Optimization { .. } => "OPTIMIZATION_ERROR",
            Self::ResourceConflict { .. } => "RESOURCE_CONFLICT",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }

    /// Structured context for the API's `error_details` map.
    pub fn details(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        match self {
            Self::Validation { field, message } | Self::Configuration { field, message } => {
                map.insert("field".into(), field.clone());
                map.insert("message".into(), message.clone());
            }
            Self::EntityNotFound { entity, id } => {
                map.insert("entity".into(), (*entity).to_string());
                map.insert("id".into(), id.clone());
            }
            Self::BusinessRuleViolation { entity, from, to } => {
                map.insert("entity".into(), (*entity).to_string());
                map.insert("from".into(), from.clone());
                map.insert("to".into(), to.clone());
            }
            Self::NoFeasibleSolution { reason, conflicting_jobs, suggestions, .. } => {
                map.insert("reason".into(), (*reason).to_string());
                if !conflicting_jobs.is_empty() {
                    map.insert("conflicting_jobs".into(), conflicting_jobs.join(","));
                }
                if !suggestions.is_empty() {
                    map.insert(
                        "suggested_actions".into(),
                        suggestions.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(","),
                    );
                }
            }
            Self::OptimizationTimeout { elapsed_seconds } => {
                map.insert("elapsed_seconds".into(), format!("{elapsed_seconds:.1}"));
            }
            Self::Optimization { message }
            | Self::Storage { message } => {
                map.insert("message".into(), message.clone());
            }
            Self::ResourceConflict { resource, message } => {
                map.insert("resource".into(), resource.clone());
                map.insert("message".into(), message.clone());
            }
        }
        map
    }
}

impl From<RepositoryError> for SchedulingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => Self::EntityNotFound { entity, id },
            RepositoryError::Storage { message } => Self::Storage { message },
        }
    }
}
