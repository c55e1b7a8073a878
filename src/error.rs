//! Structural failures raised by the reconciliation stages. Row-level numeric
//! problems never reach this type; they become missing cells.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Normalize,
    Join,
    Derive,
    Filter,
    Analyze,
    Assemble,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Normalize => "normalize",
            Stage::Join => "join",
            Stage::Derive => "derive",
            Stage::Filter => "filter",
            Stage::Analyze => "analyze",
            Stage::Assemble => "assemble",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconError {
    #[error("normalize: cannot rename column '{from}' to '{to}': '{to}' already exists")]
    NamingConflict { from: String, to: String },

    #[error("join: at least one key column is required")]
    EmptyJoinKeys,

    #[error("join: key column '{column}' is missing from the {side} table")]
    MissingKeyColumn { column: String, side: Side },

    #[error("join: output column '{column}' appears more than once after applying suffixes")]
    DuplicateJoinColumn { column: String },

    #[error("derive: metric '{metric}' requires column '{column}', which is absent")]
    MissingDerivationColumn { metric: String, column: String },

    #[error("filter: condition references unknown column '{column}'")]
    UnknownFilterColumn { column: String },

    #[error("filter: cannot parse condition '{expression}'")]
    InvalidFilterExpression { expression: String },

    #[error("analyze: insufficient schema, missing {}", .missing.join(", "))]
    InsufficientSchema { missing: Vec<String> },

    #[error("assemble: no station has a defined mean efficiency")]
    EmptyStationSet,

    #[error("config: invalid value for '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },
}

impl ReconError {
    pub fn stage(&self) -> Stage {
        match self {
            ReconError::NamingConflict { .. } => Stage::Normalize,
            ReconError::EmptyJoinKeys
            | ReconError::MissingKeyColumn { .. }
            | ReconError::DuplicateJoinColumn { .. } => Stage::Join,
            ReconError::MissingDerivationColumn { .. } => Stage::Derive,
            ReconError::UnknownFilterColumn { .. } | ReconError::InvalidFilterExpression { .. } => {
                Stage::Filter
            }
            ReconError::InsufficientSchema { .. } => Stage::Analyze,
            ReconError::EmptyStationSet => Stage::Assemble,
            ReconError::InvalidParameter { .. } => Stage::Config,
        }
    }

    pub(crate) fn invalid(parameter: &str, reason: impl Into<String>) -> Self {
        ReconError::InvalidParameter {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ReconResult<T> = std::result::Result<T, ReconError>;
