//! Error types for milestoning integrators.
//!
//! Every failure that stops a trajectory surfaces as a [`MilestoneError`].
//! Crossings of any kind (corner crossings, uncommitted Elber destinations)
//! are never errors; they are recorded and left to downstream analysis.

use thiserror::Error;

use crate::types::ForceGroup;

/// Unified error type for milestoning runs.
#[derive(Error, Debug)]
pub enum MilestoneError {
    /// The boundary indicator already reports a crossing at step 0.
    #[error(
        "MMVT simulation bouncing on first step (indicator {value}): the system will be trapped behind a boundary"
    )]
    TrappedAtStart { value: f64 },

    /// An Elber milestone group has no force assigned to it in the system.
    #[error("System contains no force in group {group} used to detect {role} boundary crossings")]
    MissingForceGroup { group: ForceGroup, role: &'static str },

    /// `step` was called before a simulation context was bound.
    #[error("This integrator is not bound to a context")]
    Unbound,

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O errors (crossing log, statistics, state snapshots)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// State snapshot serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Mathematical/numerical errors (e.g., NaN coefficients)
    #[error("Numerical error: {0}")]
    NumericalError(String),
}

impl MilestoneError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        MilestoneError::ConfigError(message.into())
    }

    /// Creates a numerical error.
    pub fn numerical(message: impl Into<String>) -> Self {
        MilestoneError::NumericalError(message.into())
    }

    /// Checks whether the error invalidates the trajectory itself.
    ///
    /// Fatal errors mean continuing would produce a physically meaningless
    /// trajectory; the run has to be reconfigured, not retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MilestoneError::TrappedAtStart { .. }
                | MilestoneError::MissingForceGroup { .. }
                | MilestoneError::Unbound
                | MilestoneError::ConfigError(_)
                | MilestoneError::NumericalError(_)
        )
    }

    /// Returns a user-friendly error message with actionable guidance.
    pub fn user_message(&self) -> String {
        match self {
            MilestoneError::TrappedAtStart { .. } => {
                format!(
                    "{}\n\
                     → Check and revise MMVT boundary definitions and/or atomic positions.\n\
                     → The starting structure must lie strictly inside its milestone cell.",
                    self
                )
            }
            MilestoneError::MissingForceGroup { group, .. } => {
                format!(
                    "{}\n\
                     → Check for mismatches between force group assignments and the groups \
                     added to the Elber integrator (group {}).",
                    self, group
                )
            }
            MilestoneError::Unbound => {
                format!(
                    "{}\n\
                     → Call `bind(context)` before `step(n)`.",
                    self
                )
            }
            MilestoneError::ConfigError(_) => {
                format!(
                    "{}\n\
                     → Review your run file and ensure all required fields are set.\n\
                     → Check that step size is positive and temperature/friction are non-negative.",
                    self
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Result type alias for milestoning operations.
pub type Result<T> = std::result::Result<T, MilestoneError>;
