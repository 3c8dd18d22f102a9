use thiserror::Error;

/// Unified error type for `arellano_collocation` operations.
#[derive(Debug, Error)]
pub enum SovereignError {
    /// Raised when provided arrays or matrices have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension, often the model-implied value.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when an economy or solver parameter is outside its admissible range.
    #[error("parameter `{name}` = {value} is invalid: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Raised when a transition matrix row is not a probability distribution.
    #[error("transition matrix row {row} is not stochastic (sum {sum}, min entry {min})")]
    InvalidTransitionMatrix { row: usize, sum: f64, min: f64 },

    /// Raised when a basis matrix cannot be factorized.
    #[error("matrix in {context} is singular")]
    SingularMatrix { context: &'static str },

    /// Raised when the debt-choice bracket at a collocation node is empty.
    #[error("no feasible debt choice at node {node}: bracket [{lower}, {upper}] is empty")]
    InfeasibleNode {
        /// Index of the collocation node.
        node: usize,
        lower: f64,
        upper: f64,
    },

    /// Raised when coefficients stop being finite during the fixed-point iteration.
    #[error("encountered non-finite values in {context} during sweep {iteration}")]
    NumericalDivergence {
        iteration: usize,
        context: &'static str,
    },

    /// Raised on request when the fixed-point iteration hit its cap.
    #[error(
        "collocation iteration did not converge after {iterations} iterations; last distance {distance}"
    )]
    NonConvergence {
        /// Number of sweeps performed before termination.
        iterations: usize,
        /// Largest coefficient change observed in the last sweep.
        distance: f64,
    },
}

impl SovereignError {
    /// Helper to format a [`DimensionMismatch`](SovereignError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper to raise when a matrix factorization fails due to singularity.
    pub fn singular(context: &'static str) -> Self {
        Self::SingularMatrix { context }
    }

    /// Helper for rejecting an out-of-range parameter.
    pub fn invalid_parameter(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, SovereignError>;
