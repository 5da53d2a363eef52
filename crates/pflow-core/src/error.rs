//! Error type shared by every pflow crate.
//!
//! [`PflowError`] separates lifecycle and configuration mistakes (which abort
//! the current call) from numerical outcomes. Island blackout is deliberately
//! absent: it is recorded in [`crate::Diagnostics`] and never raised.
//!
//! # Example
//!
//! ```ignore
//! use pflow_core::{PflowError, PflowResult};
//!
//! fn trip(topology: &mut NetworkTopology, line: LineId) -> PflowResult<()> {
//!     topology.set_line_status(line, LineStatus::Tripped)?;
//!     topology.recompute_connectivity()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for topology, assembly and solver operations.
#[derive(Error, Debug)]
pub enum PflowError {
    /// Malformed or under-specified topology detected at finalize time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A mutation or query referenced an entity that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation called out of lifecycle order
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Newton iteration hit its cap (or blew up) without meeting tolerance
    #[error("Power flow did not converge after {iterations} iterations (residual norm {residual_norm:.3e})")]
    ConvergenceFailure { iterations: usize, residual_norm: f64 },

    /// The linear-solve backend failed (singular or malformed system)
    #[error("Linear solve error: {0}")]
    LinearSolve(String),

    /// Input records could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors while reading network files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using PflowError.
pub type PflowResult<T> = Result<T, PflowError>;

impl PflowError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        PflowError::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        PflowError::NotFound(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        PflowError::InvalidState(msg.into())
    }

    /// True for errors the caller may recover from by changing solver settings.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PflowError::ConvergenceFailure { .. } | PflowError::LinearSolve(_)
        )
    }
}

impl From<serde_json::Error> for PflowError {
    fn from(err: serde_json::Error) -> Self {
        PflowError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for PflowError {
    fn from(err: toml::de::Error) -> Self {
        PflowError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PflowError::ConvergenceFailure {
            iterations: 20,
            residual_norm: 1.5e-2,
        };
        let text = err.to_string();
        assert!(text.contains("20 iterations"));
        assert!(text.contains("1.500e-2"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "case.json");
        let err: PflowError = io_err.into();
        assert!(matches!(err, PflowError::Io(_)));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(PflowError::LinearSolve("singular".into()).is_recoverable());
        assert!(!PflowError::invalid_state("solve before setup").is_recoverable());
        assert!(!PflowError::not_found("line 8-9").is_recoverable());
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> PflowResult<()> {
            Err(PflowError::configuration("no generation anywhere"))
        }

        fn outer() -> PflowResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(outer(), Err(PflowError::Configuration(_))));
    }
}
