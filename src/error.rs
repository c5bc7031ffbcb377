//! # Error Types
//!
//! Configuration and I/O failures are reported through [`PgibbsError`].
//! Bookkeeping contract violations (double add/remove of a sentence,
//! unseating a customer that was never seated, residual mass after
//! clearing) are not errors: they panic with a diagnostic.

/// Errors from pgibbs operations.
#[derive(Debug, thiserror::Error)]
pub enum PgibbsError {
    /// The option is not registered in the configuration.
    #[error("illegal argument '{0}'")]
    UnknownOption(String),

    /// The option value does not parse as the requested type.
    #[error("value '{value}' for argument {key} was not {expected}")]
    InvalidValue {
        /// The option name.
        key: String,
        /// The raw value.
        value: String,
        /// Human readable type name.
        expected: &'static str,
    },

    /// `sampmeth` was none of `sequence`, `parallel`, `block`.
    #[error("illegal -sampmeth argument '{0}'")]
    UnknownSamplingMethod(String),

    /// A parameter parsed but is outside its domain.
    #[error("invalid parameter {key}: {reason}")]
    InvalidParameter {
        /// The option name.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The worker pool could not be started.
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for pgibbs operations.
pub type Result<T> = std::result::Result<T, PgibbsError>;
