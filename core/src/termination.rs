//! # Errors and Early Termination
//!
//! Everything that can stop an optimization run before it produced its next solution is
//! collected in [`Error`]. Termination that the caller asked for (interrupts, limits) is further
//! described by [`Termination`].

use std::fmt;

/// Early termination reasons for an optimization run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Terminated because of maximum number of oracle calls reached
    OracleCallsLimit,
    /// Termination because of external interrupt
    Interrupted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::OracleCallsLimit => {
                write!(f, "Solver terminated early because of oracle call limit")
            }
            Termination::Interrupted => {
                write!(f, "Solver terminated early because of interrupt signal")
            }
        }
    }
}

/// Errors raised by the optimizer and its encodings
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The input formula is not well formed
    #[error("malformed formula: {0}")]
    MalformedFormula(String),
    /// An internal invariant between the oracle and the encodings was broken
    #[error("encoding invariant violated: {0}")]
    EncodingInvariantViolation(String),
    /// A bound was requested that the encoding cannot provide
    #[error("invalid bound {requested} requested (current bound {current})")]
    InvalidBound { requested: usize, current: usize },
    /// No more variable ids can be issued
    #[error("variable id space exhausted")]
    IdsExhausted,
    /// The run was terminated early
    #[error("{0}")]
    Interrupted(Termination),
    /// The hard clauses are unsatisfiable
    #[error("hard clauses are unsatisfiable")]
    Unsatisfiable,
    /// A clause was added to an optimizer that already hardened relaxation literals
    #[error("clauses cannot be added after relaxation literals were hardened")]
    IncrementAfterHardening,
    /// All solutions have been enumerated
    #[error("no further solutions")]
    Exhausted,
    /// The optimizer stopped on an earlier error and cannot continue
    #[error("optimizer was aborted by an earlier error")]
    Aborted,
    /// Failure in the oracle or a logger
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<Termination> for Error {
    fn from(value: Termination) -> Self {
        Error::Interrupted(value)
    }
}

impl From<rustsat::OutOfMemory> for Error {
    fn from(value: rustsat::OutOfMemory) -> Self {
        Error::Other(value.into())
    }
}

impl Error {
    /// Checks whether the error is an early termination rather than a failure
    pub fn is_termination(&self) -> bool {
        matches!(self, Error::Interrupted(_))
    }
}

/// Result type of the crate
pub type Result<T = ()> = std::result::Result<T, Error>;

/// Equivalent of [`anyhow::ensure`] returning an [`Error::EncodingInvariantViolation`]
macro_rules! ensure {
    ($cond:expr, $msg:literal) => {
        if !$cond {
            return Err(crate::termination::Error::EncodingInvariantViolation(
                format!($msg),
            ));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(crate::termination::Error::EncodingInvariantViolation(
                format!($fmt, $($arg)*),
            ));
        }
    };
}
pub(crate) use ensure;
