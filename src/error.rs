//! # Error
//!
//! $$
//! \mathcal{E}=\{\text{invalid input},\ \text{numerical instability},\ \text{dimension mismatch}\}
//! $$
//!
use thiserror::Error;

/// Errors surfaced by the estimation, simulation and diagnostics entry points.
///
/// Optimizer non-convergence is not an error: it is reported through
/// [`ConvergenceStatus`](crate::stats::mle::ConvergenceStatus).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CirError {
  /// Input rejected at the boundary before any computation.
  #[error("invalid input: {0}")]
  InvalidInput(String),
  /// The objective cannot be evaluated to a finite value where the optimizer needs one.
  #[error("numerical instability: {0}")]
  NumericalInstability(String),
  /// Two series that must be aligned have different lengths.
  #[error("dimension mismatch: expected length {expected}, found {found}")]
  DimensionMismatch { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, CirError>;

macro_rules! ensure_input {
  ($cond:expr, $($arg:tt)+) => {
    if !$cond {
      return Err($crate::error::CirError::InvalidInput(format!($($arg)+)));
    }
  };
}

pub(crate) use ensure_input;
