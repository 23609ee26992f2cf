//! # Errors
//!
//! Failure taxonomy shared by every analysis entry point.

use thiserror::Error;

/// Typed failure returned by the analysis core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
  /// Request rejected before any fetch or computation.
  #[error("invalid request: {0}")]
  Validation(String),
  /// Price or benchmark data could not be obtained.
  #[error("no data available: {0}")]
  DataUnavailable(String),
  /// Too few aligned observations for the requested statistic.
  #[error("insufficient data: {observations} aligned observations, at least {required} required")]
  InsufficientData { observations: usize, required: usize },
  /// Minimum-variance solver stopped without converging.
  #[error("optimizer did not converge after {iterations} iterations: {reason}")]
  Optimization { iterations: u64, reason: String },
}

impl PortfolioError {
  pub(crate) fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }

  pub(crate) fn unavailable(msg: impl Into<String>) -> Self {
    Self::DataUnavailable(msg.into())
  }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PortfolioError>;
