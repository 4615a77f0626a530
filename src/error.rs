//! Error kinds reported at the call boundary.
//!
//! Every statistical failure surfaces here instead of as a NaN or an infinity.
//! Errors are per call: nothing in this crate keeps failure state around.

/// Errors produced by experiment design, assignment setup, and analysis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Invalid experiment setup: alpha/power/rate bounds, allocation tables that do not sum to 1,
    /// stratum counts of zero.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input data that cannot be analyzed: missing control arm, zero-count arm, empty score
    /// sample where a quantile needs at least one point.
    #[error("validation error: {0}")]
    Validation(String),

    /// A formula evaluated outside its domain (equal proportions in sample sizing, rates at the
    /// 0/1 boundary where a variance vanishes).
    #[error("domain error: {0}")]
    Domain(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }
}

impl From<statrs::StatsError> for Error {
    fn from(e: statrs::StatsError) -> Self {
        Self::Domain(e.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
