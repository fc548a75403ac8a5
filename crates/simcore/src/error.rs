//! Error taxonomy shared by every simulation component.

use thiserror::Error;

/// Errors raised by the simulation core.
///
/// Configuration errors are produced once at construction. Timestep and
/// non-finite errors are runtime invariant violations of the driving loop.
/// Request errors are returned at the request boundary and leave the
/// previously active request in place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("invalid configuration: {field} = {value} ({reason})")]
    InvalidConfig {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("invalid timestep: dt = {0} (must be finite and > 0)")]
    InvalidTimestep(f64),

    #[error("integration produced a non-finite {quantity}")]
    NonFinite { quantity: &'static str },

    #[error("{requested} request rejected: actuator is configured for {configured}")]
    UnsupportedRequest {
        requested: &'static str,
        configured: &'static str,
    },

    #[error("setpoint must be finite, got {value}")]
    InvalidSetpoint { value: f64 },

    #[error("module index {index} out of range ({count} modules)")]
    ModuleIndex { index: usize, count: usize },
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Shorthand for [`SimError::InvalidConfig`].
    pub fn config(field: &'static str, value: f64, reason: &'static str) -> Self {
        SimError::InvalidConfig { field, value, reason }
    }
}

/// Checks a value is finite and strictly positive.
pub fn require_positive(field: &'static str, value: f64) -> SimResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SimError::config(field, value, "must be finite and > 0"))
    }
}

/// Checks a value is finite and not negative.
pub fn require_non_negative(field: &'static str, value: f64) -> SimResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SimError::config(field, value, "must be finite and >= 0"))
    }
}

/// Rejects non-positive or non-finite timesteps.
pub fn validate_timestep(dt: f64) -> SimResult<f64> {
    if dt.is_finite() && dt > 0.0 {
        Ok(dt)
    } else {
        Err(SimError::InvalidTimestep(dt))
    }
}
