use serde::{Deserialize, Serialize};

use crate::angle::wrap_half_open;
use crate::error::{validate_timestep, SimResult};

// Mechanical State

/// State of one rotating mechanism, measured at the final (post-gearbox) output.
///
/// `position` accumulates total rotation and is never wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MechanismState {
    pub position: f64,
    pub velocity: f64,
    pub applied_torque: f64,
    pub current: f64,
}

impl MechanismState {
    pub fn at_rest(position: f64) -> Self {
        MechanismState {
            position,
            ..Default::default()
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.applied_torque.is_finite()
            && self.current.is_finite()
    }
}

/// Snapshot of one swerve module after the last completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub drive: MechanismState,
    pub steer: MechanismState,
    pub wheel_radius: f64,
}

impl ModuleState {
    /// Wheel surface distance travelled (m).
    pub fn wheel_linear_position(&self) -> f64 {
        self.drive.position * self.wheel_radius
    }

    /// Wheel surface speed (m/s).
    pub fn wheel_linear_velocity(&self) -> f64 {
        self.drive.velocity * self.wheel_radius
    }

    /// Steer facing wrapped to `[-π, π)`.
    pub fn steer_facing(&self) -> f64 {
        wrap_half_open(self.steer.position)
    }
}

// Sensor State

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GyroState {
    /// Ground truth heading, integrated from the supplied chassis velocity.
    pub true_heading: f64,
    /// Unwrapped estimated heading including drift.
    pub estimated_heading: f64,
    pub estimated_angular_velocity: f64,
    pub drift_bias: f64,
    pub collision_disturbance: f64,
    pub collision_ticks_remaining: u32,
    /// True velocity seen on the previous tick, for impact detection.
    /// `None` until the first tick after construction or reset.
    pub last_true_angular_velocity: Option<f64>,
}

// General

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimContext {
    pub dt: f64,
    pub t: f64,
}

impl SimContext {
    pub fn new(dt: f64, t: f64) -> SimResult<Self> {
        Ok(SimContext {
            dt: validate_timestep(dt)?,
            t,
        })
    }
}

/// Anything with state that a simulation reset must clear.
pub trait Model {
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_module_state_derived_quantities() {
        let state = ModuleState {
            drive: MechanismState {
                position: 10.0,
                velocity: 4.0,
                ..Default::default()
            },
            steer: MechanismState::at_rest(2.0 * PI + 0.25),
            wheel_radius: 0.05,
        };

        assert!((state.wheel_linear_position() - 0.5).abs() < 1e-12);
        assert!((state.wheel_linear_velocity() - 0.2).abs() < 1e-12);
        assert!((state.steer_facing() - 0.25).abs() < 1e-9);
        // the raw steer position stays unwrapped
        assert!((state.steer.position - (2.0 * PI + 0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_context_rejects_bad_dt() {
        assert!(SimContext::new(0.0, 0.0).is_err());
        assert!(SimContext::new(0.005, 1.0).is_ok());
    }

    #[test]
    fn test_non_finite_detection() {
        let mut state = MechanismState::default();
        assert!(state.is_finite());
        state.velocity = f64::NAN;
        assert!(!state.is_finite());
    }
}
