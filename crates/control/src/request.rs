//! Control requests issued by consuming code.

use serde::{Deserialize, Serialize};
use simcore::{SimError, SimResult};

/// The control law a request selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlKind {
    VoltageOut,
    VelocityVoltage,
    PositionCurrent,
}

impl ControlKind {
    pub fn name(&self) -> &'static str {
        match self {
            ControlKind::VoltageOut => "VoltageOut",
            ControlKind::VelocityVoltage => "VelocityVoltage",
            ControlKind::PositionCurrent => "PositionCurrent",
        }
    }
}

/// A request for one actuator. Setpoints are mechanism-referenced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlRequest {
    /// Open-loop voltage (V)
    VoltageOut(f64),
    /// Mechanism velocity setpoint (rad/s), voltage output
    VelocityVoltage(f64),
    /// Mechanism angle setpoint (rad), current output
    PositionCurrent(f64),
}

impl Default for ControlRequest {
    fn default() -> Self {
        ControlRequest::VoltageOut(0.0)
    }
}

impl ControlRequest {
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlRequest::VoltageOut(_) => ControlKind::VoltageOut,
            ControlRequest::VelocityVoltage(_) => ControlKind::VelocityVoltage,
            ControlRequest::PositionCurrent(_) => ControlKind::PositionCurrent,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            ControlRequest::VoltageOut(v)
            | ControlRequest::VelocityVoltage(v)
            | ControlRequest::PositionCurrent(v) => v,
        }
    }

    /// Rejects NaN and infinite setpoints.
    pub fn validate(&self) -> SimResult<()> {
        let value = self.value();
        if value.is_finite() {
            Ok(())
        } else {
            Err(SimError::InvalidSetpoint { value })
        }
    }
}
