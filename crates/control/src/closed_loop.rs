//! Closed-loop controller
//!
//! Maps the active [`ControlRequest`] and measured mechanism state to a
//! voltage or current command. Gains given at the rotor are converted to
//! mechanism units once, when the controller is built.

use log::debug;
use serde::{Deserialize, Serialize};

use electrical::{ControlOutput, MotorConfig};
use simcore::{
    require_non_negative, require_positive, sign, validate_timestep, wrap_shortest,
    MechanismState, Model, SimError, SimResult,
};

use crate::request::{ControlKind, ControlRequest};

/// Which closed-loop law an actuator is configured for.
///
/// `gain_at_rotor` means the gains were tuned against rotor (un-geared)
/// speed/position and are scaled by the gear ratio on resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law")]
pub enum ControllerConfig {
    VoltageOut,
    VelocityVoltage {
        /// V per rad/s
        gain_p: f64,
        #[serde(default)]
        gain_at_rotor: bool,
    },
    PositionCurrent {
        /// A per rad
        gain_p: f64,
        /// A per rad/s
        #[serde(default)]
        gain_d: f64,
        #[serde(default)]
        gain_at_rotor: bool,
    },
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig::VoltageOut
    }
}

impl ControllerConfig {
    pub fn velocity(gain_p: f64) -> Self {
        ControllerConfig::VelocityVoltage {
            gain_p,
            gain_at_rotor: false,
        }
    }

    pub fn position(gain_p: f64, gain_d: f64) -> Self {
        ControllerConfig::PositionCurrent {
            gain_p,
            gain_d,
            gain_at_rotor: false,
        }
    }

    /// Reinterprets the gains as rotor-referenced
    pub fn at_rotor(self) -> Self {
        match self {
            ControllerConfig::VoltageOut => self,
            ControllerConfig::VelocityVoltage { gain_p, .. } => ControllerConfig::VelocityVoltage {
                gain_p,
                gain_at_rotor: true,
            },
            ControllerConfig::PositionCurrent { gain_p, gain_d, .. } => {
                ControllerConfig::PositionCurrent {
                    gain_p,
                    gain_d,
                    gain_at_rotor: true,
                }
            }
        }
    }

    pub fn kind(&self) -> ControlKind {
        match self {
            ControllerConfig::VoltageOut => ControlKind::VoltageOut,
            ControllerConfig::VelocityVoltage { .. } => ControlKind::VelocityVoltage,
            ControllerConfig::PositionCurrent { .. } => ControlKind::PositionCurrent,
        }
    }

    /// Validates gains and converts them to mechanism units.
    pub fn resolve(&self, gear_ratio: f64) -> SimResult<ControlLaw> {
        require_positive("gear_ratio", gear_ratio)?;
        let scale = |at_rotor: bool| if at_rotor { gear_ratio } else { 1.0 };

        match *self {
            ControllerConfig::VoltageOut => Ok(ControlLaw::OpenLoop),
            ControllerConfig::VelocityVoltage { gain_p, gain_at_rotor } => {
                require_non_negative("gain_p", gain_p)?;
                Ok(ControlLaw::Velocity {
                    kp: gain_p * scale(gain_at_rotor),
                })
            }
            ControllerConfig::PositionCurrent {
                gain_p,
                gain_d,
                gain_at_rotor,
            } => {
                require_non_negative("gain_p", gain_p)?;
                require_non_negative("gain_d", gain_d)?;
                let s = scale(gain_at_rotor);
                Ok(ControlLaw::Position {
                    kp: gain_p * s,
                    kd: gain_d * s,
                })
            }
        }
    }
}

/// Mechanism-referenced gains, ready for the per-tick hot path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlLaw {
    OpenLoop,
    Velocity { kp: f64 },
    Position { kp: f64, kd: f64 },
}

impl ControlLaw {
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlLaw::OpenLoop => ControlKind::VoltageOut,
            ControlLaw::Velocity { .. } => ControlKind::VelocityVoltage,
            ControlLaw::Position { .. } => ControlKind::PositionCurrent,
        }
    }

    /// `VoltageOut` is always available; closed-loop requests need a matching law.
    pub fn supports(&self, kind: ControlKind) -> bool {
        kind == ControlKind::VoltageOut || kind == self.kind()
    }
}

/// Controller with state carried across ticks
#[derive(Debug, Clone)]
pub struct ClosedLoopController {
    law: ControlLaw,
    motor: MotorConfig,
    continuous_position: bool,
    friction_feedforward: bool,
    previous_error: f64,
    last_kind: ControlKind,
}

impl ClosedLoopController {
    pub fn new(config: ControllerConfig, motor: MotorConfig) -> SimResult<Self> {
        motor.validate()?;
        let law = config.resolve(motor.gear_ratio)?;
        debug!("controller resolved {:?} -> {:?}", config, law);

        Ok(Self {
            law,
            motor,
            continuous_position: false,
            friction_feedforward: true,
            previous_error: 0.0,
            last_kind: ControlKind::VoltageOut,
        })
    }

    /// Treat position as a continuous rotation (shortest-path error)
    pub fn with_continuous_position(mut self, continuous: bool) -> Self {
        self.continuous_position = continuous;
        self
    }

    /// Enable or disable the friction feed-forward on velocity requests
    pub fn with_friction_feedforward(mut self, enabled: bool) -> Self {
        self.friction_feedforward = enabled;
        self
    }

    pub fn law(&self) -> ControlLaw {
        self.law
    }

    pub fn previous_error(&self) -> f64 {
        self.previous_error
    }

    /// Checks a request can be served without touching controller state.
    pub fn validate_request(&self, request: &ControlRequest) -> SimResult<()> {
        request.validate()?;
        let kind = request.kind();
        if self.law.supports(kind) {
            Ok(())
        } else {
            Err(SimError::UnsupportedRequest {
                requested: kind.name(),
                configured: self.law.kind().name(),
            })
        }
    }

    /// Computes this tick's command for `request` given the measured state.
    pub fn step(
        &mut self,
        request: &ControlRequest,
        state: &MechanismState,
        dt: f64,
    ) -> SimResult<ControlOutput> {
        validate_timestep(dt)?;
        self.validate_request(request)?;

        let kind = request.kind();
        if kind != self.last_kind {
            self.previous_error = 0.0;
            self.last_kind = kind;
        }

        let output = match (*request, self.law) {
            (ControlRequest::VoltageOut(volts), _) => ControlOutput::Voltage(volts),
            (ControlRequest::VelocityVoltage(setpoint), ControlLaw::Velocity { kp }) => {
                let error = setpoint - state.velocity;
                let feedforward = if self.friction_feedforward {
                    self.motor.friction_voltage() * sign(setpoint)
                } else {
                    0.0
                };
                ControlOutput::Voltage(self.motor.clamp_voltage(kp * error + feedforward))
            }
            (ControlRequest::PositionCurrent(setpoint), ControlLaw::Position { kp, kd }) => {
                let mut error = setpoint - state.position;
                if self.continuous_position {
                    error = wrap_shortest(error);
                }
                let derivative = (error - self.previous_error) / dt;
                self.previous_error = error;
                ControlOutput::Current(self.motor.clamp_current(kp * error + kd * derivative))
            }
            // validate_request has rejected every other pairing
            (other, law) => {
                return Err(SimError::UnsupportedRequest {
                    requested: other.kind().name(),
                    configured: law.kind().name(),
                });
            }
        };

        Ok(output)
    }
}

impl Model for ClosedLoopController {
    fn reset(&mut self) {
        self.previous_error = 0.0;
        self.last_kind = ControlKind::VoltageOut;
    }
}

/// Largest mechanism-referenced velocity gain (V per rad/s) for which a
/// zero-setpoint velocity loop decays without overshoot at timestep `dt`.
///
/// With `u = -kp·ω` the motor gives `J·dω/dt = -(kt·G/R)(kp + ke·G)·ω`, so a
/// velocity-first update stays monotonic while `(kt·G/(R·J))(kp + ke·G)·dt <= 1`.
/// Saturation only shrinks the step and keeps the bound valid. A negative
/// result means back-EMF braking alone already overshoots at this `dt`.
pub fn max_monotonic_velocity_gain(
    motor: &MotorConfig,
    load_inertia: f64,
    dt: f64,
) -> SimResult<f64> {
    motor.validate()?;
    require_positive("load_inertia", load_inertia)?;
    validate_timestep(dt)?;

    let g = motor.gear_ratio;
    let m = &motor.motor;
    Ok(m.resistance * load_inertia / (m.kt * g * dt) - m.ke * g)
}
