//! Brushed-equivalent DC motor model with gearbox, friction and saturation.
//!
//! Everything here is a pure function of its inputs and an immutable
//! [`MotorConfig`], so it can be tested without a simulation loop.

use serde::{Deserialize, Serialize};
use simcore::{require_non_negative, require_positive, sign, SimResult};

const RPM_TO_RAD_PER_SEC: f64 = std::f64::consts::TAU / 60.0;

/// Electrical constants of one motor, referenced to the rotor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorConstant {
    /// Torque constant (N·m/A)
    pub kt: f64,
    /// Back-EMF constant (V·s/rad)
    pub ke: f64,
    /// Winding resistance (Ω)
    pub resistance: f64,
}

impl MotorConstant {
    pub fn new(kt: f64, ke: f64, resistance: f64) -> Self {
        MotorConstant { kt, ke, resistance }
    }

    pub fn from_recalc_values(
        kv_rpm_per_volt: f64,
        kt_nm_per_amp: f64,
        km_nm_per_root_of_watt: f64,
    ) -> Self {
        let ke = 1.0 / (kv_rpm_per_volt * RPM_TO_RAD_PER_SEC);
        let resistance = (kt_nm_per_amp / km_nm_per_root_of_watt).powi(2);

        MotorConstant {
            kt: kt_nm_per_amp,
            ke,
            resistance,
        }
    }

    pub fn kraken_x60() -> Self {
        MotorConstant::from_recalc_values(502.1, 0.0194, 0.107)
    }

    pub fn neo() -> Self {
        MotorConstant::from_recalc_values(493.5, 0.0181, 0.070)
    }

    pub fn falcon_500() -> Self {
        MotorConstant::from_recalc_values(531.9, 0.0182, 0.097)
    }

    pub fn validate(&self) -> SimResult<()> {
        require_positive("motor.kt", self.kt)?;
        require_positive("motor.ke", self.ke)?;
        require_positive("motor.resistance", self.resistance)?;
        Ok(())
    }

    /// Theoretical free speed at the given voltage (rotor rad/s)
    pub fn free_speed(&self, voltage: f64) -> f64 {
        voltage / self.ke
    }

    /// Stall current at the given voltage (A)
    pub fn stall_current(&self, voltage: f64) -> f64 {
        voltage / self.resistance
    }

    /// Stall torque at the given voltage (rotor N·m)
    pub fn stall_torque(&self, voltage: f64) -> f64 {
        self.kt * self.stall_current(voltage)
    }

    /// Steady-state rotor torque at a rotor velocity and voltage
    pub fn torque_at_velocity(&self, velocity: f64, voltage: f64) -> f64 {
        self.kt * (voltage - self.ke * velocity) / self.resistance
    }
}

impl Default for MotorConstant {
    fn default() -> Self {
        MotorConstant::kraken_x60()
    }
}

/// Friction expressed as the voltage or current needed to overcome it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FrictionCompensation {
    Voltage(f64),
    Current(f64),
}

impl Default for FrictionCompensation {
    fn default() -> Self {
        FrictionCompensation::Voltage(0.0)
    }
}

impl FrictionCompensation {
    pub fn magnitude(&self) -> f64 {
        match *self {
            FrictionCompensation::Voltage(v) => v,
            FrictionCompensation::Current(a) => a,
        }
    }

    pub fn as_voltage(&self, resistance: f64) -> f64 {
        match *self {
            FrictionCompensation::Voltage(v) => v,
            FrictionCompensation::Current(a) => a * resistance,
        }
    }

    pub fn as_current(&self, resistance: f64) -> f64 {
        match *self {
            FrictionCompensation::Voltage(v) => v / resistance,
            FrictionCompensation::Current(a) => a,
        }
    }
}

/// Configuration for a geared motor driving one mechanism
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    pub motor: MotorConstant,
    /// Rotor turns per mechanism turn. E.g., 6.75 for a 6.75:1 reduction
    pub gear_ratio: f64,
    pub friction: FrictionCompensation,
    /// Stator current limit (A)
    pub current_limit: Option<f64>,
    /// Output voltage limit (V)
    pub voltage_limit: Option<f64>,
}

impl Default for MotorConfig {
    fn default() -> Self {
        MotorConfig {
            motor: MotorConstant::default(),
            gear_ratio: 1.0,
            friction: FrictionCompensation::default(),
            current_limit: None,
            voltage_limit: Some(12.0),
        }
    }
}

impl MotorConfig {
    pub fn new(motor: MotorConstant) -> Self {
        MotorConfig {
            motor,
            ..Default::default()
        }
    }

    pub fn with_gear_ratio(mut self, ratio: f64) -> Self {
        self.gear_ratio = ratio;
        self
    }

    pub fn with_friction(mut self, friction: FrictionCompensation) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_current_limit(mut self, amps: f64) -> Self {
        self.current_limit = Some(amps);
        self
    }

    pub fn with_voltage_limit(mut self, volts: f64) -> Self {
        self.voltage_limit = Some(volts);
        self
    }

    pub fn without_voltage_limit(mut self) -> Self {
        self.voltage_limit = None;
        self
    }

    /// Rejects invalid values; nothing is clamped.
    pub fn validate(&self) -> SimResult<()> {
        self.motor.validate()?;
        require_positive("gear_ratio", self.gear_ratio)?;
        require_non_negative("friction", self.friction.magnitude())?;
        if let Some(limit) = self.current_limit {
            require_positive("current_limit", limit)?;
        }
        if let Some(limit) = self.voltage_limit {
            require_positive("voltage_limit", limit)?;
        }
        Ok(())
    }

    pub fn clamp_voltage(&self, volts: f64) -> f64 {
        match self.voltage_limit {
            Some(limit) => volts.clamp(-limit, limit),
            None => volts,
        }
    }

    pub fn clamp_current(&self, amps: f64) -> f64 {
        match self.current_limit {
            Some(limit) => amps.clamp(-limit, limit),
            None => amps,
        }
    }

    pub fn friction_voltage(&self) -> f64 {
        self.friction.as_voltage(self.motor.resistance)
    }

    pub fn friction_current(&self) -> f64 {
        self.friction.as_current(self.motor.resistance)
    }

    /// Mechanism-side friction torque magnitude (N·m)
    pub fn friction_torque(&self) -> f64 {
        self.motor.kt * self.friction_current() * self.gear_ratio
    }
}

/// Command produced by a controller for the motor driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlOutput {
    Voltage(f64),
    Current(f64),
}

impl Default for ControlOutput {
    fn default() -> Self {
        ControlOutput::Voltage(0.0)
    }
}

/// Instantaneous motor output at the mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorOutput {
    /// Net torque at the mechanism after friction (N·m)
    pub torque: f64,
    /// Electromagnetic torque at the mechanism (N·m)
    pub drive_torque: f64,
    /// Signed friction torque at the mechanism (N·m)
    pub friction_torque: f64,
    /// Stator current (A)
    pub current: f64,
    /// Terminal voltage (V)
    pub voltage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorModel {
    config: MotorConfig,
}

impl MotorModel {
    pub fn new(config: MotorConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(MotorModel { config })
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// Converts a control output into mechanism torque at the given
    /// mechanism velocity.
    pub fn compute_torque(&self, output: ControlOutput, mechanism_velocity: f64) -> MotorOutput {
        let cfg = &self.config;
        let motor = &cfg.motor;
        let rotor_velocity = mechanism_velocity * cfg.gear_ratio;
        let back_emf = motor.ke * rotor_velocity;

        let (current, voltage) = match output {
            ControlOutput::Voltage(v) => {
                let v = cfg.clamp_voltage(v);
                let current = cfg.clamp_current((v - back_emf) / motor.resistance);
                // a current-limited driver lowers its terminal voltage
                (current, current * motor.resistance + back_emf)
            }
            ControlOutput::Current(i) => {
                let current = cfg.clamp_current(i);
                (current, current * motor.resistance + back_emf)
            }
        };

        let drive_torque = motor.kt * current * cfg.gear_ratio;
        let friction_torque = self.friction_loss(drive_torque, mechanism_velocity);

        MotorOutput {
            torque: drive_torque + friction_torque,
            drive_torque,
            friction_torque,
            current,
            voltage,
        }
    }

    /// Signed friction torque. Opposes any nonzero motion, however slow; at
    /// rest it opposes the drive torque and never exceeds it.
    ///
    /// Torques from outside the motor are not known here. The actuator
    /// resolves the hold against the net torque each tick.
    fn friction_loss(&self, drive_torque: f64, mechanism_velocity: f64) -> f64 {
        let friction = self.config.friction_torque();
        if mechanism_velocity == 0.0 {
            -sign(drive_torque) * friction.min(drive_torque.abs())
        } else {
            -sign(mechanism_velocity) * friction
        }
    }
}
