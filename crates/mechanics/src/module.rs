//! Swerve module simulation: a drive and a steer actuator sharing one wheel.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use control::{ControlRequest, ControllerConfig};
use electrical::{FrictionCompensation, MotorConfig, MotorConstant};
use simcore::{
    require_positive, validate_timestep, wrap_half_open, IntegrationMethod, MechanismState, Model,
    ModuleState, SimError, SimResult,
};

use crate::actuator::{Actuator, ActuatorConfig, ActuatorStep};

/// A module tick computed against the current state, not yet applied.
#[derive(Debug, Clone)]
pub(crate) struct ModuleStep {
    steer: ActuatorStep,
    drive: ActuatorStep,
}

/// Represents the physical configuration of one swerve module.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwerveModuleConfig {
    /// Wheel radius in meters.
    pub wheel_radius: f64,
    pub drive: ActuatorConfig,
    pub steer: ActuatorConfig,
    /// Drive torque induced per N·m of steer torque through the coaxial
    /// gearing. `None` leaves the axes uncoupled.
    pub steer_drive_coupling: Option<f64>,
    pub integration: IntegrationMethod,
}

impl Default for SwerveModuleConfig {
    fn default() -> Self {
        // MK4i-style module, L2 drive ratio, Kraken X60 on both axes
        let drive_motor = MotorConfig::new(MotorConstant::kraken_x60())
            .with_gear_ratio(6.75)
            .with_friction(FrictionCompensation::Voltage(0.2))
            .with_current_limit(60.0);
        let steer_motor = MotorConfig::new(MotorConstant::kraken_x60())
            .with_gear_ratio(150.0 / 7.0)
            .with_friction(FrictionCompensation::Current(0.3))
            .with_current_limit(40.0);

        SwerveModuleConfig {
            wheel_radius: 0.0508,
            drive: ActuatorConfig::new(drive_motor, ControllerConfig::velocity(0.5), 0.025),
            steer: ActuatorConfig::new(steer_motor, ControllerConfig::position(20.0, 0.5), 0.004)
                .with_continuous_position(true),
            steer_drive_coupling: None,
            integration: IntegrationMethod::default(),
        }
    }
}

impl SwerveModuleConfig {
    pub fn with_wheel_radius(mut self, radius: f64) -> Self {
        self.wheel_radius = radius;
        self
    }

    pub fn with_drive(mut self, drive: ActuatorConfig) -> Self {
        self.drive = drive;
        self
    }

    pub fn with_steer(mut self, steer: ActuatorConfig) -> Self {
        self.steer = steer;
        self
    }

    pub fn with_coupling(mut self, ratio: f64) -> Self {
        self.steer_drive_coupling = Some(ratio);
        self
    }

    pub fn with_integration(mut self, method: IntegrationMethod) -> Self {
        self.integration = method;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        require_positive("wheel_radius", self.wheel_radius)?;
        self.drive.validate()?;
        self.steer.validate()?;
        if let Some(ratio) = self.steer_drive_coupling {
            if !ratio.is_finite() {
                return Err(SimError::config("steer_drive_coupling", ratio, "must be finite"));
            }
        }
        Ok(())
    }
}

/// One simulated swerve module.
///
/// Reads always reflect the last completed tick.
#[derive(Debug, Clone)]
pub struct SwerveModuleSim {
    config: SwerveModuleConfig,
    drive: Actuator,
    steer: Actuator,
    /// Traction the wheel delivers to the chassis (N), from chassis dynamics.
    drive_ground_force: f64,
}

impl SwerveModuleSim {
    pub fn new(config: SwerveModuleConfig) -> SimResult<Self> {
        config.validate()?;
        debug!(
            "swerve module: wheel radius {} m, drive ratio {}, steer ratio {}",
            config.wheel_radius, config.drive.motor.gear_ratio, config.steer.motor.gear_ratio
        );

        Ok(SwerveModuleSim {
            drive: Actuator::new(config.drive, config.integration)?,
            steer: Actuator::new(config.steer, config.integration)?,
            config,
            drive_ground_force: 0.0,
        })
    }

    pub fn config(&self) -> &SwerveModuleConfig {
        &self.config
    }

    // === Control requests ===

    /// Replaces the drive request, effective at the next tick.
    pub fn request_drive_control(&mut self, request: ControlRequest) -> SimResult<()> {
        self.drive.request(request)
    }

    /// Replaces the steer request, effective at the next tick.
    pub fn request_steer_control(&mut self, request: ControlRequest) -> SimResult<()> {
        self.steer.request(request)
    }

    /// Sets the traction force the wheel delivers to the chassis (N,
    /// positive forward). Its reaction slows the wheel. Held until changed.
    pub fn set_drive_ground_force(&mut self, newtons: f64) -> SimResult<()> {
        if !newtons.is_finite() {
            return Err(SimError::InvalidSetpoint { value: newtons });
        }
        self.drive_ground_force = newtons;
        Ok(())
    }

    pub fn drive_request(&self) -> ControlRequest {
        self.drive.pending_request().unwrap_or(self.drive.active_request())
    }

    pub fn steer_request(&self) -> ControlRequest {
        self.steer.pending_request().unwrap_or(self.steer.active_request())
    }

    // === Simulation ===

    /// Advances both actuators one physics tick, steer first.
    ///
    /// Either both actuators advance or neither does.
    pub fn tick(&mut self, dt: f64) -> SimResult<()> {
        let step = self.plan(dt)?;
        self.commit(step);
        trace!(
            "module tick: drive {:.4} rad/s, steer {:.4} rad",
            self.drive.state().velocity,
            self.steer.state().position
        );
        Ok(())
    }

    pub(crate) fn plan(&self, dt: f64) -> SimResult<ModuleStep> {
        validate_timestep(dt)?;
        let planned = self.steer.plan(0.0, dt).and_then(|steer| {
            let coupling = self
                .config
                .steer_drive_coupling
                .map_or(0.0, |ratio| -ratio * steer.state.applied_torque);
            let ground = -self.drive_ground_force * self.config.wheel_radius;
            let drive = self.drive.plan(ground + coupling, dt)?;
            Ok(ModuleStep { steer, drive })
        });
        if let Err(err) = &planned {
            warn!("swerve module tick failed: {err}");
        }
        planned
    }

    pub(crate) fn commit(&mut self, step: ModuleStep) {
        self.steer.commit(step.steer);
        self.drive.commit(step.drive);
    }

    // === Reads ===

    pub fn state(&self) -> ModuleState {
        ModuleState {
            drive: *self.drive.state(),
            steer: *self.steer.state(),
            wheel_radius: self.config.wheel_radius,
        }
    }

    pub fn drive_state(&self) -> &MechanismState {
        self.drive.state()
    }

    pub fn steer_state(&self) -> &MechanismState {
        self.steer.state()
    }

    /// Steer facing in `[-π, π)`.
    pub fn steer_absolute_facing(&self) -> f64 {
        wrap_half_open(self.steer.state().position)
    }

    /// Steer mechanism angle since reset (rad, unwrapped).
    /// Already post-gearbox: do not divide by the gear ratio again.
    pub fn steer_relative_encoder_position(&self) -> f64 {
        self.steer.state().position
    }

    /// Total wheel rotation since reset (rad, unwrapped).
    /// Already post-gearbox: do not divide by the gear ratio again.
    pub fn drive_wheel_final_position(&self) -> f64 {
        self.drive.state().position
    }

    pub fn drive_wheel_final_velocity(&self) -> f64 {
        self.drive.state().velocity
    }

    /// Distance rolled by the wheel surface (m).
    pub fn drive_wheel_distance(&self) -> f64 {
        self.drive.state().position * self.config.wheel_radius
    }

    /// Wheel surface speed (m/s).
    pub fn drive_wheel_speed(&self) -> f64 {
        self.drive.state().velocity * self.config.wheel_radius
    }

    /// Drive motor shaft angle (rad).
    pub fn drive_rotor_position(&self) -> f64 {
        self.drive.state().position * self.config.drive.motor.gear_ratio
    }

    /// Steer motor shaft angle (rad).
    pub fn steer_rotor_position(&self) -> f64 {
        self.steer.state().position * self.config.steer.motor.gear_ratio
    }

    pub fn drive_current(&self) -> f64 {
        self.drive.state().current
    }

    pub fn steer_current(&self) -> f64 {
        self.steer.state().current
    }
}

impl Model for SwerveModuleSim {
    /// Zeroes both mechanisms, controller memory, requests and ground force.
    fn reset(&mut self) {
        self.drive.reset();
        self.steer.reset();
        self.drive_ground_force = 0.0;
        debug!("swerve module reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    const DT: f64 = 0.005;

    fn module() -> SwerveModuleSim {
        SwerveModuleSim::new(SwerveModuleConfig::default()).unwrap()
    }

    #[test]
    fn test_default_request_is_zero_voltage() {
        let mut m = module();
        assert_eq!(m.drive_request(), ControlRequest::VoltageOut(0.0));
        assert_eq!(m.steer_request(), ControlRequest::VoltageOut(0.0));
        for _ in 0..10 {
            m.tick(DT).unwrap();
        }
        assert_eq!(m.state().drive, MechanismState::default());
        assert_eq!(m.state().steer, MechanismState::default());
    }

    #[test]
    fn test_steer_settles_on_setpoint() {
        let mut m = module();
        m.request_steer_control(ControlRequest::PositionCurrent(FRAC_PI_2)).unwrap();
        for _ in 0..400 {
            m.tick(DT).unwrap();
        }
        let facing = m.steer_absolute_facing();
        assert!((facing - FRAC_PI_2).abs() < 0.02, "{facing}");
        assert!(m.steer_state().velocity.abs() < 0.1);
    }

    #[test]
    fn test_steer_turns_short_way_across_boundary() {
        let mut m = module();
        m.request_steer_control(ControlRequest::PositionCurrent(PI - 0.1)).unwrap();
        for _ in 0..400 {
            m.tick(DT).unwrap();
        }
        // target just past the seam: keep going forward instead of unwinding
        m.request_steer_control(ControlRequest::PositionCurrent(-PI + 0.1)).unwrap();
        for _ in 0..400 {
            m.tick(DT).unwrap();
            assert!(m.steer_relative_encoder_position() > PI - 0.2);
        }
        assert!((m.steer_relative_encoder_position() - (PI + 0.1)).abs() < 0.02);
        assert!((m.steer_absolute_facing() - (-PI + 0.1)).abs() < 0.02);
    }

    #[test]
    fn test_drive_velocity_and_unit_conversions() {
        let mut m = module();
        m.request_drive_control(ControlRequest::VelocityVoltage(40.0)).unwrap();
        for _ in 0..1000 {
            m.tick(DT).unwrap();
        }
        let r = m.config().wheel_radius;
        let g = m.config().drive.motor.gear_ratio;
        // P-only loop with friction feed-forward settles at kp·sp / (kp + ke·G)
        let ke_g = m.config().drive.motor.motor.ke * g;
        let expected = 0.5 * 40.0 / (0.5 + ke_g);
        let velocity = m.drive_wheel_final_velocity();
        assert!((velocity - expected).abs() < 0.05, "{velocity}");
        assert!((m.drive_wheel_speed() - m.drive_wheel_final_velocity() * r).abs() < 1e-12);
        assert!((m.drive_wheel_distance() - m.drive_wheel_final_position() * r).abs() < 1e-12);
        assert!((m.drive_rotor_position() - m.drive_wheel_final_position() * g).abs() < 1e-9);
        // odometry keeps counting past a full turn
        assert!(m.drive_wheel_final_position() > 10.0 * PI);
    }

    #[test]
    fn test_ground_force_resists_drive() {
        let mut free = module();
        let mut loaded = module();
        loaded.set_drive_ground_force(100.0).unwrap();
        for m in [&mut free, &mut loaded] {
            m.request_drive_control(ControlRequest::VoltageOut(6.0)).unwrap();
            for _ in 0..100 {
                m.tick(DT).unwrap();
            }
        }
        assert!(loaded.drive_wheel_final_velocity() < free.drive_wheel_final_velocity());
        assert!(loaded.set_drive_ground_force(f64::NAN).is_err());
    }

    #[test]
    fn test_friction_holds_wheel_against_weak_ground_force() {
        let mut m = module();
        // 10 N at the 0.0508 m wheel is below the drive's friction torque
        let friction = m.config().drive.motor.friction_torque();
        assert!(10.0 * m.config().wheel_radius < friction);

        m.set_drive_ground_force(10.0).unwrap();
        for _ in 0..200 {
            m.tick(DT).unwrap();
        }
        assert!(m.drive_wheel_final_velocity().abs() < 1e-12);
        assert!(m.drive_wheel_final_position().abs() < 1e-12);

        m.set_drive_ground_force(100.0).unwrap();
        m.tick(DT).unwrap();
        assert!(m.drive_wheel_final_velocity() < 0.0);
    }

    #[test]
    fn test_coupling_moves_drive_when_steering() {
        let mut uncoupled = module();
        let mut coupled =
            SwerveModuleSim::new(SwerveModuleConfig::default().with_coupling(0.5)).unwrap();
        for m in [&mut uncoupled, &mut coupled] {
            m.request_steer_control(ControlRequest::PositionCurrent(1.0)).unwrap();
            for _ in 0..20 {
                m.tick(DT).unwrap();
            }
        }
        assert_eq!(uncoupled.drive_wheel_final_position(), 0.0);
        assert!(coupled.drive_wheel_final_position() < 0.0);
        assert_eq!(
            uncoupled.steer_relative_encoder_position(),
            coupled.steer_relative_encoder_position()
        );
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let mut m = module();
        m.request_drive_control(ControlRequest::VelocityVoltage(30.0)).unwrap();
        m.request_steer_control(ControlRequest::PositionCurrent(2.5)).unwrap();
        for _ in 0..200 {
            m.tick(DT).unwrap();
        }
        m.reset();

        let s = m.state();
        assert_eq!(s.drive.position, 0.0);
        assert_eq!(s.drive.velocity, 0.0);
        assert_eq!(s.steer.position, 0.0);
        assert_eq!(s.steer.velocity, 0.0);
        assert_eq!(m.steer_absolute_facing(), 0.0);
        assert_eq!(m.drive_request(), ControlRequest::VoltageOut(0.0));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let flat = SwerveModuleConfig::default().with_wheel_radius(0.0);
        assert!(SwerveModuleSim::new(flat).is_err());

        let mut config = SwerveModuleConfig::default();
        config.drive.motor.gear_ratio = 0.0;
        assert!(SwerveModuleSim::new(config).is_err());

        let mut config = SwerveModuleConfig::default();
        config.steer.load_inertia = -1.0;
        assert!(SwerveModuleSim::new(config).is_err());

        let config = SwerveModuleConfig::default().with_coupling(f64::NAN);
        assert!(SwerveModuleSim::new(config).is_err());
    }

    #[test]
    fn test_failed_tick_is_all_or_nothing() {
        let mut m = module();
        m.request_drive_control(ControlRequest::VoltageOut(6.0)).unwrap();
        m.request_steer_control(ControlRequest::PositionCurrent(1.0)).unwrap();
        assert!(m.tick(-DT).is_err());
        assert_eq!(m.state().drive, MechanismState::default());
        assert_eq!(m.state().steer, MechanismState::default());
        assert_eq!(m.drive_request(), ControlRequest::VoltageOut(6.0));
    }
}
