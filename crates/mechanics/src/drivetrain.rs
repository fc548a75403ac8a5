//! Drivetrain aggregate: every swerve module plus the chassis gyro, advanced
//! together on one fixed physics timestep.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use sensors::{GyroConfig, GyroSimulation};
use simcore::{require_positive, FixedTimestep, Model, SimError, SimResult};

use crate::module::{SwerveModuleConfig, SwerveModuleSim};

/// Physics and control rates. The control period is always a whole number
/// of physics ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimTiming {
    /// Physics timestep in seconds.
    pub physics_dt: f64,
    /// Physics ticks per control period.
    pub control_substeps: u32,
}

impl Default for SimTiming {
    fn default() -> Self {
        // 200 Hz physics under a 50 Hz robot loop
        SimTiming {
            physics_dt: 0.005,
            control_substeps: 4,
        }
    }
}

impl SimTiming {
    pub fn control_dt(&self) -> f64 {
        self.physics_dt * self.control_substeps as f64
    }

    pub fn validate(&self) -> SimResult<()> {
        require_positive("physics_dt", self.physics_dt)?;
        if self.control_substeps == 0 {
            return Err(SimError::config("control_substeps", 0.0, "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwerveDriveConfig {
    pub modules: Vec<SwerveModuleConfig>,
    pub gyro: GyroConfig,
    pub timing: SimTiming,
}

impl Default for SwerveDriveConfig {
    fn default() -> Self {
        // front left, front right, back left, back right
        SwerveDriveConfig {
            modules: vec![SwerveModuleConfig::default(); 4],
            gyro: GyroConfig::default(),
            timing: SimTiming::default(),
        }
    }
}

impl SwerveDriveConfig {
    pub fn with_modules(mut self, modules: Vec<SwerveModuleConfig>) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_gyro(mut self, gyro: GyroConfig) -> Self {
        self.gyro = gyro;
        self
    }

    pub fn with_timing(mut self, timing: SimTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.modules.is_empty() {
            return Err(SimError::config("modules", 0.0, "at least one module is required"));
        }
        for module in &self.modules {
            module.validate()?;
        }
        self.gyro.validate()?;
        self.timing.validate()
    }
}

/// The simulated drivetrain. Owns its modules and gyro; nothing is shared
/// between instances.
#[derive(Debug, Clone)]
pub struct SwerveDriveSim {
    config: SwerveDriveConfig,
    modules: Vec<SwerveModuleSim>,
    gyro: GyroSimulation,
    stepper: FixedTimestep,
    ticks: u64,
}

impl SwerveDriveSim {
    pub fn new(config: SwerveDriveConfig) -> SimResult<Self> {
        config.validate()?;
        let modules = config
            .modules
            .iter()
            .map(|module| SwerveModuleSim::new(*module))
            .collect::<SimResult<Vec<_>>>()?;
        debug!(
            "swerve drive: {} modules, physics dt {} s, {} substeps",
            modules.len(),
            config.timing.physics_dt,
            config.timing.control_substeps
        );

        Ok(SwerveDriveSim {
            gyro: GyroSimulation::new(config.gyro)?,
            stepper: FixedTimestep::new(config.timing.physics_dt)?,
            modules,
            config,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &SwerveDriveConfig {
        &self.config
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn module(&self, index: usize) -> SimResult<&SwerveModuleSim> {
        let count = self.modules.len();
        self.modules.get(index).ok_or(SimError::ModuleIndex { index, count })
    }

    pub fn module_mut(&mut self, index: usize) -> SimResult<&mut SwerveModuleSim> {
        let count = self.modules.len();
        self.modules
            .get_mut(index)
            .ok_or(SimError::ModuleIndex { index, count })
    }

    pub fn modules(&self) -> &[SwerveModuleSim] {
        &self.modules
    }

    pub fn gyro(&self) -> &GyroSimulation {
        &self.gyro
    }

    /// Simulated time covered by completed physics ticks.
    pub fn elapsed(&self) -> f64 {
        self.ticks as f64 * self.config.timing.physics_dt
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one physics tick: every module in index order, then the gyro
    /// with the chassis's true angular velocity (rad/s).
    ///
    /// Nothing is committed unless every module and the gyro succeed.
    pub fn tick(&mut self, chassis_angular_velocity: f64) -> SimResult<()> {
        let dt = self.config.timing.physics_dt;
        let steps = self
            .modules
            .iter()
            .map(|module| module.plan(dt))
            .collect::<SimResult<Vec<_>>>()?;
        self.gyro.tick(chassis_angular_velocity, dt)?;

        for (module, step) in self.modules.iter_mut().zip(steps) {
            module.commit(step);
        }
        self.ticks += 1;
        trace!(
            "drive tick {}: gyro {:.4} rad",
            self.ticks,
            self.gyro.gyro_rotation()
        );
        Ok(())
    }

    /// Runs one control period worth of physics ticks. Requests issued
    /// before the call take effect on its first tick.
    pub fn step_control_period(&mut self, chassis_angular_velocity: f64) -> SimResult<()> {
        for _ in 0..self.config.timing.control_substeps {
            self.tick(chassis_angular_velocity)?;
        }
        Ok(())
    }

    /// Advances by `elapsed` wall seconds, running as many whole physics
    /// ticks as fit. Leftover time carries into the next call and is
    /// returned.
    pub fn run_for(&mut self, elapsed: f64, chassis_angular_velocity: f64) -> SimResult<f64> {
        let mut stepper = self.stepper.clone();
        let result = stepper.advance(elapsed, |_| self.tick(chassis_angular_velocity));
        self.stepper = stepper;
        if let Err(err) = &result {
            warn!("run_for stopped after {} ticks: {err}", self.ticks);
        }
        result
    }

    /// Injects a collision disturbance into the gyro.
    pub fn apply_collision_impulse(&mut self, magnitude: f64) -> SimResult<()> {
        self.gyro.apply_collision_impulse(magnitude)
    }
}

impl Model for SwerveDriveSim {
    /// Zeroes every module, the gyro and the clock.
    fn reset(&mut self) {
        for module in &mut self.modules {
            module.reset();
        }
        self.gyro.reset();
        self.stepper.reset();
        self.ticks = 0;
        debug!("swerve drive reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use control::ControlRequest;

    fn quiet_config() -> SwerveDriveConfig {
        SwerveDriveConfig::default().with_gyro(GyroConfig::ideal())
    }

    #[test]
    fn test_default_drivetrain_has_four_modules() {
        let sim = SwerveDriveSim::new(SwerveDriveConfig::default()).unwrap();
        assert_eq!(sim.module_count(), 4);
        assert_eq!(sim.elapsed(), 0.0);
        assert!(sim.module(3).is_ok());
        assert_eq!(
            sim.module(4).err(),
            Some(SimError::ModuleIndex { index: 4, count: 4 })
        );
    }

    #[test]
    fn test_control_period_runs_substeps() {
        let mut sim = SwerveDriveSim::new(quiet_config()).unwrap();
        sim.step_control_period(0.0).unwrap();
        assert_eq!(sim.ticks(), 4);
        assert!((sim.elapsed() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_run_for_carries_remainder() {
        let mut sim = SwerveDriveSim::new(quiet_config()).unwrap();
        let rest = sim.run_for(0.012, 0.0).unwrap();
        assert_eq!(sim.ticks(), 2);
        assert!((rest - 0.002).abs() < 1e-9);

        sim.run_for(0.004, 0.0).unwrap();
        assert_eq!(sim.ticks(), 3);
    }

    #[test]
    fn test_gyro_follows_chassis_rotation() {
        let mut sim = SwerveDriveSim::new(quiet_config()).unwrap();
        for _ in 0..100 {
            sim.tick(1.0).unwrap();
        }
        assert!((sim.gyro().gyro_rotation() - 0.5).abs() < 1e-9);
        assert_eq!(sim.gyro().gyro_angular_velocity(), 1.0);
    }

    #[test]
    fn test_module_requests_apply_to_that_module_only() {
        let mut sim = SwerveDriveSim::new(quiet_config()).unwrap();
        sim.module_mut(1)
            .unwrap()
            .request_steer_control(ControlRequest::PositionCurrent(1.0))
            .unwrap();
        for _ in 0..50 {
            sim.step_control_period(0.0).unwrap();
        }
        assert!((sim.module(1).unwrap().steer_absolute_facing() - 1.0).abs() < 0.02);
        assert_eq!(sim.module(0).unwrap().steer_absolute_facing(), 0.0);
    }

    #[test]
    fn test_failed_gyro_tick_commits_nothing() {
        let mut sim = SwerveDriveSim::new(quiet_config()).unwrap();
        sim.module_mut(0)
            .unwrap()
            .request_drive_control(ControlRequest::VoltageOut(6.0))
            .unwrap();

        assert!(sim.tick(f64::NAN).is_err());
        assert_eq!(sim.ticks(), 0);
        let module = sim.module(0).unwrap();
        assert_eq!(module.drive_state().velocity, 0.0);
        assert_eq!(module.drive_request(), ControlRequest::VoltageOut(6.0));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut sim = SwerveDriveSim::new(quiet_config()).unwrap();
        for i in 0..4 {
            let module = sim.module_mut(i).unwrap();
            module.request_drive_control(ControlRequest::VoltageOut(8.0)).unwrap();
            module.request_steer_control(ControlRequest::PositionCurrent(2.0)).unwrap();
        }
        sim.run_for(0.5, 2.0).unwrap();
        sim.apply_collision_impulse(3.0).unwrap();

        sim.reset();
        assert_eq!(sim.ticks(), 0);
        assert_eq!(sim.gyro().gyro_rotation(), 0.0);
        for module in sim.modules() {
            assert_eq!(*module.drive_state(), simcore::MechanismState::default());
            assert_eq!(*module.steer_state(), simcore::MechanismState::default());
            assert_eq!(module.drive_request(), ControlRequest::VoltageOut(0.0));
        }
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let empty = SwerveDriveConfig::default().with_modules(Vec::new());
        assert!(SwerveDriveSim::new(empty).is_err());

        let no_substeps = SwerveDriveConfig::default().with_timing(SimTiming {
            physics_dt: 0.005,
            control_substeps: 0,
        });
        assert!(SwerveDriveSim::new(no_substeps).is_err());

        let bad_dt = SwerveDriveConfig::default().with_timing(SimTiming {
            physics_dt: 0.0,
            control_substeps: 4,
        });
        assert!(SwerveDriveSim::new(bad_dt).is_err());
    }
}
