//! Swerve actuator mechanics.
//!
//! An [`Actuator`] ties a closed-loop controller, a motor model and a
//! mechanism integrator together. A [`SwerveModuleSim`] pairs a drive and a
//! steer actuator on one wheel, and [`SwerveDriveSim`] advances every module
//! and the chassis gyro on a shared fixed timestep.

pub mod actuator;
pub mod drivetrain;
pub mod module;

pub use actuator::{Actuator, ActuatorConfig};
pub use drivetrain::{SimTiming, SwerveDriveConfig, SwerveDriveSim};
pub use module::{SwerveModuleConfig, SwerveModuleSim};
