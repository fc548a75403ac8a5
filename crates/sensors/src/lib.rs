//! Simulated sensors.
//!
//! This crate provides:
//! - A chassis yaw gyro with noise, bias drift and impact disturbance

pub mod gyro;

pub use gyro::*;
