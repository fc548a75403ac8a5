//! Closed-loop control for simulated actuators
//!
//! This crate provides:
//! - Control requests (voltage, velocity-voltage, position-current)
//! - Controller configuration with rotor/mechanism gain resolution
//! - The per-actuator closed-loop controller

pub mod closed_loop;
pub mod request;

pub use closed_loop::*;
pub use request::*;
