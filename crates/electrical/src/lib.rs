//! Motor electrical models.
//!
//! This crate provides:
//! - Datasheet motor constants and presets
//! - A pure geared motor model with friction and saturation

pub mod motor;

pub use motor::*;
