//! Angle wrapping helpers.
//!
//! Mechanism positions accumulate without bound; only derived readings are
//! wrapped, and the two conventions differ at the ±π boundary.

use std::f64::consts::{PI, TAU};

/// Wraps an angle to `[-π, π)`. Used for steer facing.
pub fn wrap_half_open(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid rounds up to TAU for tiny negative inputs
    if wrapped >= PI { wrapped - TAU } else { wrapped }
}

/// Wraps an angle to `(-π, π]`. Used for shortest-path errors and gyro rotation.
pub fn wrap_shortest(angle: f64) -> f64 {
    let wrapped = PI - (PI - angle).rem_euclid(TAU);
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Sign with `sign(0) == 0`, unlike `f64::signum`.
pub fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}
