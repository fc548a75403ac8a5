//! Mechanism integrators.
//!
//! An integrator only knows torque and inertia. Control semantics live in the
//! `control` crate; the integrator integrates whatever torque it is handed.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{require_positive, validate_timestep, SimError, SimResult};
use crate::traits::{MechanismState, SimContext};

/// A single-mechanism integration strategy.
pub trait Integrator {
    /// Advances `state` by one timestep under `torque + external_torque`.
    ///
    /// The returned state carries the new position and velocity; the caller
    /// fills in applied torque and current.
    fn advance(
        &self,
        state: &MechanismState,
        torque: f64,
        load_inertia: f64,
        external_torque: f64,
        dt: f64,
    ) -> SimResult<MechanismState>;
}

fn acceleration(torque: f64, load_inertia: f64, external_torque: f64, dt: f64) -> SimResult<f64> {
    validate_timestep(dt)?;
    require_positive("load_inertia", load_inertia)?;
    Ok((torque + external_torque) / load_inertia)
}

fn finish(previous: &MechanismState, position: f64, velocity: f64) -> SimResult<MechanismState> {
    for (quantity, value) in [("velocity", velocity), ("position", position)] {
        if !value.is_finite() {
            warn!("integration diverged: {quantity} = {value}");
            return Err(SimError::NonFinite { quantity });
        }
    }
    Ok(MechanismState {
        position,
        velocity,
        ..*previous
    })
}

/// Semi-implicit Euler integrator (Symplectic Euler).
/// Velocity is updated first and the new velocity moves the position.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemiImplicitEuler;

impl Integrator for SemiImplicitEuler {
    fn advance(
        &self,
        state: &MechanismState,
        torque: f64,
        load_inertia: f64,
        external_torque: f64,
        dt: f64,
    ) -> SimResult<MechanismState> {
        let alpha = acceleration(torque, load_inertia, external_torque, dt)?;
        let velocity = state.velocity + alpha * dt;
        let position = state.position + velocity * dt;
        finish(state, position, velocity)
    }
}

/// Forward Euler. Position moves with the old velocity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitEuler;

impl Integrator for ExplicitEuler {
    fn advance(
        &self,
        state: &MechanismState,
        torque: f64,
        load_inertia: f64,
        external_torque: f64,
        dt: f64,
    ) -> SimResult<MechanismState> {
        let alpha = acceleration(torque, load_inertia, external_torque, dt)?;
        let position = state.position + state.velocity * dt;
        let velocity = state.velocity + alpha * dt;
        finish(state, position, velocity)
    }
}

/// Velocity first, then position from the mean of old and new velocity.
///
/// Exact when the torque is held constant across the tick, which is what a
/// controller sampled once per tick produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroOrderHold;

impl Integrator for ZeroOrderHold {
    fn advance(
        &self,
        state: &MechanismState,
        torque: f64,
        load_inertia: f64,
        external_torque: f64,
        dt: f64,
    ) -> SimResult<MechanismState> {
        let alpha = acceleration(torque, load_inertia, external_torque, dt)?;
        let velocity = state.velocity + alpha * dt;
        let position = state.position + 0.5 * (state.velocity + velocity) * dt;
        finish(state, position, velocity)
    }
}

/// Configurable choice of integrator, dispatched with a `match`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationMethod {
    ExplicitEuler,
    SemiImplicitEuler,
    #[default]
    ZeroOrderHold,
}

impl Integrator for IntegrationMethod {
    fn advance(
        &self,
        state: &MechanismState,
        torque: f64,
        load_inertia: f64,
        external_torque: f64,
        dt: f64,
    ) -> SimResult<MechanismState> {
        match self {
            IntegrationMethod::ExplicitEuler => {
                ExplicitEuler.advance(state, torque, load_inertia, external_torque, dt)
            }
            IntegrationMethod::SemiImplicitEuler => {
                SemiImplicitEuler.advance(state, torque, load_inertia, external_torque, dt)
            }
            IntegrationMethod::ZeroOrderHold => {
                ZeroOrderHold.advance(state, torque, load_inertia, external_torque, dt)
            }
        }
    }
}

/// Fixed-timestep wrapper that accumulates wall time and
/// runs as many whole ticks as fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedTimestep {
    pub fixed_dt: f64,
    pub accumulator: f64,
    pub t: f64,
}

impl FixedTimestep {
    pub fn new(fixed_dt: f64) -> SimResult<Self> {
        Ok(FixedTimestep {
            fixed_dt: validate_timestep(fixed_dt)?,
            accumulator: 0.0,
            t: 0.0,
        })
    }

    /// Runs `tick` once per whole `fixed_dt` contained in the accumulated time.
    /// Returns the remaining time that didn't fit into a full tick.
    ///
    /// A failing tick stops the loop; the failed tick's time stays in the
    /// accumulator.
    pub fn advance<F>(&mut self, elapsed: f64, mut tick: F) -> SimResult<f64>
    where
        F: FnMut(SimContext) -> SimResult<()>,
    {
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(SimError::InvalidTimestep(elapsed));
        }
        self.accumulator += elapsed;

        while self.accumulator >= self.fixed_dt {
            tick(SimContext {
                dt: self.fixed_dt,
                t: self.t,
            })?;
            self.accumulator -= self.fixed_dt;
            self.t += self.fixed_dt;
        }

        Ok(self.accumulator)
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.t = 0.0;
    }
}
