//! Chassis yaw gyro with measurement noise, bias random walk and
//! collision-induced disturbance.
//!
//! The true chassis angular velocity comes from rigid-body dynamics outside
//! this crate. Each tick the simulation turns it into what a real gyro would
//! report:
//!
//! ```text
//! ω̂      = ω + N(0, σ_v) + collision disturbance
//! bias  += N(0, σ_drift·√dt)
//! θ̂     += ω̂·dt + bias·dt
//! ```
//!
//! All randomness comes from a seeded `ChaCha8Rng`, so two simulations built
//! with the same seed and fed the same inputs report bit-identical readings.

use log::{debug, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use simcore::{
    require_non_negative, require_positive, validate_timestep, wrap_shortest, GyroState, Model,
    SimError, SimResult,
};

/// Gyro noise, drift and disturbance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GyroConfig {
    /// Rate measurement noise (rad/s)
    pub velocity_noise_std: f64,
    /// Bias instability, random walk rate (rad/s per √s)
    pub drift_std: f64,
    /// Per-tick geometric decay of an active collision disturbance, in [0, 1)
    pub collision_decay_ratio: f64,
    /// Ticks after which a collision disturbance is dropped
    pub collision_window_ticks: u32,
    /// True angular acceleration (rad/s²) above which an impact is assumed
    pub impact_acceleration_threshold: Option<f64>,
    /// Disturbance (rad/s) injected per rad/s² of acceleration above the threshold
    pub impact_gain: f64,
    pub seed: u64,
}

impl Default for GyroConfig {
    fn default() -> Self {
        GyroConfig {
            velocity_noise_std: 0.002,
            drift_std: 2.0e-4,
            collision_decay_ratio: 0.8,
            collision_window_ticks: 25,
            impact_acceleration_threshold: None,
            impact_gain: 0.0,
            seed: 0,
        }
    }
}

impl GyroConfig {
    /// A perfect gyro: no noise, no drift.
    pub fn ideal() -> Self {
        GyroConfig {
            velocity_noise_std: 0.0,
            drift_std: 0.0,
            ..Default::default()
        }
    }

    /// Roughly a Pigeon 2.0: quiet, slow bias drift.
    pub fn pigeon2() -> Self {
        GyroConfig {
            velocity_noise_std: 0.0015,
            drift_std: 1.0e-4,
            impact_acceleration_threshold: Some(200.0),
            impact_gain: 0.002,
            ..Default::default()
        }
    }

    /// Roughly a navX2-MXP.
    pub fn navx2() -> Self {
        GyroConfig {
            velocity_noise_std: 0.003,
            drift_std: 3.0e-4,
            impact_acceleration_threshold: Some(150.0),
            impact_gain: 0.004,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_velocity_noise(mut self, std: f64) -> Self {
        self.velocity_noise_std = std;
        self
    }

    pub fn with_drift(mut self, std: f64) -> Self {
        self.drift_std = std;
        self
    }

    pub fn with_collision_decay(mut self, ratio: f64, window_ticks: u32) -> Self {
        self.collision_decay_ratio = ratio;
        self.collision_window_ticks = window_ticks;
        self
    }

    pub fn with_impact_detection(mut self, threshold: f64, gain: f64) -> Self {
        self.impact_acceleration_threshold = Some(threshold);
        self.impact_gain = gain;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        require_non_negative("velocity_noise_std", self.velocity_noise_std)?;
        require_non_negative("drift_std", self.drift_std)?;
        require_non_negative("collision_decay_ratio", self.collision_decay_ratio)?;
        if self.collision_decay_ratio >= 1.0 {
            return Err(SimError::config(
                "collision_decay_ratio",
                self.collision_decay_ratio,
                "must be < 1",
            ));
        }
        if self.collision_window_ticks == 0 {
            return Err(SimError::config("collision_window_ticks", 0.0, "must be >= 1"));
        }
        if let Some(threshold) = self.impact_acceleration_threshold {
            require_positive("impact_acceleration_threshold", threshold)?;
        }
        require_non_negative("impact_gain", self.impact_gain)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GyroSimulation {
    config: GyroConfig,
    state: GyroState,
    rng: ChaCha8Rng,
}

impl GyroSimulation {
    pub fn new(config: GyroConfig) -> SimResult<Self> {
        config.validate()?;
        debug!("gyro simulation created: {:?}", config);
        Ok(GyroSimulation {
            config,
            state: GyroState::default(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        })
    }

    pub fn config(&self) -> &GyroConfig {
        &self.config
    }

    pub fn state(&self) -> &GyroState {
        &self.state
    }

    /// Advances the gyro by one physics tick.
    ///
    /// State and the noise stream are only committed once every quantity is
    /// finite.
    pub fn tick(&mut self, true_angular_velocity: f64, dt: f64) -> SimResult<()> {
        validate_timestep(dt)?;
        if !true_angular_velocity.is_finite() {
            return Err(SimError::NonFinite {
                quantity: "true angular velocity",
            });
        }

        let mut next = self.state;
        let mut rng = self.rng.clone();

        // the first tick after construction or reset has nothing to compare against
        let threshold = self.config.impact_acceleration_threshold;
        if let (Some(threshold), Some(previous)) = (threshold, next.last_true_angular_velocity) {
            let acceleration = (true_angular_velocity - previous) / dt;
            if acceleration.abs() > threshold {
                let magnitude = self.config.impact_gain * (acceleration.abs() - threshold);
                trace!("impact detected: {acceleration:.1} rad/s^2");
                self.inject(&mut next, magnitude.copysign(acceleration));
            }
        }

        let noise = sample(&mut rng, self.config.velocity_noise_std);
        let disturbance = if next.collision_ticks_remaining > 0 {
            next.collision_disturbance
        } else {
            0.0
        };
        next.estimated_angular_velocity = true_angular_velocity + noise + disturbance;
        next.drift_bias += sample(&mut rng, self.config.drift_std * dt.sqrt());
        next.estimated_heading += next.estimated_angular_velocity * dt + next.drift_bias * dt;
        next.true_heading += true_angular_velocity * dt;
        next.last_true_angular_velocity = Some(true_angular_velocity);

        if next.collision_ticks_remaining > 0 {
            next.collision_ticks_remaining -= 1;
            next.collision_disturbance = if next.collision_ticks_remaining == 0 {
                0.0
            } else {
                next.collision_disturbance * self.config.collision_decay_ratio
            };
        }

        if !(next.estimated_heading.is_finite() && next.estimated_angular_velocity.is_finite()) {
            return Err(SimError::NonFinite {
                quantity: "gyro heading",
            });
        }
        self.state = next;
        self.rng = rng;
        Ok(())
    }

    /// Injects a transient angular-velocity disturbance (rad/s) that decays
    /// over the configured window. Stacks with one already active.
    pub fn apply_collision_impulse(&mut self, magnitude: f64) -> SimResult<()> {
        if !magnitude.is_finite() {
            return Err(SimError::InvalidSetpoint { value: magnitude });
        }
        let mut next = self.state;
        self.inject(&mut next, magnitude);
        self.state = next;
        Ok(())
    }

    fn inject(&self, state: &mut GyroState, magnitude: f64) {
        if state.collision_ticks_remaining == 0 {
            state.collision_disturbance = 0.0;
        }
        state.collision_disturbance += magnitude;
        state.collision_ticks_remaining = self.config.collision_window_ticks;
    }

    /// Estimated heading wrapped to (-π, π]
    pub fn gyro_rotation(&self) -> f64 {
        wrap_shortest(self.state.estimated_heading)
    }

    /// Estimated angular velocity (rad/s), unwrapped
    pub fn gyro_angular_velocity(&self) -> f64 {
        self.state.estimated_angular_velocity
    }

    pub fn true_heading(&self) -> f64 {
        self.state.true_heading
    }

    pub fn drift_bias(&self) -> f64 {
        self.state.drift_bias
    }
}

fn sample(rng: &mut ChaCha8Rng, std: f64) -> f64 {
    if std > 0.0 {
        let z: f64 = rng.sample(StandardNormal);
        std * z
    } else {
        0.0
    }
}

impl Model for GyroSimulation {
    /// Zeroes all state and restarts the noise stream from the seed.
    fn reset(&mut self) {
        self.state = GyroState::default();
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        debug!("gyro simulation reset");
    }
}
