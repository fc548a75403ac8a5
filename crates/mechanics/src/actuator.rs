//! Actuator - one motor, its controller and the mechanism it drives
//!
//! Each tick runs Controller → Motor Model → Integrator against the state
//! left by the previous tick. Requests are buffered and promoted at the
//! start of the next tick.

use log::warn;
use serde::{Deserialize, Serialize};

use control::{ClosedLoopController, ControlRequest, ControllerConfig};
use electrical::{MotorConfig, MotorModel, MotorOutput};
use simcore::{
    require_positive, sign, IntegrationMethod, Integrator, MechanismState, Model, SimError,
    SimResult,
};

/// Configuration for one actuated mechanism
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub motor: MotorConfig,
    pub controller: ControllerConfig,
    /// Effective inertia at the mechanism, kg·m²
    pub load_inertia: f64,
    /// Position errors take the shortest path around the circle
    pub continuous_position: bool,
    /// Add friction compensation to velocity requests
    pub friction_feedforward: bool,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        ActuatorConfig {
            motor: MotorConfig::default(),
            controller: ControllerConfig::VoltageOut,
            load_inertia: 0.01,
            continuous_position: false,
            friction_feedforward: true,
        }
    }
}

impl ActuatorConfig {
    pub fn new(motor: MotorConfig, controller: ControllerConfig, load_inertia: f64) -> Self {
        ActuatorConfig {
            motor,
            controller,
            load_inertia,
            ..Default::default()
        }
    }

    pub fn with_continuous_position(mut self, continuous: bool) -> Self {
        self.continuous_position = continuous;
        self
    }

    pub fn with_friction_feedforward(mut self, enabled: bool) -> Self {
        self.friction_feedforward = enabled;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        self.motor.validate()?;
        self.controller.resolve(self.motor.gear_ratio)?;
        require_positive("load_inertia", self.load_inertia)?;
        Ok(())
    }
}

/// Outcome of a tick that has been computed but not yet applied.
#[derive(Debug, Clone)]
pub(crate) struct ActuatorStep {
    controller: ClosedLoopController,
    request: ControlRequest,
    pub(crate) state: MechanismState,
}

#[derive(Debug, Clone)]
pub struct Actuator {
    config: ActuatorConfig,
    controller: ClosedLoopController,
    motor: MotorModel,
    integrator: IntegrationMethod,
    state: MechanismState,
    active: ControlRequest,
    pending: Option<ControlRequest>,
}

impl Actuator {
    pub fn new(config: ActuatorConfig, integrator: IntegrationMethod) -> SimResult<Self> {
        config.validate()?;
        let controller = ClosedLoopController::new(config.controller, config.motor)?
            .with_continuous_position(config.continuous_position)
            .with_friction_feedforward(config.friction_feedforward);

        Ok(Actuator {
            motor: MotorModel::new(config.motor)?,
            config,
            controller,
            integrator,
            state: MechanismState::default(),
            active: ControlRequest::default(),
            pending: None,
        })
    }

    pub fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    pub fn state(&self) -> &MechanismState {
        &self.state
    }

    /// The request the last completed tick ran with.
    pub fn active_request(&self) -> ControlRequest {
        self.active
    }

    /// A request waiting for the next tick, if any.
    pub fn pending_request(&self) -> Option<ControlRequest> {
        self.pending
    }

    /// Buffers `request` for the next tick. A rejected request leaves the
    /// previous one in place.
    pub fn request(&mut self, request: ControlRequest) -> SimResult<()> {
        if let Err(err) = self.controller.validate_request(&request) {
            warn!("rejected {:?}: {}", request, err);
            return Err(err);
        }
        self.pending = Some(request);
        Ok(())
    }

    pub(crate) fn plan(&self, external_torque: f64, dt: f64) -> SimResult<ActuatorStep> {
        let request = self.pending.unwrap_or(self.active);
        let mut controller = self.controller.clone();

        let output = controller.step(&request, &self.state, dt)?;
        let motor = self.motor.compute_torque(output, self.state.velocity);
        let torque = self.friction_resolved_torque(&motor, external_torque, dt);
        let mut next = self.integrator.advance(
            &self.state,
            torque,
            self.config.load_inertia,
            external_torque,
            dt,
        )?;
        next.applied_torque = torque;
        next.current = motor.current;

        if !next.is_finite() {
            return Err(SimError::NonFinite { quantity: "mechanism state" });
        }

        Ok(ActuatorStep {
            controller,
            request,
            state: next,
        })
    }

    /// Motor torque after friction, resolved against everything acting on
    /// the mechanism this tick.
    ///
    /// When friction can absorb all the motion the other torques would
    /// produce, the mechanism comes to rest (and stays there while held).
    /// Otherwise friction opposes the direction it would move in. Friction
    /// never reverses the mechanism.
    fn friction_resolved_torque(&self, motor: &MotorOutput, external_torque: f64, dt: f64) -> f64 {
        let inertia = self.config.load_inertia;
        let friction = self.config.motor.friction_torque();
        let driven = motor.drive_torque + external_torque;

        let free_velocity = self.state.velocity + driven / inertia * dt;
        if free_velocity.abs() <= friction / inertia * dt {
            -self.state.velocity * inertia / dt - external_torque
        } else {
            motor.drive_torque - sign(free_velocity) * friction
        }
    }

    pub(crate) fn commit(&mut self, step: ActuatorStep) {
        self.controller = step.controller;
        self.active = step.request;
        self.pending = None;
        self.state = step.state;
    }

    /// Runs one tick with an external torque (N·m) acting on the mechanism.
    pub fn tick(&mut self, external_torque: f64, dt: f64) -> SimResult<()> {
        let step = self.plan(external_torque, dt)?;
        self.commit(step);
        Ok(())
    }
}

impl Model for Actuator {
    fn reset(&mut self) {
        self.controller.reset();
        self.state = MechanismState::default();
        self.active = ControlRequest::default();
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use electrical::{FrictionCompensation, MotorConstant};

    fn open_loop() -> Actuator {
        let motor = MotorConfig::new(MotorConstant::neo()).with_gear_ratio(5.0);
        let config = ActuatorConfig::new(motor, ControllerConfig::VoltageOut, 0.02);
        Actuator::new(config, IntegrationMethod::default()).unwrap()
    }

    #[test]
    fn test_request_buffered_until_tick() {
        let mut act = open_loop();
        act.request(ControlRequest::VoltageOut(6.0)).unwrap();
        assert_eq!(act.active_request(), ControlRequest::VoltageOut(0.0));
        assert_eq!(act.pending_request(), Some(ControlRequest::VoltageOut(6.0)));
        assert_eq!(act.state().velocity, 0.0);

        act.tick(0.0, 0.01).unwrap();
        assert_eq!(act.active_request(), ControlRequest::VoltageOut(6.0));
        assert_eq!(act.pending_request(), None);
        assert!(act.state().velocity > 0.0);
        assert!(act.state().applied_torque > 0.0);
        assert!(act.state().current > 0.0);
    }

    #[test]
    fn test_rejected_request_keeps_previous() {
        let mut act = open_loop();
        act.request(ControlRequest::VoltageOut(3.0)).unwrap();
        let err = act.request(ControlRequest::VelocityVoltage(10.0)).unwrap_err();
        assert!(matches!(err, SimError::UnsupportedRequest { .. }));
        assert_eq!(act.pending_request(), Some(ControlRequest::VoltageOut(3.0)));
        assert!(act.request(ControlRequest::VoltageOut(f64::NAN)).is_err());
    }

    #[test]
    fn test_failed_tick_leaves_state_untouched() {
        let mut act = open_loop();
        act.request(ControlRequest::VoltageOut(6.0)).unwrap();
        assert!(act.tick(0.0, 0.0).is_err());
        assert!(act.tick(f64::INFINITY, 0.01).is_err());
        assert_eq!(*act.state(), MechanismState::default());
        assert_eq!(act.pending_request(), Some(ControlRequest::VoltageOut(6.0)));
    }

    #[test]
    fn test_free_speed_approached() {
        let mut act = open_loop();
        act.request(ControlRequest::VoltageOut(12.0)).unwrap();
        for _ in 0..2000 {
            act.tick(0.0, 0.001).unwrap();
        }
        let free_speed = MotorConstant::neo().free_speed(12.0) / 5.0;
        assert!((act.state().velocity - free_speed).abs() / free_speed < 1e-3);
    }

    #[test]
    fn test_friction_stops_without_reversing() {
        let mut act = friction_held(2.0);
        act.state.velocity = 0.05;

        act.tick(0.0, 0.01).unwrap();
        assert!(act.state().velocity.abs() < 1e-12);
        act.tick(0.0, 0.01).unwrap();
        assert!(act.state().velocity.abs() < 1e-12);
        assert!(act.state().position > 0.0);
    }

    fn friction_held(friction_amps: f64) -> Actuator {
        let motor = MotorConfig::new(MotorConstant::neo())
            .with_gear_ratio(5.0)
            .with_friction(FrictionCompensation::Current(friction_amps));
        let config = ActuatorConfig::new(motor, ControllerConfig::position(0.0, 0.0), 0.02);
        let mut act = Actuator::new(config, IntegrationMethod::default()).unwrap();
        act.request(ControlRequest::PositionCurrent(0.0)).unwrap();
        act
    }

    #[test]
    fn test_slow_coast_is_stopped_by_friction() {
        let mut act = friction_held(2.0);
        act.state.velocity = 5e-4;

        act.tick(0.0, 0.01).unwrap();
        assert!(act.state().velocity.abs() < 1e-12);
        let position = act.state().position;
        assert!(position > 0.0 && position < 5e-6);

        for _ in 0..1000 {
            act.tick(0.0, 0.01).unwrap();
        }
        assert!(act.state().velocity.abs() < 1e-12);
        assert!((act.state().position - position).abs() < 1e-12);
    }

    #[test]
    fn test_friction_holds_against_external_torque() {
        // neo kt 0.0181 N·m/A, 2 A through a 5:1 reduction
        let holding = 0.0181 * 2.0 * 5.0;

        let mut act = friction_held(2.0);
        for _ in 0..100 {
            act.tick(0.5 * holding, 0.01).unwrap();
        }
        assert!(act.state().velocity.abs() < 1e-12);
        assert!(act.state().position.abs() < 1e-12);
        assert!((act.state().applied_torque + 0.5 * holding).abs() < 1e-9);

        let mut act = friction_held(2.0);
        act.tick(2.0 * holding, 0.01).unwrap();
        // breaks away with friction taking half of the push
        let expected = holding / 0.02 * 0.01;
        assert!((act.state().velocity - expected).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_inertia_rejected() {
        let config = ActuatorConfig {
            load_inertia: 0.0,
            ..Default::default()
        };
        assert!(Actuator::new(config, IntegrationMethod::default()).is_err());
    }
}
