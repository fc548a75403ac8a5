//! Runs a swerve drive scenario and prints one CSV row per control period.
//!
//! Usage: `swerve-sim-app [scenario.json]`. Without a file the built-in
//! scenario is used. Log level comes from `SWERVE_SIM_LOG` (default `info`).

use std::io::{self, BufWriter, Write};

use control::ControlRequest;
use log::{info, warn, LevelFilter};
use mechanics::{SwerveDriveConfig, SwerveDriveSim};
use serde::{Deserialize, Serialize};
use simcore::{require_positive, SimResult};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// Requests issued at a point in simulated time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TimedCommand {
    at: f64,
    /// Target module, or every module when absent.
    #[serde(default)]
    module: Option<usize>,
    #[serde(default)]
    drive: Option<ControlRequest>,
    #[serde(default)]
    steer: Option<ControlRequest>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Collision {
    at: f64,
    /// Gyro disturbance in rad/s
    magnitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Scenario {
    drivetrain: SwerveDriveConfig,
    /// Seconds of simulated time
    duration: f64,
    /// True chassis yaw rate fed to the gyro (rad/s)
    chassis_angular_velocity: f64,
    commands: Vec<TimedCommand>,
    collisions: Vec<Collision>,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            drivetrain: SwerveDriveConfig::default(),
            duration: 3.0,
            chassis_angular_velocity: 0.5,
            commands: vec![
                TimedCommand {
                    at: 0.0,
                    module: None,
                    drive: Some(ControlRequest::VelocityVoltage(40.0)),
                    steer: Some(ControlRequest::PositionCurrent(std::f64::consts::FRAC_PI_4)),
                },
                TimedCommand {
                    at: 1.5,
                    module: None,
                    drive: Some(ControlRequest::VelocityVoltage(0.0)),
                    steer: Some(ControlRequest::PositionCurrent(-3.0)),
                },
            ],
            collisions: vec![Collision {
                at: 2.0,
                magnitude: 1.0,
            }],
        }
    }
}

fn load_scenario(path: Option<String>) -> Result<Scenario, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            info!("loading scenario from {path}");
            let text = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => {
            info!("no scenario file given, using the built-in scenario");
            Ok(Scenario::default())
        }
    }
}

fn apply_command(sim: &mut SwerveDriveSim, command: &TimedCommand) -> SimResult<()> {
    let targets = match command.module {
        Some(index) => vec![index],
        None => (0..sim.module_count()).collect(),
    };
    for index in targets {
        let module = sim.module_mut(index)?;
        if let Some(request) = command.drive {
            module.request_drive_control(request)?;
        }
        if let Some(request) = command.steer {
            module.request_steer_control(request)?;
        }
    }
    Ok(())
}

fn write_header(out: &mut impl Write, modules: usize) -> io::Result<()> {
    write!(out, "t")?;
    for i in 0..modules {
        write!(
            out,
            ",m{i}_wheel_speed,m{i}_drive_current,m{i}_steer_facing,m{i}_steer_current"
        )?;
    }
    writeln!(out, ",gyro_rotation,gyro_rate,true_heading,drift_bias")
}

fn write_row(out: &mut impl Write, sim: &SwerveDriveSim) -> io::Result<()> {
    write!(out, "{:.4}", sim.elapsed())?;
    for module in sim.modules() {
        write!(
            out,
            ",{:.6},{:.6},{:.6},{:.6}",
            module.drive_wheel_speed(),
            module.drive_current(),
            module.steer_absolute_facing(),
            module.steer_current()
        )?;
    }
    let gyro = sim.gyro();
    writeln!(
        out,
        ",{:.6},{:.6},{:.6},{:.6}",
        gyro.gyro_rotation(),
        gyro.gyro_angular_velocity(),
        gyro.true_heading(),
        gyro.drift_bias()
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let level = std::env::var("SWERVE_SIM_LOG")
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)?;

    let mut scenario = load_scenario(std::env::args().nth(1))?;
    require_positive("duration", scenario.duration)?;
    scenario.commands.sort_by(|a, b| a.at.total_cmp(&b.at));
    scenario.collisions.sort_by(|a, b| a.at.total_cmp(&b.at));

    let mut sim = SwerveDriveSim::new(scenario.drivetrain.clone())?;
    let control_dt = sim.config().timing.control_dt();
    let periods = (scenario.duration / control_dt).round() as usize;
    info!(
        "running {periods} control periods of {control_dt} s with {} modules",
        sim.module_count()
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    write_header(&mut out, sim.module_count())?;
    write_row(&mut out, &sim)?;

    let mut commands = scenario.commands.iter().peekable();
    let mut collisions = scenario.collisions.iter().peekable();
    for _ in 0..periods {
        let now = sim.elapsed();
        while let Some(command) = commands.next_if(|c| c.at <= now + 1e-9) {
            if let Err(err) = apply_command(&mut sim, command) {
                warn!("command at t = {} s skipped: {err}", command.at);
            }
        }
        while let Some(collision) = collisions.next_if(|c| c.at <= now + 1e-9) {
            info!("collision at t = {now:.3} s, {} rad/s", collision.magnitude);
            sim.apply_collision_impulse(collision.magnitude)?;
        }

        sim.step_control_period(scenario.chassis_angular_velocity)?;
        write_row(&mut out, &sim)?;
    }
    out.flush()?;

    let gyro = sim.gyro();
    info!(
        "done after {:.3} s: gyro {:.4} rad, true heading {:.4} rad",
        sim.elapsed(),
        gyro.gyro_rotation(),
        gyro.true_heading()
    );
    Ok(())
}
