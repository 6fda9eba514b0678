// Actuator abstractions for the swerve wheel controllers
//
// A wheel controller drives two actuators (azimuth and drive) through the
// ActuatorPort trait so the same control code runs against bus servos and
// the in-memory simulator.

use serde::{Deserialize, Serialize};

/// Control modes an actuator can be commanded in.
///
/// The config file names these as strings ("position", "velocity", ...);
/// an unknown name fails the config load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Position,
    Velocity,
    PercentOutput,
    Voltage,
}

/// Which of the two preconfigured drive control modes is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    #[default]
    OpenLoop,
    ClosedLoop,
}

/// Non-fatal actuator command failures.
///
/// Reads and mode commands log-and-continue inside the port implementations;
/// only encoder re-homing surfaces its failure to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("encoder rehome rejected with status 0x{status:02X}")]
    Rehome { status: u8 },

    #[error("bus error: {0}")]
    Bus(String),
}

/// Interface to one motor controller.
pub trait ActuatorPort {
    /// Command the actuator in the given control mode.
    ///
    /// Failures are handled inside the implementation; the control loop
    /// observes no return value.
    fn set(&mut self, mode: ControlMode, value: f64);

    /// Relative encoder position in ticks.
    fn position(&mut self) -> i32;

    /// Masked absolute encoder reading, 0-4095.
    fn absolute_position(&mut self) -> u16;

    /// Re-home the relative encoder to `ticks`.
    fn set_position(&mut self, ticks: i32) -> Result<(), ActuatorError>;
}

/// Closed-loop gain profile selection strategy.
///
/// Called once per closed-loop `set` with the raw commanded speed (0 to 1).
/// Returning `Some(slot)` selects a gain profile; `None` keeps the current
/// one.
pub trait GainScheduler {
    fn select_profile(&self, speed: f64) -> Option<u32>;
}

/// Default scheduler: stay on the profile configured at startup.
pub struct FixedGains;

impl GainScheduler for FixedGains {
    fn select_profile(&self, _speed: f64) -> Option<u32> {
        None
    }
}
