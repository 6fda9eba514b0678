// Wheel control for the swerve base
//
// Provides:
// - Azimuth/drive command optimization (shortest path, drive reversal)
// - The ActuatorPort abstraction the controller drives
// - Injectable closed-loop gain scheduling

mod actuator;
mod controller;

pub use actuator::{
    ActuatorError, ActuatorPort, ControlMode, DriveMode, FixedGains, GainScheduler,
};
pub use controller::WheelController;
