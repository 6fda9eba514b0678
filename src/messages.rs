// Wire message types for the runtime

use serde::{Deserialize, Serialize};

use crate::config::WHEEL_COUNT;
use crate::wheel::DriveMode;

/// One wheel's target pair from the inverse-kinematics solver.
///
/// `azimuth` is -0.5 to 0.5 rotations, clockwise, zero straight ahead;
/// `drive` is 0 to 1 in the direction of the azimuth.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WheelCommand {
    pub azimuth: f64,
    pub drive: f64,
}

/// Command from the kinematics solver -> runtime, one entry per wheel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwerveCommand {
    pub wheels: [WheelCommand; WHEEL_COUNT],

    #[serde(default)]
    pub drive_mode: DriveMode,
}

/// One wheel's commanded state as of the last control cycle
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WheelState {
    pub azimuth_setpoint: f64,
    pub drive_setpoint: f64,
    pub reversed: bool,
}

/// Actuation read-back published by the runtime every cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwerveActuation {
    pub wheels: [WheelState; WHEEL_COUNT],
}

/// Health status published by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}
