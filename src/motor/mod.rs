// Servo bus backend for the wheel actuators
//
// Provides:
// - Serial servo bus protocol implementation
// - BusActuator: one servo on the shared bus as an ActuatorPort

pub mod bus;
mod servo;

pub use bus::{MotorError, OperatingMode, ServoBus};
pub use servo::{BusActuator, AZIMUTH_SERVO_IDS, DRIVE_SERVO_IDS};
