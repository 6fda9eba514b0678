// Bus servo as an ActuatorPort
//
// One servo on the shared bus, adapted to the wheel controller's actuator
// interface. Read failures fall back to the last good value so a transient
// bus error never takes down the control loop.

use std::sync::{Arc, Mutex};

use tracing::warn;

use super::bus::{MotorError, OperatingMode, ServoBus};
use crate::wheel::{ActuatorError, ActuatorPort, ControlMode};

/// Azimuth servo IDs for wheels 0-3
pub const AZIMUTH_SERVO_IDS: [u8; 4] = [0, 1, 2, 3];

/// Drive servo IDs for wheels 0-3
pub const DRIVE_SERVO_IDS: [u8; 4] = [10, 11, 12, 13];

/// Nominal supply voltage used to map voltage commands onto PWM duty
const NOMINAL_VOLTAGE: f64 = 12.0;

/// One servo on a shared serial bus.
pub struct BusActuator {
    bus: Arc<Mutex<ServoBus>>,
    id: u8,
    operating_mode: Option<OperatingMode>,
    last_position: i32,
    last_absolute_position: u16,
}

impl BusActuator {
    pub fn new(bus: Arc<Mutex<ServoBus>>, id: u8) -> Self {
        Self {
            bus,
            id,
            operating_mode: None,
            last_position: 0,
            last_absolute_position: 0,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Check that the servo answers on the bus.
    pub fn ping(&mut self) -> Result<bool, MotorError> {
        let mut bus = self.bus.lock().map_err(poisoned)?;
        bus.ping(self.id)
    }

    /// Switch the servo operating mode: torque off, change mode, torque on.
    fn switch_mode(bus: &mut ServoBus, id: u8, mode: OperatingMode) -> Result<(), MotorError> {
        bus.disable_torque(id)?;
        bus.set_operating_mode(id, mode)?;
        bus.enable_torque(id)
    }

    fn apply(bus: &mut ServoBus, id: u8, mode: ControlMode, value: f64) -> Result<(), MotorError> {
        match mode {
            ControlMode::Position => bus.set_goal_position(id, value.round() as i32),
            ControlMode::Velocity => {
                let raw = value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX));
                bus.set_goal_velocity(id, raw as i16)
            }
            ControlMode::PercentOutput => bus.set_goal_pwm(id, (value * 1000.0).round() as i16),
            ControlMode::Voltage => {
                bus.set_goal_pwm(id, (value / NOMINAL_VOLTAGE * 1000.0).round() as i16)
            }
        }
    }

    fn operating_mode_for(mode: ControlMode) -> OperatingMode {
        match mode {
            ControlMode::Position => OperatingMode::Position,
            ControlMode::Velocity => OperatingMode::Velocity,
            ControlMode::PercentOutput | ControlMode::Voltage => OperatingMode::Pwm,
        }
    }
}

impl ActuatorPort for BusActuator {
    fn set(&mut self, mode: ControlMode, value: f64) {
        let Ok(mut bus) = self.bus.lock() else {
            warn!(id = self.id, "servo bus mutex poisoned, dropping command");
            return;
        };

        let wanted = Self::operating_mode_for(mode);
        if self.operating_mode != Some(wanted) {
            if let Err(e) = Self::switch_mode(&mut bus, self.id, wanted) {
                warn!(id = self.id, "failed to switch operating mode: {e}");
                return;
            }
            self.operating_mode = Some(wanted);
        }

        if let Err(e) = Self::apply(&mut bus, self.id, mode, value) {
            warn!(id = self.id, "failed to command servo: {e}");
        }
    }

    fn position(&mut self) -> i32 {
        let Ok(mut bus) = self.bus.lock() else {
            warn!(id = self.id, "servo bus mutex poisoned, using last position");
            return self.last_position;
        };
        match bus.present_position(self.id) {
            Ok(ticks) => {
                self.last_position = ticks;
                ticks
            }
            Err(e) => {
                warn!(id = self.id, "position read failed, using last value: {e}");
                self.last_position
            }
        }
    }

    fn absolute_position(&mut self) -> u16 {
        let Ok(mut bus) = self.bus.lock() else {
            warn!(id = self.id, "servo bus mutex poisoned, using last position");
            return self.last_absolute_position;
        };
        match bus.absolute_position(self.id) {
            Ok(ticks) => {
                self.last_absolute_position = ticks;
                ticks
            }
            Err(e) => {
                warn!(id = self.id, "absolute position read failed, using last value: {e}");
                self.last_absolute_position
            }
        }
    }

    fn set_position(&mut self, ticks: i32) -> Result<(), ActuatorError> {
        let mut bus = self
            .bus
            .lock()
            .map_err(|_| ActuatorError::Bus("servo bus mutex poisoned".into()))?;
        match bus.reset_position(self.id, ticks) {
            Ok(()) => {
                self.last_position = ticks;
                Ok(())
            }
            Err(MotorError::Fault { status, .. }) => Err(ActuatorError::Rehome { status }),
            Err(e) => Err(ActuatorError::Bus(e.to_string())),
        }
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> MotorError {
    MotorError::Io(std::io::Error::other("servo bus mutex poisoned"))
}
