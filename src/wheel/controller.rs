// Swerve wheel azimuth/drive optimization
//
// The inverse-kinematics layer hands each wheel an angle in -0.5 to 0.5
// rotations and a speed in 0 to 1. This controller turns that pair into
// motor setpoints, reversing drive direction instead of swinging the
// azimuth through a large angle whenever the direct path would exceed a
// quarter revolution.

use tracing::{debug, error};

use super::actuator::{ActuatorPort, ControlMode, DriveMode, FixedGains, GainScheduler};
use crate::config::WheelConfig;

/// Controls one swerve wheel's azimuth and drive motors.
///
/// Azimuth angles are measured clockwise with zero at the wheel's zeroed
/// straight-ahead position. The controller assumes an absolute encoder on
/// the azimuth actuator and no mechanical limit on azimuth rotation.
pub struct WheelController {
    ticks_per_revolution: f64,
    drive_setpoint_max: f64,
    azimuth_control_mode: ControlMode,
    drive_open_loop_control_mode: ControlMode,
    drive_closed_loop_control_mode: ControlMode,

    azimuth: Box<dyn ActuatorPort>,
    drive: Box<dyn ActuatorPort>,
    gains: Box<dyn GainScheduler>,

    azimuth_setpoint: f64,
    drive_setpoint: f64,
    drive_mode: DriveMode,
    active_profile: Option<u32>,
}

impl WheelController {
    /// Create a wheel controller from a validated wheel configuration and
    /// its two actuators. Starts in open-loop drive mode.
    pub fn new(
        config: &WheelConfig,
        azimuth: Box<dyn ActuatorPort>,
        drive: Box<dyn ActuatorPort>,
    ) -> Self {
        debug!(
            ticks_per_revolution = config.ticks_per_revolution,
            drive_setpoint_max = config.drive_setpoint_max,
            azimuth_control_mode = ?config.azimuth_control_mode,
            drive_open_loop_control_mode = ?config.drive_open_loop_control_mode,
            drive_closed_loop_control_mode = ?config.drive_closed_loop_control_mode,
            "wheel controller configured"
        );

        Self {
            ticks_per_revolution: f64::from(config.ticks_per_revolution),
            drive_setpoint_max: config.drive_setpoint_max,
            azimuth_control_mode: config.azimuth_control_mode,
            drive_open_loop_control_mode: config.drive_open_loop_control_mode,
            drive_closed_loop_control_mode: config.drive_closed_loop_control_mode,
            azimuth,
            drive,
            gains: Box::new(FixedGains),
            azimuth_setpoint: 0.0,
            drive_setpoint: 0.0,
            drive_mode: DriveMode::OpenLoop,
            active_profile: None,
        }
    }

    /// Replace the closed-loop gain scheduling strategy.
    pub fn with_gain_scheduler(mut self, gains: Box<dyn GainScheduler>) -> Self {
        self.gains = gains;
        self
    }

    /// Calculate the optimal motor setpoints and apply them.
    ///
    /// In closed-loop mode the drive setpoint is scaled by the configured
    /// `drive_setpoint_max`; open-loop passes the speed through unscaled.
    ///
    /// # Arguments
    /// * `azimuth` - -0.5 to 0.5 rotations, clockwise, zero straight ahead
    /// * `drive` - 0 to 1 in the direction of the wheel azimuth
    ///
    /// Inputs outside these ranges are not rejected; the caller guarantees
    /// them.
    pub fn set(&mut self, azimuth: f64, drive: f64) {
        self.drive_setpoint = match self.drive_mode {
            DriveMode::OpenLoop => drive,
            DriveMode::ClosedLoop => {
                if let Some(slot) = self.gains.select_profile(drive) {
                    if self.active_profile != Some(slot) {
                        debug!(slot, "selecting closed-loop gain profile");
                        self.active_profile = Some(slot);
                    }
                }
                drive * self.drive_setpoint_max
            }
        };

        // azimuth hardware polarity: positive command is negative rotation
        let azimuth = -azimuth;

        // don't reset wheel azimuth direction to zero when returning to neutral
        if self.drive_setpoint == 0.0 {
            self.drive.set(self.drive_control_mode(), 0.0);
            return;
        }

        let azimuth_position = f64::from(self.azimuth.position());
        let mut azimuth_error = ieee_remainder(
            azimuth * self.ticks_per_revolution - azimuth_position,
            self.ticks_per_revolution,
        );
        if azimuth_error.abs() > 0.25 * self.ticks_per_revolution {
            azimuth_error -= (0.5 * self.ticks_per_revolution).copysign(azimuth_error);
            self.drive_setpoint = -self.drive_setpoint;
        }
        self.azimuth_setpoint = azimuth_position + azimuth_error;

        self.azimuth.set(self.azimuth_control_mode, self.azimuth_setpoint);
        self.drive.set(self.drive_control_mode(), self.drive_setpoint);
    }

    /// Select open- or closed-loop drive for subsequent `set` calls.
    pub fn set_drive_mode(&mut self, drive_mode: DriveMode) {
        self.drive_mode = drive_mode;
    }

    /// Stop azimuth and drive movement.
    ///
    /// Re-anchors the azimuth setpoint to the current actual position in
    /// case the wheel has been manually rotated away from its previous
    /// setpoint, then holds it there.
    pub fn stop(&mut self) {
        self.azimuth_setpoint = f64::from(self.azimuth.position());
        self.azimuth.set(self.azimuth_control_mode, self.azimuth_setpoint);
        self.drive.set(self.drive_control_mode(), 0.0);
    }

    /// Set the azimuth encoder relative to the wheel's zero alignment
    /// position.
    ///
    /// A failed re-home is logged and the controller carries on with its
    /// updated setpoint; the next control cycle remains self-consistent.
    ///
    /// # Arguments
    /// * `zero` - encoder position (in ticks) where the wheel is zeroed
    pub fn set_azimuth_zero(&mut self, zero: i32) {
        self.azimuth_setpoint = f64::from(i32::from(self.azimuth.absolute_position()) - zero);
        if let Err(e) = self.azimuth.set_position(self.azimuth_setpoint as i32) {
            error!("azimuth encoder rehome failed: {e}");
        }
        self.azimuth.set(self.azimuth_control_mode, self.azimuth_setpoint);
    }

    /// True if drive direction has been reversed to optimize azimuth
    /// rotation.
    pub fn is_drive_reversed(&self) -> bool {
        self.drive_setpoint < 0.0
    }

    /// The azimuth position setpoint. May differ from the actual position
    /// while the wheel is still rotating into place.
    pub fn azimuth_setpoint(&self) -> f64 {
        self.azimuth_setpoint
    }

    /// The drive setpoint. Sign encodes reversal; may differ from actual
    /// speed while the wheel is accelerating.
    pub fn drive_setpoint(&self) -> f64 {
        self.drive_setpoint
    }

    /// The wheel's azimuth absolute position, 0-4095 encoder ticks.
    pub fn azimuth_absolute_position(&mut self) -> u16 {
        self.azimuth.absolute_position()
    }

    pub fn ticks_per_revolution(&self) -> i32 {
        self.ticks_per_revolution as i32
    }

    pub fn drive_setpoint_max(&self) -> f64 {
        self.drive_setpoint_max
    }

    pub fn azimuth_control_mode(&self) -> ControlMode {
        self.azimuth_control_mode
    }

    pub fn drive_open_loop_control_mode(&self) -> ControlMode {
        self.drive_open_loop_control_mode
    }

    pub fn drive_closed_loop_control_mode(&self) -> ControlMode {
        self.drive_closed_loop_control_mode
    }

    /// The azimuth actuator bound to this wheel.
    pub fn azimuth_actuator(&mut self) -> &mut dyn ActuatorPort {
        self.azimuth.as_mut()
    }

    /// The drive actuator bound to this wheel.
    pub fn drive_actuator(&mut self) -> &mut dyn ActuatorPort {
        self.drive.as_mut()
    }

    fn drive_control_mode(&self) -> ControlMode {
        match self.drive_mode {
            DriveMode::OpenLoop => self.drive_open_loop_control_mode,
            DriveMode::ClosedLoop => self.drive_closed_loop_control_mode,
        }
    }
}

/// IEEE 754 remainder: `x - n * m` where `n` is the integer nearest `x / m`,
/// ties rounding to even. The result magnitude is at most `m / 2`, i.e. the
/// shortest signed path on a circle of circumference `m`.
fn ieee_remainder(x: f64, m: f64) -> f64 {
    let quotient = x / m;
    let mut n = quotient.round();
    if (quotient - quotient.trunc()).abs() == 0.5 {
        // round() breaks ties away from zero; IEEE remainder wants even
        n = 2.0 * (quotient / 2.0).round();
    }
    x - n * m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WheelConfig;
    use crate::sim::SimActuator;

    const TICKS: f64 = 4096.0;
    const EPS: f64 = 1e-9;

    fn test_config() -> WheelConfig {
        WheelConfig {
            ticks_per_revolution: 4096,
            drive_setpoint_max: 12000.0,
            azimuth_control_mode: ControlMode::Position,
            drive_open_loop_control_mode: ControlMode::PercentOutput,
            drive_closed_loop_control_mode: ControlMode::Velocity,
            azimuth_zero: [0; 4],
        }
    }

    fn test_wheel() -> (WheelController, SimActuator, SimActuator) {
        let azimuth = SimActuator::new();
        let drive = SimActuator::new();
        let wheel = WheelController::new(
            &test_config(),
            Box::new(azimuth.clone()),
            Box::new(drive.clone()),
        );
        (wheel, azimuth, drive)
    }

    /// Shortest signed distance between two tick positions.
    fn shortest_path(from: f64, to: f64) -> f64 {
        ieee_remainder(to - from, TICKS)
    }

    #[test]
    fn test_ieee_remainder() {
        assert!((ieee_remainder(409.6, 4096.0) - 409.6).abs() < EPS);
        assert!((ieee_remainder(4096.0 + 100.0, 4096.0) - 100.0).abs() < EPS);
        assert!((ieee_remainder(-3000.0, 4096.0) - 1096.0).abs() < EPS);
        assert!((ieee_remainder(3000.0, 4096.0) + 1096.0).abs() < EPS);
    }

    #[test]
    fn test_ieee_remainder_halfway_rounds_to_even() {
        // quotient 0.5: nearest integers 0 and 1, even wins, remainder stays
        assert!((ieee_remainder(2048.0, 4096.0) - 2048.0).abs() < EPS);
        assert!((ieee_remainder(-2048.0, 4096.0) + 2048.0).abs() < EPS);
        // quotient 1.5: even neighbor is 2
        assert!((ieee_remainder(6144.0, 4096.0) + 2048.0).abs() < EPS);
    }

    #[test]
    fn test_small_angle_no_reversal() {
        let (mut wheel, _azimuth, drive) = test_wheel();
        wheel.set(0.1, 1.0);

        // 0.1 rotations negated and scaled: -409.6 ticks, under the quarter
        // turn threshold
        assert!((wheel.azimuth_setpoint() + 409.6).abs() < EPS);
        assert!(!wheel.is_drive_reversed());
        let (_, value) = drive.last_command().unwrap();
        assert!((value - 1.0).abs() < EPS);
    }

    #[test]
    fn test_half_turn_reverses_instead_of_rotating() {
        let (mut wheel, azimuth, drive) = test_wheel();
        wheel.set(0.5, 1.0);

        // requesting 180 degrees away: stay at 0 and reverse drive
        assert!(wheel.azimuth_setpoint().abs() < EPS);
        assert!(wheel.is_drive_reversed());
        let (mode, value) = azimuth.last_command().unwrap();
        assert_eq!(mode, ControlMode::Position);
        assert!(value.abs() < EPS);
        let (_, value) = drive.last_command().unwrap();
        assert!((value + 1.0).abs() < EPS);
    }

    #[test]
    fn test_reversal_preserves_drive_magnitude() {
        let (mut wheel, _azimuth, _drive) = test_wheel();
        wheel.set(0.4, 0.7);

        assert!(wheel.is_drive_reversed());
        assert!((wheel.drive_setpoint().abs() - 0.7).abs() < EPS);
    }

    #[test]
    fn test_azimuth_never_travels_more_than_quarter_turn() {
        for start in [-8200, -4096, -1000, 0, 137, 2048, 4096, 12288] {
            for i in 0..20 {
                let azimuth = -0.5 + f64::from(i) * 0.05;
                let (mut wheel, sim, _drive) = test_wheel();
                sim.set_current_position(start);

                wheel.set(azimuth, 1.0);

                let travel = shortest_path(f64::from(start), wheel.azimuth_setpoint());
                assert!(
                    travel.abs() <= 0.25 * TICKS + EPS,
                    "azimuth {} from {} travels {} ticks",
                    azimuth,
                    start,
                    travel
                );
            }
        }
    }

    #[test]
    fn test_neutral_leaves_azimuth_alone() {
        let (mut wheel, azimuth, drive) = test_wheel();
        wheel.set(0.2, 1.0);
        let setpoint = wheel.azimuth_setpoint();
        let azimuth_commands = azimuth.command_count();

        wheel.set(-0.4, 0.0);

        assert!((wheel.azimuth_setpoint() - setpoint).abs() < EPS);
        assert_eq!(azimuth.command_count(), azimuth_commands);
        let (_, value) = drive.last_command().unwrap();
        assert!(value.abs() < EPS);
    }

    #[test]
    fn test_set_is_idempotent_while_wheel_is_stationary() {
        let (mut wheel, sim, _drive) = test_wheel();
        sim.set_current_position(500);

        wheel.set(0.3, 0.8);
        let azimuth_setpoint = wheel.azimuth_setpoint();
        let drive_setpoint = wheel.drive_setpoint();

        wheel.set(0.3, 0.8);
        assert!((wheel.azimuth_setpoint() - azimuth_setpoint).abs() < EPS);
        assert!((wheel.drive_setpoint() - drive_setpoint).abs() < EPS);
    }

    #[test]
    fn test_setpoint_stable_once_wheel_settles() {
        let (mut wheel, azimuth, _drive) = test_wheel();
        wheel.set(0.1, 1.0);

        // servo finishes rotating (encoder lands on a whole tick)
        azimuth.settle();
        wheel.set(0.1, 1.0);

        assert!((wheel.azimuth_setpoint() + 409.6).abs() < 0.5);
        assert!(!wheel.is_drive_reversed());
    }

    #[test]
    fn test_stop_reanchors_to_actual_position() {
        let (mut wheel, azimuth, drive) = test_wheel();
        wheel.set(0.25, 1.0);

        // wheel shoved by hand while disabled
        azimuth.set_current_position(777);
        wheel.stop();

        assert!((wheel.azimuth_setpoint() - 777.0).abs() < EPS);
        assert_eq!(wheel.azimuth_actuator().position(), 777);
        let (mode, value) = azimuth.last_command().unwrap();
        assert_eq!(mode, ControlMode::Position);
        assert!((value - 777.0).abs() < EPS);
        let (_, value) = drive.last_command().unwrap();
        assert!(value.abs() < EPS);
    }

    #[test]
    fn test_calibration_accessors() {
        let (mut wheel, azimuth, _drive) = test_wheel();
        azimuth.set_absolute_position(1234);

        assert_eq!(wheel.ticks_per_revolution(), 4096);
        assert!((wheel.drive_setpoint_max() - 12000.0).abs() < EPS);
        assert_eq!(wheel.azimuth_control_mode(), ControlMode::Position);
        assert_eq!(
            wheel.drive_open_loop_control_mode(),
            ControlMode::PercentOutput
        );
        assert_eq!(wheel.drive_closed_loop_control_mode(), ControlMode::Velocity);
        assert_eq!(wheel.azimuth_absolute_position(), 1234);
        assert_eq!(wheel.drive_actuator().position(), 0);
    }

    #[test]
    fn test_closed_loop_scales_drive_setpoint() {
        let (mut wheel, _azimuth, drive) = test_wheel();
        wheel.set_drive_mode(DriveMode::ClosedLoop);
        wheel.set(0.0, 0.5);

        assert!((wheel.drive_setpoint() - 6000.0).abs() < EPS);
        let (mode, value) = drive.last_command().unwrap();
        assert_eq!(mode, ControlMode::Velocity);
        assert!((value - 6000.0).abs() < EPS);
    }

    #[test]
    fn test_open_loop_passes_drive_through_unscaled() {
        let (mut wheel, _azimuth, drive) = test_wheel();
        wheel.set(0.0, 0.5);

        assert!((wheel.drive_setpoint() - 0.5).abs() < EPS);
        let (mode, _) = drive.last_command().unwrap();
        assert_eq!(mode, ControlMode::PercentOutput);
    }

    #[test]
    fn test_set_azimuth_zero_rehomes_encoder() {
        let (mut wheel, azimuth, _drive) = test_wheel();
        azimuth.set_absolute_position(3000);

        wheel.set_azimuth_zero(2767);

        assert!((wheel.azimuth_setpoint() - 233.0).abs() < EPS);
        assert_eq!(azimuth.position_register(), 233);
        let (mode, value) = azimuth.last_command().unwrap();
        assert_eq!(mode, ControlMode::Position);
        assert!((value - 233.0).abs() < EPS);
    }

    #[test]
    fn test_set_azimuth_zero_survives_rehome_failure() {
        let (mut wheel, azimuth, _drive) = test_wheel();
        azimuth.set_absolute_position(3000);
        azimuth.fail_next_rehome();

        wheel.set_azimuth_zero(2767);

        // setpoint still updates optimistically and the hold is commanded
        assert!((wheel.azimuth_setpoint() - 233.0).abs() < EPS);
        let (_, value) = azimuth.last_command().unwrap();
        assert!((value - 233.0).abs() < EPS);
    }

    #[test]
    fn test_gain_scheduler_is_consulted_in_closed_loop() {
        struct TwoSpeed;
        impl GainScheduler for TwoSpeed {
            fn select_profile(&self, speed: f64) -> Option<u32> {
                Some(if speed > 0.5 { 1 } else { 0 })
            }
        }

        let azimuth = SimActuator::new();
        let drive = SimActuator::new();
        let mut wheel = WheelController::new(
            &test_config(),
            Box::new(azimuth),
            Box::new(drive),
        )
        .with_gain_scheduler(Box::new(TwoSpeed));
        wheel.set_drive_mode(DriveMode::ClosedLoop);

        wheel.set(0.0, 0.2);
        assert_eq!(wheel.active_profile, Some(0));
        wheel.set(0.0, 0.9);
        assert_eq!(wheel.active_profile, Some(1));
    }
}
