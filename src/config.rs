// Runtime configuration: topics, loop timing, servo bus, wheel calibration
//
// Calibration constants are loaded from a TOML file at startup; a missing or
// unparseable key fails the load so the controllers can never start half
// configured.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::motor::{AZIMUTH_SERVO_IDS, DRIVE_SERVO_IDS};
use crate::wheel::ControlMode;

/// Number of wheels on the base
pub const WHEEL_COUNT: usize = 4;

// Zenoh topics
pub const TOPIC_CMD_WHEELS: &str = "swerve/cmd/wheels"; // per-wheel commands
pub const TOPIC_RT_WHEELS: &str = "swerve/rt/wheels"; // actuation read-back
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

/// Configuration load/validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct SwerveConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub motor: MotorConfig,
    pub wheel: WheelConfig,
}

/// Control loop timing
#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Loop frequency in Hz
    #[serde(default = "default_loop_hz")]
    pub loop_hz: u64,

    /// Command watchdog timeout in milliseconds
    #[serde(default = "default_cmd_timeout_ms")]
    pub cmd_timeout_ms: u64,
}

/// Servo bus settings
#[derive(Clone, Debug, Deserialize)]
pub struct MotorConfig {
    /// Serial port for the servo bus
    pub port: String,

    #[serde(default = "default_baudrate")]
    pub baudrate: u32,

    /// Enable hardware motor control (false = simulated actuators)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Azimuth servo bus IDs, wheel order
    #[serde(default = "default_azimuth_ids")]
    pub azimuth_ids: [u8; WHEEL_COUNT],

    /// Drive servo bus IDs, wheel order
    #[serde(default = "default_drive_ids")]
    pub drive_ids: [u8; WHEEL_COUNT],
}

/// Per-wheel calibration constants
#[derive(Clone, Debug, Deserialize)]
pub struct WheelConfig {
    /// Azimuth encoder ticks per wheel revolution
    pub ticks_per_revolution: u32,

    /// Closed-loop drive setpoint at full commanded speed
    pub drive_setpoint_max: f64,

    pub azimuth_control_mode: ControlMode,
    pub drive_open_loop_control_mode: ControlMode,
    pub drive_closed_loop_control_mode: ControlMode,

    /// Absolute encoder readings where each wheel points straight ahead
    #[serde(default)]
    pub azimuth_zero: [i32; WHEEL_COUNT],
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            loop_hz: default_loop_hz(),
            cmd_timeout_ms: default_cmd_timeout_ms(),
        }
    }
}

impl SwerveConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: SwerveConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.wheel.ticks_per_revolution == 0 {
            return Err(ConfigError::Invalid(
                "wheel.ticks_per_revolution must be positive".into(),
            ));
        }
        if self.wheel.drive_setpoint_max <= 0.0 {
            return Err(ConfigError::Invalid(
                "wheel.drive_setpoint_max must be positive".into(),
            ));
        }
        if self.runtime.loop_hz == 0 || self.runtime.loop_hz > 1000 {
            return Err(ConfigError::Invalid(
                "runtime.loop_hz must be between 1 and 1000".into(),
            ));
        }
        Ok(())
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(1000 / self.runtime.loop_hz)
    }

    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.cmd_timeout_ms)
    }
}

fn default_loop_hz() -> u64 {
    50
}

fn default_cmd_timeout_ms() -> u64 {
    250
}

fn default_baudrate() -> u32 {
    1_000_000
}

fn default_enabled() -> bool {
    true
}

fn default_azimuth_ids() -> [u8; WHEEL_COUNT] {
    AZIMUTH_SERVO_IDS
}

fn default_drive_ids() -> [u8; WHEEL_COUNT] {
    DRIVE_SERVO_IDS
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [runtime]
        loop_hz = 100
        cmd_timeout_ms = 200

        [motor]
        port = "/dev/ttyUSB0"
        enabled = false

        [wheel]
        ticks_per_revolution = 4096
        drive_setpoint_max = 12000.0
        azimuth_control_mode = "position"
        drive_open_loop_control_mode = "percent_output"
        drive_closed_loop_control_mode = "velocity"
        azimuth_zero = [2281, 3359, 1562, 844]
    "#;

    fn parse(content: &str) -> Result<SwerveConfig, ConfigError> {
        let config: SwerveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(FULL).unwrap();
        assert_eq!(config.runtime.loop_hz, 100);
        assert_eq!(config.cmd_timeout(), Duration::from_millis(200));
        assert!(!config.motor.enabled);
        assert_eq!(config.motor.azimuth_ids, [0, 1, 2, 3]);
        assert_eq!(config.motor.drive_ids, [10, 11, 12, 13]);
        assert_eq!(config.wheel.ticks_per_revolution, 4096);
        assert_eq!(config.wheel.azimuth_control_mode, ControlMode::Position);
        assert_eq!(
            config.wheel.drive_closed_loop_control_mode,
            ControlMode::Velocity
        );
        assert_eq!(config.wheel.azimuth_zero, [2281, 3359, 1562, 844]);
    }

    #[test]
    fn test_runtime_section_defaults() {
        let config = parse(
            r#"
            [motor]
            port = "/dev/ttyUSB0"

            [wheel]
            ticks_per_revolution = 4096
            drive_setpoint_max = 12000.0
            azimuth_control_mode = "position"
            drive_open_loop_control_mode = "percent_output"
            drive_closed_loop_control_mode = "velocity"
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.loop_hz, 50);
        assert_eq!(config.loop_period(), Duration::from_millis(20));
        assert!(config.motor.enabled);
        assert_eq!(config.wheel.azimuth_zero, [0; WHEEL_COUNT]);
    }

    #[test]
    fn test_missing_calibration_key_fails() {
        // no ticks_per_revolution
        let result = parse(
            r#"
            [motor]
            port = "/dev/ttyUSB0"

            [wheel]
            drive_setpoint_max = 12000.0
            azimuth_control_mode = "position"
            drive_open_loop_control_mode = "percent_output"
            drive_closed_loop_control_mode = "velocity"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_control_mode_fails() {
        let result = parse(&FULL.replace("\"position\"", "\"motion_magic\""));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_ticks_rejected() {
        let result =
            parse(&FULL.replace("ticks_per_revolution = 4096", "ticks_per_revolution = 0"));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_negative_setpoint_max_rejected() {
        let result =
            parse(&FULL.replace("drive_setpoint_max = 12000.0", "drive_setpoint_max = -1.0"));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
