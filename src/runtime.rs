// Fixed-rate control loop with watchdog
//
// The kinematics solver publishes per-wheel targets; if it stops, the
// watchdog stops every wheel instead of letting the base drive away on the
// last command.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{SwerveConfig, TOPIC_CMD_WHEELS, TOPIC_HEALTH, TOPIC_RT_WHEELS, WHEEL_COUNT};
use crate::messages::{RuntimeHealth, SwerveActuation, SwerveCommand, WheelState};
use crate::motor::{BusActuator, MotorError, ServoBus};
use crate::sim::SimActuator;
use crate::wheel::WheelController;

pub struct Runtime {
    latest_cmd: Option<SwerveCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process incoming command
    fn on_command(&mut self, cmd: SwerveCommand) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// The command to apply this cycle, or `None` when the watchdog says
    /// the wheels must stop.
    fn command_for_cycle(&mut self, timeout: Duration) -> Option<SwerveCommand> {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > timeout {
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping wheels", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            return None;
        }

        match &self.latest_cmd {
            Some(cmd) => {
                self.health = RuntimeHealth::Ok;
                Some(cmd.clone())
            }
            None => {
                // No command ever received
                self.health = RuntimeHealth::CmdStale;
                None
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the four wheel controllers from config: bus servos, or simulated
/// actuators when motor control is disabled.
fn build_wheels(config: &SwerveConfig) -> Result<Vec<WheelController>, MotorError> {
    if !config.motor.enabled {
        info!("Motor control disabled, using simulated actuators");
        return Ok((0..WHEEL_COUNT)
            .map(|_| {
                WheelController::new(
                    &config.wheel,
                    Box::new(SimActuator::new()),
                    Box::new(SimActuator::new()),
                )
            })
            .collect());
    }

    info!("Opening servo bus on {}", config.motor.port);
    let bus = Arc::new(Mutex::new(ServoBus::open_with_baudrate(
        &config.motor.port,
        config.motor.baudrate,
    )?));

    let mut wheels = Vec::with_capacity(WHEEL_COUNT);
    for i in 0..WHEEL_COUNT {
        let mut azimuth = BusActuator::new(bus.clone(), config.motor.azimuth_ids[i]);
        let mut drive = BusActuator::new(bus.clone(), config.motor.drive_ids[i]);

        for servo in [&mut azimuth, &mut drive] {
            match servo.ping() {
                Ok(true) => debug!("Servo {} responding", servo.id()),
                Ok(false) => {
                    warn!("Servo {} not responding to ping", servo.id());
                    return Err(MotorError::Timeout { id: servo.id() });
                }
                Err(e) => return Err(e),
            }
        }

        wheels.push(WheelController::new(
            &config.wheel,
            Box::new(azimuth),
            Box::new(drive),
        ));
    }
    Ok(wheels)
}

pub async fn run(config: SwerveConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut wheels = build_wheels(&config)?;

    info!("Zeroing azimuth encoders: {:?}", config.wheel.azimuth_zero);
    for (wheel, zero) in wheels.iter_mut().zip(config.wheel.azimuth_zero) {
        wheel.set_azimuth_zero(zero);
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_WHEELS).await?;
    let pub_actuation = session.declare_publisher(TOPIC_RT_WHEELS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let timeout = config.cmd_timeout();
    let mut tick = interval(config.loop_period());

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        config.runtime.loop_hz,
        timeout.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_WHEELS);
    info!("Publishing to: {}, {}", TOPIC_RT_WHEELS, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<SwerveCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd);
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Apply the live command, or stop every wheel on watchdog trip
        match runtime.command_for_cycle(timeout) {
            Some(cmd) => {
                for (wheel, target) in wheels.iter_mut().zip(cmd.wheels) {
                    wheel.set_drive_mode(cmd.drive_mode);
                    wheel.set(target.azimuth, target.drive);
                }
            }
            None => {
                for wheel in wheels.iter_mut() {
                    wheel.stop();
                }
            }
        }

        // 3. Publish actuation read-back
        let mut actuation = SwerveActuation::default();
        for (state, wheel) in actuation.wheels.iter_mut().zip(wheels.iter()) {
            *state = WheelState {
                azimuth_setpoint: wheel.azimuth_setpoint(),
                drive_setpoint: wheel.drive_setpoint(),
                reversed: wheel.is_drive_reversed(),
            };
        }
        let actuation_json = serde_json::to_string(&actuation)?;
        pub_actuation.put(actuation_json).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }
}
