// Keyboard teleop: A/D steer, W/S drive, R/F speed, C loop mode, Q quit
//
// Publishes the same azimuth/drive target to all four wheels - handy for
// checking wheel alignment and reversal behavior without a kinematics
// solver in the loop.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{TOPIC_CMD_WHEELS, WHEEL_COUNT};
use swerve_zenoh_runtime::messages::{SwerveCommand, WheelCommand};
use swerve_zenoh_runtime::wheel::DriveMode;

const DRIVE_SPEEDS: [f64; 3] = [0.1, 0.3, 0.6]; // fraction of full speed
const AZIMUTH_STEP: f64 = 0.01; // rotations per keypress
const INPUT_TIMEOUT_MS: u64 = 100; // Reset drive after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_WHEELS).await?;

    info!("Controls: A/D=steer, W/S=drive, R/F=speed, C=open/closed loop, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent target state
    let mut azimuth: f64 = 0.0;
    let mut drive: f64 = 0.0;
    let mut drive_mode = DriveMode::OpenLoop;
    let mut last_drive_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Steering - wraps at the +-0.5 rotation bounds
                    KeyCode::Char('a') if pressed => {
                        azimuth = wrap_azimuth(azimuth - AZIMUTH_STEP);
                    }
                    KeyCode::Char('d') if pressed => {
                        azimuth = wrap_azimuth(azimuth + AZIMUTH_STEP);
                    }

                    // Drive - held keys keep refreshing the timestamp
                    KeyCode::Char('w') if pressed => {
                        drive = DRIVE_SPEEDS[speed_idx];
                        last_drive_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        drive = 0.0;
                        last_drive_input = Instant::now();
                    }

                    // Speed steps
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(DRIVE_SPEEDS.len() - 1);
                        info!("Speed: {}", ["LOW", "MID", "HIGH"][speed_idx]);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        info!("Speed: {}", ["LOW", "MID", "HIGH"][speed_idx]);
                    }

                    KeyCode::Char('c') if pressed => {
                        drive_mode = match drive_mode {
                            DriveMode::OpenLoop => DriveMode::ClosedLoop,
                            DriveMode::ClosedLoop => DriveMode::OpenLoop,
                        };
                        info!("Drive mode: {:?}", drive_mode);
                    }

                    KeyCode::Char('q') if pressed => {
                        info!("Quitting");
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }

        // Stop driving when input goes quiet; the wheel holds its heading
        if last_drive_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            drive = 0.0;
        }

        let cmd = SwerveCommand {
            wheels: [WheelCommand { azimuth, drive }; WHEEL_COUNT],
            drive_mode,
        };
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }
}

/// Fold an azimuth target back into -0.5 to 0.5 rotations.
fn wrap_azimuth(azimuth: f64) -> f64 {
    if azimuth >= 0.5 {
        azimuth - 1.0
    } else if azimuth < -0.5 {
        azimuth + 1.0
    } else {
        azimuth
    }
}
