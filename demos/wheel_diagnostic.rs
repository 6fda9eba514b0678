// Wheel diagnostic: READ-ONLY test to verify servo bus connection
//
// This tool does NOT write anything to the servos - it's completely safe.
// Use it before driving the base for the first time.
//
// Usage: cargo run --example wheel_diagnostic -- [port]
// Example: cargo run --example wheel_diagnostic -- /dev/ttyUSB0

use std::io::{self, Write};

use swerve_zenoh_runtime::motor::{ServoBus, AZIMUTH_SERVO_IDS, DRIVE_SERVO_IDS};

const WHEEL_NAMES: [&str; 4] = ["Front Left", "Front Right", "Rear Left", "Rear Right"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║          Swerve Wheel Diagnostic (READ-ONLY)                 ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  This tool only READS from servos - no writes, no movement   ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Serial port: {}", port);
    println!("Azimuth servo IDs: {:?}", AZIMUTH_SERVO_IDS);
    println!("Drive servo IDs: {:?}", DRIVE_SERVO_IDS);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match ServoBus::open(&port) {
        Ok(bus) => {
            println!("  ✓ Serial port opened successfully");
            bus
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            println!("  - Check you have permission to open the port");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Pinging servos...");
    let mut all_found = true;
    for (i, name) in WHEEL_NAMES.iter().enumerate() {
        for (label, id) in [
            ("azimuth", AZIMUTH_SERVO_IDS[i]),
            ("drive", DRIVE_SERVO_IDS[i]),
        ] {
            print!("  {} {} (ID {}): ", name, label, id);
            io::stdout().flush()?;

            match bus.ping(id) {
                Ok(true) => println!("✓ RESPONDING"),
                Ok(false) => {
                    println!("✗ NO RESPONSE");
                    all_found = false;
                }
                Err(e) => {
                    println!("✗ ERROR: {}", e);
                    all_found = false;
                }
            }
        }
    }
    println!();

    if !all_found {
        println!("⚠ WARNING: Not all servos responded!");
        println!("Fix the wiring or IDs before going any further.");
        return Ok(());
    }

    println!("Step 3: Reading azimuth encoder positions...");
    println!("  (rotate a wheel by hand and re-run to see the values move)");
    for (i, name) in WHEEL_NAMES.iter().enumerate() {
        let id = AZIMUTH_SERVO_IDS[i];
        let relative = bus.present_position(id)?;
        let absolute = bus.absolute_position(id)?;
        println!(
            "  {} (ID {}): relative={} ticks, absolute={} ticks",
            name, id, relative, absolute
        );
    }
    println!();

    println!("All servos responding. Record the absolute positions with the");
    println!("wheels aligned straight ahead and put them in swerve.toml as");
    println!("wheel.azimuth_zero, then start the runtime with: cargo run");

    Ok(())
}
