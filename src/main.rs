use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::SwerveConfig;

/// Swerve wheel actuation runtime
#[derive(Parser)]
#[command(name = "swerve-zenoh-runtime")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "swerve.toml")]
    config: PathBuf,

    /// Use simulated actuators regardless of the config
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let mut config = match SwerveConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(1);
        }
    };
    if args.simulate {
        config.motor.enabled = false;
    }

    if let Err(e) = swerve_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
