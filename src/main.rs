//! CLI entry point for rot2prog
//!
//! Every command loads the configuration, brings the link up through the
//! connection supervisor (retrying until the controller answers) and then
//! runs one operation.
//!
//! # Usage
//!
//! ```bash
//! rot2prog status
//! rot2prog goto 180 45
//! rot2prog jog left-up --for-ms 1500
//! rot2prog track pass.json
//! ROT2PROG_SERIAL__PORT=/dev/ttyUSB1 rot2prog monitor
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rot2prog_tracker::config::{RotorConfig, DEFAULT_CONFIG_PATH};
use rot2prog_tracker::hardware::rot2prog::{JogDirection, Position, RotorController};
use rot2prog_tracker::logging;
use rot2prog_tracker::status_monitor::StatusMonitor;
use rot2prog_tracker::supervisor::ConnectionSupervisor;
use rot2prog_tracker::tracking::{load_waypoints, SystemClock, TrackingScheduler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "rot2prog")]
#[command(about = "ROT2Prog antenna rotator control and pass tracking", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial port, overriding the configuration
    #[arg(long)]
    port: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the current position
    Status,

    /// Stop all motion
    Stop,

    /// Move to an absolute position
    Goto {
        /// Azimuth in degrees
        #[arg(allow_negative_numbers = true)]
        azimuth: f64,
        /// Elevation in degrees
        #[arg(allow_negative_numbers = true)]
        elevation: f64,
    },

    /// Drive the motors in a direction
    Jog {
        /// left, right, up, down, left-up, right-up, left-down or right-down
        direction: JogDirection,
        /// Stop again after this many milliseconds
        #[arg(long)]
        for_ms: Option<u64>,
    },

    /// Stop a jog
    JogStop,

    /// Set motor power in percent
    Power {
        /// Azimuth motor
        #[arg(allow_negative_numbers = true)]
        motor1: i32,
        /// Elevation motor
        #[arg(allow_negative_numbers = true)]
        motor2: i32,
    },

    /// Reset all controller settings
    ClearSettings,

    /// Show the active software limits and resolution
    Limits,

    /// Follow a predicted pass from a waypoint file (Ctrl-C cancels)
    Track {
        /// JSON waypoint file
        file: PathBuf,
    },

    /// Print position changes until Ctrl-C
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RotorConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    config.validate()?;
    logging::init_from_config(&config)?;

    // Parse before connecting so a bad file fails fast
    let waypoints = match &cli.command {
        Commands::Track { file } => Some(load_waypoints(file)?),
        _ => None,
    };

    let supervisor = ConnectionSupervisor::from_config(&config);
    let rotor = tokio::select! {
        rotor = supervisor.connect() => rotor,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted before the controller answered");
            return Ok(());
        }
    };

    match cli.command {
        Commands::Status => print_position(rotor.status().await?),
        Commands::Stop => print_position(rotor.stop().await?),
        Commands::Goto { azimuth, elevation } => {
            rotor.set(azimuth, elevation).await?;
            println!("Moving to Az {azimuth:.1}° El {elevation:.1}°");
        }
        Commands::Jog { direction, for_ms } => {
            print_position(rotor.jog(direction).await?);
            if let Some(ms) = for_ms {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                print_position(rotor.jog_stop().await?);
            }
        }
        Commands::JogStop => print_position(rotor.jog_stop().await?),
        Commands::Power { motor1, motor2 } => {
            rotor.set_motor_power(motor1, motor2).await?;
            println!("Motor power set to {}% / {}%", motor1.clamp(0, 100), motor2.clamp(0, 100));
        }
        Commands::ClearSettings => {
            rotor.clear_all_settings().await?;
            println!("Controller settings cleared");
        }
        Commands::Limits => {
            let limits = rotor.limits();
            println!(
                "Azimuth   [{:.1}°, {:.1}°]\nElevation [{:.1}°, {:.1}°]\nResolution {} pulses/°",
                limits.min_az,
                limits.max_az,
                limits.min_el,
                limits.max_el,
                rotor.resolution()
            );
        }
        Commands::Track { .. } => {
            track(rotor, waypoints.unwrap_or_default(), config.tracking_interval()).await?
        }
        Commands::Monitor => monitor(rotor, config.status_interval()).await,
    }

    Ok(())
}

async fn track(
    rotor: Arc<RotorController>,
    waypoints: Vec<rot2prog_tracker::tracking::Waypoint>,
    poll_interval: Duration,
) -> Result<()> {
    let scheduler = TrackingScheduler::new(rotor, Arc::new(SystemClock), poll_interval);
    let job = scheduler.start(waypoints).await;
    info!(%job, "Tracking job started");

    let report = tokio::select! {
        report = scheduler.wait() => report,
        _ = tokio::signal::ctrl_c() => {
            info!(%job, "Cancelling tracking job");
            scheduler.cancel().await
        }
    };

    if let Some(report) = report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

async fn monitor(rotor: Arc<RotorController>, poll_interval: Duration) {
    let monitor = StatusMonitor::spawn(rotor, poll_interval);
    let mut positions = monitor.subscribe();

    loop {
        tokio::select! {
            changed = positions.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = *positions.borrow_and_update();
                if let Some(position) = latest {
                    print_position(position);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    monitor.stop().await;
}

fn print_position(position: Position) {
    println!(
        "Az {:.1}° El {:.1}°",
        position.azimuth, position.elevation
    );
}
