//! insertd - assembly-cell robot daemon
//!
//! Connects the robot's dashboard, primary and secondary interfaces, brings
//! the arm to a runnable mode, then streams position and tool telemetry as
//! JSON lines on stdout until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use insertd::secondary::epoch_seconds;
use insertd::RobotController;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "insertd")]
#[command(about = "Assembly-cell daemon - robot telemetry and motion tracking")]
#[command(version)]
struct Args {
    /// Path to the cell configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Telemetry output interval in milliseconds
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Skip the power-on / brake-release preparation sequence
    #[arg(long)]
    no_prepare: bool,
}

impl Args {
    fn config_path(&self) -> String {
        self.config
            .clone()
            .or_else(|| std::env::var("INSERTD_CONFIG").ok())
            .unwrap_or_else(|| "config/cell.yaml".to_string())
    }
}

#[derive(Serialize)]
struct PositionRecord {
    stime: f64,
    #[serde(rename = "type")]
    event_type: &'static str,
    tcp_pose: Option<[f64; 6]>,
    joint_positions: Option<[f64; 6]>,
}

#[derive(Serialize)]
struct ToolRecord {
    stime: f64,
    #[serde(rename = "type")]
    event_type: &'static str,
    voltage_48v: f32,
    current: f32,
    temperature: f32,
    mode: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config_path();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    info!("insertd starting, config: {}", config_path);

    let controller =
        RobotController::from_config_path(&config_path).context("Failed to create controller")?;

    controller.connect().await.context("Robot connection failed")?;
    if !args.no_prepare {
        controller
            .ensure_ready()
            .await
            .context("Failed to bring robot to a runnable mode")?;
    }
    info!("Robot ready, streaming telemetry every {}ms", args.interval_ms);

    let interval = Duration::from_millis(args.interval_ms);
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                emit_telemetry(&controller).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

async fn emit_telemetry(controller: &RobotController) {
    let (joints, pose) = controller.robot_state().await;
    if joints.is_none() && pose.is_none() {
        warn!("No fresh telemetry this interval");
    } else {
        let record = PositionRecord {
            stime: epoch_seconds(),
            event_type: "position",
            tcp_pose: pose.map(|p| [p.x, p.y, p.z, p.rx, p.ry, p.rz]),
            joint_positions: joints,
        };
        print_record(&record);
    }

    if let Some(tool) = controller.tool_data().await {
        let record = ToolRecord {
            stime: epoch_seconds(),
            event_type: "tool",
            voltage_48v: tool.tool_voltage_48v,
            current: tool.tool_current,
            temperature: tool.tool_temperature,
            mode: tool.tool_mode,
        };
        print_record(&record);
    }
}

fn print_record<T: Serialize>(record: &T) {
    match serde_json::to_string(record) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Failed to serialize telemetry record: {}", e),
    }
}
