//! Robot controller for the assembly cell
//!
//! Composes the three robot-side connections (dashboard for coarse state,
//! primary for script dispatch, secondary for state telemetry) behind one
//! interface the sequence layer drives: query state, move to a pose, track
//! completion.

use crate::config::Config;
use crate::dashboard::DashboardClient;
use crate::motion::{MotionCompletionTracker, MotionOutcome};
use crate::parser::{CartesianPose, JointPositions, ToolData};
use crate::primary::{self, PrimaryClient};
use crate::secondary::{SecondaryClient, TelemetrySnapshot};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info};

pub struct RobotController {
    config: Config,
    dashboard: DashboardClient,
    primary: PrimaryClient,
    secondary: SecondaryClient,
}

impl RobotController {
    pub fn new(config: Config) -> Result<Self> {
        let host = config.robot.host.clone();
        let ports = config.robot.ports.clone();
        Ok(Self {
            dashboard: DashboardClient::new(&host, ports.dashboard)
                .context("Failed to create dashboard client")?,
            primary: PrimaryClient::new(&host, ports.primary),
            secondary: SecondaryClient::new(&host, ports.secondary),
            config,
        })
    }

    pub fn from_config_path(path: &str) -> Result<Self> {
        let config = Config::load_from_path(path).context("Failed to load configuration")?;
        Self::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect all three robot interfaces.
    pub async fn connect(&self) -> Result<()> {
        info!("Connecting to robot at {}", self.config.robot.host);
        self.dashboard
            .connect()
            .await
            .context("Dashboard connection failed")?;
        self.primary
            .connect()
            .await
            .context("Primary connection failed")?;
        self.secondary
            .connect()
            .await
            .context("Secondary connection failed")?;
        Ok(())
    }

    /// Drop and re-establish all connections.
    pub async fn reconnect(&self) -> Result<()> {
        info!("Reconnecting to robot");
        self.shutdown().await;
        match self.connect().await {
            Ok(()) => {
                info!("Reconnection successful");
                Ok(())
            }
            Err(e) => {
                error!("Reconnection failed: {:#}", e);
                Err(e)
            }
        }
    }

    /// Query the robot mode name, then power on / release brakes if the
    /// robot is not yet running.
    pub async fn ensure_ready(&self) -> Result<()> {
        let mode = self.robot_mode().await?;
        info!("Robot mode: {}", mode);

        if mode.contains("POWER_OFF") || mode.contains("DISCONNECTED") {
            info!("Powering on robot");
            self.dashboard.send_command("power on").await?;
            self.wait_for_mode("IDLE", Duration::from_secs(15)).await?;
        }

        let mode = self.robot_mode().await?;
        if mode.contains("IDLE") {
            info!("Releasing brakes");
            self.dashboard.send_command("brake release").await?;
            self.wait_for_mode("RUNNING", Duration::from_secs(10)).await?;
        }

        Ok(())
    }

    async fn wait_for_mode(&self, wanted: &str, timeout: Duration) -> Result<()> {
        let start = std::time::Instant::now();
        loop {
            let mode = self.robot_mode().await?;
            if mode.contains(wanted) {
                return Ok(());
            }
            if start.elapsed() > timeout {
                anyhow::bail!("Timeout waiting for robot mode {} (current: {})", wanted, mode);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    pub async fn robot_mode(&self) -> Result<String> {
        Ok(self.dashboard.robot_mode().await?)
    }

    pub async fn enable_freedrive(&self) -> bool {
        self.primary.send_script(primary::freedrive_enable_script()).await
    }

    pub async fn disable_freedrive(&self) -> bool {
        self.primary.send_script(primary::freedrive_disable_script()).await
    }

    pub async fn current_pose(&self) -> Option<CartesianPose> {
        self.secondary.cartesian_positions().await
    }

    pub async fn current_joints(&self) -> Option<JointPositions> {
        self.secondary.joint_positions().await
    }

    pub async fn tool_data(&self) -> Option<ToolData> {
        self.secondary.tool_data().await
    }

    /// Joint angles and TCP pose from one pass over the state stream.
    pub async fn robot_state(&self) -> (Option<JointPositions>, Option<CartesianPose>) {
        self.secondary.robot_state().await
    }

    pub async fn snapshot(&self) -> TelemetrySnapshot {
        self.secondary.snapshot().await
    }

    /// Dispatch a linear move to `target` and track it to a terminal
    /// outcome. The outcome message is fit for end-user reporting; stuck
    /// resends happen inside the tracker.
    pub async fn move_to_pose(&self, target: CartesianPose, grip: bool) -> MotionOutcome {
        let mut request = self.config.motion_request(target);
        request.grip = grip;

        let mut tracker = MotionCompletionTracker::new(&self.secondary, &self.primary);
        let outcome = tracker.run(&request).await;
        if !outcome.is_success() {
            error!("Move failed: {}", outcome.message());
        }
        outcome
    }

    /// Fire-and-forget joint-space move; completion is not tracked.
    pub async fn move_joints(&self, joints: &JointPositions, speed: f64, acceleration: f64) -> bool {
        let script = primary::movej_script(joints, speed, acceleration);
        self.primary.send_script(&script).await
    }

    /// Per-interface connection health: (dashboard, primary, secondary).
    pub async fn connection_health(&self) -> (bool, bool, bool) {
        (
            self.dashboard.is_connected().await,
            self.primary.is_connected().await,
            self.secondary.is_connected().await,
        )
    }

    /// Close all connections. Best effort, never fails.
    pub async fn shutdown(&self) {
        self.dashboard.disconnect().await;
        self.primary.disconnect().await;
        self.secondary.disconnect().await;
        info!("Robot controller shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MovementConfig, PortConfig, RobotConfig};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn text_stub(banner: &'static str, reply: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            if !banner.is_empty() {
                sock.write_all(banner.as_bytes()).await.unwrap();
            }
            let mut buf = [0u8; 256];
            loop {
                match sock.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                if sock.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        port
    }

    async fn silent_stub() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(sock);
        });
        port
    }

    fn config(dashboard: u16, primary: u16, secondary: u16) -> Config {
        Config {
            robot: RobotConfig {
                host: "127.0.0.1".to_string(),
                ports: PortConfig {
                    primary,
                    secondary,
                    dashboard,
                },
                movement: MovementConfig {
                    speed: 0.5,
                    acceleration: 1.0,
                },
                connection: Default::default(),
                motion: None,
            },
        }
    }

    #[tokio::test]
    async fn connects_all_interfaces_and_reads_mode() {
        let dashboard = text_stub("Connected: dashboard\n", "Robotmode: RUNNING\n").await;
        let primary = silent_stub().await;
        let secondary = silent_stub().await;

        let controller = RobotController::new(config(dashboard, primary, secondary)).unwrap();
        controller.connect().await.unwrap();

        assert_eq!(controller.robot_mode().await.unwrap(), "RUNNING");
        assert_eq!(controller.connection_health().await, (true, true, true));

        controller.ensure_ready().await.unwrap();

        controller.shutdown().await;
        assert_eq!(controller.connection_health().await, (false, false, false));
    }
}
