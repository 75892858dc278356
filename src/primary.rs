//! Primary-interface script client
//!
//! The primary port accepts URScript programs as plain text. Transmission is
//! fire-and-forget: the robot acknowledges nothing on this channel, so
//! `send_script` only reports whether the bytes went out. Arrival at a target
//! pose is observed through the secondary interface instead (see
//! `crate::motion`).

use crate::error::{CellError, Result};
use crate::parser::CartesianPose;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

/// Default primary interface port on UR robots.
pub const UR_PRIMARY_PORT: u16 = 30001;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tool voltage applied while the gripper holds a part.
const GRIP_VOLTAGE: u8 = 12;

/// Client for the robot's primary URScript interface.
pub struct PrimaryClient {
    host: String,
    port: u16,
    stream: Mutex<Option<TcpStream>>,
}

impl PrimaryClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            stream: Mutex::new(None),
        }
    }

    pub async fn connect(&self) -> Result<()> {
        let stream = timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            CellError::Connection(format!("connect to {}:{} timed out", self.host, self.port))
        })?
        .map_err(|e| CellError::Connection(format!("{}:{}: {}", self.host, self.port, e)))?;

        *self.stream.lock().await = Some(stream);
        info!("Connected to primary interface at {}:{}", self.host, self.port);
        Ok(())
    }

    pub async fn disconnect(&self) {
        *self.stream.lock().await = None;
    }

    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Send a URScript program. Returns `true` if the bytes were written;
    /// nothing more is knowable on this channel.
    pub async fn send_script(&self, script: &str) -> bool {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            warn!("Not connected to primary interface");
            return false;
        };

        let text = if script.ends_with('\n') {
            script.to_string()
        } else {
            format!("{}\n", script)
        };

        match stream.write_all(text.as_bytes()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send URScript: {}", e);
                *guard = None;
                false
            }
        }
    }
}

/// Build a `movel` program that drives the TCP to `target`, optionally
/// energizing the gripper first.
pub fn movel_script(target: &CartesianPose, speed: f64, acceleration: f64, grip: bool) -> String {
    let voltage = if grip { GRIP_VOLTAGE } else { 0 };
    format!(
        "def move_to_target():\n  \
         set_tool_voltage({voltage})\n  \
         set_digital_out(8, {grip})\n  \
         target_pose = p[{:.6}, {:.6}, {:.6}, {:.6}, {:.6}, {:.6}]\n  \
         movel(target_pose, a={acceleration:.2}, v={speed:.2})\nend\n",
        target.x,
        target.y,
        target.z,
        target.rx,
        target.ry,
        target.rz,
        grip = if grip { "True" } else { "False" },
    )
}

/// Build a `movej` program for a joint-space move.
pub fn movej_script(joints: &[f64; 6], speed: f64, acceleration: f64) -> String {
    let positions = joints
        .iter()
        .map(|q| format!("{:.4}", q))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "def move_to_joints():\n  movej([{positions}], a={acceleration:.2}, v={speed:.2})\nend\n"
    )
}

/// Program that puts the arm into freedrive until stopped.
pub fn freedrive_enable_script() -> &'static str {
    "def freedrive_enable():\n  freedrive_mode()\n  while (True):\n    sleep(0.1)\n  end\nend\n"
}

pub fn freedrive_disable_script() -> &'static str {
    "end_freedrive_mode()\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn pose(x: f64, y: f64, z: f64) -> CartesianPose {
        CartesianPose {
            x,
            y,
            z,
            rx: 1.5,
            ry: 0.0,
            rz: -0.5,
            tcp_offset: [0.0; 6],
        }
    }

    #[test]
    fn movel_script_formats_pose_and_grip() {
        let script = movel_script(&pose(0.1, -0.25, 0.5), 0.5, 1.0, true);
        assert!(script.contains("set_tool_voltage(12)"));
        assert!(script.contains("set_digital_out(8, True)"));
        assert!(script.contains("p[0.100000, -0.250000, 0.500000, 1.500000, 0.000000, -0.500000]"));
        assert!(script.contains("movel(target_pose, a=1.00, v=0.50)"));

        let released = movel_script(&pose(0.0, 0.0, 0.0), 0.5, 1.0, false);
        assert!(released.contains("set_tool_voltage(0)"));
        assert!(released.contains("set_digital_out(8, False)"));
    }

    #[test]
    fn movej_script_formats_joints() {
        let script = movej_script(&[0.0, -1.5708, 1.5708, 0.0, 0.5, 0.0], 1.0, 1.4);
        assert!(script.contains("movej([0.0000, -1.5708, 1.5708, 0.0000, 0.5000, 0.0000]"));
        assert!(script.contains("a=1.40, v=1.00"));
    }

    #[tokio::test]
    async fn send_script_writes_newline_terminated_text() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let n = sock.read(&mut buf).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        let client = PrimaryClient::new(&addr.ip().to_string(), addr.port());
        client.connect().await.unwrap();
        assert!(client.send_script("halt").await);

        let received = server.await.unwrap();
        assert_eq!(received, "halt\n");
    }

    #[tokio::test]
    async fn send_without_connection_reports_failure() {
        let client = PrimaryClient::new("127.0.0.1", 1);
        assert!(!client.send_script("halt").await);
    }
}
