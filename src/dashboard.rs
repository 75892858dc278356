//! Dashboard-interface client
//!
//! Simple line-oriented request/response protocol used for coarse robot
//! state queries and power control. Not part of the telemetry core; the
//! sequence layer uses it to confirm the robot is in a runnable mode.

use crate::error::{CellError, Result};
use regex::Regex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

/// Default dashboard port on UR robots.
pub const UR_DASHBOARD_PORT: u16 = 29999;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the robot's dashboard command interface.
pub struct DashboardClient {
    host: String,
    port: u16,
    stream: Mutex<Option<TcpStream>>,
    robotmode_pattern: Regex,
}

impl DashboardClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let robotmode_pattern = Regex::new(r"(?i)robotmode:\s*(\w+)")
            .map_err(|e| CellError::Protocol(format!("robotmode pattern: {}", e)))?;
        Ok(Self {
            host: host.to_string(),
            port,
            stream: Mutex::new(None),
            robotmode_pattern,
        })
    }

    /// Connect and consume the welcome banner the dashboard sends first.
    pub async fn connect(&self) -> Result<()> {
        let mut stream = timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            CellError::Connection(format!("connect to {}:{} timed out", self.host, self.port))
        })?
        .map_err(|e| CellError::Connection(format!("{}:{}: {}", self.host, self.port, e)))?;

        let mut banner = [0u8; 1024];
        let read = timeout(REPLY_TIMEOUT, stream.read(&mut banner))
            .await
            .map_err(|_| CellError::Timeout)??;
        let welcome = String::from_utf8_lossy(&banner[..read]).trim().to_string();
        info!("Dashboard connected: {}", welcome);

        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    pub async fn disconnect(&self) {
        *self.stream.lock().await = None;
    }

    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Send one command line and return the single-line reply.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| CellError::Connection("dashboard not connected".into()))?;

        let line = format!("{}\n", command.trim_end());
        stream.write_all(line.as_bytes()).await?;

        let mut buf = [0u8; 1024];
        let read = timeout(REPLY_TIMEOUT, stream.read(&mut buf))
            .await
            .map_err(|_| CellError::Timeout)??;
        if read == 0 {
            *guard = None;
            return Err(CellError::Disconnected);
        }

        Ok(String::from_utf8_lossy(&buf[..read]).trim().to_string())
    }

    /// Query the robot mode name, e.g. `RUNNING` or `POWER_OFF`.
    pub async fn robot_mode(&self) -> Result<String> {
        let reply = self.send_command("robotmode").await?;
        match self.robotmode_pattern.captures(&reply) {
            Some(captures) => Ok(captures[1].to_string()),
            // Older controllers answer with the bare mode name.
            None => Ok(reply),
        }
    }
}
