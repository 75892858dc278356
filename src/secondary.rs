//! Secondary-interface telemetry client
//!
//! The secondary port streams robot state frames at a fixed rate whether or
//! not anyone reads them. This client owns that socket and exposes
//! request/response style accessors: drain the stale backlog, then read
//! fresh frames until one carries the requested sub-package, with a bounded
//! number of attempts. Absence after the attempt budget is a normal outcome
//! (the robot simply did not send that sub-package in the window), not a
//! connection failure.
//!
//! All accessors serialize on one async mutex. The protocol has no re-sync
//! marker, so two tasks interleaving reads on the same stream would
//! desynchronize frame boundaries permanently.

use crate::error::{CellError, Result};
use crate::framing;
use crate::parser::{self, CartesianPose, JointPositions, ToolData};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Default secondary interface port on UR robots.
pub const UR_SECONDARY_PORT: u16 = 30002;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_DEADLINE: Duration = Duration::from_millis(500);
const DRAIN_BUDGET: Duration = Duration::from_millis(250);
const READ_ATTEMPTS: usize = 10;
const ATTEMPT_BACKOFF: Duration = Duration::from_millis(50);

/// Current epoch time in seconds, rounded to microsecond precision.
pub fn epoch_seconds() -> f64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    (now * 1_000_000.0).round() / 1_000_000.0
}

/// Latest successfully parsed state, per connection. Each field stays empty
/// until first parsed and is overwritten whole on every later parse.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetrySnapshot {
    pub joint_positions: Option<JointPositions>,
    pub cartesian: Option<CartesianPose>,
    pub tool: Option<ToolData>,
    /// Epoch seconds of the last successful parse, 0.0 before the first.
    pub last_updated: f64,
}

struct Inner {
    stream: Option<TcpStream>,
    snapshot: TelemetrySnapshot,
}

/// Client for the robot's secondary state-streaming interface.
pub struct SecondaryClient {
    host: String,
    port: u16,
    inner: Mutex<Inner>,
}

impl SecondaryClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            inner: Mutex::new(Inner {
                stream: None,
                snapshot: TelemetrySnapshot::default(),
            }),
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

        let mut inner = self.inner.lock().await;
        inner.stream = Some(stream);
        info!("Connected to secondary interface at {}:{}", self.host, self.port);
        Ok(())
    }

    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        inner.stream = None;
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.stream.is_some()
    }

    /// Latest parsed state without touching the socket.
    pub async fn snapshot(&self) -> TelemetrySnapshot {
        self.inner.lock().await.snapshot.clone()
    }

    /// Freshest joint angles, or `None` if no JointData arrived within the
    /// attempt budget.
    pub async fn joint_positions(&self) -> Option<JointPositions> {
        self.fetch(parser::parse_joint_positions, |snap, v| {
            snap.joint_positions = Some(v)
        })
        .await
    }

    /// Freshest TCP pose, or `None` if no CartesianInfo arrived within the
    /// attempt budget.
    pub async fn cartesian_positions(&self) -> Option<CartesianPose> {
        self.fetch(parser::parse_cartesian_positions, |snap, v| {
            snap.cartesian = Some(v)
        })
        .await
    }

    /// Freshest tool I/O data.
    pub async fn tool_data(&self) -> Option<ToolData> {
        self.fetch(parser::parse_tool_data, |snap, v| snap.tool = Some(v)).await
    }

    /// Joint angles and TCP pose gathered in a single pass over the stream.
    /// Either side may be absent if the attempt budget runs out first.
    pub async fn robot_state(&self) -> (Option<JointPositions>, Option<CartesianPose>) {
        let mut inner = self.inner.lock().await;
        let Inner { stream, snapshot } = &mut *inner;
        let Some(sock) = stream.as_mut() else {
            return (None, None);
        };

        framing::drain_stale(sock, DRAIN_BUDGET).await;

        let mut joints = None;
        let mut pose = None;
        let mut lost = false;

        for attempt in 0..READ_ATTEMPTS {
            match framing::read_frame(sock, READ_DEADLINE).await {
                Ok(frame) => {
                    if joints.is_none() {
                        if let Some(j) = parser::parse_joint_positions(frame.payload()) {
                            snapshot.joint_positions = Some(j);
                            snapshot.last_updated = epoch_seconds();
                            joints = Some(j);
                        }
                    }
                    if pose.is_none() {
                        if let Some(p) = parser::parse_cartesian_positions(frame.payload()) {
                            snapshot.cartesian = Some(p);
                            snapshot.last_updated = epoch_seconds();
                            pose = Some(p);
                        }
                    }
                    if joints.is_some() && pose.is_some() {
                        break;
                    }
                }
                Err(CellError::Disconnected) | Err(CellError::Io(_)) => {
                    lost = true;
                    break;
                }
                // Timed-out or corrupt attempt; the next top-level read
                // starts fresh at the next length prefix.
                Err(_) => {}
            }
            if attempt + 1 < READ_ATTEMPTS {
                sleep(ATTEMPT_BACKOFF).await;
            }
        }

        if lost {
            warn!("Secondary connection lost while reading robot state");
            *stream = None;
        }
        (joints, pose)
    }

    /// Shared accessor path: lock the socket, drain stale frames, then read
    /// fresh frames until `extract` finds the requested sub-package.
    async fn fetch<T: Copy>(
        &self,
        extract: impl Fn(&[u8]) -> Option<T>,
        store: impl Fn(&mut TelemetrySnapshot, T),
    ) -> Option<T> {
        let mut inner = self.inner.lock().await;
        let Inner { stream, snapshot } = &mut *inner;
        let Some(sock) = stream.as_mut() else {
            return None;
        };

        framing::drain_stale(sock, DRAIN_BUDGET).await;

        let mut found = None;
        let mut lost = false;

        for attempt in 0..READ_ATTEMPTS {
            match framing::read_frame(sock, READ_DEADLINE).await {
                Ok(frame) => {
                    if let Some(value) = extract(frame.payload()) {
                        store(snapshot, value);
                        snapshot.last_updated = epoch_seconds();
                        found = Some(value);
                        break;
                    }
                }
                Err(CellError::Disconnected) | Err(CellError::Io(_)) => {
                    lost = true;
                    break;
                }
                Err(_) => {}
            }
            if attempt + 1 < READ_ATTEMPTS {
                sleep(ATTEMPT_BACKOFF).await;
            }
        }

        if lost {
            warn!("Secondary connection lost during read");
            *stream = None;
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::PackageType;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn sub_package(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut bytes = (body.len() as i32 + 5).to_be_bytes().to_vec();
        bytes.push(tag);
        bytes.extend_from_slice(body);
        bytes
    }

    fn state_frame(subs: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = vec![0u8; 5];
        for sub in subs {
            payload.extend_from_slice(sub);
        }
        let mut frame = (payload.len() as i32 + 4).to_be_bytes().to_vec();
        frame.extend_from_slice(&payload);
        frame
    }

    fn joint_sub(angles: &[f64; 6]) -> Vec<u8> {
        let mut body = vec![0u8; 6 * 41];
        for (i, angle) in angles.iter().enumerate() {
            body[i * 41..i * 41 + 8].copy_from_slice(&angle.to_be_bytes());
        }
        sub_package(PackageType::JointData as u8, &body)
    }

    fn cartesian_sub(pose: &[f64; 6]) -> Vec<u8> {
        let mut body = Vec::new();
        for v in pose {
            body.extend_from_slice(&v.to_be_bytes());
        }
        body.extend_from_slice(&[0u8; 48]); // zero TCP offset
        sub_package(PackageType::CartesianInfo as u8, &body)
    }

    async fn serve_frames(frame: Vec<u8>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            loop {
                if sock.write_all(&frame).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(8)).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn accessor_returns_fresh_joint_positions() {
        let angles = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let addr = serve_frames(state_frame(&[joint_sub(&angles)])).await;

        let client = SecondaryClient::new(&addr.ip().to_string(), addr.port());
        client.connect().await.unwrap();

        let joints = client.joint_positions().await.expect("joint data");
        assert_eq!(joints, angles);

        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.joint_positions, Some(angles));
        assert!(snapshot.last_updated > 0.0);
    }

    #[tokio::test]
    async fn missing_subpackage_type_is_absent_not_error() {
        // Only cartesian frames on the wire; joint reads must come back
        // empty without dropping the connection.
        let pose = [0.5, -0.5, 0.25, 0.0, 3.14, 0.0];
        let addr = serve_frames(state_frame(&[cartesian_sub(&pose)])).await;

        let client = SecondaryClient::new(&addr.ip().to_string(), addr.port());
        client.connect().await.unwrap();

        assert!(client.joint_positions().await.is_none());
        assert!(client.is_connected().await);

        let parsed = client.cartesian_positions().await.expect("cartesian data");
        assert_eq!(parsed.x, 0.5);
        assert_eq!(parsed.tcp_offset, [0.0; 6]);
    }

    #[tokio::test]
    async fn robot_state_gathers_both_from_one_pass() {
        let angles = [1.0, 1.1, 1.2, 1.3, 1.4, 1.5];
        let pose = [0.2, 0.3, 0.4, 0.0, 0.0, 1.57];
        let frame = state_frame(&[joint_sub(&angles), cartesian_sub(&pose)]);
        let addr = serve_frames(frame).await;

        let client = SecondaryClient::new(&addr.ip().to_string(), addr.port());
        client.connect().await.unwrap();

        let (joints, cartesian) = client.robot_state().await;
        assert_eq!(joints, Some(angles));
        assert_eq!(cartesian.map(|c| c.z), Some(0.4));
    }

    #[tokio::test]
    async fn closed_connection_marks_client_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });

        let client = SecondaryClient::new(&addr.ip().to_string(), addr.port());
        client.connect().await.unwrap();

        assert!(client.joint_positions().await.is_none());
        assert!(!client.is_connected().await);
    }
}
