//! Motion-completion tracking
//!
//! The primary channel gives no acknowledgement that a move ever ran, so
//! completion is observed by polling the telemetry position feed and
//! classifying each sample: arrived (within tolerance of the target),
//! progressing (position still changing), or stuck (a streak of samples with
//! negligible change). A stuck robot gets the same move re-dispatched a
//! bounded number of times before the tracker gives up.
//!
//! The position feed is itself retried, lagged telemetry, so a single
//! no-change sample proves nothing; only a streak of them counts as stalled.

use crate::parser::CartesianPose;
use crate::primary::{self, PrimaryClient};
use crate::secondary::SecondaryClient;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Live position feed the tracker polls. `None` means no fresh sample was
/// available this poll, which is tolerated.
#[async_trait]
pub trait PoseSource: Send + Sync {
    async fn cartesian_positions(&self) -> Option<CartesianPose>;
}

/// Command channel for dispatching and re-dispatching move scripts.
#[async_trait]
pub trait CommandPort: Send + Sync {
    async fn send_script(&self, script: &str) -> bool;
}

#[async_trait]
impl PoseSource for SecondaryClient {
    async fn cartesian_positions(&self) -> Option<CartesianPose> {
        SecondaryClient::cartesian_positions(self).await
    }
}

#[async_trait]
impl CommandPort for PrimaryClient {
    async fn send_script(&self, script: &str) -> bool {
        PrimaryClient::send_script(self, script).await
    }
}

/// One tracked move: target, dynamics, and the tracker tunables.
#[derive(Debug, Clone)]
pub struct MotionRequest {
    pub target: CartesianPose,
    pub speed: f64,
    pub acceleration: f64,
    /// Energize the gripper for this move.
    pub grip: bool,
    /// Arrival tolerance per axis (X/Y/Z); orientation is not checked.
    pub tolerance: f64,
    /// Per-axis change below which two consecutive samples count as "same".
    pub stuck_tolerance: f64,
    /// Consecutive same-position samples before the move is declared stuck.
    pub stuck_streak: u32,
    /// Resend budget for stuck moves.
    pub max_retries: u32,
    /// Poll budget per polling window (restarts after each resend).
    pub max_polls: u32,
    pub poll_interval: Duration,
}

impl MotionRequest {
    pub fn new(target: CartesianPose, speed: f64, acceleration: f64) -> Self {
        Self {
            target,
            speed,
            acceleration,
            grip: false,
            tolerance: 0.001,
            stuck_tolerance: 0.0001,
            stuck_streak: 5,
            max_retries: 3,
            max_polls: 100,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Tracker phases, in the order a healthy move passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionPhase {
    Sent,
    Polling,
    Arrived,
    StuckRetrying,
    TimedOut,
    Failed,
}

/// Terminal result of a tracked move.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionOutcome {
    Arrived { retries: u32 },
    TimedOut { retries: u32 },
    Failed { reason: String },
}

impl MotionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MotionOutcome::Arrived { .. })
    }

    /// Human-readable summary, suitable for end-user reporting.
    pub fn message(&self) -> String {
        match self {
            MotionOutcome::Arrived { retries } => {
                format!("Robot reached the target position (resends: {})", retries)
            }
            MotionOutcome::TimedOut { retries } => format!(
                "Robot did not reach the target position in time (resends: {})",
                retries
            ),
            MotionOutcome::Failed { reason } => reason.clone(),
        }
    }
}

/// Drives one move to a terminal outcome by polling the position feed.
///
/// Runs on the caller's task; each cycle is one telemetry read plus an
/// interval sleep, no dedicated thread.
pub struct MotionCompletionTracker<'a> {
    poses: &'a dyn PoseSource,
    commands: &'a dyn CommandPort,
    phase: MotionPhase,
}

impl<'a> MotionCompletionTracker<'a> {
    pub fn new(poses: &'a dyn PoseSource, commands: &'a dyn CommandPort) -> Self {
        Self {
            poses,
            commands,
            phase: MotionPhase::Sent,
        }
    }

    pub fn phase(&self) -> MotionPhase {
        self.phase
    }

    /// Dispatch the move and poll until arrival, poll exhaustion, or a
    /// dispatch failure.
    pub async fn run(&mut self, request: &MotionRequest) -> MotionOutcome {
        let script = primary::movel_script(
            &request.target,
            request.speed,
            request.acceleration,
            request.grip,
        );

        // Baseline for stuck detection: where the robot was before the move.
        let mut last_sample = self.poses.cartesian_positions().await;

        if !self.commands.send_script(&script).await {
            self.phase = MotionPhase::Failed;
            return MotionOutcome::Failed {
                reason: "Failed to send move script to robot".to_string(),
            };
        }
        self.phase = MotionPhase::Polling;

        let mut retries = 0u32;
        let mut streak = 0u32;
        let mut polls = 0u32;

        while polls < request.max_polls {
            sleep(request.poll_interval).await;
            polls += 1;

            // A missed sample spends a poll but says nothing about motion.
            let Some(current) = self.poses.cartesian_positions().await else {
                continue;
            };

            if within(&current, &request.target, request.tolerance) {
                info!("Target position reached after {} resends", retries);
                self.phase = MotionPhase::Arrived;
                return MotionOutcome::Arrived { retries };
            }

            if let Some(previous) = last_sample {
                if within(&current, &previous, request.stuck_tolerance) {
                    streak += 1;
                    debug!("Position unchanged for {} consecutive samples", streak);

                    if streak >= request.stuck_streak && retries < request.max_retries {
                        retries += 1;
                        streak = 0;
                        polls = 0;
                        self.phase = MotionPhase::StuckRetrying;
                        warn!(
                            "Robot appears stuck, resending move ({}/{})",
                            retries, request.max_retries
                        );
                        if !self.commands.send_script(&script).await {
                            self.phase = MotionPhase::Failed;
                            return MotionOutcome::Failed {
                                reason: format!(
                                    "Failed to resend move script on retry {}",
                                    retries
                                ),
                            };
                        }
                        self.phase = MotionPhase::Polling;
                    }
                } else {
                    streak = 0;
                }
            }

            last_sample = Some(current);
        }

        self.phase = MotionPhase::TimedOut;
        MotionOutcome::TimedOut { retries }
    }
}

/// Positions agree within `tolerance` on X, Y and Z. Orientation is ignored.
fn within(a: &CartesianPose, b: &CartesianPose, tolerance: f64) -> bool {
    (a.x - b.x).abs() < tolerance && (a.y - b.y).abs() < tolerance && (a.z - b.z).abs() < tolerance
}
