//! insertd - assembly-cell robot coordination library
//!
//! Connects a UR-style industrial arm's three TCP interfaces and exposes
//! what the assembly sequence layer needs: fresh state telemetry parsed
//! from the robot's binary secondary stream, script dispatch on the primary
//! interface, coarse mode control over the dashboard, and closed-loop
//! motion-completion tracking with stuck detection and bounded resends.
//!
//! # Architecture
//!
//! - **codec / parser**: big-endian scalar readers and the sub-package walk
//!   that extracts joint, Cartesian and tool data from state frames
//! - **framing**: deadline-bounded length-prefixed frame reads plus the
//!   stale-backlog drain that keeps telemetry fresh
//! - **SecondaryClient**: request/response accessors over the state stream,
//!   serialized on one socket lock
//! - **PrimaryClient / DashboardClient**: URScript dispatch and dashboard
//!   queries
//! - **MotionCompletionTracker**: polls the position feed to classify a move
//!   as arrived, progressing or stuck
//! - **RobotController**: ties the clients together for the sequence layer

pub mod codec;
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod error;
pub mod framing;
pub mod motion;
pub mod parser;
pub mod primary;
pub mod secondary;

pub use config::{Config, MotionConfig, MovementConfig, PortConfig, RobotConfig};
pub use controller::RobotController;
pub use dashboard::DashboardClient;
pub use error::{CellError, Result};
pub use framing::Frame;
pub use motion::{
    CommandPort, MotionCompletionTracker, MotionOutcome, MotionPhase, MotionRequest, PoseSource,
};
pub use parser::{CartesianPose, JointPositions, PackageType, ToolData};
pub use primary::PrimaryClient;
pub use secondary::{SecondaryClient, TelemetrySnapshot};
