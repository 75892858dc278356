//! Configuration loading for the assembly cell

use crate::error::{CellError, Result};
use crate::motion::MotionRequest;
use crate::parser::CartesianPose;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub robot: RobotConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    pub host: String,
    #[serde(default)]
    pub ports: PortConfig,
    pub movement: MovementConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    pub motion: Option<MotionConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortConfig {
    pub primary: u16,
    pub secondary: u16,
    pub dashboard: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            primary: crate::primary::UR_PRIMARY_PORT,
            secondary: crate::secondary::UR_SECONDARY_PORT,
            dashboard: crate::dashboard::UR_DASHBOARD_PORT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MovementConfig {
    pub speed: f64,
    pub acceleration: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub timeout: f64,
    pub retry_attempts: u32,
    pub retry_delay: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: 5.0,
            retry_attempts: 3,
            retry_delay: 1.0,
        }
    }
}

/// Motion-tracker tunables. All optional; accessors fall back to the
/// canonical defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MotionConfig {
    pub tolerance: Option<f64>,
    pub stuck_tolerance: Option<f64>,
    pub stuck_streak: Option<u32>,
    pub max_retries: Option<u32>,
    pub max_polls: Option<u32>,
    pub poll_interval_ms: Option<u64>,
}

impl MotionConfig {
    pub fn tolerance(&self) -> f64 {
        self.tolerance.unwrap_or(0.001)
    }

    pub fn stuck_tolerance(&self) -> f64 {
        self.stuck_tolerance.unwrap_or(0.0001)
    }

    pub fn stuck_streak(&self) -> u32 {
        self.stuck_streak.unwrap_or(5)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(3)
    }

    pub fn max_polls(&self) -> u32 {
        self.max_polls.unwrap_or(100)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(100))
    }
}

impl Config {
    pub fn load_from_path(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| CellError::Config(format!("Failed to read {}: {}", path, e)))?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Build a motion request for `target` using configured movement
    /// dynamics and tracker tunables.
    pub fn motion_request(&self, target: CartesianPose) -> MotionRequest {
        let mut request = MotionRequest::new(
            target,
            self.robot.movement.speed,
            self.robot.movement.acceleration,
        );
        if let Some(motion) = &self.robot.motion {
            request.tolerance = motion.tolerance();
            request.stuck_tolerance = motion.stuck_tolerance();
            request.stuck_streak = motion.stuck_streak();
            request.max_retries = motion.max_retries();
            request.max_polls = motion.max_polls();
            request.poll_interval = motion.poll_interval();
        }
        request
    }
}
