//! Error types for the assembly-cell robot interfaces

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CellError>;

#[derive(Error, Debug)]
pub enum CellError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed by robot")]
    Disconnected,

    #[error("Receive timed out")]
    Timeout,

    #[error("Corrupt frame: declared length {0} outside sane bounds")]
    CorruptFrame(i32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Motion error: {0}")]
    Motion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
