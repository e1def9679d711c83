//! Application layer errors

use std::path::PathBuf;
use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Unsupported by this adapter: {0}")]
    Unsupported(String),

    /// The platform understood the action and refused it
    #[error("Action rejected: {0}")]
    Rejected(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors raised by a comic downloader
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Downloader binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Failed to write downloader options: {0}")]
    Options(String),

    #[error("Failed to execute downloader: {0}")]
    Spawn(std::io::Error),

    #[error("Downloader exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
}

/// Errors raised while assembling images into a PDF
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("No image files found in {0}")]
    NoImages(PathBuf),

    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to encode PDF: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a download job before it runs
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid comic id: {0}")]
    InvalidId(String),

    #[error("Failed to prepare job directory: {0}")]
    Workspace(std::io::Error),
}

/// Errors raised by the gscore relay
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Relay is not connected")]
    NotConnected,

    #[error("Gave up after {0} reconnect attempts")]
    GaveUp(u32),
}
