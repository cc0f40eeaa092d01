//! Error types shared across the supervisor.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all supervision failure modes.
///
/// Only [`AppError::Config`] is ever fatal, and only to host startup. Every
/// other variant is isolated to the single worker it concerns.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or discovery failure.
    Config(String),
    /// A worker could not be constructed (missing executable, bad log path).
    Construction(String),
    /// The worker log file could not be opened for writing.
    LogOpen(String),
    /// The worker executable could not be launched.
    Spawn(String),
    /// The out-of-band terminate message could not be delivered.
    Signal(String),
    /// The process priority class could not be applied.
    Priority(String),
    /// The requested transition is not valid from the current worker state.
    InvalidState(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Construction(msg) => write!(f, "construction: {msg}"),
            Self::LogOpen(msg) => write!(f, "log open: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Signal(msg) => write!(f, "signal: {msg}"),
            Self::Priority(msg) => write!(f, "priority: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
