//! PCM error types
//!
//! `DriverError` is what a sound driver reports (an errno plus text).
//! `PcmError` is what the stream manager hands to its callers, with the
//! device name attached wherever the driver was involved.

use std::fmt;

use thiserror::Error;

use super::types::Direction;

/// Failure reported by a sound driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    /// Positive errno value
    pub errno: i32,
    pub message: String,
}

impl DriverError {
    pub fn new(errno: i32, message: impl Into<String>) -> Self {
        Self {
            errno: errno.abs(),
            message: message.into(),
        }
    }

    /// Buffer overrun (capture) or underrun (playback).
    pub fn is_xrun(&self) -> bool {
        self.errno == libc::EPIPE
    }

    /// Non-blocking handle with nothing to transfer right now.
    pub fn would_block(&self) -> bool {
        self.errno == libc::EAGAIN
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.message, self.errno)
    }
}

impl std::error::Error for DriverError {}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors returned by `PcmStream` and `PcmWorker`.
#[derive(Debug, Clone, Error)]
pub enum PcmError {
    /// Malformed direction, mode, format or parameter value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The driver rejected a parameter combination
    #[error("cannot configure PCM device '{device}': {message}")]
    Configuration { device: String, message: String },

    /// Unexpected driver failure
    #[error("PCM device '{device}': {message}")]
    Device { device: String, message: String },

    #[error("cannot {op} a {direction} PCM")]
    Direction { op: &'static str, direction: Direction },

    #[error("data size {len} is not a multiple of the frame size {frame_size}")]
    Alignment { len: usize, frame_size: usize },

    /// Operation on a closed stream
    #[error("PCM device '{device}' is closed")]
    InvalidState { device: String },
}

impl PcmError {
    pub(crate) fn device(device: &str, err: DriverError) -> Self {
        Self::Device {
            device: device.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn configuration(device: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            device: device.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PcmError>;
