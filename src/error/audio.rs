// Audio error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// These constants provide a single source of truth for error codes
/// shared with any embedding application.
///
/// Error code range: 1001-1007
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// No audio input device is available
    pub const NO_INPUT_DEVICE: i32 = 1001;

    /// The device offers no usable sample format
    pub const UNSUPPORTED_FORMAT: i32 = 1002;

    /// Failed to open the audio stream
    pub const STREAM_OPEN_FAILED: i32 = 1003;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1004;

    /// Pipeline is already running
    pub const ALREADY_RUNNING: i32 = 1005;

    /// Pipeline is not running
    pub const NOT_RUNNING: i32 = 1006;

    /// Mutex was poisoned
    pub const LOCK_POISONED: i32 = 1007;
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover device discovery, stream management, and pipeline
/// lifecycle operations.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// No audio input device is available
    NoInputDevice,

    /// The device offers no usable sample format
    UnsupportedFormat { details: String },

    /// Failed to open the audio stream
    StreamOpenFailed { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Pipeline is already running
    AlreadyRunning,

    /// Pipeline is not running
    NotRunning,

    /// Mutex was poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::NoInputDevice => AudioErrorCodes::NO_INPUT_DEVICE,
            AudioError::UnsupportedFormat { .. } => AudioErrorCodes::UNSUPPORTED_FORMAT,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::NotRunning => AudioErrorCodes::NOT_RUNNING,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::NoInputDevice => {
                "No audio input device available. Connect a microphone.".to_string()
            }
            AudioError::UnsupportedFormat { details } => {
                format!("No usable input format: {}", details)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::AlreadyRunning => {
                "Pipeline already running. Call stop() first.".to_string()
            }
            AudioError::NotRunning => "Pipeline not running. Call start() first.".to_string(),
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}
