//! Structured error types for wavebind
//!
//! One central enum covering the client's failure taxonomy: contract
//! validation, session state, transient service failures, and the
//! result-assembly failures that are captured rather than propagated.

use std::io;
use thiserror::Error;

use crate::config::{VALID_BIT_DEPTHS, VALID_CHANNELS, VALID_FORMATS, VALID_SAMPLE_RATES};

/// Primary error type for wavebind operations
#[derive(Error, Debug)]
pub enum WavebindError {
    // =========================================================================
    // Contract Validation Errors
    // =========================================================================
    /// Too many parameters declared on a method
    #[error("method cannot declare more than {max} parameters (got {count})")]
    TooManyParameters { count: usize, max: usize },

    /// Parameter name over the length limit
    #[error("parameter name '{name}' exceeds {max} characters")]
    ParameterNameTooLong { name: String, max: usize },

    /// Parameter name declared twice
    #[error("duplicate parameter name '{name}'")]
    DuplicateParameter { name: String },

    /// Declared default disagrees with the declared kind
    #[error("parameter '{name}': default value does not match declared type '{kind}'")]
    DefaultTypeMismatch { name: String, kind: &'static str },

    /// UI annotation names a parameter the method does not declare
    #[error("UI annotation references unknown parameter '{name}'")]
    UnknownUiParameter { name: String },

    /// UI component is missing required fields
    #[error("parameter '{name}': missing required field(s) {missing:?} for UI component '{component}'")]
    MissingUiFields {
        name: String,
        component: &'static str,
        missing: Vec<&'static str>,
    },

    // =========================================================================
    // State Errors
    // =========================================================================
    /// Registration attempted before an account identity was configured
    #[error("master token not set; call set_master_token before registering a method")]
    MasterTokenNotSet,

    /// Master token is not a UUID
    #[error("invalid master token '{token}': must be a valid UUID")]
    InvalidMasterToken { token: String },

    /// Dispatch of a method name that was never registered
    #[error("method not registered: {name}")]
    MethodNotRegistered { name: String },

    /// Announce/dispatch attempted with nothing registered at all
    #[error("no method registered; call register_method first")]
    NoMethodRegistered,

    /// A second invocation was dispatched while one is active
    #[error("an invocation is already running")]
    InvocationInProgress,

    /// Results aggregator used before a connection identity was bound
    #[error("no connection identity bound; register a method first")]
    IdentityUnbound,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Sample rate outside the supported set
    #[error("invalid sample rate '{value}'; valid sample rates are {valid:?}")]
    InvalidSampleRate { value: u32, valid: [u32; 4] },

    /// Bit depth outside the supported set
    #[error("invalid bit depth '{value}'; valid bit depths are {valid:?}")]
    InvalidBitDepth { value: u16, valid: [u16; 2] },

    /// Channel count outside the supported set
    #[error("invalid channel count '{value}'; valid channel counts are {valid:?}")]
    InvalidChannels { value: u16, valid: [u16; 2] },

    /// Audio format outside the supported set
    #[error("invalid audio format '{value}'; valid formats are {valid:?}")]
    InvalidFormat {
        value: String,
        valid: [&'static str; 5],
    },

    // =========================================================================
    // Service Errors
    // =========================================================================
    /// The service answered with an unexpected status
    #[error("{operation} failed with status {status}: {body}")]
    ServiceStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Network-level failure talking to the service
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    // =========================================================================
    // Result Assembly Errors (captured into the result bundle, not raised)
    // =========================================================================
    /// Audio transcoding failed
    #[error("audio conversion failed: {message}")]
    Conversion { message: String },

    /// Storage upload failed
    #[error("upload failed: {message}")]
    Upload { message: String },

    /// Declared file type outside the supported set
    #[error("file type '{file_type}' is not supported")]
    UnsupportedFileType { file_type: String },

    /// File URL could not be parsed
    #[error("invalid file url '{url}'")]
    InvalidFileUrl { url: String },

    /// Hosted asset download failed
    #[error("download failed for '{url}': {message}")]
    Download { url: String, message: String },

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WavebindError {
    /// Check if the error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::ServiceStatus { status, .. } => {
                matches!(*status, 429 | 500 | 502 | 503 | 504)
            }
            Self::Io(io_err) => matches!(
                io_err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    pub fn invalid_sample_rate(value: u32) -> Self {
        Self::InvalidSampleRate {
            value,
            valid: VALID_SAMPLE_RATES,
        }
    }

    pub fn invalid_bit_depth(value: u16) -> Self {
        Self::InvalidBitDepth {
            value,
            valid: VALID_BIT_DEPTHS,
        }
    }

    pub fn invalid_channels(value: u16) -> Self {
        Self::InvalidChannels {
            value,
            valid: VALID_CHANNELS,
        }
    }

    pub fn invalid_format(value: impl Into<String>) -> Self {
        Self::InvalidFormat {
            value: value.into(),
            valid: VALID_FORMATS,
        }
    }
}

/// Result type alias using WavebindError
pub type Result<T> = std::result::Result<T, WavebindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(WavebindError::ServiceStatus {
            operation: "compute-contract creation",
            status: 503,
            body: String::new(),
        }
        .is_retryable());

        assert!(WavebindError::ServiceStatus {
            operation: "compute-contract creation",
            status: 429,
            body: String::new(),
        }
        .is_retryable());

        assert!(!WavebindError::ServiceStatus {
            operation: "connection-mapping creation",
            status: 404,
            body: String::new(),
        }
        .is_retryable());

        assert!(!WavebindError::MasterTokenNotSet.is_retryable());
        assert!(!WavebindError::InvocationInProgress.is_retryable());
    }

    #[test]
    fn test_config_errors_name_value_and_valid_set() {
        let err = WavebindError::invalid_sample_rate(96000);
        let message = err.to_string();
        assert!(message.contains("96000"));
        assert!(message.contains("22050"));
        assert!(message.contains("48000"));

        let err = WavebindError::invalid_format("opus");
        let message = err.to_string();
        assert!(message.contains("opus"));
        assert!(message.contains("wav"));
        assert!(message.contains("flac"));
    }
}
