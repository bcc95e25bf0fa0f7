use thiserror::Error;

/// Main error type for the Spectral-Pulse library
#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Audio loading and analysis errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },
}

/// Capture source errors, surfaced to the caller of `attach_source`
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No capture device available")]
    NoDevice,

    #[error("Permission to open the capture device was denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Unsupported capture configuration: {details}")]
    Unsupported { details: String },

    #[error("Capture stream failed: {reason}")]
    Stream { reason: String },

    #[error("Capture source is already running")]
    AlreadyRunning,
}

/// Optional analyzer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Analyzer {name} failed to load from {source_name}: {reason}")]
    LoadFailed {
        name: String,
        source_name: String,
        reason: String,
    },

    #[error("Analyzer {name} is unavailable for this session")]
    Unavailable { name: String },

    #[error("Analysis job {job_id} failed: {reason}")]
    JobFailed { job_id: u64, reason: String },

    #[error("Analysis worker disconnected")]
    WorkerDisconnected,

    #[error("Calibration cancelled")]
    Cancelled,
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using PulseError
pub type Result<T> = std::result::Result<T, PulseError>;

impl PulseError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Audio(AudioError::LoadFailed { .. }) => true,
            // A device may appear or be unlocked later
            Self::Capture(CaptureError::NoDevice) => true,
            Self::Capture(CaptureError::Stream { .. }) => true,
            Self::Analyzer(AnalyzerError::JobFailed { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Audio(AudioError::LoadFailed { path }) => {
                format!("Could not load audio file '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Capture(CaptureError::PermissionDenied { .. }) => {
                "Microphone access was denied. Grant input permission and try again.".to_string()
            }
            Self::Capture(CaptureError::NoDevice) => {
                "No audio input device was found.".to_string()
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(PulseError::from(CaptureError::NoDevice).is_recoverable());
        assert!(!PulseError::from(CaptureError::PermissionDenied {
            reason: "denied".into()
        })
        .is_recoverable());
        assert!(!PulseError::generic("boom").is_recoverable());
    }

    #[test]
    fn test_user_message_for_denied_capture() {
        let err = PulseError::from(CaptureError::PermissionDenied {
            reason: "os".into(),
        });
        assert!(err.user_message().contains("denied"));
    }
}
