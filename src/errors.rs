use thiserror::Error;

/// Failure classes surfaced by the rangefinder core.
///
/// Every variant is recovered locally: the session is torn down to a closed
/// or ready state and the triggering user action can simply be retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangefinderError {
    #[error("Permission denied error: {0}")]
    PermissionDenied(String),
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Session busy: {0}")]
    SessionBusy(String),
    #[error("Session configuration failed: {0}")]
    ConfigurationFailed(String),
    #[error("Capture error: {0}")]
    CaptureFailed(String),
    #[error("Encoding error: {0}")]
    EncodeFailed(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Discriminant of [`RangefinderError`] without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    SessionBusy,
    ConfigurationFailed,
    CaptureFailed,
    EncodeFailed,
    StorageError,
    ConfigError,
}

impl RangefinderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Self::SessionBusy(_) => ErrorKind::SessionBusy,
            Self::ConfigurationFailed(_) => ErrorKind::ConfigurationFailed,
            Self::CaptureFailed(_) => ErrorKind::CaptureFailed,
            Self::EncodeFailed(_) => ErrorKind::EncodeFailed,
            Self::StorageError(_) => ErrorKind::StorageError,
            Self::ConfigError(_) => ErrorKind::ConfigError,
        }
    }

    /// The detail string carried by the variant.
    pub fn detail(&self) -> &str {
        match self {
            Self::PermissionDenied(msg)
            | Self::DeviceUnavailable(msg)
            | Self::SessionBusy(msg)
            | Self::ConfigurationFailed(msg)
            | Self::CaptureFailed(msg)
            | Self::EncodeFailed(msg)
            | Self::StorageError(msg)
            | Self::ConfigError(msg) => msg,
        }
    }

    /// Short text shown to the user for this failure class.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied(_) => "No camera permission granted".to_string(),
            Self::DeviceUnavailable(msg) => msg.clone(),
            Self::SessionBusy(_) => "Camera is busy".to_string(),
            Self::ConfigurationFailed(_) => "Couldn't configure camera view".to_string(),
            Self::CaptureFailed(msg) => msg.clone(),
            Self::EncodeFailed(msg) => format!("Error saving image: {}", msg),
            Self::StorageError(msg) => format!("Error saving image: {}", msg),
            Self::ConfigError(msg) => format!("Invalid configuration: {}", msg),
        }
    }
}

impl From<image::ImageError> for RangefinderError {
    fn from(err: image::ImageError) -> Self {
        RangefinderError::EncodeFailed(err.to_string())
    }
}
