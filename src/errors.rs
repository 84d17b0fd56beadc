// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the monitoring station

use thiserror::Error;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Camera-related errors
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    /// IR illuminator errors
    #[error("Illuminator error: {0}")]
    Illuminator(#[from] IlluminatorError),
    /// Temperature/humidity sensor errors
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
    /// Video assembly errors
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),
    /// Timelapse controller errors
    #[error("Timelapse error: {0}")]
    Controller(#[from] ControllerError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
    /// Storage/filesystem errors
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Camera-specific errors
#[derive(Debug, Error)]
pub enum CameraError {
    /// The capture command could not be started
    #[error("Failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The capture command ran but reported failure
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    /// Exposure metadata could not be read back after metering
    #[error("Invalid exposure metadata: {0}")]
    InvalidMetadata(String),
    /// Generic capture failure
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
}

/// IR illuminator errors
#[derive(Debug, Error)]
pub enum IlluminatorError {
    /// An output line could not be configured or driven
    #[error("GPIO line {line}: {source}")]
    Line {
        line: u32,
        #[source]
        source: std::io::Error,
    },
    /// The GPIO controller could not be opened
    #[error("GPIO unavailable: {0}")]
    Gpio(String),
    /// IR was requested but no illuminator hardware is attached
    #[error("No illuminator available")]
    Unavailable,
}

/// Temperature/humidity sensor errors
#[derive(Debug, Error)]
pub enum SensorError {
    /// Bus open/transfer failure
    #[error("I2C transfer failed: {0}")]
    Bus(#[from] std::io::Error),
    /// The sensor kept reporting busy past the ceiling
    #[error("Sensor busy for more than {0:?}")]
    Timeout(std::time::Duration),
    /// Calibration bit not set after initialization
    #[error("Sensor calibration failed")]
    Calibration,
}

/// Video assembly errors
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The encoder process could not be started
    #[error("Failed to launch encoder {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The encoder exited unsuccessfully
    #[error("Encoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    /// The finished movie could not be moved into place
    #[error("Failed to promote movie: {0}")]
    Promote(#[source] std::io::Error),
    /// Encoder task panicked or was cancelled
    #[error("Encoder task aborted: {0}")]
    Aborted(String),
}

/// Timelapse controller errors
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The request conflicts with an active run
    #[error("Not available: a timelapse run is in progress")]
    NotAvailable,
    /// The camera failed during a run or preview
    #[error(transparent)]
    Camera(#[from] CameraError),
    /// The illuminator failed during a run or preview
    #[error(transparent)]
    Illuminator(#[from] IlluminatorError),
    /// Staging directory could not be prepared
    #[error("Staging directory: {0}")]
    Staging(#[from] std::io::Error),
    /// Capture worker panicked or was cancelled
    #[error("Capture task aborted: {0}")]
    Aborted(String),
}

impl From<tokio::task::JoinError> for ControllerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ControllerError::Aborted(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EncodeError {
    fn from(err: tokio::task::JoinError) -> Self {
        EncodeError::Aborted(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_error_converts_to_app_error() {
        let err: AppError = ControllerError::NotAvailable.into();
        assert!(matches!(err, AppError::Controller(ControllerError::NotAvailable)));
        assert!(err.to_string().contains("in progress"));
    }

    #[test]
    fn test_camera_error_is_transparent_inside_controller_error() {
        let err: ControllerError = CameraError::CaptureFailed("sensor timeout".into()).into();
        assert_eq!(err.to_string(), "Capture failed: sensor timeout");
    }
}
