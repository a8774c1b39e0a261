//! Error types for field sampling.

use drift_common::TimeDecodeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while building or sampling fields.
///
/// `OutOfDomain` and `TimeOutOfRange` are per-query and recoverable: the
/// advection kernel decides what happens to the particle. Everything else
/// is fatal for the run or aborts construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Spatial query outside the grid with extrapolation disabled.
    #[error("{field} sampled outside the spatial domain at ({x}, {y}, {z})")]
    OutOfDomain { field: String, x: f64, y: f64, z: f64 },

    /// Temporal query outside the series under the `error` boundary policy.
    #[error(
        "{field} sampled at time {time} outside [{start}, {end}]; \
         choose a boundary policy that allows time extrapolation"
    )]
    TimeOutOfRange {
        field: String,
        time: f64,
        start: f64,
        end: f64,
    },

    /// I/O or decode failure reading a snapshot. Not retried.
    #[error("failed to load snapshot {index} of {field}: {reason}")]
    SnapshotLoad {
        field: String,
        index: usize,
        reason: String,
    },

    /// Time units/calendar cannot be decoded without an explicit override.
    #[error(
        "unsupported calendar '{calendar}' for units '{units}': supply an explicit timestamp array"
    )]
    UnsupportedCalendar { calendar: String, units: String },

    /// Any other malformed time axis (bad units, non-monotonic, empty).
    #[error("invalid time axis: {0}")]
    InvalidTimeAxis(String),

    /// Fields sharing a role cannot be put on one time scale.
    #[error("inconsistent field axes: {0}")]
    InconsistentFieldAxes(String),

    /// Coordinate arrays that do not describe a usable grid.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// No field registered under this name.
    #[error("field not found: {0}")]
    FieldNotFound(String),
}

/// Status codes reported back to the advection kernel for a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0,
    Repeat = 1,
    Delete = 2,
    Error = 3,
    ErrorOutOfBounds = 4,
    ErrorTimeExtrapolation = 5,
}

impl FieldError {
    /// Create an OutOfDomain error.
    pub fn out_of_domain(field: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self::OutOfDomain {
            field: field.into(),
            x,
            y,
            z,
        }
    }

    /// Create a TimeOutOfRange error.
    pub fn time_out_of_range(field: impl Into<String>, time: f64, start: f64, end: f64) -> Self {
        Self::TimeOutOfRange {
            field: field.into(),
            time,
            start,
            end,
        }
    }

    /// Create a SnapshotLoad error.
    pub fn snapshot_load(field: impl Into<String>, index: usize, reason: impl ToString) -> Self {
        Self::SnapshotLoad {
            field: field.into(),
            index,
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidGrid error.
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an InconsistentFieldAxes error.
    pub fn inconsistent_axes(msg: impl Into<String>) -> Self {
        Self::InconsistentFieldAxes(msg.into())
    }

    /// Kernel status code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::OutOfDomain { .. } => ErrorCode::ErrorOutOfBounds,
            Self::TimeOutOfRange { .. } => ErrorCode::ErrorTimeExtrapolation,
            _ => ErrorCode::Error,
        }
    }

    /// Whether the caller can handle this per particle and keep running.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfDomain { .. } | Self::TimeOutOfRange { .. })
    }
}

impl From<TimeDecodeError> for FieldError {
    fn from(err: TimeDecodeError) -> Self {
        match err {
            TimeDecodeError::UnsupportedCalendar { calendar, units } => {
                Self::UnsupportedCalendar { calendar, units }
            }
            other => Self::InvalidTimeAxis(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for FieldError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Result type for field operations.
pub type Result<T> = std::result::Result<T, FieldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            FieldError::out_of_domain("U", -1.0, 0.0, 0.0).error_code(),
            ErrorCode::ErrorOutOfBounds
        );
        assert_eq!(
            FieldError::time_out_of_range("U", 11.0, 0.0, 10.0).error_code(),
            ErrorCode::ErrorTimeExtrapolation
        );
        assert_eq!(
            FieldError::snapshot_load("U", 3, "truncated file").error_code(),
            ErrorCode::Error
        );
        assert_eq!(ErrorCode::ErrorTimeExtrapolation as u8, 5);
    }

    #[test]
    fn test_error_code_serialization() {
        let code = FieldError::out_of_domain("U", -1.0, 0.0, 0.0).error_code();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, r#""error_out_of_bounds""#);
        let parsed: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, code);
    }

    #[test]
    fn test_recoverable() {
        assert!(FieldError::out_of_domain("U", 0.0, 0.0, 0.0).is_recoverable());
        assert!(!FieldError::inconsistent_axes("U/V").is_recoverable());
        assert!(!FieldError::snapshot_load("U", 0, "eof").is_recoverable());
    }

    #[test]
    fn test_calendar_error_conversion() {
        let err: FieldError = TimeDecodeError::unsupported_calendar("standard", "months since 1955-01-01").into();
        assert!(matches!(err, FieldError::UnsupportedCalendar { .. }));

        let err: FieldError = TimeDecodeError::Empty.into();
        assert!(matches!(err, FieldError::InvalidTimeAxis(_)));
    }

    #[test]
    fn test_messages() {
        let err = FieldError::time_out_of_range("V", 12.0, 0.0, 10.0);
        assert!(err.to_string().contains("boundary policy"));
        let err = FieldError::out_of_domain("U", -1.0, 5.0, 0.0);
        assert_eq!(err.to_string(), "U sampled outside the spatial domain at (-1, 5, 0)");
    }
}
