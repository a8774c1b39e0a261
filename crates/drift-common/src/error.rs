//! Error types for time-axis decoding.

use thiserror::Error;

/// Result type alias using TimeDecodeError.
pub type TimeResult<T> = Result<T, TimeDecodeError>;

/// Failures raised while turning a raw time description into a numeric axis.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimeDecodeError {
    /// The calendar/units combination cannot be decoded unambiguously.
    #[error(
        "unsupported calendar '{calendar}' for units '{units}': supply an explicit timestamp array"
    )]
    UnsupportedCalendar { calendar: String, units: String },

    #[error("invalid time units: {0}")]
    InvalidUnits(String),

    #[error("time axis is not strictly increasing at index {index} ({previous} >= {next})")]
    NonMonotonic {
        index: usize,
        previous: f64,
        next: f64,
    },

    #[error("time axis value {value} at index {index} is not finite")]
    NonFinite { index: usize, value: f64 },

    #[error("time axis is empty")]
    Empty,
}

impl TimeDecodeError {
    pub fn unsupported_calendar(calendar: impl Into<String>, units: impl Into<String>) -> Self {
        Self::UnsupportedCalendar {
            calendar: calendar.into(),
            units: units.into(),
        }
    }

    pub fn invalid_units(msg: impl Into<String>) -> Self {
        Self::InvalidUnits(msg.into())
    }
}
