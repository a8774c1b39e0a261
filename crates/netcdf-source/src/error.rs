//! Error types for NetCDF-backed fields.

use drift_common::TimeDecodeError;
use field_engine::FieldError;
use thiserror::Error;

/// Result type for NetCDF source operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for reading NetCDF field data.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing required variable, dimension or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Error reported by libnetcdf
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    /// Time variable that cannot be normalized
    #[error(transparent)]
    Time(#[from] TimeDecodeError),

    /// Grid or field construction rejected the file contents
    #[error(transparent)]
    Field(#[from] FieldError),
}

impl NetCdfError {
    /// Error for a required variable that is absent from `path`.
    pub fn missing_variable(name: &str, path: impl std::fmt::Display) -> Self {
        Self::MissingData(format!("variable '{}' in {}", name, path))
    }
}

impl From<NetCdfError> for FieldError {
    fn from(err: NetCdfError) -> Self {
        match err {
            NetCdfError::Field(e) => e,
            NetCdfError::Time(e) => e.into(),
            NetCdfError::InvalidFormat(msg) | NetCdfError::MissingData(msg) => {
                FieldError::invalid_grid(msg)
            }
            other => FieldError::invalid_config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_errors_keep_their_kind() {
        let err = NetCdfError::from(TimeDecodeError::unsupported_calendar("julian", "days since 1900-01-01"));
        assert!(matches!(
            FieldError::from(err),
            FieldError::UnsupportedCalendar { .. }
        ));
    }

    #[test]
    fn test_missing_variable_message() {
        let err = NetCdfError::missing_variable("uo", "a.nc");
        assert_eq!(err.to_string(), "Missing required data: variable 'uo' in a.nc");
        assert!(matches!(FieldError::from(err), FieldError::InvalidGrid(_)));
    }
}
