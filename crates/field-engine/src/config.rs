//! Configuration for fields and field sets.

use std::path::Path;

use crate::error::{FieldError, Result};
use crate::types::{BoundaryPolicy, InterpolationMethod};
use serde::{Deserialize, Serialize};

/// Per-field sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Spatial interpolation method.
    pub interpolation: InterpolationMethod,

    /// Temporal boundary policy. `None` inherits the field set default.
    pub boundary: Option<BoundaryPolicy>,

    /// Clamp spatial queries outside the grid to the nearest edge cell
    /// instead of failing with `OutOfDomain`.
    pub allow_extrapolation: bool,

    /// Multiplier applied to every sampled value (unit conversion).
    pub scale_factor: f64,

    /// Physical units, informational only.
    pub units: Option<String>,

    /// Values below this are treated as missing.
    pub vmin: Option<f32>,

    /// Values above this are treated as missing.
    pub vmax: Option<f32>,

    /// Returned where every contributing node is missing (land points).
    pub mask_value: f64,

    /// Start loading the next snapshot in the background after a window shift.
    pub prefetch: bool,

    /// Maximum snapshots resident per field (2 or 3).
    pub window_capacity: usize,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            interpolation: InterpolationMethod::Linear,
            boundary: None,
            allow_extrapolation: false,
            scale_factor: 1.0,
            units: None,
            vmin: None,
            vmax: None,
            mask_value: 0.0,
            prefetch: true,
            window_capacity: 3,
        }
    }
}

impl FieldConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FIELD_INTERPOLATION") {
            config.interpolation = InterpolationMethod::from_str(&val);
        }

        if let Ok(val) = std::env::var("FIELD_BOUNDARY_POLICY") {
            let period = std::env::var("FIELD_TIME_PERIOD")
                .ok()
                .and_then(|p| p.parse().ok());
            config.boundary = BoundaryPolicy::from_parts(&val, period);
        }

        if let Ok(val) = std::env::var("FIELD_PREFETCH") {
            config.prefetch = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("FIELD_ALLOW_EXTRAPOLATION") {
            config.allow_extrapolation = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Builder-style setter for the boundary policy.
    pub fn with_boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.boundary = Some(boundary);
        self
    }

    /// Builder-style setter for the interpolation method.
    pub fn with_interpolation(mut self, interpolation: InterpolationMethod) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(2..=3).contains(&self.window_capacity) {
            return Err(format!(
                "window_capacity must be 2 or 3, got {}",
                self.window_capacity
            ));
        }

        if !self.scale_factor.is_finite() {
            return Err("scale_factor must be finite".to_string());
        }

        if let (Some(lo), Some(hi)) = (self.vmin, self.vmax) {
            if lo > hi {
                return Err(format!("vmin {} exceeds vmax {}", lo, hi));
            }
        }

        if let Some(policy) = &self.boundary {
            policy.validate(0.0)?;
        }

        Ok(())
    }
}

/// Configuration shared by all fields of a field set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSetConfig {
    /// Boundary policy for fields that do not set their own.
    pub default_boundary: BoundaryPolicy,

    /// Template for fields built by the set from raw data.
    pub field_defaults: FieldConfig,
}

impl FieldSetConfig {
    /// Load configuration from environment variables.
    ///
    /// `FIELD_BOUNDARY_POLICY` sets the set-wide default rather than a
    /// per-field override here.
    pub fn from_env() -> Self {
        let mut field_defaults = FieldConfig::from_env();
        let default_boundary = field_defaults.boundary.take().unwrap_or_default();
        Self {
            default_boundary,
            field_defaults,
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FieldError::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate().map_err(FieldError::InvalidConfig)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.default_boundary.validate(0.0)?;
        self.field_defaults.validate()
    }
}
