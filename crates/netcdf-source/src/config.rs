//! Configuration for NetCDF-backed fields.

use std::ops::Range;
use std::path::{Path, PathBuf};

use field_engine::Mesh;
use serde::{Deserialize, Serialize};

use crate::error::{NetCdfError, NetCdfResult};

/// Names of the coordinate variables/dimensions in the files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionNames {
    pub lon: String,
    pub lat: String,
    /// Depth coordinate. `None` for surface-only data.
    pub depth: Option<String>,
    /// Time coordinate. `None` for a time-invariant variable.
    pub time: Option<String>,
}

impl Default for DimensionNames {
    fn default() -> Self {
        Self {
            lon: "lon".to_string(),
            lat: "lat".to_string(),
            depth: Some("depth".to_string()),
            time: Some("time".to_string()),
        }
    }
}

/// Index ranges selecting a sub-region of the stored grid.
///
/// For curvilinear grids `lon` and `lat` index the `x` and `y` dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSubset {
    pub lon: Option<Range<usize>>,
    pub lat: Option<Range<usize>>,
    pub depth: Option<Range<usize>>,
}

impl IndexSubset {
    pub fn is_empty(&self) -> bool {
        self.lon.is_none() && self.lat.is_none() && self.depth.is_none()
    }
}

/// Where and how to read one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Files in time order. Each becomes one backing handle.
    pub files: Vec<PathBuf>,

    /// Data variable to read, e.g. `uo`.
    pub variable: String,

    /// Coordinate name mapping.
    pub dimensions: DimensionNames,

    /// Explicit timestamps in seconds, replacing the files' time variables.
    /// Required when the stored calendar cannot be normalized.
    pub timestamps: Option<Vec<f64>>,

    /// Optional spatial subsetting.
    pub indices: IndexSubset,

    /// Horizontal metric of the coordinates.
    pub mesh: Mesh,

    /// Span of a periodic x axis (360 for global longitudes).
    pub periodic_x: Option<f64>,

    /// Raw value treated as missing, overriding `_FillValue`/`missing_value`.
    pub fill_value: Option<f64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            variable: String::new(),
            dimensions: DimensionNames::default(),
            timestamps: None,
            indices: IndexSubset::default(),
            mesh: Mesh::Spherical,
            periodic_x: None,
            fill_value: None,
        }
    }
}

impl SourceConfig {
    /// Configuration for `variable` stored in `files`, with default names.
    pub fn new(variable: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            files,
            variable: variable.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> NetCdfResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| NetCdfError::InvalidFormat(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_dimensions(mut self, dimensions: DimensionNames) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_timestamps(mut self, timestamps: Vec<f64>) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    pub fn with_indices(mut self, indices: IndexSubset) -> Self {
        self.indices = indices;
        self
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = mesh;
        self
    }

    pub fn with_periodic_x(mut self, span: f64) -> Self {
        self.periodic_x = Some(span);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> NetCdfResult<()> {
        if self.files.is_empty() {
            return Err(NetCdfError::MissingData("no input files configured".to_string()));
        }
        if self.variable.is_empty() {
            return Err(NetCdfError::MissingData("no data variable configured".to_string()));
        }
        for (axis, range) in [
            ("lon", &self.indices.lon),
            ("lat", &self.indices.lat),
            ("depth", &self.indices.depth),
        ] {
            if let Some(range) = range {
                if range.is_empty() {
                    return Err(NetCdfError::InvalidFormat(format!(
                        "empty {} index range {:?}",
                        axis, range
                    )));
                }
            }
        }
        if let Some(span) = self.periodic_x {
            if !(span.is_finite() && span > 0.0) {
                return Err(NetCdfError::InvalidFormat(format!(
                    "periodic_x span must be positive, got {}",
                    span
                )));
            }
        }
        Ok(())
    }
}
