//! Core types for field sampling.

use serde::{Deserialize, Serialize};

/// Interpolation method used when sampling a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMethod {
    /// Value of the closest node (categorical or masked fields).
    Nearest,
    /// Bilinear in the horizontal, linear across depth levels.
    #[default]
    Linear,
    /// Bilinear in the horizontal, cubic Hermite across depth levels with
    /// slopes weighted by the level spacing.
    CubicDepth,
}

impl InterpolationMethod {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "nearest" => Self::Nearest,
            "cubic" | "cubic_depth" | "cubic-depth" => Self::CubicDepth,
            _ => Self::Linear,
        }
    }
}

impl std::fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Linear => write!(f, "linear"),
            Self::CubicDepth => write!(f, "cubic_depth"),
        }
    }
}

/// Rule for temporal queries outside the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Fail with `TimeOutOfRange`.
    #[default]
    Error,
    /// Hold the first snapshot before the start and the last after the end.
    Clamp,
    /// Hold the last snapshot after the end; fail before the start.
    FreezeAtLast,
    /// Wrap the query into `[t0, t0 + cycle)` before lookup.
    TimePeriodic { cycle: f64 },
}

impl BoundaryPolicy {
    /// Parse a policy name; `time_periodic` needs the cycle length.
    pub fn from_parts(name: &str, cycle: Option<f64>) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "clamp" => Some(Self::Clamp),
            "freeze" | "freeze_at_last" => Some(Self::FreezeAtLast),
            "time_periodic" | "periodic" => cycle.map(|cycle| Self::TimePeriodic { cycle }),
            _ => None,
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, Self::TimePeriodic { .. })
    }

    /// Validate against the span of the time axis it will be applied to.
    pub fn validate(&self, span: f64) -> Result<(), String> {
        if let Self::TimePeriodic { cycle } = self {
            if !cycle.is_finite() || *cycle <= 0.0 {
                return Err(format!("time_periodic cycle must be > 0, got {}", cycle));
            }
            if *cycle < span {
                return Err(format!(
                    "time_periodic cycle {} is shorter than the time axis span {}",
                    cycle, span
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for BoundaryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Clamp => write!(f, "clamp"),
            Self::FreezeAtLast => write!(f, "freeze_at_last"),
            Self::TimePeriodic { cycle } => write!(f, "time_periodic({})", cycle),
        }
    }
}

/// Horizontal metric of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mesh {
    /// Coordinates in degrees on a sphere.
    #[default]
    Spherical,
    /// Cartesian coordinates (metres or model units).
    Flat,
}

impl Mesh {
    /// Mean Earth radius in metres.
    pub const EARTH_RADIUS: f64 = 6.371e6;

    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "flat" => Self::Flat,
            _ => Self::Spherical,
        }
    }

    /// Metres per coordinate unit along x and y at latitude `lat`.
    pub fn metres_per_unit(&self, lat: f64) -> (f64, f64) {
        match self {
            Self::Flat => (1.0, 1.0),
            Self::Spherical => {
                let per_degree = Self::EARTH_RADIUS * std::f64::consts::PI / 180.0;
                (per_degree * lat.to_radians().cos(), per_degree)
            }
        }
    }
}

/// Spatial gradient of a field at a point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Gradient {
    /// dV/dx (per metre on spherical meshes).
    pub dx: f64,
    /// dV/dy (per metre on spherical meshes).
    pub dy: f64,
    /// dV/dz (per depth unit).
    pub dz: f64,
}

impl Gradient {
    pub fn new(dx: f64, dy: f64, dz: f64) -> Self {
        Self { dx, dy, dz }
    }

    /// Linear blend `self + w * (other - self)`.
    pub fn lerp(&self, other: &Gradient, w: f64) -> Self {
        Self {
            dx: self.dx + w * (other.dx - self.dx),
            dy: self.dy + w * (other.dy - self.dy),
            dz: self.dz + w * (other.dz - self.dz),
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.dx * factor, self.dy * factor, self.dz * factor)
    }
}

/// Statistics about a field's snapshot window.
#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    /// Snapshots read from the backing store (including prefetches).
    pub loads: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Loads satisfied by a completed prefetch.
    pub prefetch_hits: u64,
    /// Snapshots resident right now.
    pub resident: usize,
    pub memory_bytes: u64,
}

impl WindowStats {
    /// Calculate the window hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
