//! Common test fixtures for drift tests.
//!
//! This module provides pre-defined axes and time encodings that represent
//! common scenarios in ocean model output.

/// Common grid extents for testing.
pub mod grid {
    use crate::generators::axis;

    /// Global 1 degree grid, zonally periodic.
    pub const GLOBAL_1DEG: GridSpec = GridSpec {
        width: 360,
        height: 181,
        min_lon: 0.0,
        min_lat: -90.0,
        resolution: 1.0,
    };

    /// Small 11x11 unit-spaced box starting at the origin.
    pub const UNIT_BOX: GridSpec = GridSpec {
        width: 11,
        height: 11,
        min_lon: 0.0,
        min_lat: 0.0,
        resolution: 1.0,
    };

    /// Regional Mediterranean-like grid at 0.5 degrees.
    pub const REGIONAL: GridSpec = GridSpec {
        width: 81,
        height: 31,
        min_lon: -6.0,
        min_lat: 30.0,
        resolution: 0.5,
    };

    /// Regular lon/lat grid extent for testing.
    #[derive(Debug, Clone, Copy)]
    pub struct GridSpec {
        pub width: usize,
        pub height: usize,
        pub min_lon: f64,
        pub min_lat: f64,
        pub resolution: f64,
    }

    impl GridSpec {
        /// Returns the number of nodes per level.
        pub fn size(&self) -> usize {
            self.width * self.height
        }

        pub fn lon(&self) -> Vec<f64> {
            axis(self.min_lon, self.resolution, self.width)
        }

        pub fn lat(&self) -> Vec<f64> {
            axis(self.min_lat, self.resolution, self.height)
        }

        /// Zonal period if the grid wraps around the globe.
        pub fn zonal_span(&self) -> Option<f64> {
            let span = self.width as f64 * self.resolution;
            ((span - 360.0).abs() < 1e-9).then_some(span)
        }

        /// Returns the bounding box as (min_lon, min_lat, max_lon, max_lat).
        pub fn bbox(&self) -> (f64, f64, f64, f64) {
            (
                self.min_lon,
                self.min_lat,
                self.min_lon + self.resolution * (self.width - 1) as f64,
                self.min_lat + self.resolution * (self.height - 1) as f64,
            )
        }
    }
}

/// Common CF time encodings for testing.
pub mod time {
    /// Hours since 2000-01-01 on the standard calendar
    pub const HOURS_SINCE_2000: &str = "hours since 2000-01-01 00:00:00";

    /// Days since 1950-01-01, the usual ocean reanalysis origin
    pub const DAYS_SINCE_1950: &str = "days since 1950-01-01";

    /// Months have no fixed length and cannot be normalized
    pub const MONTHS_SINCE_1955: &str = "months since 1955-01-01";

    /// Climatology-style calendars
    pub const NOLEAP: &str = "noleap";
    pub const DAYS_360: &str = "360_day";
    pub const STANDARD: &str = "standard";

    /// One day in seconds
    pub const DAY: f64 = 86_400.0;

    /// One hour in seconds
    pub const HOUR: f64 = 3_600.0;
}

/// Common field names for testing.
pub mod fields {
    pub const U: &str = "U";
    pub const V: &str = "V";
    pub const W: &str = "W";
    pub const TEMPERATURE: &str = "T";
    pub const SALINITY: &str = "S";
}

/// Common depth axes in metres.
pub mod depth {
    /// Five levels with increasing thickness
    pub const LEVELS: [f64; 5] = [0.0, 10.0, 30.0, 70.0, 150.0];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_spec_size() {
        assert_eq!(grid::GLOBAL_1DEG.size(), 360 * 181);
        assert_eq!(grid::UNIT_BOX.size(), 121);
    }

    #[test]
    fn test_grid_spec_axes() {
        let lon = grid::UNIT_BOX.lon();
        assert_eq!(lon.len(), 11);
        assert_eq!(lon[10], 10.0);
        assert_eq!(grid::UNIT_BOX.bbox(), (0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_zonal_span() {
        assert_eq!(grid::GLOBAL_1DEG.zonal_span(), Some(360.0));
        assert_eq!(grid::REGIONAL.zonal_span(), None);
    }
}
