//! Rectilinear meshes: independent 1-D x and y axes.

use drift_common::BoundingBox;
use nalgebra::Matrix2;

use super::{bracket, check_monotonic, HorizontalHit};
use crate::error::{FieldError, Result};

/// Mesh described by a longitude/x axis and a latitude/y axis.
#[derive(Debug, Clone)]
pub struct RectilinearMesh {
    lon: Vec<f64>,
    lat: Vec<f64>,
    periodic: Option<f64>,
}

impl RectilinearMesh {
    pub fn new(lon: Vec<f64>, lat: Vec<f64>, periodic: Option<f64>) -> Result<Self> {
        if lon.len() < 2 || lat.len() < 2 {
            return Err(FieldError::invalid_grid(format!(
                "rectilinear grid needs at least 2x2 nodes, got {}x{}",
                lon.len(),
                lat.len()
            )));
        }
        check_monotonic("lon", &lon)?;
        check_monotonic("lat", &lat)?;

        let mut mesh = Self {
            lon,
            lat,
            periodic: None,
        };
        if let Some(span) = periodic {
            mesh.set_periodic(span)?;
        }
        Ok(mesh)
    }

    pub(crate) fn set_periodic(&mut self, span: f64) -> Result<()> {
        let n = self.lon.len();
        if self.lon[n - 1] < self.lon[0] {
            return Err(FieldError::invalid_grid(
                "periodic x axis must be ascending",
            ));
        }
        let extent = self.lon[n - 1] - self.lon[0];
        if !span.is_finite() || span < extent || span <= 0.0 {
            return Err(FieldError::invalid_grid(format!(
                "periodic span {} is smaller than the x extent {}",
                span, extent
            )));
        }
        self.periodic = Some(span);
        Ok(())
    }

    /// Node shape `(ny, nx)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub(crate) fn locate(&self, x: f64, y: f64, allow_extrapolation: bool) -> Option<HorizontalHit> {
        let (i, i_next, xsi) = self.locate_x(x, allow_extrapolation)?;
        let (j, j_next, eta) = bracket(&self.lat, y, allow_extrapolation)?;
        Some(HorizontalHit {
            i,
            i_next,
            j,
            j_next,
            xsi,
            eta,
        })
    }

    fn locate_x(&self, x: f64, allow_extrapolation: bool) -> Option<(usize, usize, f64)> {
        let Some(span) = self.periodic else {
            return bracket(&self.lon, x, allow_extrapolation);
        };

        let n = self.lon.len();
        let x0 = self.lon[0];
        let wrapped = x0 + (x - x0).rem_euclid(span);
        let last = self.lon[n - 1];
        if wrapped > last {
            // wrap cell between the last column and the first one shifted by span
            let width = x0 + span - last;
            let xsi = ((wrapped - last) / width).clamp(0.0, 1.0);
            return Some((n - 1, 0, xsi));
        }
        bracket(&self.lon, wrapped, true)
    }

    /// Jacobian in coordinate units and the latitude of the point.
    pub(crate) fn jacobian(&self, hit: &HorizontalHit) -> (Matrix2<f64>, f64) {
        let dx = if hit.i_next < hit.i {
            self.lon[hit.i_next] + self.periodic.unwrap_or(0.0) - self.lon[hit.i]
        } else {
            self.lon[hit.i_next] - self.lon[hit.i]
        };
        let dy = self.lat[hit.j_next] - self.lat[hit.j];
        let lat = self.lat[hit.j] + hit.eta * dy;
        (Matrix2::new(dx, 0.0, 0.0, dy), lat)
    }

    pub fn bbox(&self) -> BoundingBox {
        let n = self.lon.len();
        let (min_x, max_x) = match self.periodic {
            Some(span) => (self.lon[0], self.lon[0] + span),
            None => (self.lon[0].min(self.lon[n - 1]), self.lon[0].max(self.lon[n - 1])),
        };
        let m = self.lat.len();
        let min_y = self.lat[0].min(self.lat[m - 1]);
        let max_y = self.lat[0].max(self.lat[m - 1]);
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }
}
