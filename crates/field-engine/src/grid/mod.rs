//! Spatial grids and cell location.
//!
//! A [`Grid`] pairs a horizontal mesh (rectilinear or curvilinear) with an
//! optional depth axis and the normalized time axis of the data laid out on
//! it. Grids are immutable once built and shared between fields as
//! `Arc<Grid>`.
//!
//! Node data is stored `[k][j][i]` (depth, y, x), row-major.

mod curvilinear;
mod rectilinear;

pub use curvilinear::CurvilinearMesh;
pub use rectilinear::RectilinearMesh;

use drift_common::{DomainBounds, TimeAxis};
use nalgebra::Matrix2;
use tracing::debug;

use crate::error::{FieldError, Result};
use crate::types::Mesh;

/// Horizontal coordinates used to build a grid.
#[derive(Debug, Clone)]
pub enum Coordinates {
    /// 1-D longitude/x and latitude/y axes, each strictly monotonic.
    Rectilinear { lon: Vec<f64>, lat: Vec<f64> },
    /// 2-D coordinate arrays of shape `[ny][nx]`, row-major.
    Curvilinear {
        lon: Vec<f64>,
        lat: Vec<f64>,
        nx: usize,
        ny: usize,
    },
}

/// Vertical layout of a grid.
#[derive(Debug, Clone, PartialEq)]
pub enum DepthAxis {
    /// Single layer; the z coordinate of a query is ignored.
    Surface,
    /// Depth levels shared by every horizontal node.
    Levels(Vec<f64>),
    /// Per-node depth columns of shape `[nz][ny][nx]` (terrain-following or
    /// partial-cell bathymetry).
    Columns { nz: usize, depths: Vec<f64> },
}

impl DepthAxis {
    /// Number of depth levels.
    pub fn len(&self) -> usize {
        match self {
            Self::Surface => 1,
            Self::Levels(levels) => levels.len(),
            Self::Columns { nz, .. } => *nz,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A located cell: bracketing node indices and the fractional position of
/// the query inside the cell along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRef {
    pub i: usize,
    pub i_next: usize,
    pub j: usize,
    pub j_next: usize,
    pub xsi: f64,
    pub eta: f64,
    pub k: usize,
    pub k_next: usize,
    pub zeta: f64,
}

impl CellRef {
    /// The four horizontal corners `(i, j, weight)` with bilinear weights,
    /// counter-clockwise from `(i, j)`.
    pub fn corners(&self) -> [(usize, usize, f64); 4] {
        let (xsi, eta) = (self.xsi, self.eta);
        [
            (self.i, self.j, (1.0 - xsi) * (1.0 - eta)),
            (self.i_next, self.j, xsi * (1.0 - eta)),
            (self.i_next, self.j_next, xsi * eta),
            (self.i, self.j_next, (1.0 - xsi) * eta),
        ]
    }

    /// Closest node `(k, j, i)` in index space.
    pub fn nearest_node(&self) -> (usize, usize, usize) {
        let i = if self.xsi < 0.5 { self.i } else { self.i_next };
        let j = if self.eta < 0.5 { self.j } else { self.j_next };
        let k = if self.zeta < 0.5 { self.k } else { self.k_next };
        (k, j, i)
    }
}

/// Last cell returned by [`Grid::locate`] for a field; seeds the next
/// search on curvilinear grids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocateSeed {
    cell: Option<(usize, usize)>,
}

impl LocateSeed {
    pub fn cell(&self) -> Option<(usize, usize)> {
        self.cell
    }

    pub(crate) fn set(&mut self, i: usize, j: usize) {
        self.cell = Some((i, j));
    }
}

/// Horizontal part of a located cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HorizontalHit {
    pub i: usize,
    pub i_next: usize,
    pub j: usize,
    pub j_next: usize,
    pub xsi: f64,
    pub eta: f64,
}

#[derive(Debug)]
enum Horizontal {
    Rectilinear(RectilinearMesh),
    Curvilinear(CurvilinearMesh),
}

/// Spatial mesh plus time axis.
#[derive(Debug)]
pub struct Grid {
    horizontal: Horizontal,
    depth: DepthAxis,
    time: TimeAxis,
    mesh: Mesh,
    periodic_x: Option<f64>,
    bounds: DomainBounds,
}

impl Grid {
    /// Build a grid on a spherical mesh without periodicity.
    pub fn new(coords: Coordinates, depth: DepthAxis, time: TimeAxis) -> Result<Self> {
        let horizontal = match coords {
            Coordinates::Rectilinear { lon, lat } => {
                Horizontal::Rectilinear(RectilinearMesh::new(lon, lat, None)?)
            }
            Coordinates::Curvilinear { lon, lat, nx, ny } => {
                Horizontal::Curvilinear(CurvilinearMesh::new(lon, lat, nx, ny, None)?)
            }
        };
        let (ny, nx) = match &horizontal {
            Horizontal::Rectilinear(m) => m.shape(),
            Horizontal::Curvilinear(m) => m.shape(),
        };
        let depth = normalize_depth(depth, ny * nx)?;

        let bounds = compute_bounds(&horizontal, &depth, None);
        let grid = Self {
            horizontal,
            depth,
            time,
            mesh: Mesh::default(),
            periodic_x: None,
            bounds,
        };

        debug!(
            nx = nx,
            ny = ny,
            nz = grid.depth.len(),
            times = grid.time.len(),
            curvilinear = grid.is_curvilinear(),
            "Built grid"
        );
        Ok(grid)
    }

    /// Rectilinear surface grid; shorthand used by in-memory fields.
    pub fn rectilinear(lon: Vec<f64>, lat: Vec<f64>, time: TimeAxis) -> Result<Self> {
        Self::new(Coordinates::Rectilinear { lon, lat }, DepthAxis::Surface, time)
    }

    /// Set the horizontal metric.
    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = mesh;
        self
    }

    /// Make the x axis periodic with the given span (e.g. 360 for a
    /// global longitude wrap). The last node column connects back to the
    /// first through a wrap cell.
    pub fn with_periodic_x(mut self, span: f64) -> Result<Self> {
        match &mut self.horizontal {
            Horizontal::Rectilinear(m) => m.set_periodic(span)?,
            Horizontal::Curvilinear(m) => m.set_periodic(span)?,
        }
        self.periodic_x = Some(span);
        self.bounds = compute_bounds(&self.horizontal, &self.depth, self.periodic_x);
        debug!(span = span, "Grid x axis is periodic");
        Ok(self)
    }

    /// Locate `(x, y, z)`.
    ///
    /// Returns `None` when the point is outside the grid and
    /// `allow_extrapolation` is false; with extrapolation the point is
    /// clamped onto the nearest edge cell.
    pub fn locate(
        &self,
        x: f64,
        y: f64,
        z: f64,
        allow_extrapolation: bool,
        seed: &mut LocateSeed,
    ) -> Option<CellRef> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }

        let hit = match &self.horizontal {
            Horizontal::Rectilinear(m) => m.locate(x, y, allow_extrapolation)?,
            Horizontal::Curvilinear(m) => m.locate(x, y, seed, allow_extrapolation)?,
        };
        seed.set(hit.i, hit.j);

        let (k, k_next, zeta) = match &self.depth {
            DepthAxis::Surface => (0, 0, 0.0),
            DepthAxis::Levels(levels) => resolve_depth(levels, z, allow_extrapolation)?,
            DepthAxis::Columns { nz, depths } => {
                let column = |k: usize| self.blend_column(depths, &hit, k);
                resolve_depth_by(*nz, column, z, allow_extrapolation)?
            }
        };

        Some(CellRef {
            i: hit.i,
            i_next: hit.i_next,
            j: hit.j,
            j_next: hit.j_next,
            xsi: hit.xsi,
            eta: hit.eta,
            k,
            k_next,
            zeta,
        })
    }

    /// Depth of level `k` at the horizontal position of `cell`.
    pub fn depth_at(&self, cell: &CellRef, k: usize) -> f64 {
        match &self.depth {
            DepthAxis::Surface => 0.0,
            DepthAxis::Levels(levels) => levels[k],
            DepthAxis::Columns { depths, .. } => {
                let hit = HorizontalHit {
                    i: cell.i,
                    i_next: cell.i_next,
                    j: cell.j,
                    j_next: cell.j_next,
                    xsi: cell.xsi,
                    eta: cell.eta,
                };
                self.blend_column(depths, &hit, k)
            }
        }
    }

    /// Jacobian `d(x, y) / d(xsi, eta)` at the located point, in metres on
    /// spherical meshes and coordinate units on flat ones.
    pub fn jacobian(&self, cell: &CellRef) -> Matrix2<f64> {
        let hit = HorizontalHit {
            i: cell.i,
            i_next: cell.i_next,
            j: cell.j,
            j_next: cell.j_next,
            xsi: cell.xsi,
            eta: cell.eta,
        };
        let (mut jac, lat) = match &self.horizontal {
            Horizontal::Rectilinear(m) => m.jacobian(&hit),
            Horizontal::Curvilinear(m) => m.jacobian(&hit),
        };
        let (mx, my) = self.mesh.metres_per_unit(lat);
        jac[(0, 0)] *= mx;
        jac[(0, 1)] *= mx;
        jac[(1, 0)] *= my;
        jac[(1, 1)] *= my;
        jac
    }

    /// Node shape `(nz, ny, nx)`.
    pub fn node_shape(&self) -> (usize, usize, usize) {
        let (ny, nx) = match &self.horizontal {
            Horizontal::Rectilinear(m) => m.shape(),
            Horizontal::Curvilinear(m) => m.shape(),
        };
        (self.depth.len(), ny, nx)
    }

    /// Number of values in one snapshot.
    pub fn snapshot_len(&self) -> usize {
        let (nz, ny, nx) = self.node_shape();
        nz * ny * nx
    }

    pub fn domain_bounds(&self) -> DomainBounds {
        self.bounds
    }

    pub fn time_axis(&self) -> &TimeAxis {
        &self.time
    }

    pub fn depth(&self) -> &DepthAxis {
        &self.depth
    }

    pub fn mesh(&self) -> Mesh {
        self.mesh
    }

    pub fn periodic_x(&self) -> Option<f64> {
        self.periodic_x
    }

    pub fn is_curvilinear(&self) -> bool {
        matches!(self.horizontal, Horizontal::Curvilinear(_))
    }

    fn blend_column(&self, depths: &[f64], hit: &HorizontalHit, k: usize) -> f64 {
        let (ny, nx) = match &self.horizontal {
            Horizontal::Rectilinear(m) => m.shape(),
            Horizontal::Curvilinear(m) => m.shape(),
        };
        let at = |i: usize, j: usize| depths[(k * ny + j) * nx + i];
        let (xsi, eta) = (hit.xsi, hit.eta);
        (1.0 - xsi) * (1.0 - eta) * at(hit.i, hit.j)
            + xsi * (1.0 - eta) * at(hit.i_next, hit.j)
            + xsi * eta * at(hit.i_next, hit.j_next)
            + (1.0 - xsi) * eta * at(hit.i, hit.j_next)
    }
}

/// Position of a value relative to a monotonic axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AxisPos {
    /// Inside interval `idx..=idx + 1` at fraction `frac`.
    Inside(usize, f64),
    /// Before the first element in index order.
    Below,
    /// Past the last element in index order.
    Above,
}

/// Bracket `v` on a strictly monotonic axis (ascending or descending) of
/// at least two values.
pub(crate) fn search_axis(values: &[f64], v: f64) -> AxisPos {
    search_by(values.len(), |idx| values[idx], v)
}

/// [`search_axis`] over an axis of `n` values read through `at`.
pub(crate) fn search_by(n: usize, at: impl Fn(usize) -> f64, v: f64) -> AxisPos {
    debug_assert!(n >= 2);
    if v.is_nan() {
        return AxisPos::Below;
    }

    let (first, last) = (at(0), at(n - 1));
    let ascending = last > first;
    let (before_first, after_last) = if ascending {
        (v < first, v > last)
    } else {
        (v > first, v < last)
    };
    if before_first {
        return AxisPos::Below;
    }
    if after_last {
        return AxisPos::Above;
    }

    // first index whose value lies past `v` in axis order
    let (mut lo, mut hi) = (0, n);
    while lo < hi {
        let mid = (lo + hi) / 2;
        let passed = if ascending { at(mid) > v } else { at(mid) < v };
        if passed {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    let idx = lo.saturating_sub(1).min(n - 2);
    let (a, b) = (at(idx), at(idx + 1));
    let frac = if b == a {
        0.0
    } else {
        ((v - a) / (b - a)).clamp(0.0, 1.0)
    };
    AxisPos::Inside(idx, frac)
}

/// Bracket `v`, clamping onto the first or last interval when allowed.
pub(crate) fn bracket(values: &[f64], v: f64, allow_extrapolation: bool) -> Option<(usize, usize, f64)> {
    let n = values.len();
    match search_axis(values, v) {
        AxisPos::Inside(idx, frac) => Some((idx, idx + 1, frac)),
        AxisPos::Below if allow_extrapolation => Some((0, 1, 0.0)),
        AxisPos::Above if allow_extrapolation => Some((n - 2, n - 1, 1.0)),
        _ => None,
    }
}

/// Validate that `values` is finite and strictly monotonic.
pub(crate) fn check_monotonic(name: &str, values: &[f64]) -> Result<()> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(FieldError::invalid_grid(format!("{} contains non-finite values", name)));
    }
    let ascending = values.windows(2).all(|w| w[1] > w[0]);
    let descending = values.windows(2).all(|w| w[1] < w[0]);
    if !ascending && !descending {
        return Err(FieldError::invalid_grid(format!(
            "{} is not strictly monotonic",
            name
        )));
    }
    Ok(())
}

fn resolve_depth(levels: &[f64], z: f64, allow_extrapolation: bool) -> Option<(usize, usize, f64)> {
    resolve_depth_by(levels.len(), |k| levels[k], z, allow_extrapolation)
}

fn resolve_depth_by(
    n: usize,
    at: impl Fn(usize) -> f64,
    z: f64,
    allow_extrapolation: bool,
) -> Option<(usize, usize, f64)> {
    match search_by(n, at, z) {
        AxisPos::Inside(k, frac) => Some((k, k + 1, frac)),
        AxisPos::Below if allow_extrapolation => Some((0, 0, 0.0)),
        AxisPos::Above if allow_extrapolation => Some((n - 1, n - 1, 0.0)),
        _ => None,
    }
}

fn normalize_depth(depth: DepthAxis, horizontal_nodes: usize) -> Result<DepthAxis> {
    match depth {
        DepthAxis::Surface => Ok(DepthAxis::Surface),
        DepthAxis::Levels(levels) => match levels.len() {
            0 => Err(FieldError::invalid_grid("depth axis is empty")),
            1 => Ok(DepthAxis::Surface),
            _ => {
                check_monotonic("depth", &levels)?;
                Ok(DepthAxis::Levels(levels))
            }
        },
        DepthAxis::Columns { nz, depths } => {
            if depths.len() != nz * horizontal_nodes {
                return Err(FieldError::invalid_grid(format!(
                    "depth columns hold {} values, expected {} x {}",
                    depths.len(),
                    nz,
                    horizontal_nodes
                )));
            }
            match nz {
                0 => Err(FieldError::invalid_grid("depth axis is empty")),
                1 => Ok(DepthAxis::Surface),
                _ => {
                    check_columns(nz, horizontal_nodes, &depths)?;
                    Ok(DepthAxis::Columns { nz, depths })
                }
            }
        }
    }
}

/// Every column must be finite and strictly monotonic, all in the same
/// direction, so that blended columns stay monotonic too.
fn check_columns(nz: usize, horizontal_nodes: usize, depths: &[f64]) -> Result<()> {
    let mut direction = None;
    for node in 0..horizontal_nodes {
        let column: Vec<f64> = (0..nz).map(|k| depths[k * horizontal_nodes + node]).collect();
        check_monotonic(&format!("depth column {}", node), &column)?;
        let ascending = column[nz - 1] > column[0];
        if *direction.get_or_insert(ascending) != ascending {
            return Err(FieldError::invalid_grid(format!(
                "depth column {} runs opposite to column 0",
                node
            )));
        }
    }
    Ok(())
}

fn compute_bounds(
    horizontal: &Horizontal,
    depth: &DepthAxis,
    periodic_x: Option<f64>,
) -> DomainBounds {
    let horizontal = match horizontal {
        Horizontal::Rectilinear(m) => m.bbox(),
        Horizontal::Curvilinear(m) => m.bbox(),
    };
    let depth = match depth {
        DepthAxis::Surface => None,
        DepthAxis::Levels(levels) => min_max(levels),
        DepthAxis::Columns { depths, .. } => min_max(depths),
    };
    DomainBounds {
        horizontal,
        depth,
        periodic_x,
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time() -> TimeAxis {
        TimeAxis::from_seconds(vec![0.0, 10.0]).unwrap()
    }

    fn axis(n: usize) -> Vec<f64> {
        (0..n).map(|v| v as f64).collect()
    }

    #[test]
    fn test_search_axis_ascending() {
        let values = [0.0, 1.0, 2.0, 4.0];
        assert_eq!(search_axis(&values, 0.0), AxisPos::Inside(0, 0.0));
        assert_eq!(search_axis(&values, 3.0), AxisPos::Inside(2, 0.5));
        assert_eq!(search_axis(&values, 4.0), AxisPos::Inside(2, 1.0));
        assert_eq!(search_axis(&values, -0.1), AxisPos::Below);
        assert_eq!(search_axis(&values, 4.1), AxisPos::Above);
    }

    #[test]
    fn test_search_axis_descending() {
        let values = [90.0, 45.0, 0.0];
        assert_eq!(search_axis(&values, 90.0), AxisPos::Inside(0, 0.0));
        assert_eq!(search_axis(&values, 22.5), AxisPos::Inside(1, 0.5));
        assert_eq!(search_axis(&values, 91.0), AxisPos::Below);
        assert_eq!(search_axis(&values, -1.0), AxisPos::Above);
    }

    #[test]
    fn test_bracket_extrapolation() {
        let values = [0.0, 5.0, 10.0];
        assert_eq!(bracket(&values, -1.0, false), None);
        assert_eq!(bracket(&values, -1.0, true), Some((0, 1, 0.0)));
        assert_eq!(bracket(&values, 11.0, true), Some((1, 2, 1.0)));
    }

    #[test]
    fn test_check_monotonic() {
        assert!(check_monotonic("lon", &[0.0, 1.0, 2.0]).is_ok());
        assert!(check_monotonic("lat", &[2.0, 1.0, 0.0]).is_ok());
        assert!(check_monotonic("lon", &[0.0, 1.0, 1.0]).is_err());
        assert!(check_monotonic("lon", &[0.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_locate_rectilinear_with_levels() {
        let grid = Grid::new(
            Coordinates::Rectilinear {
                lon: axis(11),
                lat: axis(11),
            },
            DepthAxis::Levels(vec![0.0, 10.0, 30.0]),
            time(),
        )
        .unwrap();
        assert_eq!(grid.node_shape(), (3, 11, 11));

        let mut seed = LocateSeed::default();
        let cell = grid.locate(2.5, 7.0, 20.0, false, &mut seed).unwrap();
        assert_eq!((cell.i, cell.i_next, cell.j, cell.j_next), (2, 3, 7, 8));
        assert!((cell.xsi - 0.5).abs() < 1e-12);
        assert_eq!(cell.eta, 0.0);
        assert_eq!((cell.k, cell.k_next), (1, 2));
        assert!((cell.zeta - 0.5).abs() < 1e-12);
        assert_eq!(seed.cell(), Some((2, 7)));

        assert!(grid.locate(2.5, 7.0, 31.0, false, &mut seed).is_none());
        let clamped = grid.locate(2.5, 7.0, 31.0, true, &mut seed).unwrap();
        assert_eq!((clamped.k, clamped.k_next), (2, 2));
    }

    #[test]
    fn test_locate_outside_domain() {
        let grid = Grid::rectilinear(axis(11), axis(11), time()).unwrap();
        let mut seed = LocateSeed::default();
        assert!(grid.locate(-1.0, 5.0, 0.0, false, &mut seed).is_none());
        assert!(grid.locate(f64::NAN, 5.0, 0.0, true, &mut seed).is_none());

        let cell = grid.locate(-1.0, 5.0, 0.0, true, &mut seed).unwrap();
        assert_eq!((cell.i, cell.xsi), (0, 0.0));
    }

    #[test]
    fn test_depth_columns() {
        // 2x2 horizontal nodes, two levels; column depth grows with x
        let depths = vec![
            0.0, 0.0, 0.0, 0.0, // k = 0
            10.0, 20.0, 10.0, 20.0, // k = 1
        ];
        let grid = Grid::new(
            Coordinates::Rectilinear {
                lon: vec![0.0, 1.0],
                lat: vec![0.0, 1.0],
            },
            DepthAxis::Columns { nz: 2, depths },
            time(),
        )
        .unwrap();

        let mut seed = LocateSeed::default();
        let cell = grid.locate(0.5, 0.5, 7.5, false, &mut seed).unwrap();
        // column at x = 0.5 spans 0..15
        assert!((cell.zeta - 0.5).abs() < 1e-12);
        assert!((grid.depth_at(&cell, 1) - 15.0).abs() < 1e-12);
        assert_eq!(grid.domain_bounds().depth, Some((0.0, 20.0)));
    }

    #[test]
    fn test_depth_columns_shape_mismatch() {
        let result = Grid::new(
            Coordinates::Rectilinear {
                lon: vec![0.0, 1.0],
                lat: vec![0.0, 1.0],
            },
            DepthAxis::Columns {
                nz: 2,
                depths: vec![0.0; 6],
            },
            time(),
        );
        assert!(matches!(result, Err(FieldError::InvalidGrid(_))));
    }

    #[test]
    fn test_depth_columns_must_be_monotonic_and_finite() {
        let columns = |depths: Vec<f64>| {
            Grid::new(
                Coordinates::Rectilinear {
                    lon: vec![0.0, 1.0],
                    lat: vec![0.0, 1.0],
                },
                DepthAxis::Columns { nz: 2, depths },
                time(),
            )
        };

        // node 1 is flat
        let flat = columns(vec![0.0, 5.0, 0.0, 0.0, 10.0, 5.0, 10.0, 10.0]);
        assert!(matches!(flat, Err(FieldError::InvalidGrid(_))));

        let nan = columns(vec![0.0, 0.0, 0.0, 0.0, 10.0, f64::NAN, 10.0, 10.0]);
        assert!(matches!(nan, Err(FieldError::InvalidGrid(_))));

        // node 2 runs upwards while the others run downwards
        let mixed = columns(vec![0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0]);
        assert!(matches!(mixed, Err(FieldError::InvalidGrid(_))));
    }

    #[test]
    fn test_descending_depth_columns() {
        // heights above the bed: level 0 is the top
        let depths = vec![
            20.0, 20.0, 20.0, 20.0, // k = 0
            10.0, 10.0, 10.0, 10.0, // k = 1
            0.0, 0.0, 0.0, 0.0, // k = 2
        ];
        let grid = Grid::new(
            Coordinates::Rectilinear {
                lon: vec![0.0, 1.0],
                lat: vec![0.0, 1.0],
            },
            DepthAxis::Columns { nz: 3, depths },
            time(),
        )
        .unwrap();

        let mut seed = LocateSeed::default();
        let cell = grid.locate(0.5, 0.5, 5.0, false, &mut seed).unwrap();
        assert_eq!((cell.k, cell.k_next), (1, 2));
        assert!((cell.zeta - 0.5).abs() < 1e-12);
        assert!(grid.locate(0.5, 0.5, 25.0, false, &mut seed).is_none());
    }

    #[test]
    fn test_single_level_is_surface() {
        let grid = Grid::new(
            Coordinates::Rectilinear {
                lon: axis(3),
                lat: axis(3),
            },
            DepthAxis::Levels(vec![5.0]),
            time(),
        )
        .unwrap();
        assert_eq!(grid.depth(), &DepthAxis::Surface);
    }

    #[test]
    fn test_jacobian_spherical_vs_flat() {
        let grid = Grid::rectilinear(axis(3), vec![0.0, 1.0, 2.0], time()).unwrap();
        let mut seed = LocateSeed::default();
        let cell = grid.locate(0.5, 0.0, 0.0, false, &mut seed).unwrap();
        let jac = grid.jacobian(&cell);
        let (mx, my) = Mesh::Spherical.metres_per_unit(0.0);
        assert!((jac[(0, 0)] - mx).abs() < 1e-6);
        assert!((jac[(1, 1)] - my).abs() < 1e-6);

        let flat = Grid::rectilinear(axis(3), axis(3), time())
            .unwrap()
            .with_mesh(Mesh::Flat);
        let jac = flat.jacobian(&cell);
        assert_eq!(jac, Matrix2::identity());
    }

    #[test]
    fn test_nearest_node() {
        let cell = CellRef {
            i: 1,
            i_next: 2,
            j: 3,
            j_next: 4,
            xsi: 0.7,
            eta: 0.2,
            k: 0,
            k_next: 0,
            zeta: 0.0,
        };
        assert_eq!(cell.nearest_node(), (0, 3, 2));
        let weights: f64 = cell.corners().iter().map(|c| c.2).sum();
        assert!((weights - 1.0).abs() < 1e-12);
    }
}
