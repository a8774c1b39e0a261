//! Curvilinear meshes: 2-D coordinate arrays with no axis alignment.
//!
//! Cell lookup is two-tier. The cell found by the previous query and its
//! eight neighbours are tried first, since particles move a fraction of a
//! cell per step. On a miss, a uniform bucket index over cell bounding
//! boxes narrows the search to a handful of candidates. Containment is
//! decided by inverting the bilinear cell map with Newton iterations.

use drift_common::BoundingBox;
use nalgebra::{Matrix2, Vector2};

use super::{HorizontalHit, LocateSeed};
use crate::error::{FieldError, Result};

const MAX_NEWTON_ITERATIONS: usize = 20;
const NEWTON_TOLERANCE: f64 = 1e-12;
/// Slack on the unit square when deciding containment.
const CELL_TOLERANCE: f64 = 1e-9;
/// Fractions this close to 0 or 1 are snapped so node queries are exact.
const SNAP: f64 = 1e-12;
const CELLS_PER_BUCKET: usize = 16;

type Corners = [(f64, f64); 4];

/// Mesh described by 2-D longitude/latitude arrays of shape `[ny][nx]`.
#[derive(Debug, Clone)]
pub struct CurvilinearMesh {
    lon: Vec<f64>,
    lat: Vec<f64>,
    nx: usize,
    ny: usize,
    periodic: Option<f64>,
    index: CellIndex,
}

impl CurvilinearMesh {
    pub fn new(
        lon: Vec<f64>,
        lat: Vec<f64>,
        nx: usize,
        ny: usize,
        periodic: Option<f64>,
    ) -> Result<Self> {
        if nx < 2 || ny < 2 {
            return Err(FieldError::invalid_grid(format!(
                "curvilinear grid needs at least 2x2 nodes, got {}x{}",
                nx, ny
            )));
        }
        if lon.len() != nx * ny || lat.len() != nx * ny {
            return Err(FieldError::invalid_grid(format!(
                "coordinate arrays hold {} and {} values, expected {}x{}",
                lon.len(),
                lat.len(),
                ny,
                nx
            )));
        }
        if lon.iter().chain(lat.iter()).any(|v| !v.is_finite()) {
            return Err(FieldError::invalid_grid(
                "curvilinear coordinates contain non-finite values",
            ));
        }

        let mut mesh = Self {
            lon,
            lat,
            nx,
            ny,
            periodic: None,
            index: CellIndex::empty(),
        };
        match periodic {
            Some(span) => mesh.set_periodic(span)?,
            None => mesh.index = CellIndex::build(&mesh),
        }
        Ok(mesh)
    }

    pub(crate) fn set_periodic(&mut self, span: f64) -> Result<()> {
        if !span.is_finite() || span <= 0.0 {
            return Err(FieldError::invalid_grid(format!(
                "periodic span must be > 0, got {}",
                span
            )));
        }
        self.periodic = Some(span);
        self.index = CellIndex::build(self);
        Ok(())
    }

    /// Node shape `(ny, nx)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    /// Node coordinates at `(i, j)`.
    pub fn node(&self, i: usize, j: usize) -> (f64, f64) {
        let idx = j * self.nx + i;
        (self.lon[idx], self.lat[idx])
    }

    /// Cell columns; a periodic mesh has an extra wrap column.
    fn cell_cols(&self) -> usize {
        if self.periodic.is_some() {
            self.nx
        } else {
            self.nx - 1
        }
    }

    fn cell_rows(&self) -> usize {
        self.ny - 1
    }

    fn next_i(&self, i: usize) -> usize {
        (i + 1) % self.nx
    }

    /// Cell corners, counter-clockwise from `(i, j)`, with longitudes
    /// unwrapped relative to the first corner on periodic meshes.
    fn corners(&self, i: usize, j: usize) -> Corners {
        let ni = self.next_i(i);
        let mut corners = [
            self.node(i, j),
            self.node(ni, j),
            self.node(ni, j + 1),
            self.node(i, j + 1),
        ];
        if let Some(span) = self.periodic {
            let x0 = corners[0].0;
            for corner in corners.iter_mut().skip(1) {
                corner.0 = x0 + wrap_delta(corner.0 - x0, span);
            }
        }
        corners
    }

    fn unwrap_query(&self, corners: &Corners, x: f64) -> f64 {
        match self.periodic {
            Some(span) => corners[0].0 + wrap_delta(x - corners[0].0, span),
            None => x,
        }
    }

    /// Fractional position of `(x, y)` if it lies in cell `(i, j)`.
    fn contains(&self, i: usize, j: usize, x: f64, y: f64) -> Option<(f64, f64)> {
        let corners = self.corners(i, j);
        let x = self.unwrap_query(&corners, x);
        let bbox = corners_bbox(&corners).expand(CELL_TOLERANCE);
        if !bbox.contains_point(x, y) {
            return None;
        }

        let (xsi, eta) = invert_bilinear(&corners, x, y)?;
        let inside = |v: f64| (-CELL_TOLERANCE..=1.0 + CELL_TOLERANCE).contains(&v);
        if inside(xsi) && inside(eta) {
            Some((snap(xsi), snap(eta)))
        } else {
            None
        }
    }

    pub(crate) fn locate(
        &self,
        x: f64,
        y: f64,
        seed: &LocateSeed,
        allow_extrapolation: bool,
    ) -> Option<HorizontalHit> {
        if let Some((si, sj)) = seed.cell() {
            for (i, j) in self.neighbourhood(si, sj) {
                if let Some((xsi, eta)) = self.contains(i, j, x, y) {
                    return Some(self.hit(i, j, xsi, eta));
                }
            }
        }

        let (qx, qy) = self.index.normalize(x, y, self.periodic);
        for &cell in self.index.candidates(qx, qy) {
            let (i, j) = (cell % self.cell_cols(), cell / self.cell_cols());
            if let Some((xsi, eta)) = self.contains(i, j, x, y) {
                return Some(self.hit(i, j, xsi, eta));
            }
        }

        if allow_extrapolation {
            self.nearest_cell(x, y)
        } else {
            None
        }
    }

    /// Seed cell first, then its eight neighbours.
    fn neighbourhood(&self, i: usize, j: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let cols = self.cell_cols() as isize;
        let rows = self.cell_rows() as isize;
        let periodic = self.periodic.is_some();
        const OFFSETS: [(isize, isize); 9] = [
            (0, 0),
            (-1, 0),
            (1, 0),
            (0, -1),
            (0, 1),
            (-1, -1),
            (1, -1),
            (-1, 1),
            (1, 1),
        ];
        OFFSETS.iter().filter_map(move |&(di, dj)| {
            let nj = j as isize + dj;
            let mut ni = i as isize + di;
            if periodic {
                ni = ni.rem_euclid(cols);
            }
            if ni < 0 || ni >= cols || nj < 0 || nj >= rows {
                None
            } else {
                Some((ni as usize, nj as usize))
            }
        })
    }

    /// Clamp onto the cell whose centre is closest to the point.
    fn nearest_cell(&self, x: f64, y: f64) -> Option<HorizontalHit> {
        let (qx, qy) = self.index.normalize(x, y, self.periodic);
        let (i, j) = self.index.nearest(qx, qy, |cell| {
            let (i, j) = (cell % self.cell_cols(), cell / self.cell_cols());
            let corners = self.corners(i, j);
            let cx = corners.iter().map(|c| c.0).sum::<f64>() / 4.0;
            let cy = corners.iter().map(|c| c.1).sum::<f64>() / 4.0;
            let dx = self.unwrap_query(&corners, x) - cx;
            ((dx * dx + (y - cy) * (y - cy)), (i, j))
        })?;

        let corners = self.corners(i, j);
        let ux = self.unwrap_query(&corners, x);
        let (xsi, eta) = invert_bilinear(&corners, ux, y).unwrap_or((0.5, 0.5));
        Some(self.hit(i, j, xsi.clamp(0.0, 1.0), eta.clamp(0.0, 1.0)))
    }

    fn hit(&self, i: usize, j: usize, xsi: f64, eta: f64) -> HorizontalHit {
        HorizontalHit {
            i,
            i_next: self.next_i(i),
            j,
            j_next: j + 1,
            xsi,
            eta,
        }
    }

    /// Jacobian in coordinate units and the latitude of the point.
    pub(crate) fn jacobian(&self, hit: &HorizontalHit) -> (Matrix2<f64>, f64) {
        let corners = self.corners(hit.i, hit.j);
        let (_, lat) = bilinear_point(&corners, hit.xsi, hit.eta);
        (bilinear_jacobian(&corners, hit.xsi, hit.eta), lat)
    }

    pub fn bbox(&self) -> BoundingBox {
        let bbox = BoundingBox::from_points(&self.lon, &self.lat)
            .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, 0.0, 0.0));
        match self.periodic {
            Some(span) => BoundingBox::new(bbox.min_x, bbox.min_y, bbox.min_x + span, bbox.max_y),
            None => bbox,
        }
    }
}

/// Uniform bucket grid over cell bounding boxes.
#[derive(Debug, Clone)]
struct CellIndex {
    origin_x: f64,
    origin_y: f64,
    bucket_w: f64,
    bucket_h: f64,
    nbx: usize,
    nby: usize,
    buckets: Vec<Vec<usize>>,
}

impl CellIndex {
    fn empty() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            bucket_w: 1.0,
            bucket_h: 1.0,
            nbx: 0,
            nby: 0,
            buckets: Vec::new(),
        }
    }

    fn build(mesh: &CurvilinearMesh) -> Self {
        let cols = mesh.cell_cols();
        let rows = mesh.cell_rows();
        let n_cells = cols * rows;

        let extent = mesh.bbox();
        let per_side = ((n_cells / CELLS_PER_BUCKET).max(1) as f64).sqrt().ceil() as usize;
        let (nbx, nby) = (per_side.max(1), per_side.max(1));
        let mut index = Self {
            origin_x: extent.min_x,
            origin_y: extent.min_y,
            bucket_w: (extent.width() / nbx as f64).max(f64::EPSILON),
            bucket_h: (extent.height() / nby as f64).max(f64::EPSILON),
            nbx,
            nby,
            buckets: vec![Vec::new(); nbx * nby],
        };

        for j in 0..rows {
            for i in 0..cols {
                let cell = j * cols + i;
                let bbox = corners_bbox(&mesh.corners(i, j)).expand(CELL_TOLERANCE);
                index.insert(cell, &bbox);
                if let Some(span) = mesh.periodic {
                    // cells straddling the seam are reachable from both sides
                    if bbox.max_x > extent.max_x {
                        index.insert(cell, &shift_x(&bbox, -span));
                    }
                    if bbox.min_x < extent.min_x {
                        index.insert(cell, &shift_x(&bbox, span));
                    }
                }
            }
        }
        index
    }

    fn insert(&mut self, cell: usize, bbox: &BoundingBox) {
        let (bx0, by0) = self.bucket_clamped(bbox.min_x, bbox.min_y);
        let (bx1, by1) = self.bucket_clamped(bbox.max_x, bbox.max_y);
        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                self.buckets[by * self.nbx + bx].push(cell);
            }
        }
    }

    fn bucket_clamped(&self, x: f64, y: f64) -> (usize, usize) {
        let bx = ((x - self.origin_x) / self.bucket_w).floor();
        let by = ((y - self.origin_y) / self.bucket_h).floor();
        (
            bx.clamp(0.0, (self.nbx - 1) as f64) as usize,
            by.clamp(0.0, (self.nby - 1) as f64) as usize,
        )
    }

    /// Bring a periodic x into the indexed range.
    fn normalize(&self, x: f64, y: f64, periodic: Option<f64>) -> (f64, f64) {
        match periodic {
            Some(span) => (self.origin_x + (x - self.origin_x).rem_euclid(span), y),
            None => (x, y),
        }
    }

    fn candidates(&self, x: f64, y: f64) -> &[usize] {
        let bx = ((x - self.origin_x) / self.bucket_w).floor();
        let by = ((y - self.origin_y) / self.bucket_h).floor();
        if self.buckets.is_empty()
            || bx < 0.0
            || by < 0.0
            || bx > self.nbx as f64
            || by > self.nby as f64
        {
            return &[];
        }
        // a point on the far edge belongs to the last bucket
        let bx = (bx as usize).min(self.nbx - 1);
        let by = (by as usize).min(self.nby - 1);
        &self.buckets[by * self.nbx + bx]
    }

    /// Closest cell by `distance`, searching rings of buckets outward from
    /// the clamped bucket of the point.
    fn nearest<F>(&self, x: f64, y: f64, distance: F) -> Option<(usize, usize)>
    where
        F: Fn(usize) -> (f64, (usize, usize)),
    {
        if self.buckets.is_empty() {
            return None;
        }
        let (cx, cy) = self.bucket_clamped(x, y);
        let max_ring = self.nbx.max(self.nby);
        let mut best: Option<(f64, (usize, usize))> = None;
        let mut found_at: Option<usize> = None;

        for ring in 0..=max_ring {
            if let Some(r) = found_at {
                // one extra ring catches closer cells in diagonal buckets
                if ring > r + 1 {
                    break;
                }
            }
            for (bx, by) in ring_buckets(cx, cy, ring, self.nbx, self.nby) {
                for &cell in &self.buckets[by * self.nbx + bx] {
                    let (d, ij) = distance(cell);
                    if best.map_or(true, |(bd, _)| d < bd) {
                        best = Some((d, ij));
                    }
                }
            }
            if best.is_some() && found_at.is_none() {
                found_at = Some(ring);
            }
        }
        best.map(|(_, ij)| ij)
    }
}

fn ring_buckets(
    cx: usize,
    cy: usize,
    ring: usize,
    nbx: usize,
    nby: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let r = ring as isize;
    let (cx, cy) = (cx as isize, cy as isize);
    (-r..=r)
        .flat_map(move |dy| (-r..=r).map(move |dx| (dx, dy)))
        .filter(move |&(dx, dy)| dx.abs() == r || dy.abs() == r)
        .map(move |(dx, dy)| (cx + dx, cy + dy))
        .filter(move |&(x, y)| x >= 0 && y >= 0 && x < nbx as isize && y < nby as isize)
        .map(|(x, y)| (x as usize, y as usize))
}

fn wrap_delta(d: f64, span: f64) -> f64 {
    (d + span / 2.0).rem_euclid(span) - span / 2.0
}

fn snap(v: f64) -> f64 {
    if v.abs() < SNAP {
        0.0
    } else if (v - 1.0).abs() < SNAP {
        1.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn shift_x(bbox: &BoundingBox, dx: f64) -> BoundingBox {
    BoundingBox::new(bbox.min_x + dx, bbox.min_y, bbox.max_x + dx, bbox.max_y)
}

fn corners_bbox(corners: &Corners) -> BoundingBox {
    let xs = corners.map(|c| c.0);
    let ys = corners.map(|c| c.1);
    let fold = |v: [f64; 4], f: fn(f64, f64) -> f64| v.into_iter().reduce(f).unwrap_or(0.0);
    BoundingBox::new(
        fold(xs, f64::min),
        fold(ys, f64::min),
        fold(xs, f64::max),
        fold(ys, f64::max),
    )
}

fn bilinear_point(c: &Corners, xsi: f64, eta: f64) -> (f64, f64) {
    let w = [
        (1.0 - xsi) * (1.0 - eta),
        xsi * (1.0 - eta),
        xsi * eta,
        (1.0 - xsi) * eta,
    ];
    let x = w[0] * c[0].0 + w[1] * c[1].0 + w[2] * c[2].0 + w[3] * c[3].0;
    let y = w[0] * c[0].1 + w[1] * c[1].1 + w[2] * c[2].1 + w[3] * c[3].1;
    (x, y)
}

/// `d(x, y) / d(xsi, eta)` of the bilinear cell map.
pub(crate) fn bilinear_jacobian(c: &Corners, xsi: f64, eta: f64) -> Matrix2<f64> {
    let dx_dxsi = (1.0 - eta) * (c[1].0 - c[0].0) + eta * (c[2].0 - c[3].0);
    let dx_deta = (1.0 - xsi) * (c[3].0 - c[0].0) + xsi * (c[2].0 - c[1].0);
    let dy_dxsi = (1.0 - eta) * (c[1].1 - c[0].1) + eta * (c[2].1 - c[3].1);
    let dy_deta = (1.0 - xsi) * (c[3].1 - c[0].1) + xsi * (c[2].1 - c[1].1);
    Matrix2::new(dx_dxsi, dx_deta, dy_dxsi, dy_deta)
}

/// Newton inversion of the bilinear map. Returns unconstrained `(xsi, eta)`.
fn invert_bilinear(c: &Corners, x: f64, y: f64) -> Option<(f64, f64)> {
    let mut xsi = 0.5;
    let mut eta = 0.5;
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let (px, py) = bilinear_point(c, xsi, eta);
        let inverse = bilinear_jacobian(c, xsi, eta).try_inverse()?;
        let step = inverse * Vector2::new(x - px, y - py);
        xsi += step.x;
        eta += step.y;
        if step.norm() < NEWTON_TOLERANCE {
            return Some((xsi, eta));
        }
    }
    None
}
