//! Spatial interpolation on a single snapshot.
//!
//! All functions return `None` when every node that would contribute is
//! masked (NaN, fill, or outside `[vmin, vmax]`); the caller substitutes
//! the field's mask value.

use crate::grid::CellRef;
use crate::types::InterpolationMethod;

/// Read-only view of one snapshot with its node shape and valid range.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotView<'a> {
    data: &'a [f32],
    nz: usize,
    ny: usize,
    nx: usize,
    vmin: Option<f32>,
    vmax: Option<f32>,
}

impl<'a> SnapshotView<'a> {
    /// Create a view over `data` laid out `[k][j][i]`.
    pub fn new(data: &'a [f32], shape: (usize, usize, usize)) -> Self {
        let (nz, ny, nx) = shape;
        debug_assert_eq!(data.len(), nz * ny * nx);
        Self {
            data,
            nz,
            ny,
            nx,
            vmin: None,
            vmax: None,
        }
    }

    /// Treat values outside `[vmin, vmax]` as masked.
    pub fn with_range(mut self, vmin: Option<f32>, vmax: Option<f32>) -> Self {
        self.vmin = vmin;
        self.vmax = vmax;
        self
    }

    pub fn nz(&self) -> usize {
        self.nz
    }

    /// Node value, or `None` if masked.
    pub fn value(&self, k: usize, j: usize, i: usize) -> Option<f64> {
        let v = self.data[(k * self.ny + j) * self.nx + i];
        if v.is_nan() {
            return None;
        }
        if self.vmin.is_some_and(|lo| v < lo) || self.vmax.is_some_and(|hi| v > hi) {
            return None;
        }
        Some(v as f64)
    }
}

/// Interpolate the snapshot at a located cell.
///
/// `depth` gives the depth of level `k` at the cell's horizontal position;
/// only the cubic method reads it.
pub fn interpolate(
    view: &SnapshotView,
    cell: &CellRef,
    method: InterpolationMethod,
    depth: impl Fn(usize) -> f64,
) -> Option<f64> {
    match method {
        InterpolationMethod::Nearest => {
            let (k, j, i) = cell.nearest_node();
            view.value(k, j, i)
        }
        InterpolationMethod::Linear => linear_depth(view, cell),
        InterpolationMethod::CubicDepth => {
            cubic_depth(view, cell, depth).or_else(|| linear_depth(view, cell))
        }
    }
}

/// Bilinear interpolation on level `k`, renormalized over unmasked corners.
pub fn bilinear(view: &SnapshotView, cell: &CellRef, k: usize) -> Option<f64> {
    let mut sum = 0.0;
    let mut weight = 0.0;
    let mut masked = false;
    for (i, j, w) in cell.corners() {
        match view.value(k, j, i) {
            Some(v) => {
                sum += w * v;
                weight += w;
            }
            None => masked = true,
        }
    }

    if !masked {
        Some(sum)
    } else if weight > 0.0 {
        Some(sum / weight)
    } else {
        None
    }
}

/// Bilinear in the horizontal, linear between the bracketing levels.
fn linear_depth(view: &SnapshotView, cell: &CellRef) -> Option<f64> {
    let upper = bilinear(view, cell, cell.k);
    if cell.k_next == cell.k || cell.zeta == 0.0 {
        return upper;
    }
    let lower = bilinear(view, cell, cell.k_next);
    match (upper, lower) {
        (Some(a), Some(b)) => Some(a + cell.zeta * (b - a)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Cubic Hermite across the bracketing levels with finite-difference
/// slopes taken over the actual level depths, so unevenly spaced levels
/// are weighted by distance. `None` if any of the four levels is masked
/// so the caller can fall back to linear.
fn cubic_depth(view: &SnapshotView, cell: &CellRef, depth: impl Fn(usize) -> f64) -> Option<f64> {
    if cell.k_next == cell.k || view.nz() < 3 {
        return linear_depth(view, cell);
    }
    let last = view.nz() - 1;
    let k0 = cell.k.saturating_sub(1);
    let (k1, k2) = (cell.k, cell.k_next);
    let k3 = (cell.k_next + 1).min(last);

    let p = [
        bilinear(view, cell, k0)?,
        bilinear(view, cell, k1)?,
        bilinear(view, cell, k2)?,
        bilinear(view, cell, k3)?,
    ];
    let z = [depth(k0), depth(k1), depth(k2), depth(k3)];
    Some(hermite(p, z, cell.zeta))
}

/// Cubic Hermite between `p[1]` at `z[1]` and `p[2]` at `z[2]`, evaluated
/// at fraction `t` of the interval. Slopes are centred differences over
/// `z`; an end level repeated by clamping degrades to a one-sided slope.
/// On equally spaced levels this is the Catmull-Rom spline.
fn hermite(p: [f64; 4], z: [f64; 4], t: f64) -> f64 {
    let slope = |a: usize, b: usize| {
        let dz = z[b] - z[a];
        if dz == 0.0 {
            0.0
        } else {
            (p[b] - p[a]) / dz
        }
    };
    let h = z[2] - z[1];
    let m1 = slope(0, 2) * h;
    let m2 = slope(1, 3) * h;

    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;
    h00 * p[1] + h10 * m1 + h01 * p[2] + h11 * m2
}

/// Derivatives `(dV/dxsi, dV/deta)` of the bilinear interpolant on level
/// `k`. `None` if any corner is masked.
pub fn bilinear_derivatives(view: &SnapshotView, cell: &CellRef, k: usize) -> Option<(f64, f64)> {
    let v00 = view.value(k, cell.j, cell.i)?;
    let v10 = view.value(k, cell.j, cell.i_next)?;
    let v11 = view.value(k, cell.j_next, cell.i_next)?;
    let v01 = view.value(k, cell.j_next, cell.i)?;
    let (xsi, eta) = (cell.xsi, cell.eta);
    let d_xsi = (1.0 - eta) * (v10 - v00) + eta * (v11 - v01);
    let d_eta = (1.0 - xsi) * (v01 - v00) + xsi * (v11 - v10);
    Some((d_xsi, d_eta))
}

/// Horizontal derivatives blended linearly between the bracketing levels.
pub fn horizontal_derivatives(view: &SnapshotView, cell: &CellRef) -> Option<(f64, f64)> {
    let upper = bilinear_derivatives(view, cell, cell.k);
    if cell.k_next == cell.k || cell.zeta == 0.0 {
        return upper;
    }
    match (upper, bilinear_derivatives(view, cell, cell.k_next)) {
        (Some(a), Some(b)) => Some((
            a.0 + cell.zeta * (b.0 - a.0),
            a.1 + cell.zeta * (b.1 - a.1),
        )),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(k: usize) -> f64 {
        k as f64
    }

    fn cell(xsi: f64, eta: f64, k: usize, k_next: usize, zeta: f64) -> CellRef {
        CellRef {
            i: 0,
            i_next: 1,
            j: 0,
            j_next: 1,
            xsi,
            eta,
            k,
            k_next,
            zeta,
        }
    }

    #[test]
    fn test_bilinear_corners() {
        #[rustfmt::skip]
        let data: Vec<f32> = vec![
            1.0, 2.0,
            3.0, 4.0,
        ];
        let view = SnapshotView::new(&data, (1, 2, 2));

        assert_eq!(bilinear(&view, &cell(0.0, 0.0, 0, 0, 0.0), 0), Some(1.0));
        assert_eq!(bilinear(&view, &cell(1.0, 0.0, 0, 0, 0.0), 0), Some(2.0));
        assert_eq!(bilinear(&view, &cell(0.0, 1.0, 0, 0, 0.0), 0), Some(3.0));
        assert_eq!(bilinear(&view, &cell(1.0, 1.0, 0, 0, 0.0), 0), Some(4.0));

        let center = bilinear(&view, &cell(0.5, 0.5, 0, 0, 0.0), 0).unwrap();
        assert!((center - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_bilinear_renormalizes_masked_corner() {
        let data: Vec<f32> = vec![1.0, f32::NAN, 1.0, 1.0];
        let view = SnapshotView::new(&data, (1, 2, 2));
        let v = bilinear(&view, &cell(0.5, 0.5, 0, 0, 0.0), 0).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_masked() {
        let data: Vec<f32> = vec![f32::NAN; 4];
        let view = SnapshotView::new(&data, (1, 2, 2));
        assert_eq!(interpolate(&view, &cell(0.3, 0.3, 0, 0, 0.0), InterpolationMethod::Linear, uniform), None);
    }

    #[test]
    fn test_range_masking() {
        let data: Vec<f32> = vec![1.0, 1.0, 1.0, 1e20];
        let view = SnapshotView::new(&data, (1, 2, 2)).with_range(None, Some(100.0));
        let v = interpolate(&view, &cell(0.9, 0.9, 0, 0, 0.0), InterpolationMethod::Linear, uniform).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nearest() {
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let view = SnapshotView::new(&data, (1, 2, 2));
        let method = InterpolationMethod::Nearest;
        assert_eq!(interpolate(&view, &cell(0.4, 0.4, 0, 0, 0.0), method, uniform), Some(1.0));
        assert_eq!(interpolate(&view, &cell(0.6, 0.6, 0, 0, 0.0), method, uniform), Some(4.0));
    }

    #[test]
    fn test_linear_depth() {
        // two levels, uniform per level
        let data: Vec<f32> = vec![0.0, 0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0];
        let view = SnapshotView::new(&data, (2, 2, 2));
        let v = interpolate(&view, &cell(0.5, 0.5, 0, 1, 0.25), InterpolationMethod::Linear, uniform).unwrap();
        assert!((v - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_cubic_depth_reproduces_linear_profile() {
        // value = 2k on four levels
        let mut data = Vec::new();
        for k in 0..4 {
            data.extend(std::iter::repeat(2.0 * k as f32).take(4));
        }
        let view = SnapshotView::new(&data, (4, 2, 2));
        let v = interpolate(&view, &cell(0.5, 0.5, 1, 2, 0.5), InterpolationMethod::CubicDepth, uniform).unwrap();
        assert!((v - 3.0).abs() < 1e-12);

        // on a node the spline passes through the stored value
        let v = interpolate(&view, &cell(0.0, 0.0, 1, 2, 0.0), InterpolationMethod::CubicDepth, uniform).unwrap();
        assert_eq!(v, 2.0);
    }

    #[test]
    fn test_hermite_matches_catmull_rom_on_even_levels() {
        let p = [0.0, 1.0, 4.0, 9.0];
        let z = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(hermite(p, z, 0.0), 1.0);
        assert!((hermite(p, z, 1.0) - 4.0).abs() < 1e-12);
        // Catmull-Rom reproduces the parabola k^2 at k = 1.5
        assert!((hermite(p, z, 0.5) - 2.25).abs() < 1e-12);
    }

    #[test]
    fn test_cubic_depth_on_uneven_levels() {
        // value = depth on the levels 0, 10, 30, 70, 150
        let levels = [0.0, 10.0, 30.0, 70.0, 150.0];
        let mut data = Vec::new();
        for z in levels {
            data.extend(std::iter::repeat(z as f32).take(4));
        }
        let view = SnapshotView::new(&data, (5, 2, 2));
        let depth = |k: usize| levels[k];

        // halfway between 30 and 70
        let v = interpolate(&view, &cell(0.5, 0.5, 2, 3, 0.5), InterpolationMethod::CubicDepth, depth)
            .unwrap();
        assert!((v - 50.0).abs() < 1e-9, "got {}", v);

        // uniform-spacing weights would bend the linear profile
        let uneven = hermite([10.0, 30.0, 70.0, 150.0], [0.0, 1.0, 2.0, 3.0], 0.5);
        assert!((uneven - 50.0).abs() > 1.0);
    }

    #[test]
    fn test_derivatives() {
        // V = 3 xsi + 2 eta
        let data: Vec<f32> = vec![0.0, 3.0, 2.0, 5.0];
        let view = SnapshotView::new(&data, (1, 2, 2));
        let (dx, dy) = horizontal_derivatives(&view, &cell(0.3, 0.7, 0, 0, 0.0)).unwrap();
        assert!((dx - 3.0).abs() < 1e-12);
        assert!((dy - 2.0).abs() < 1e-12);
    }
}
