//! Test data generators for synthetic ocean-like fields.
//!
//! All 4-D generators return values laid out `[t][k][j][i]`, the layout
//! accepted by `Field::from_data`.

/// Evenly spaced axis values `start, start + step, ...`.
///
/// # Example
///
/// ```
/// use test_utils::axis;
///
/// assert_eq!(axis(0.0, 0.5, 3), vec![0.0, 0.5, 1.0]);
/// ```
pub fn axis(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that node values come back unchanged:
/// grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0);  // col=1, row=0
/// assert_eq!(grid[10], 1.0);    // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// A field holding `value` everywhere.
pub fn create_uniform_field(nx: usize, ny: usize, nz: usize, nt: usize, value: f32) -> Vec<f32> {
    vec![value; nx * ny * nz * nt]
}

/// A field whose value at each node is `f(x, y, z, t)`.
pub fn create_field_from_fn<F>(lon: &[f64], lat: &[f64], depth: &[f64], times: &[f64], f: F) -> Vec<f32>
where
    F: Fn(f64, f64, f64, f64) -> f64,
{
    let depth = if depth.is_empty() { &[0.0][..] } else { depth };
    let mut data = Vec::with_capacity(lon.len() * lat.len() * depth.len() * times.len());
    for &t in times {
        for &z in depth {
            for &y in lat {
                for &x in lon {
                    data.push(f(x, y, z, t) as f32);
                }
            }
        }
    }
    data
}

/// A field linear in every coordinate:
/// `c[0] + c[1]*x + c[2]*y + c[3]*z + c[4]*t`.
///
/// Bilinear and linear-in-time interpolation reproduce it exactly.
pub fn create_linear_field(lon: &[f64], lat: &[f64], depth: &[f64], times: &[f64], c: [f64; 5]) -> Vec<f32> {
    create_field_from_fn(lon, lat, depth, times, |x, y, z, t| {
        c[0] + c[1] * x + c[2] * y + c[3] * z + c[4] * t
    })
}

/// Surface field holding the node's time value, useful for checking
/// temporal blending.
pub fn create_time_ramp(nx: usize, ny: usize, times: &[f64]) -> Vec<f32> {
    times
        .iter()
        .flat_map(|&t| std::iter::repeat(t as f32).take(nx * ny))
        .collect()
}

/// Solid-body rotation about `center` with angular speed `omega`.
///
/// Returns `(u, v)` surface fields, constant in time.
pub fn create_eddy_velocity(
    lon: &[f64],
    lat: &[f64],
    nt: usize,
    center: (f64, f64),
    omega: f64,
) -> (Vec<f32>, Vec<f32>) {
    let times = vec![0.0; nt];
    let u = create_field_from_fn(lon, lat, &[], &times, |_, y, _, _| -omega * (y - center.1));
    let v = create_field_from_fn(lon, lat, &[], &times, |x, _, _, _| omega * (x - center.0));
    (u, v)
}

/// Replace the listed `(j, i)` surface nodes of every time step with NaN.
pub fn with_land_nodes(mut data: Vec<f32>, nx: usize, ny: usize, land: &[(usize, usize)]) -> Vec<f32> {
    let plane = nx * ny;
    for step in data.chunks_mut(plane) {
        for &(j, i) in land {
            if j < ny && i < nx {
                step[j * nx + i] = f32::NAN;
            }
        }
    }
    data
}

/// Node coordinates of a regular grid rotated by `angle` radians about
/// `origin`, as `(lon, lat)` arrays laid out `[j][i]`.
pub fn create_rotated_mesh(
    nx: usize,
    ny: usize,
    origin: (f64, f64),
    spacing: f64,
    angle: f64,
) -> (Vec<f64>, Vec<f64>) {
    let (sin, cos) = angle.sin_cos();
    let mut lon = Vec::with_capacity(nx * ny);
    let mut lat = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let (a, b) = (i as f64 * spacing, j as f64 * spacing);
            lon.push(origin.0 + a * cos - b * sin);
            lat.push(origin.1 + a * sin + b * cos);
        }
    }
    (lon, lat)
}
