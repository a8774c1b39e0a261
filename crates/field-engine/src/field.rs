//! A named variable bound to a grid and a time window.

use std::sync::Arc;

use drift_common::{DomainBounds, TimeAxis, TimeBounds};
use tracing::info;

use crate::buffer::{InMemorySource, Snapshot, SnapshotSource, TimeWindowBuffer};
use crate::config::FieldConfig;
use crate::error::{FieldError, Result};
use crate::grid::{CellRef, Grid, LocateSeed};
use crate::interpolation::{self, SnapshotView};
use crate::types::{BoundaryPolicy, Gradient, WindowStats};

/// A sampled variable such as `U`, `V` or temperature.
///
/// Every query goes through the field's own [`TimeWindowBuffer`], so
/// sampling needs `&mut self`. A field is never shared between tasks.
#[derive(Debug)]
pub struct Field {
    name: String,
    grid: Arc<Grid>,
    buffer: TimeWindowBuffer,
    config: FieldConfig,
    default_boundary: BoundaryPolicy,
    seed: LocateSeed,
}

impl Field {
    /// Bind `source` to `grid`. The source must hold one snapshot per grid
    /// time step, each with `grid.snapshot_len()` values.
    pub fn new(
        name: impl Into<String>,
        grid: Arc<Grid>,
        source: Arc<dyn SnapshotSource>,
        config: FieldConfig,
    ) -> Result<Self> {
        let name = name.into();
        config
            .validate()
            .map_err(|e| FieldError::invalid_config(format!("{}: {}", name, e)))?;

        if source.snapshot_len() != grid.snapshot_len() {
            let (nz, ny, nx) = grid.node_shape();
            return Err(FieldError::invalid_grid(format!(
                "{}: snapshots hold {} values but the grid has {}x{}x{} nodes",
                name,
                source.snapshot_len(),
                nz,
                ny,
                nx
            )));
        }
        let times = grid.time_axis().clone();
        if let Some(policy) = &config.boundary {
            policy
                .validate(times.bounds().span())
                .map_err(|e| FieldError::invalid_config(format!("{}: {}", name, e)))?;
        }

        let buffer = TimeWindowBuffer::new(
            name.clone(),
            source,
            times,
            config.window_capacity,
            config.prefetch,
        )?;

        let (nz, ny, nx) = grid.node_shape();
        info!(
            field = %name,
            nx = nx,
            ny = ny,
            nz = nz,
            times = grid.time_axis().len(),
            interpolation = %config.interpolation,
            "Created field"
        );

        Ok(Self {
            name,
            grid,
            buffer,
            config,
            default_boundary: BoundaryPolicy::default(),
            seed: LocateSeed::default(),
        })
    }

    /// Build a field from an in-memory array laid out `[t][k][j][i]`.
    pub fn from_data(
        name: impl Into<String>,
        data: Vec<f32>,
        grid: Arc<Grid>,
        config: FieldConfig,
    ) -> Result<Self> {
        let name = name.into();
        let snapshot_len = grid.snapshot_len();
        let steps = grid.time_axis().len();
        if data.len() != steps * snapshot_len {
            return Err(FieldError::invalid_config(format!(
                "{}: data holds {} values, expected {} time steps of {}",
                name,
                data.len(),
                steps,
                snapshot_len
            )));
        }
        let snapshots = data.chunks(snapshot_len).map(<[f32]>::to_vec).collect();
        let source = InMemorySource::new(snapshots, grid.time_axis())?;
        Self::new(name, grid, Arc::new(source), config)
    }

    /// Sample at `(x, y, z, t)` with the field's boundary policy.
    pub async fn sample(&mut self, x: f64, y: f64, z: f64, t: f64) -> Result<f64> {
        self.sample_with(x, y, z, t, None).await
    }

    /// Sample with an optional per-call boundary policy override.
    ///
    /// Space is interpolated on each bracketing snapshot, then the results
    /// are blended linearly in time. The scale factor is applied last.
    pub async fn sample_with(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        t: f64,
        boundary: Option<&BoundaryPolicy>,
    ) -> Result<f64> {
        let policy = self.policy_for(boundary)?;
        let cell = self.locate(x, y, z)?;
        let bracket = self.buffer.ensure_window(t, &policy).await?;

        let left = self.interpolate(&bracket.left, &cell);
        let right = match &bracket.right {
            Some(snapshot) if bracket.weight > 0.0 => Some(self.interpolate(snapshot, &cell)),
            _ => None,
        };

        let value = match (left, right) {
            (Some(l), Some(Some(r))) => l + bracket.weight * (r - l),
            (Some(l), _) => l,
            (None, Some(Some(r))) => r,
            (None, _) => return Ok(self.config.mask_value),
        };
        Ok(value * self.config.scale_factor)
    }

    /// Spatial gradient `(dV/dx, dV/dy, dV/dz)` at `(x, y, z, t)`.
    ///
    /// Horizontal components are per metre on spherical meshes. Cells with a
    /// masked corner contribute a zero horizontal gradient.
    pub async fn sample_gradient(&mut self, x: f64, y: f64, z: f64, t: f64) -> Result<Gradient> {
        self.sample_gradient_with(x, y, z, t, None).await
    }

    /// [`sample_gradient`](Self::sample_gradient) with an optional per-call
    /// boundary policy override.
    pub async fn sample_gradient_with(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        t: f64,
        boundary: Option<&BoundaryPolicy>,
    ) -> Result<Gradient> {
        let policy = self.policy_for(boundary)?;
        let cell = self.locate(x, y, z)?;
        let bracket = self.buffer.ensure_window(t, &policy).await?;

        let left = self.gradient_on(&bracket.left, &cell);
        let gradient = match &bracket.right {
            Some(snapshot) if bracket.weight > 0.0 => {
                left.lerp(&self.gradient_on(snapshot, &cell), bracket.weight)
            }
            _ => left,
        };
        Ok(gradient.scaled(self.config.scale_factor))
    }

    /// Load the snapshots bracketing `t` without sampling.
    pub async fn advance_to(&mut self, t: f64) -> Result<()> {
        let policy = self.boundary();
        self.buffer.ensure_window(t, &policy).await.map(|_| ())
    }

    fn locate(&mut self, x: f64, y: f64, z: f64) -> Result<CellRef> {
        self.grid
            .locate(x, y, z, self.config.allow_extrapolation, &mut self.seed)
            .ok_or_else(|| FieldError::out_of_domain(&self.name, x, y, z))
    }

    fn view<'a>(&self, snapshot: &'a Snapshot) -> SnapshotView<'a> {
        SnapshotView::new(&snapshot.data, self.grid.node_shape())
            .with_range(self.config.vmin, self.config.vmax)
    }

    fn interpolate(&self, snapshot: &Snapshot, cell: &CellRef) -> Option<f64> {
        let depth = |k: usize| self.grid.depth_at(cell, k);
        interpolation::interpolate(&self.view(snapshot), cell, self.config.interpolation, depth)
    }

    fn gradient_on(&self, snapshot: &Snapshot, cell: &CellRef) -> Gradient {
        let view = self.view(snapshot);

        let (dx, dy) = interpolation::horizontal_derivatives(&view, cell)
            .and_then(|(d_xsi, d_eta)| {
                // d(xsi, eta) derivatives = J^T * d(x, y) derivatives
                let inverse = self.grid.jacobian(cell).transpose().try_inverse()?;
                let d = inverse * nalgebra::Vector2::new(d_xsi, d_eta);
                Some((d.x, d.y))
            })
            .unwrap_or((0.0, 0.0));

        let dz = if cell.k_next == cell.k {
            0.0
        } else {
            let upper = interpolation::bilinear(&view, cell, cell.k);
            let lower = interpolation::bilinear(&view, cell, cell.k_next);
            let thickness = self.grid.depth_at(cell, cell.k_next) - self.grid.depth_at(cell, cell.k);
            match (upper, lower) {
                (Some(a), Some(b)) if thickness != 0.0 => (b - a) / thickness,
                _ => 0.0,
            }
        };

        Gradient::new(dx, dy, dz)
    }

    /// Per-call override, then field policy, then field set default.
    ///
    /// The field and default policies were checked against the time axis
    /// when they were set; an override is checked here.
    fn policy_for(&self, boundary: Option<&BoundaryPolicy>) -> Result<BoundaryPolicy> {
        match boundary {
            Some(policy) => {
                policy
                    .validate(self.time_axis().bounds().span())
                    .map_err(|e| FieldError::invalid_config(format!("{}: {}", self.name, e)))?;
                Ok(*policy)
            }
            None => Ok(self.boundary()),
        }
    }

    /// Boundary policy used when no per-call override is given.
    pub fn boundary(&self) -> BoundaryPolicy {
        self.config.boundary.unwrap_or(self.default_boundary)
    }

    /// Set the fallback policy inherited from a field set.
    pub(crate) fn set_default_boundary(&mut self, policy: BoundaryPolicy) -> Result<()> {
        if self.config.boundary.is_none() {
            policy
                .validate(self.time_axis().bounds().span())
                .map_err(|e| FieldError::invalid_config(format!("{}: {}", self.name, e)))?;
        }
        self.default_boundary = policy;
        Ok(())
    }

    /// Times at which the field can be sampled under its boundary policy.
    ///
    /// Time-invariant fields and fields under `clamp` or `time_periodic`
    /// are unbounded; `freeze_at_last` is open-ended after the series.
    pub fn time_bounds(&self) -> TimeBounds {
        let data = self.data_time_bounds();
        if self.time_axis().len() == 1 {
            return TimeBounds {
                start: f64::NEG_INFINITY,
                end: f64::INFINITY,
            };
        }
        match self.boundary() {
            BoundaryPolicy::Error => data,
            BoundaryPolicy::FreezeAtLast => TimeBounds {
                start: data.start,
                end: f64::INFINITY,
            },
            BoundaryPolicy::Clamp | BoundaryPolicy::TimePeriodic { .. } => TimeBounds {
                start: f64::NEG_INFINITY,
                end: f64::INFINITY,
            },
        }
    }

    /// First and last snapshot time.
    pub fn data_time_bounds(&self) -> TimeBounds {
        self.buffer.time_bounds()
    }

    pub fn domain_bounds(&self) -> DomainBounds {
        self.grid.domain_bounds()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn time_axis(&self) -> &TimeAxis {
        self.buffer.times()
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn units(&self) -> Option<&str> {
        self.config.units.as_deref()
    }

    pub fn window_stats(&self) -> WindowStats {
        self.buffer.stats()
    }

    /// Time indices of the resident snapshots.
    pub fn resident_snapshots(&self) -> Vec<usize> {
        self.buffer.resident_snapshots()
    }

    pub fn buffer(&self) -> &TimeWindowBuffer {
        &self.buffer
    }
}
