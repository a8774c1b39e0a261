//! Space-time interpolation of gridded ocean and atmosphere fields.
//!
//! This crate serves field values to a particle tracking kernel. Fields may
//! live on rectilinear or curvilinear grids, with or without depth, and
//! their time series may be far larger than memory. Only the snapshots
//! bracketing the current query time are kept resident.
//!
//! # Architecture
//!
//! ```text
//! Kernel query (x, y, z, t)
//!      │
//!      ▼
//! FieldSet::sample_core / sample_vector
//!      │
//!      ├─► Field::sample
//!      │         │
//!      │         ├─► Grid::locate  (cell + fractional coordinates)
//!      │         │
//!      │         ├─► TimeWindowBuffer::ensure_window(t)
//!      │         │         │
//!      │         │         ├─► Window hit: reuse resident snapshots
//!      │         │         │
//!      │         │         └─► Window miss: load via SnapshotSource,
//!      │         │             evict the stale snapshot, prefetch ahead
//!      │         │
//!      │         └─► interpolate in space, then blend in time
//!      │
//!      └─► Vec<f64> per component
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use drift_common::TimeAxis;
//! use field_engine::{FieldSet, Grid};
//!
//! let times = TimeAxis::from_seconds(vec![0.0, 3600.0])?;
//! let grid = Arc::new(Grid::rectilinear(lon, lat, times)?);
//!
//! let mut set = FieldSet::builder()
//!     .data_field("U", u, Arc::clone(&grid))
//!     .data_field("V", v, grid)
//!     .build()?;
//!
//! let uv = set.sample_core(12.5, 41.0, 0.0, 1800.0).await?;
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod field;
pub mod field_set;
pub mod grid;
pub mod interpolation;
pub mod types;

// Re-export commonly used types at crate root
pub use buffer::{
    BackingHandle, Direction, InMemorySource, Snapshot, SnapshotSource, TimeBracket,
    TimeWindowBuffer,
};
pub use config::{FieldConfig, FieldSetConfig};
pub use error::{ErrorCode, FieldError, Result};
pub use field::Field;
pub use field_set::{FieldSet, FieldSetBuilder, CORE_ROLE};
pub use grid::{CellRef, Coordinates, CurvilinearMesh, DepthAxis, Grid, LocateSeed, RectilinearMesh};
pub use interpolation::SnapshotView;
pub use types::{BoundaryPolicy, Gradient, InterpolationMethod, Mesh, WindowStats};

pub use drift_common::{DomainBounds, TimeAxis, TimeBounds};
