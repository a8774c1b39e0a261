//! Time-window buffering of snapshots.
//!
//! A field's time series may span many files and far more memory than is
//! available. The [`TimeWindowBuffer`] keeps only the snapshots bracketing
//! the most recent query resident, loading new ones from a
//! [`SnapshotSource`] as the query time advances.

mod cache;
mod source;
mod window;

pub use cache::SnapshotCache;
pub use source::{BackingHandle, InMemorySource, SnapshotSource};
pub use window::{Direction, TimeBracket, TimeWindowBuffer};

/// One materialized time step of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Index along the field's time axis.
    pub index: usize,
    /// Normalized time in seconds.
    pub time: f64,
    /// Node values laid out `[k][j][i]`, NaN where missing.
    pub data: Vec<f32>,
}

impl Snapshot {
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}
