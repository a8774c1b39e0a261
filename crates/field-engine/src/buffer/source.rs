//! Backing stores for snapshot data.

use async_trait::async_trait;
use drift_common::{TimeAxis, TimeBounds};

use crate::error::{FieldError, Result};

/// One source file or chunk and the snapshots it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct BackingHandle {
    /// File path or other human-readable name.
    pub label: String,
    /// Global index of the first snapshot in this handle.
    pub first_index: usize,
    /// Number of snapshots in this handle.
    pub len: usize,
    /// Normalized times of the first and last snapshot.
    pub time_range: TimeBounds,
}

impl BackingHandle {
    pub fn contains_index(&self, index: usize) -> bool {
        index >= self.first_index && index < self.first_index + self.len
    }
}

/// Storage that can materialize one snapshot at a time.
///
/// Snapshots are addressed by their global index along the time axis and
/// returned as `f32` values laid out `[k][j][i]`, with missing values as NaN.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Backing handles in time order, covering indices `0..len()` without gaps.
    fn handles(&self) -> &[BackingHandle];

    /// Number of values in one snapshot.
    fn snapshot_len(&self) -> usize;

    /// Total number of snapshots.
    fn len(&self) -> usize {
        self.handles().iter().map(|h| h.len).sum()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the handle containing `index`.
    fn handle_for(&self, index: usize) -> Option<usize> {
        self.handles().iter().position(|h| h.contains_index(index))
    }

    /// Read snapshot `index`.
    async fn load(&self, index: usize) -> Result<Vec<f32>>;
}

/// Snapshots held in memory, for fields built directly from arrays.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    snapshots: Vec<Vec<f32>>,
    snapshot_len: usize,
    handles: Vec<BackingHandle>,
}

impl InMemorySource {
    /// One backing handle holding every snapshot.
    pub fn new(snapshots: Vec<Vec<f32>>, times: &TimeAxis) -> Result<Self> {
        let n = snapshots.len().max(1);
        Self::chunked(snapshots, times, n)
    }

    /// Split the snapshots into handles of `chunk` snapshots each, mimicking
    /// a series spread over several files.
    pub fn chunked(snapshots: Vec<Vec<f32>>, times: &TimeAxis, chunk: usize) -> Result<Self> {
        if snapshots.is_empty() {
            return Err(FieldError::invalid_config("no snapshots supplied"));
        }
        if chunk == 0 {
            return Err(FieldError::invalid_config("chunk size must be > 0"));
        }
        if snapshots.len() != times.len() {
            return Err(FieldError::invalid_config(format!(
                "{} snapshots for {} time steps",
                snapshots.len(),
                times.len()
            )));
        }
        let snapshot_len = snapshots[0].len();
        if let Some(bad) = snapshots.iter().position(|s| s.len() != snapshot_len) {
            return Err(FieldError::invalid_config(format!(
                "snapshot {} holds {} values, expected {}",
                bad,
                snapshots[bad].len(),
                snapshot_len
            )));
        }

        let values = times.values();
        let handles = (0..snapshots.len())
            .step_by(chunk)
            .enumerate()
            .map(|(n, first)| {
                let last = (first + chunk).min(snapshots.len()) - 1;
                BackingHandle {
                    label: format!("memory[{}]", n),
                    first_index: first,
                    len: last - first + 1,
                    time_range: TimeBounds {
                        start: values[first],
                        end: values[last],
                    },
                }
            })
            .collect();

        Ok(Self {
            snapshots,
            snapshot_len,
            handles,
        })
    }
}

#[async_trait]
impl SnapshotSource for InMemorySource {
    fn handles(&self) -> &[BackingHandle] {
        &self.handles
    }

    fn snapshot_len(&self) -> usize {
        self.snapshot_len
    }

    async fn load(&self, index: usize) -> Result<Vec<f32>> {
        self.snapshots
            .get(index)
            .cloned()
            .ok_or_else(|| FieldError::snapshot_load("memory", index, "index out of range"))
    }
}
