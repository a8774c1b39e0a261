//! Rolling window of snapshots bracketing the last query time.

use std::sync::Arc;
use std::time::Instant;

use drift_common::{TimeAxis, TimeBounds};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Snapshot, SnapshotCache, SnapshotSource};
use crate::error::{FieldError, Result};
use crate::types::{BoundaryPolicy, WindowStats};

/// Direction in which query times have been moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Unknown,
    Forward,
    Backward,
}

/// Snapshots bracketing a query time.
///
/// `right` is `None` when the query resolves to a single snapshot (exact
/// hit, boundary hold, or time-invariant field); `weight` is then 0.
#[derive(Debug, Clone)]
pub struct TimeBracket {
    pub left: Arc<Snapshot>,
    pub right: Option<Arc<Snapshot>>,
    pub weight: f64,
}

impl TimeBracket {
    /// Time indices of the bracket.
    pub fn indices(&self) -> (usize, Option<usize>) {
        (self.left.index, self.right.as_ref().map(|s| s.index))
    }
}

/// A query time mapped onto the time axis.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Resolved {
    Single(usize),
    Pair {
        left: usize,
        right: usize,
        weight: f64,
    },
}

impl Resolved {
    fn indices(&self) -> Vec<usize> {
        match *self {
            Self::Single(index) => vec![index],
            Self::Pair { left, right, .. } => vec![left, right],
        }
    }

    fn first(&self) -> usize {
        match *self {
            Self::Single(index) => index,
            Self::Pair { left, .. } => left,
        }
    }

    fn last(&self) -> usize {
        match *self {
            Self::Single(index) => index,
            Self::Pair { right, .. } => right,
        }
    }
}

struct Prefetch {
    index: usize,
    handle: JoinHandle<Result<Vec<f32>>>,
}

/// Bounded window of resident snapshots over a [`SnapshotSource`].
///
/// Holds the snapshots needed for the most recent query plus, when
/// prefetching, one look-ahead in the direction of travel. Snapshots that
/// fall out of the bracket are released on the next query.
///
/// Queries take `&mut self`: the window is owned by one field and mutated
/// by every query.
pub struct TimeWindowBuffer {
    label: String,
    source: Arc<dyn SnapshotSource>,
    times: TimeAxis,
    cache: SnapshotCache,
    cursor: Option<usize>,
    last_time: Option<f64>,
    direction: Direction,
    prefetch: bool,
    pending: Option<Prefetch>,
    /// Completed look-ahead not yet committed to the window.
    staged: Option<Arc<Snapshot>>,
    loads: u64,
    prefetch_hits: u64,
}

impl TimeWindowBuffer {
    /// Create a window over `source`, whose snapshots are stamped by `times`.
    ///
    /// `capacity` is the maximum number of resident snapshots (2 or 3);
    /// look-ahead prefetching needs 3.
    pub fn new(
        label: impl Into<String>,
        source: Arc<dyn SnapshotSource>,
        times: TimeAxis,
        capacity: usize,
        prefetch: bool,
    ) -> Result<Self> {
        let label = label.into();
        if !(2..=3).contains(&capacity) {
            return Err(FieldError::invalid_config(format!(
                "{}: window capacity must be 2 or 3, got {}",
                label, capacity
            )));
        }
        if source.len() != times.len() {
            return Err(FieldError::invalid_config(format!(
                "{}: source holds {} snapshots but the time axis has {} steps",
                label,
                source.len(),
                times.len()
            )));
        }

        Ok(Self {
            label,
            source,
            times,
            cache: SnapshotCache::new(capacity),
            cursor: None,
            last_time: None,
            direction: Direction::Unknown,
            prefetch: prefetch && capacity >= 3,
            pending: None,
            staged: None,
            loads: 0,
            prefetch_hits: 0,
        })
    }

    /// Make sure the snapshots bracketing `t` are resident and return them.
    ///
    /// On failure the resident snapshots are left exactly as they were.
    /// Dropping the returned future mid-load has the same effect.
    pub async fn ensure_window(&mut self, t: f64, policy: &BoundaryPolicy) -> Result<TimeBracket> {
        let resolved = self.resolve(t, policy)?;
        let needed = resolved.indices();

        let mut snapshots = Vec::with_capacity(needed.len());
        let mut loaded = Vec::new();
        for &index in &needed {
            match self.cache.get(index) {
                Some(snapshot) => snapshots.push(snapshot),
                None => {
                    let (snapshot, prefetched) = self.fetch(index).await?;
                    loaded.push((Arc::clone(&snapshot), prefetched));
                    snapshots.push(snapshot);
                }
            }
        }

        // Commit. Resident state is untouched up to here.
        let evicted = self.cache.retain(|index| needed.contains(&index));
        if !evicted.is_empty() {
            debug!(field = %self.label, evicted = ?evicted, "Evicted snapshots");
        }
        for (snapshot, prefetched) in loaded {
            self.loads += 1;
            if prefetched {
                self.prefetch_hits += 1;
            }
            self.cache.insert(snapshot);
        }
        self.staged = None;
        self.observe(t);
        self.move_cursor(resolved.first());
        if self.prefetch {
            let next = self.lookahead(&resolved, policy);
            self.schedule_prefetch(next);
        }

        let weight = match resolved {
            Resolved::Pair { weight, .. } => weight,
            Resolved::Single(_) => 0.0,
        };
        let mut snapshots = snapshots.into_iter();
        let left = snapshots
            .next()
            .ok_or_else(|| FieldError::snapshot_load(&self.label, resolved.first(), "empty window"))?;
        Ok(TimeBracket {
            left,
            right: snapshots.next(),
            weight,
        })
    }

    /// Map `t` onto the axis under `policy`.
    fn resolve(&self, t: f64, policy: &BoundaryPolicy) -> Result<Resolved> {
        let times = self.times.values();
        let n = times.len();
        let (t0, tn) = (times[0], times[n - 1]);
        let out_of_range = || FieldError::time_out_of_range(&self.label, t, t0, tn);

        if !t.is_finite() {
            return Err(out_of_range());
        }
        if n == 1 {
            return Ok(Resolved::Single(0));
        }

        let query = match policy {
            BoundaryPolicy::TimePeriodic { cycle } => t0 + (t - t0).rem_euclid(*cycle),
            _ => t,
        };

        if query < t0 {
            return match policy {
                BoundaryPolicy::Clamp => Ok(Resolved::Single(0)),
                _ => Err(out_of_range()),
            };
        }
        if query > tn {
            return match policy {
                BoundaryPolicy::Clamp | BoundaryPolicy::FreezeAtLast => Ok(Resolved::Single(n - 1)),
                BoundaryPolicy::TimePeriodic { cycle } => {
                    // between the last snapshot and the first one of the next cycle
                    let gap = t0 + cycle - tn;
                    if gap <= 0.0 {
                        return Ok(Resolved::Single(0));
                    }
                    Ok(Resolved::Pair {
                        left: n - 1,
                        right: 0,
                        weight: ((query - tn) / gap).clamp(0.0, 1.0),
                    })
                }
                BoundaryPolicy::Error => Err(out_of_range()),
            };
        }

        if let Some(index) = self.times.index_of(query) {
            return Ok(Resolved::Single(index));
        }
        let right = times.partition_point(|&v| v <= query).clamp(1, n - 1);
        let left = right - 1;
        let weight = (query - times[left]) / (times[right] - times[left]);
        Ok(Resolved::Pair {
            left,
            right,
            weight,
        })
    }

    /// Read snapshot `index`, from a finished look-ahead when there is one.
    /// Nothing is counted until the caller commits.
    async fn fetch(&mut self, index: usize) -> Result<(Arc<Snapshot>, bool)> {
        if let Some(staged) = self.staged.as_ref().filter(|s| s.index == index) {
            return Ok((Arc::clone(staged), true));
        }

        let started = Instant::now();
        let prefetched = self.pending.as_ref().is_some_and(|p| p.index == index);
        let data = match self.pending.as_mut() {
            Some(pending) if prefetched => {
                let joined = (&mut pending.handle).await;
                self.pending = None;
                joined.map_err(|e| FieldError::snapshot_load(&self.label, index, e))?
            }
            _ => self.source.load(index).await,
        };
        let data = data.map_err(|e| self.relabel(index, e))?;

        let expected = self.source.snapshot_len();
        if data.len() != expected {
            return Err(FieldError::snapshot_load(
                &self.label,
                index,
                format!("expected {} values, got {}", expected, data.len()),
            ));
        }

        debug!(
            field = %self.label,
            index = index,
            prefetched = prefetched,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded snapshot"
        );

        let snapshot = Arc::new(Snapshot {
            index,
            time: self.times.values()[index],
            data,
        });
        if prefetched {
            self.staged = Some(Arc::clone(&snapshot));
        }
        Ok((snapshot, prefetched))
    }

    fn relabel(&self, index: usize, err: FieldError) -> FieldError {
        match err {
            FieldError::SnapshotLoad { reason, .. } => {
                FieldError::snapshot_load(&self.label, index, reason)
            }
            other => FieldError::snapshot_load(&self.label, index, other),
        }
    }

    fn observe(&mut self, t: f64) {
        let direction = match self.last_time {
            Some(previous) if t > previous => Direction::Forward,
            Some(previous) if t < previous => Direction::Backward,
            _ => self.direction,
        };
        if direction != self.direction && self.direction != Direction::Unknown {
            debug!(field = %self.label, ?direction, "Query direction reversed");
            self.cancel_prefetch();
        }
        self.direction = direction;
        self.last_time = Some(t);
    }

    fn move_cursor(&mut self, index: usize) {
        let handle = self.source.handle_for(index);
        if handle == self.cursor {
            return;
        }
        if let Some(h) = handle.and_then(|h| self.source.handles().get(h)) {
            info!(
                field = %self.label,
                handle = %h.label,
                start = h.time_range.start,
                end = h.time_range.end,
                "Switched backing handle"
            );
        }
        self.cursor = handle;
    }

    /// Next snapshot in the direction of travel, if not already in the bracket.
    fn lookahead(&self, resolved: &Resolved, policy: &BoundaryPolicy) -> Option<usize> {
        let n = self.times.len();
        let periodic = policy.is_periodic();
        let next = match self.direction {
            Direction::Forward => {
                let next = resolved.last() + 1;
                if next < n {
                    Some(next)
                } else if periodic {
                    Some(0)
                } else {
                    None
                }
            }
            Direction::Backward => match resolved.first() {
                0 if periodic => Some(n - 1),
                0 => None,
                first => Some(first - 1),
            },
            Direction::Unknown => None,
        };
        next.filter(|index| !resolved.indices().contains(index))
    }

    fn schedule_prefetch(&mut self, next: Option<usize>) {
        if self.pending.as_ref().map(|p| p.index) == next && next.is_some() {
            return;
        }
        self.cancel_prefetch();

        let Some(index) = next else {
            return;
        };
        if self.cache.contains(index) {
            return;
        }
        // Outside a runtime every load is synchronous.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let source = Arc::clone(&self.source);
        let handle = runtime.spawn(async move { source.load(index).await });
        debug!(field = %self.label, index = index, "Prefetching snapshot");
        self.pending = Some(Prefetch { index, handle });
    }

    fn cancel_prefetch(&mut self) {
        self.staged = None;
        if let Some(stale) = self.pending.take() {
            stale.handle.abort();
            debug!(field = %self.label, index = stale.index, "Aborted prefetch");
        }
    }

    /// Indices of the resident snapshots, ascending.
    pub fn resident_snapshots(&self) -> Vec<usize> {
        self.cache.indices()
    }

    /// Resident snapshots including a completed look-ahead.
    pub fn resident_count(&self) -> usize {
        let prefetched = self.staged.is_some()
            || self
                .pending
                .as_ref()
                .is_some_and(|p| p.handle.is_finished());
        self.cache.len() + usize::from(prefetched)
    }

    /// Index of the prefetch in flight or completed, if any.
    pub fn pending_prefetch(&self) -> Option<usize> {
        self.pending
            .as_ref()
            .map(|p| p.index)
            .or_else(|| self.staged.as_ref().map(|s| s.index))
    }

    pub fn stats(&self) -> WindowStats {
        let mut stats = self.cache.stats();
        stats.loads = self.loads;
        stats.prefetch_hits = self.prefetch_hits;
        stats.resident = self.resident_count();
        stats
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn times(&self) -> &TimeAxis {
        &self.times
    }

    pub fn time_bounds(&self) -> TimeBounds {
        self.times.bounds()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Position of the active backing handle.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn source(&self) -> &Arc<dyn SnapshotSource> {
        &self.source
    }
}

impl Drop for TimeWindowBuffer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }
}

impl std::fmt::Debug for TimeWindowBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWindowBuffer")
            .field("label", &self.label)
            .field("times", &self.times.len())
            .field("resident", &self.cache.indices())
            .field("cursor", &self.cursor)
            .field("direction", &self.direction)
            .field("pending", &self.pending_prefetch())
            .finish()
    }
}
