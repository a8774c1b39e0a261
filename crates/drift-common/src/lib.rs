//! Common types shared by the drift field engine crates.
//!
//! - [`time`]: decoding of heterogeneous time encodings (CF units strings,
//!   calendars, explicit timestamp arrays) into one numeric axis
//! - [`bbox`]: spatial and temporal extents reported to the advection layer

pub mod bbox;
pub mod error;
pub mod time;

pub use bbox::{BoundingBox, DomainBounds};
pub use error::{TimeDecodeError, TimeResult};
pub use time::{normalize, Calendar, CalendarDate, TimeAxis, TimeBounds, TimeEncoding, TimeReference, TimeUnit, TimeUnits};
