//! NetCDF backing store for gridded fields.
//!
//! A [`NetCdfSource`] reads one variable from a time-ordered list of NetCDF
//! files. Opening a source reads only the coordinate and time variables and
//! builds the [`Grid`](field_engine::Grid) they describe; snapshots are read
//! one time step at a time on the blocking thread pool.
//!
//! # Layout
//!
//! The data variable must be ordered `[time][depth][y][x]`, with the time
//! and depth dimensions optional. 1-D `lon`/`lat` coordinates give a
//! rectilinear grid, 2-D ones a curvilinear grid. Depth may be a 1-D level
//! axis or a 3-D `[depth][y][x]` array of node depths.
//!
//! # Example
//!
//! ```ignore
//! use netcdf_source::{open_field, SourceConfig};
//!
//! let config = SourceConfig::new("uo", vec!["day1.nc".into(), "day2.nc".into()]);
//! let mut u = open_field("U", config, FieldConfig::default())?;
//! let value = u.sample(12.5, 41.0, 5.0, t).await?;
//! ```

pub mod config;
pub mod error;
mod reader;
pub mod source;

pub use config::{DimensionNames, IndexSubset, SourceConfig};
pub use error::{NetCdfError, NetCdfResult};
pub use reader::silence_hdf5_errors;
pub use source::{open_field, NetCdfSource};
