//! Blocking reads through the native netcdf library.
//!
//! Everything here runs on the calling thread; the async source wraps these
//! calls in `spawn_blocking`.

use std::ops::Range;
use std::path::Path;
use std::sync::Once;

use drift_common::TimeAxis;
use tracing::warn;

use crate::error::{NetCdfError, NetCdfResult};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when checking for optional
/// attributes that don't exist). This creates confusing log spam like:
///
/// ```text
/// HDF5-DIAG: Error detected in HDF5 (1.10.8) thread 3:
///   #003: ../../../src/H5Adense.c line 397 in H5A__dense_open(): can't locate attribute in name index
/// ```
///
/// This function disables that output by calling H5Eset_auto2 with null handlers.
/// It only needs to be called once per process, but is safe to call multiple times.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// How one time step of the data variable is laid out on disk and which
/// part of it the field keeps.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepLayout {
    /// Leading dimension is time.
    pub has_time: bool,
    /// Rank of the data variable, time included.
    pub rank: usize,
    /// On-disk `(nz, ny, nx)` of one step.
    pub shape: (usize, usize, usize),
    pub k: Range<usize>,
    pub j: Range<usize>,
    pub i: Range<usize>,
    /// Raw value treated as missing in addition to the file's attributes.
    pub fill_override: Option<f64>,
}

impl StepLayout {
    /// Values per snapshot after subsetting.
    pub fn len(&self) -> usize {
        self.k.len() * self.j.len() * self.i.len()
    }

    /// Cut the kept window out of a full `[k][j][i]` step.
    pub fn extract<T: Copy>(&self, full: &[T]) -> Vec<T> {
        let (_, ny, nx) = self.shape;
        let mut out = Vec::with_capacity(self.len());
        for k in self.k.clone() {
            for j in self.j.clone() {
                let row = (k * ny + j) * nx;
                out.extend_from_slice(&full[row + self.i.start..row + self.i.end]);
            }
        }
        out
    }
}

/// CF packing and missing-value attributes of a variable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Unpacking {
    pub scale_factor: f64,
    pub add_offset: f64,
    pub missing: Vec<f64>,
}

impl Unpacking {
    pub fn read(var: &netcdf::Variable, fill_override: Option<f64>) -> Self {
        let missing = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|name| get_f64_attr(var, name))
            .chain(fill_override)
            .collect();
        Self {
            scale_factor: get_f64_attr(var, "scale_factor").unwrap_or(1.0),
            add_offset: get_f64_attr(var, "add_offset").unwrap_or(0.0),
            missing,
        }
    }

    /// Physical value of a raw sample, NaN where missing.
    pub fn apply(&self, raw: f32) -> f32 {
        if !raw.is_finite() || self.is_missing(raw as f64) {
            return f32::NAN;
        }
        (raw as f64 * self.scale_factor + self.add_offset) as f32
    }

    fn is_missing(&self, raw: f64) -> bool {
        self.missing
            .iter()
            .any(|m| (raw - m).abs() <= m.abs().max(1.0) * 1e-6)
    }
}

/// Read one time step (`time = None` for time-invariant variables), subset
/// and unpack it.
pub(crate) fn read_step(
    path: &Path,
    variable: &str,
    time: Option<usize>,
    layout: &StepLayout,
) -> NetCdfResult<Vec<f32>> {
    silence_hdf5_errors();

    let file = netcdf::open(path)?;
    let var = file
        .variable(variable)
        .ok_or_else(|| NetCdfError::missing_variable(variable, path.display()))?;

    let raw: Vec<f32> = match (time, layout.rank) {
        (Some(t), 3) => var.get_values((t, .., ..))?,
        (Some(t), 4) => var.get_values((t, .., .., ..))?,
        (None, _) => var.get_values(..)?,
        (Some(_), rank) => {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} has rank {}, expected 3 or 4 with time",
                variable, rank
            )))
        }
    };

    let (nz, ny, nx) = layout.shape;
    if raw.len() != nz * ny * nx {
        return Err(NetCdfError::InvalidFormat(format!(
            "{} in {}: read {} values, expected {}x{}x{}",
            variable,
            path.display(),
            raw.len(),
            nz,
            ny,
            nx
        )));
    }

    let unpacking = Unpacking::read(&var, layout.fill_override);
    Ok(layout
        .extract(&raw)
        .into_iter()
        .map(|v| unpacking.apply(v))
        .collect())
}

/// Read a coordinate variable in full, returning its values and dimension
/// lengths.
pub(crate) fn read_coordinate(
    file: &netcdf::File,
    name: &str,
    path: &Path,
) -> NetCdfResult<(Vec<f64>, Vec<usize>)> {
    let var = file
        .variable(name)
        .ok_or_else(|| NetCdfError::missing_variable(name, path.display()))?;
    let dims = var.dimensions().iter().map(|d| d.len()).collect();
    let values: Vec<f64> = var.get_values(..)?;
    Ok((values, dims))
}

/// Decode a file's time variable through its CF `units`/`calendar`.
///
/// A variable without units is taken to be seconds already.
pub(crate) fn read_time_axis(file: &netcdf::File, name: &str, path: &Path) -> NetCdfResult<TimeAxis> {
    let var = file
        .variable(name)
        .ok_or_else(|| NetCdfError::missing_variable(name, path.display()))?;
    let values: Vec<f64> = var.get_values(..)?;

    let axis = match get_string_attr(&var, "units") {
        Some(units) => {
            let calendar = get_string_attr(&var, "calendar");
            TimeAxis::from_cf(&values, &units, calendar.as_deref())?
        }
        None => {
            warn!(
                file = %path.display(),
                variable = %name,
                "Time variable has no units, assuming seconds"
            );
            TimeAxis::from_seconds(values)?
        }
    };
    Ok(axis)
}

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

/// Helper to get f64 attribute.
fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

/// Helper to get string attribute.
fn get_string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
