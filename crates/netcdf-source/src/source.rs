//! Multi-file snapshot source over NetCDF files.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use drift_common::{TimeAxis, TimeBounds};
use field_engine::{
    BackingHandle, Coordinates, DepthAxis, Field, FieldConfig, FieldError, Grid, SnapshotSource,
};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::{NetCdfError, NetCdfResult};
use crate::reader::{read_coordinate, read_step, read_time_axis, silence_hdf5_errors, StepLayout};

/// One variable spread over one or more NetCDF files, concatenated along
/// time. Each file is a backing handle.
#[derive(Debug)]
pub struct NetCdfSource {
    config: SourceConfig,
    grid: Arc<Grid>,
    handles: Vec<BackingHandle>,
    layout: Arc<StepLayout>,
}

impl NetCdfSource {
    /// Inspect the configured files and build the grid they describe.
    ///
    /// Only coordinates and time variables are read here; data is read
    /// snapshot by snapshot through [`SnapshotSource::load`].
    pub fn open(config: SourceConfig) -> NetCdfResult<Self> {
        config.validate()?;
        silence_hdf5_errors();

        let first_path = config.files[0].clone();
        let first = netcdf::open(&first_path)?;
        let dims = data_dimensions(&first, &config.variable, &first_path)?;

        let has_time = match (&config.dimensions.time, dims.first()) {
            (Some(time), Some((name, _))) => name == time,
            _ => false,
        };
        let spatial = &dims[usize::from(has_time)..];
        let shape = match spatial {
            [(_, ny), (_, nx)] => (1, *ny, *nx),
            [(_, nz), (_, ny), (_, nx)] => (*nz, *ny, *nx),
            _ => {
                return Err(NetCdfError::InvalidFormat(format!(
                    "{} must have 2 or 3 spatial dimensions, found {:?}",
                    config.variable, spatial
                )))
            }
        };
        let (nz, ny, nx) = shape;

        let i = subset_range("lon", config.indices.lon.clone(), nx)?;
        let j = subset_range("lat", config.indices.lat.clone(), ny)?;
        let k = subset_range("depth", config.indices.depth.clone(), nz)?;

        let coords = read_horizontal(&first, &config, &first_path, (ny, nx), &j, &i)?;
        let depth = if spatial.len() == 3 {
            read_depth(&first, &config, &first_path, shape, (&k, &j, &i))?
        } else {
            DepthAxis::Surface
        };

        let layout = StepLayout {
            has_time,
            rank: dims.len(),
            shape,
            k,
            j,
            i,
            fill_override: config.fill_value,
        };

        let (time, handles) = scan_files(&config, &dims, has_time)?;

        let mut grid = Grid::new(coords, depth, time)?.with_mesh(config.mesh);
        if let Some(span) = config.periodic_x {
            grid = grid.with_periodic_x(span)?;
        }

        let (gz, gy, gx) = grid.node_shape();
        info!(
            variable = %config.variable,
            files = handles.len(),
            times = grid.time_axis().len(),
            nx = gx,
            ny = gy,
            nz = gz,
            curvilinear = grid.is_curvilinear(),
            "Opened NetCDF source"
        );

        Ok(Self {
            config,
            grid: Arc::new(grid),
            handles,
            layout: Arc::new(layout),
        })
    }

    /// Grid built from the files' coordinates.
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Bind this source to its grid as a field.
    pub fn into_field(self, name: impl Into<String>, config: FieldConfig) -> NetCdfResult<Field> {
        let grid = Arc::clone(&self.grid);
        Ok(Field::new(name, grid, Arc::new(self), config)?)
    }
}

/// Open `config` and bind it as a field named `name`.
pub fn open_field(
    name: impl Into<String>,
    config: SourceConfig,
    field_config: FieldConfig,
) -> NetCdfResult<Field> {
    NetCdfSource::open(config)?.into_field(name, field_config)
}

#[async_trait]
impl SnapshotSource for NetCdfSource {
    fn handles(&self) -> &[BackingHandle] {
        &self.handles
    }

    fn snapshot_len(&self) -> usize {
        self.layout.len()
    }

    async fn load(&self, index: usize) -> field_engine::Result<Vec<f32>> {
        let variable = self.config.variable.clone();
        let (handle, path) = self
            .handle_for(index)
            .and_then(|h| Some((self.handles.get(h)?, self.config.files.get(h)?.clone())))
            .ok_or_else(|| FieldError::snapshot_load(&variable, index, "index past the last file"))?;

        let local = index - handle.first_index;
        let time = self.layout.has_time.then_some(local);
        let layout = Arc::clone(&self.layout);

        let started = Instant::now();
        let name = variable.clone();
        let data = tokio::task::spawn_blocking(move || read_step(&path, &name, time, &layout))
            .await
            .map_err(|e| FieldError::snapshot_load(&variable, index, e))?
            .map_err(|e| FieldError::snapshot_load(&variable, index, e))?;

        debug!(
            variable = %variable,
            index = index,
            file = %handle.label,
            local = local,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Read NetCDF snapshot"
        );
        Ok(data)
    }
}

/// Names and lengths of the data variable's dimensions.
fn data_dimensions(file: &netcdf::File, variable: &str, path: &Path) -> NetCdfResult<Vec<(String, usize)>> {
    let var = file
        .variable(variable)
        .ok_or_else(|| NetCdfError::missing_variable(variable, path.display()))?;
    Ok(var
        .dimensions()
        .iter()
        .map(|d| (d.name().to_string(), d.len()))
        .collect())
}

fn subset_range(axis: &str, range: Option<Range<usize>>, len: usize) -> NetCdfResult<Range<usize>> {
    let range = range.unwrap_or(0..len);
    if range.is_empty() || range.end > len {
        return Err(NetCdfError::InvalidFormat(format!(
            "{} index range {:?} outside 0..{}",
            axis, range, len
        )));
    }
    Ok(range)
}

/// Horizontal coordinates: 1-D axes give a rectilinear grid, 2-D arrays a
/// curvilinear one.
fn read_horizontal(
    file: &netcdf::File,
    config: &SourceConfig,
    path: &Path,
    (ny, nx): (usize, usize),
    j: &Range<usize>,
    i: &Range<usize>,
) -> NetCdfResult<Coordinates> {
    let names = &config.dimensions;
    let (lon, lon_dims) = read_coordinate(file, &names.lon, path)?;
    let (lat, lat_dims) = read_coordinate(file, &names.lat, path)?;

    match (lon_dims.as_slice(), lat_dims.as_slice()) {
        ([lx], [ly]) if *lx == nx && *ly == ny => Ok(Coordinates::Rectilinear {
            lon: lon[i.clone()].to_vec(),
            lat: lat[j.clone()].to_vec(),
        }),
        ([ay, ax], [by, bx]) if (*ay, *ax) == (ny, nx) && (*by, *bx) == (ny, nx) => {
            let plane = StepLayout {
                has_time: false,
                rank: 2,
                shape: (1, ny, nx),
                k: 0..1,
                j: j.clone(),
                i: i.clone(),
                fill_override: None,
            };
            Ok(Coordinates::Curvilinear {
                lon: plane.extract(&lon),
                lat: plane.extract(&lat),
                nx: i.len(),
                ny: j.len(),
            })
        }
        _ => Err(NetCdfError::InvalidFormat(format!(
            "coordinates {} {:?} and {} {:?} do not match {} of shape {}x{}",
            names.lon, lon_dims, names.lat, lat_dims, config.variable, ny, nx
        ))),
    }
}

/// Depth levels (1-D) or per-node depth columns (3-D).
fn read_depth(
    file: &netcdf::File,
    config: &SourceConfig,
    path: &Path,
    shape: (usize, usize, usize),
    (k, j, i): (&Range<usize>, &Range<usize>, &Range<usize>),
) -> NetCdfResult<DepthAxis> {
    let name = config.dimensions.depth.as_deref().ok_or_else(|| {
        NetCdfError::MissingData(format!(
            "{} has a depth dimension but no depth coordinate is configured",
            config.variable
        ))
    })?;
    let (values, dims) = read_coordinate(file, name, path)?;
    let (nz, ny, nx) = shape;

    match dims.as_slice() {
        [n] if *n == nz => Ok(DepthAxis::Levels(values[k.clone()].to_vec())),
        [a, b, c] if (*a, *b, *c) == (nz, ny, nx) => {
            let window = StepLayout {
                has_time: false,
                rank: 3,
                shape,
                k: k.clone(),
                j: j.clone(),
                i: i.clone(),
                fill_override: None,
            };
            Ok(DepthAxis::Columns {
                nz: k.len(),
                depths: window.extract(&values),
            })
        }
        _ => Err(NetCdfError::InvalidFormat(format!(
            "depth coordinate {} {:?} does not match {} levels",
            name, dims, nz
        ))),
    }
}

/// Check every file against the first and assemble the time axis and
/// backing handles.
fn scan_files(
    config: &SourceConfig,
    dims: &[(String, usize)],
    has_time: bool,
) -> NetCdfResult<(TimeAxis, Vec<BackingHandle>)> {
    let spatial = &dims[usize::from(has_time)..];
    let mut axes = Vec::with_capacity(config.files.len());
    let mut steps = Vec::with_capacity(config.files.len());

    for path in &config.files {
        let file = netcdf::open(path)?;
        let file_dims = data_dimensions(&file, &config.variable, path)?;
        if file_dims.len() != dims.len() || &file_dims[usize::from(has_time)..] != spatial {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} in {} has dimensions {:?}, expected {:?}",
                config.variable,
                path.display(),
                file_dims,
                dims
            )));
        }
        let len = if has_time { file_dims[0].1 } else { 1 };
        if len == 0 {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} in {} has no time steps",
                config.variable,
                path.display()
            )));
        }
        steps.push(len);

        if config.timestamps.is_none() {
            let axis = match (&config.dimensions.time, has_time) {
                (Some(name), true) => read_time_axis(&file, name, path)?,
                _ => TimeAxis::from_seconds(vec![0.0])?,
            };
            if axis.len() != len {
                return Err(NetCdfError::InvalidFormat(format!(
                    "{}: time variable holds {} values for {} steps",
                    path.display(),
                    axis.len(),
                    len
                )));
            }
            axes.push(axis);
        }
    }

    let total: usize = steps.iter().sum();
    let time = match &config.timestamps {
        Some(timestamps) => {
            if timestamps.len() != total {
                return Err(NetCdfError::InvalidFormat(format!(
                    "{} timestamps supplied for {} snapshots",
                    timestamps.len(),
                    total
                )));
            }
            TimeAxis::from_seconds(timestamps.clone())?
        }
        None => {
            if !has_time && config.files.len() > 1 {
                return Err(NetCdfError::MissingData(format!(
                    "{} has no time dimension; supply timestamps for {} files",
                    config.variable,
                    config.files.len()
                )));
            }
            TimeAxis::concat(&axes)?
        }
    };

    let values = time.values();
    let mut first_index = 0;
    let handles = config
        .files
        .iter()
        .zip(&steps)
        .map(|(path, &len)| {
            let handle = BackingHandle {
                label: path.display().to_string(),
                first_index,
                len,
                time_range: TimeBounds {
                    start: values[first_index],
                    end: values[first_index + len - 1],
                },
            };
            first_index += len;
            handle
        })
        .collect();

    Ok((time, handles))
}
