//! Round trips through real NetCDF files written to a temp directory.

use std::path::{Path, PathBuf};

use field_engine::{FieldConfig, FieldError, FieldSet, SnapshotSource};
use netcdf_source::{open_field, DimensionNames, IndexSubset, NetCdfError, NetCdfSource, SourceConfig};
use test_utils::fixtures::time;
use test_utils::{assert_approx_eq, axis, create_linear_field, create_rotated_mesh, init_tracing};

/// Contents of one synthetic file.
struct FileSpec<'a> {
    variable: &'a str,
    lon: &'a [f64],
    lat: &'a [f64],
    depth: Option<&'a [f64]>,
    times: &'a [f64],
    units: Option<&'a str>,
    calendar: Option<&'a str>,
    data: &'a [f32],
    fill: Option<f32>,
    packing: Option<(f32, f32)>,
}

impl<'a> FileSpec<'a> {
    fn new(variable: &'a str, lon: &'a [f64], lat: &'a [f64], times: &'a [f64], data: &'a [f32]) -> Self {
        Self {
            variable,
            lon,
            lat,
            depth: None,
            times,
            units: Some(time::HOURS_SINCE_2000),
            calendar: Some(time::STANDARD),
            data,
            fill: None,
            packing: None,
        }
    }

    fn write(&self, path: &Path) -> Result<(), netcdf::Error> {
        let mut file = netcdf::create(path)?;
        file.add_dimension("time", self.times.len())?;
        if let Some(depth) = self.depth {
            file.add_dimension("depth", depth.len())?;
        }
        file.add_dimension("lat", self.lat.len())?;
        file.add_dimension("lon", self.lon.len())?;

        {
            let mut var = file.add_variable::<f64>("time", &["time"])?;
            if let Some(units) = self.units {
                var.put_attribute("units", units)?;
            }
            if let Some(calendar) = self.calendar {
                var.put_attribute("calendar", calendar)?;
            }
            var.put_values(self.times, ..)?;
        }
        {
            let mut var = file.add_variable::<f64>("lon", &["lon"])?;
            var.put_values(self.lon, ..)?;
        }
        {
            let mut var = file.add_variable::<f64>("lat", &["lat"])?;
            var.put_values(self.lat, ..)?;
        }
        let mut dims = vec!["time"];
        if let Some(depth) = self.depth {
            let mut var = file.add_variable::<f64>("depth", &["depth"])?;
            var.put_values(depth, ..)?;
            dims.push("depth");
        }
        dims.extend(["lat", "lon"]);

        let mut var = file.add_variable::<f32>(self.variable, &dims)?;
        if let Some(fill) = self.fill {
            var.put_attribute("_FillValue", fill)?;
        }
        if let Some((scale, offset)) = self.packing {
            var.put_attribute("scale_factor", scale)?;
            var.put_attribute("add_offset", offset)?;
        }
        var.put_values(self.data, ..)?;
        Ok(())
    }
}

fn temp_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

#[tokio::test]
async fn test_files_concatenate_along_time() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let lon = axis(0.0, 1.0, 6);
    let lat = axis(40.0, 1.0, 5);
    let coeffs = [0.0, 1.0, 0.0, 0.0, 0.5];

    let mut files = Vec::new();
    for (n, hours) in [[0.0, 1.0], [2.0, 3.0]].iter().enumerate() {
        let data = create_linear_field(&lon, &lat, &[], &hours[..], coeffs);
        let path = temp_path(&dir, &format!("part{}.nc", n));
        FileSpec::new("uo", &lon, &lat, &hours[..], &data).write(&path).unwrap();
        files.push(path);
    }

    let source = NetCdfSource::open(SourceConfig::new("uo", files.clone())).unwrap();
    assert_eq!(source.handles().len(), 2);
    assert_eq!(source.handles()[1].first_index, 2);
    assert_eq!(source.snapshot_len(), 30);

    let axis = source.grid().time_axis();
    assert_eq!(axis.len(), 4);
    let t0 = axis.first();
    assert_approx_eq!(axis.values()[3] - t0, 3.0 * time::HOUR, 1e-6);
    // 2000-01-01 on the Unix axis
    assert_eq!(t0, 946_684_800.0);

    let mut field = source.into_field("U", FieldConfig::default()).unwrap();
    // between the last step of the first file and the first of the second
    let value = field.sample(2.5, 42.0, 0.0, t0 + 1.5 * time::HOUR).await.unwrap();
    assert_approx_eq!(value, 2.5 + 0.5 * 1.5, 1e-5);
    assert_eq!(field.resident_snapshots(), vec![1, 2]);
}

#[tokio::test]
async fn test_fill_values_and_packing() {
    let dir = tempfile::tempdir().unwrap();
    let lon = axis(0.0, 1.0, 3);
    let lat = axis(0.0, 1.0, 3);
    let mut data = vec![100.0_f32; 9];
    data[0] = -999.0;
    let path = temp_path(&dir, "packed.nc");
    FileSpec {
        fill: Some(-999.0),
        packing: Some((0.5, 1.0)),
        ..FileSpec::new("thetao", &lon, &lat, &[0.0], &data)
    }
    .write(&path)
    .unwrap();

    let config = FieldConfig {
        mask_value: -1.0,
        ..FieldConfig::default()
    };
    let mut field = open_field("T", SourceConfig::new("thetao", vec![path]), config).unwrap();

    // 100 * 0.5 + 1
    assert_eq!(field.sample(2.0, 2.0, 0.0, 0.0).await.unwrap(), 51.0);
    // masked corner drops out of the weights
    assert_approx_eq!(field.sample(0.5, 0.5, 0.0, 0.0).await.unwrap(), 51.0, 1e-9);
    // the fill node itself
    assert_eq!(field.sample(0.0, 0.0, 0.0, 0.0).await.unwrap(), -1.0);
}

#[tokio::test]
async fn test_depth_levels_and_subsetting() {
    let dir = tempfile::tempdir().unwrap();
    let lon = axis(10.0, 0.5, 8);
    let lat = axis(-5.0, 0.5, 6);
    let depth = [0.0, 50.0, 100.0];
    let data = create_linear_field(&lon, &lat, &depth, &[0.0, 6.0], [1.0, 0.0, 2.0, 0.01, 0.0]);
    let path = temp_path(&dir, "levels.nc");
    FileSpec {
        depth: Some(&depth[..]),
        ..FileSpec::new("so", &lon, &lat, &[0.0, 6.0], &data)
    }
    .write(&path)
    .unwrap();

    let config = SourceConfig::new("so", vec![path]).with_indices(IndexSubset {
        lon: Some(2..6),
        lat: None,
        depth: Some(1..3),
    });
    let source = NetCdfSource::open(config).unwrap();
    let bounds = source.grid().domain_bounds();
    assert_eq!(bounds.horizontal.min_x, 11.0);
    assert_eq!(bounds.horizontal.max_x, 12.5);
    assert_eq!(bounds.depth, Some((50.0, 100.0)));
    assert_eq!(source.snapshot_len(), 2 * 6 * 4);

    let t0 = source.grid().time_axis().first();
    let mut field = source.into_field("S", FieldConfig::default()).unwrap();
    let value = field.sample(11.75, -3.0, 75.0, t0 + 3.0 * time::HOUR).await.unwrap();
    assert_approx_eq!(value, 1.0 - 6.0 + 0.75, 1e-5);

    let err = field.sample(10.5, -3.0, 75.0, t0).await.unwrap_err();
    assert!(matches!(err, FieldError::OutOfDomain { .. }));
}

#[tokio::test]
async fn test_curvilinear_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "curvilinear.nc");
    let (nx, ny) = (6, 5);
    let (lon, lat) = create_rotated_mesh(nx, ny, (-20.0, 60.0), 0.25, 0.5);
    let data: Vec<f32> = lon.iter().zip(&lat).map(|(x, y)| (x - y) as f32).collect();

    {
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("y", ny).unwrap();
        file.add_dimension("x", nx).unwrap();
        let mut var = file.add_variable::<f64>("nav_lon", &["y", "x"]).unwrap();
        var.put_values(&lon, ..).unwrap();
        let mut var = file.add_variable::<f64>("nav_lat", &["y", "x"]).unwrap();
        var.put_values(&lat, ..).unwrap();
        let mut var = file.add_variable::<f32>("ssh", &["y", "x"]).unwrap();
        var.put_values(&data, ..).unwrap();
    }

    let config = SourceConfig::new("ssh", vec![path]).with_dimensions(DimensionNames {
        lon: "nav_lon".to_string(),
        lat: "nav_lat".to_string(),
        depth: None,
        time: Some("time_counter".to_string()),
    });
    let source = NetCdfSource::open(config).unwrap();
    assert!(source.grid().is_curvilinear());
    assert_eq!(source.grid().time_axis().len(), 1);

    let mut field = source.into_field("SSH", FieldConfig::default()).unwrap();
    let (sin, cos) = 0.5f64.sin_cos();
    let (a, b) = (0.6, 0.35);
    let x = -20.0 + a * cos - b * sin;
    let y = 60.0 + a * sin + b * cos;
    // time-invariant: any time works
    let value = field.sample(x, y, 0.0, 1.0e9).await.unwrap();
    assert_approx_eq!(value, x - y, 1e-4);
}

#[tokio::test]
async fn test_unsupported_units_need_override() {
    let dir = tempfile::tempdir().unwrap();
    let lon = axis(0.0, 1.0, 3);
    let lat = axis(0.0, 1.0, 3);
    let data = vec![1.0_f32; 18];
    let path = temp_path(&dir, "monthly.nc");
    FileSpec {
        units: Some(time::MONTHS_SINCE_1955),
        ..FileSpec::new("mlotst", &lon, &lat, &[0.0, 1.0], &data)
    }
    .write(&path)
    .unwrap();

    let err = NetCdfSource::open(SourceConfig::new("mlotst", vec![path.clone()])).unwrap_err();
    assert!(matches!(
        FieldError::from(err),
        FieldError::UnsupportedCalendar { .. }
    ));

    let config = SourceConfig::new("mlotst", vec![path]).with_timestamps(vec![0.0, 30.0 * time::DAY]);
    let source = NetCdfSource::open(config).unwrap();
    assert_eq!(source.grid().time_axis().calendar(), None);
    assert_eq!(source.grid().time_axis().last(), 30.0 * time::DAY);

    let config = SourceConfig::new("mlotst", vec![]).with_timestamps(vec![0.0]);
    assert!(matches!(NetCdfSource::open(config), Err(NetCdfError::MissingData(_))));
}

#[tokio::test]
async fn test_time_without_units_is_seconds() {
    let dir = tempfile::tempdir().unwrap();
    let lon = axis(0.0, 1.0, 2);
    let lat = axis(0.0, 1.0, 2);
    let data = vec![0.0_f32, 0.0, 0.0, 0.0, 4.0, 4.0, 4.0, 4.0];
    let path = temp_path(&dir, "raw.nc");
    FileSpec {
        units: None,
        calendar: None,
        ..FileSpec::new("w", &lon, &lat, &[0.0, 40.0], &data)
    }
    .write(&path)
    .unwrap();

    let mut field = open_field("W", SourceConfig::new("w", vec![path]), FieldConfig::default()).unwrap();
    assert_eq!(field.sample(0.5, 0.5, 0.0, 10.0).await.unwrap(), 1.0);
}

#[test]
fn test_mismatched_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let lat = axis(0.0, 1.0, 2);
    let (small, large) = (axis(0.0, 1.0, 2), axis(0.0, 1.0, 3));

    let a = temp_path(&dir, "a.nc");
    FileSpec::new("uo", &small, &lat, &[0.0], &[0.0; 4]).write(&a).unwrap();
    let b = temp_path(&dir, "b.nc");
    FileSpec::new("uo", &large, &lat, &[1.0], &[0.0; 6]).write(&b).unwrap();

    let err = NetCdfSource::open(SourceConfig::new("uo", vec![a.clone(), b])).unwrap_err();
    assert!(matches!(err, NetCdfError::InvalidFormat(_)));

    let err = NetCdfSource::open(SourceConfig::new("vo", vec![a])).unwrap_err();
    assert!(matches!(err, NetCdfError::MissingData(_)));
}

#[tokio::test]
async fn test_field_set_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let lon = axis(0.0, 1.0, 4);
    let lat = axis(0.0, 1.0, 4);
    let hours = [0.0, 1.0, 2.0];
    let u = create_linear_field(&lon, &lat, &[], &hours, [1.0, 0.0, 0.0, 0.0, 0.0]);
    let v = create_linear_field(&lon, &lat, &[], &hours, [0.0, 0.0, 0.0, 0.0, 1.0]);

    let u_path = temp_path(&dir, "u.nc");
    FileSpec::new("uo", &lon, &lat, &hours, &u).write(&u_path).unwrap();
    let v_path = temp_path(&dir, "v.nc");
    FileSpec::new("vo", &lon, &lat, &hours, &v).write(&v_path).unwrap();

    let mut set = FieldSet::builder()
        .field(open_field("U", SourceConfig::new("uo", vec![u_path]), FieldConfig::default()).unwrap())
        .field(open_field("V", SourceConfig::new("vo", vec![v_path]), FieldConfig::default()).unwrap())
        .build()
        .unwrap();

    let t0 = set.time_bounds().unwrap().start;
    for step in 0..8 {
        let t = t0 + step as f64 * 900.0;
        let uv = set.sample_core(1.5, 1.5, 0.0, t).await.unwrap();
        assert_approx_eq!(uv[0], 1.0, 1e-6);
        assert_approx_eq!(uv[1], (t - t0) / time::HOUR, 1e-5);
    }
    for stats in set.window_stats().values() {
        assert!(stats.resident <= 3);
    }
}
