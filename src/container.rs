//! The yearly and merged output containers.
//!
//! A yearly container holds the daily rasters twice: as a (time, latitude, longitude)
//! cube for plotting, and flattened row-major to (time, point) for modeling, with
//! `lat_flat`/`lon_flat` giving the coordinates of each point. The merged container
//! keeps only the flattened form.
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use ndarray::{stack, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis, Ix1, Ix2};

use crate::aggregate::DailyRaster;
use crate::error::SmapError;
use crate::utils::{date_to_int, file_sha256, load_nc_var, write_nc_var, write_string_nc_var};

pub const FLATTENED_ATTR: &str = "flattened";

const TIME_UNITS: &str = "YYYYMMDD";
const SM_UNITS: &str = "m3 m-3";

#[derive(Debug, Clone, PartialEq)]
pub struct YearContainer {
    pub latitude: Array1<f32>,
    pub longitude: Array1<f32>,
    pub time: Array1<i32>,
    pub sm_rootzone: Array3<f32>,
    pub data: Array2<f32>,
    pub lat_flat: Array1<f32>,
    pub lon_flat: Array1<f32>,
}

impl YearContainer {
    /// Stack the daily rasters (which must be in ascending date order) into a
    /// container. `latitude` and `longitude` are the cropped coordinate vectors.
    pub fn from_daily_rasters(rasters: &[DailyRaster], latitude: Array1<f32>, longitude: Array1<f32>) -> Result<Self, SmapError> {
        if rasters.is_empty() {
            return Err(SmapError::InternalError("Cannot build a yearly container from zero days".to_owned()));
        }

        let (h, w) = (latitude.len(), longitude.len());
        if let Some(bad) = rasters.iter().find(|r| r.values.dim() != (h, w)) {
            return Err(SmapError::InternalError(format!(
                "Raster for {} has shape {:?}, expected {:?}", bad.date, bad.values.dim(), (h, w)
            )));
        }
        if let Some((a, b)) = rasters.iter().tuple_windows().find(|(a, b)| a.date >= b.date) {
            return Err(SmapError::InternalError(format!(
                "Daily rasters out of order: {} is followed by {}", a.date, b.date
            )));
        }

        let views = rasters.iter().map(|r| r.values.view()).collect_vec();
        let sm_rootzone = stack(Axis(0), &views)
            .map_err(|e| SmapError::InternalError(format!("Could not stack daily rasters: {e}")))?;
        let data = sm_rootzone.clone()
            .into_shape((rasters.len(), h * w))
            .map_err(|e| SmapError::InternalError(format!("Could not flatten daily rasters: {e}")))?;
        let time = rasters.iter().map(|r| date_to_int(r.date)).collect();
        let (lat_flat, lon_flat) = flat_coordinates(latitude.view(), longitude.view());

        Ok(Self { latitude, longitude, time, sm_rootzone, data, lat_flat, lon_flat })
    }

    pub fn num_days(&self) -> usize {
        self.time.len()
    }

    pub fn num_points(&self) -> usize {
        self.lat_flat.len()
    }

    pub fn to_flat(&self) -> FlatContainer {
        FlatContainer {
            data: self.data.clone(),
            time: self.time.clone(),
            lat_flat: self.lat_flat.clone(),
            lon_flat: self.lon_flat.clone(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), SmapError> {
        write_atomically(path, |grp| {
            for (dim, len) in [("time", self.num_days()), ("latitude", self.latitude.len()),
                               ("longitude", self.longitude.len()), ("point", self.num_points())] {
                grp.add_dimension(dim, len)
                    .map_err(|e| SmapError::from_nc_error(e, path.to_owned()))?;
            }

            write_nc_var(grp, path, self.latitude.view(), "latitude", &["latitude"], Some("degrees_north"), None, true)?;
            write_nc_var(grp, path, self.longitude.view(), "longitude", &["longitude"], Some("degrees_east"), None, true)?;
            write_nc_var(grp, path, self.time.view(), "time", &["time"], Some(TIME_UNITS), Some("Calendar date of each daily mean"), false)?;
            write_nc_var(grp, path, self.sm_rootzone.view(), "sm_rootzone", &["time", "latitude", "longitude"],
                         Some(SM_UNITS), Some("Daily mean root zone soil moisture"), true)?;
            write_nc_var(grp, path, self.data.view(), "data", &["time", "point"],
                         Some(SM_UNITS), Some("sm_rootzone with the spatial dimensions flattened in row-major order"), true)?;
            write_nc_var(grp, path, self.lat_flat.view(), "lat_flat", &["point"], Some("degrees_north"), Some("Latitude of each point in data"), false)?;
            write_nc_var(grp, path, self.lon_flat.view(), "lon_flat", &["point"], Some("degrees_east"), Some("Longitude of each point in data"), false)?;

            grp.add_attribute(FLATTENED_ATTR, 1u8)
                .map_err(|e| SmapError::from_nc_error(e, path.to_owned()))?;
            Ok(())
        })
    }
}

/// A flattened time series: one row of `data` per date in `time`, one column per
/// point in `lat_flat`/`lon_flat`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatContainer {
    pub data: Array2<f32>,
    pub time: Array1<i32>,
    pub lat_flat: Array1<f32>,
    pub lon_flat: Array1<f32>,
}

impl FlatContainer {
    pub fn load(path: &Path) -> Result<Self, SmapError> {
        let ds = netcdf::open(path)
            .map_err(|e| SmapError::from_nc_error(e, path.to_owned()))?;

        if !read_flag_attr(&ds, path, FLATTENED_ATTR)? {
            return Err(SmapError::NotFlattened { file: path.to_owned() });
        }

        let container = Self {
            data: load_nc_var::<f32, Ix2>(&ds, path, "data")?,
            time: load_nc_var::<i32, Ix1>(&ds, path, "time")?,
            lat_flat: load_nc_var::<f32, Ix1>(&ds, path, "lat_flat")?,
            lon_flat: load_nc_var::<f32, Ix1>(&ds, path, "lon_flat")?,
        };
        container.check_consistent(path)?;
        Ok(container)
    }

    fn check_consistent(&self, path: &Path) -> Result<(), SmapError> {
        let (nt, np) = self.data.dim();
        let reason = if nt != self.time.len() {
            format!("data has {nt} rows but time has {} values", self.time.len())
        } else if np != self.lat_flat.len() || np != self.lon_flat.len() {
            format!("data has {np} columns but lat_flat/lon_flat have {}/{} values", self.lat_flat.len(), self.lon_flat.len())
        } else {
            return Ok(());
        };
        Err(SmapError::InconsistentContainer { file: path.to_owned(), reason })
    }

    pub fn num_days(&self) -> usize {
        self.time.len()
    }

    pub fn num_points(&self) -> usize {
        self.lat_flat.len()
    }

    /// Rows whose date falls in `start..=end` (dates as `YYYYMMDD` integers)
    pub fn date_range_indices(&self, start: i32, end: i32) -> Vec<usize> {
        self.time.iter()
            .positions(|&t| t >= start && t <= end)
            .collect()
    }

    /// Write as a merged container, recording the files it was built from
    pub fn write(&self, path: &Path, sources: &[PathBuf]) -> Result<(), SmapError> {
        let source_names = sources.iter().map(|p| p.display().to_string()).collect_vec();
        let source_sha256 = sources.iter().map(|p| file_sha256(p)).collect::<Result<Vec<String>, _>>()?;

        write_atomically(path, |grp| {
            for (dim, len) in [("time", self.num_days()), ("point", self.num_points())] {
                grp.add_dimension(dim, len)
                    .map_err(|e| SmapError::from_nc_error(e, path.to_owned()))?;
            }

            write_nc_var(grp, path, self.data.view(), "data", &["time", "point"],
                         Some(SM_UNITS), Some("Daily mean root zone soil moisture, one row per day and one column per point"), true)?;
            write_nc_var(grp, path, self.time.view(), "time", &["time"], Some(TIME_UNITS), Some("Calendar date of each row of data"), false)?;
            write_nc_var(grp, path, self.lat_flat.view(), "lat_flat", &["point"], Some("degrees_north"), Some("Latitude of each point in data"), false)?;
            write_nc_var(grp, path, self.lon_flat.view(), "lon_flat", &["point"], Some("degrees_east"), Some("Longitude of each point in data"), false)?;

            if !sources.is_empty() {
                write_string_nc_var(grp, path, &source_names, "source_file", "source_file", Some("Yearly containers merged into this file"))?;
                write_string_nc_var(grp, path, &source_sha256, "source_file_sha256", "source_file", Some("SHA-256 checksums of the yearly containers"))?;
            }

            grp.add_attribute(FLATTENED_ATTR, 1u8)
                .map_err(|e| SmapError::from_nc_error(e, path.to_owned()))?;
            Ok(())
        })
    }
}

/// Coordinates of each point of a (lat, lon) raster flattened in row-major order:
/// point `i` is at row `i / lon.len()` and column `i % lon.len()`.
pub fn flat_coordinates(lat: ArrayView1<f32>, lon: ArrayView1<f32>) -> (Array1<f32>, Array1<f32>) {
    let w = lon.len();
    let n = lat.len() * w;
    let lat_flat = Array1::from_shape_fn(n, |i| lat[i / w]);
    let lon_flat = Array1::from_shape_fn(n, |i| lon[i % w]);
    (lat_flat, lon_flat)
}

/// Reshape one row of flattened data back to a (height, width) raster
pub fn unflatten_row(row: ArrayView1<f32>, shape: (usize, usize)) -> Result<ArrayView2<f32>, SmapError> {
    row.into_shape(shape)
        .map_err(|e| SmapError::InternalError(format!("Cannot reshape {} points to {shape:?}: {e}", row.len())))
}

fn read_flag_attr(ds: &netcdf::File, path: &Path, attname: &str) -> Result<bool, SmapError> {
    let attr = if let Some(a) = ds.attribute(attname) {
        a
    } else {
        return Ok(false)
    };
    let value = attr.value()
        .map_err(|e| SmapError::from_nc_error(e, path.to_owned()))?;

    match value {
        netcdf::AttrValue::Uchar(v) => Ok(v != 0),
        netcdf::AttrValue::Schar(v) => Ok(v != 0),
        netcdf::AttrValue::Ushort(v) => Ok(v != 0),
        netcdf::AttrValue::Short(v) => Ok(v != 0),
        netcdf::AttrValue::Uint(v) => Ok(v != 0),
        netcdf::AttrValue::Int(v) => Ok(v != 0),
        netcdf::AttrValue::Ulonglong(v) => Ok(v != 0),
        netcdf::AttrValue::Longlong(v) => Ok(v != 0),
        _ => Err(SmapError::NetcdfWrongAttrType { file: path.to_owned(), attname: attname.to_owned(), expected: "integer flag" })
    }
}

/// Write a netCDF/HDF5 file next to `path` and move it into place only once every
/// variable has been written, so a failed write never leaves a partial container.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), SmapError>
where F: FnOnce(&mut netcdf::GroupMut) -> Result<(), SmapError>
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let result = write_partial(&partial, path, write);
    match result {
        Ok(()) => {
            fs::rename(&partial, path)?;
            Ok(())
        },
        Err(e) => {
            if partial.exists() {
                let _ = fs::remove_file(&partial);
            }
            Err(e)
        }
    }
}

fn write_partial<F>(partial: &Path, path: &Path, write: F) -> Result<(), SmapError>
where F: FnOnce(&mut netcdf::GroupMut) -> Result<(), SmapError>
{
    // The file is closed when `ds` drops at the end of this function
    let mut ds = netcdf::create(partial)
        .map_err(|e| SmapError::from_nc_error(e, path.to_owned()))?;
    let mut root = ds.root_mut()
        .ok_or_else(|| SmapError::from_nc_error("Cannot get root group".into(), path.to_owned()))?;
    write(&mut root)
}
