use std::path::Path;

use chrono::{Datelike, NaiveDate};
use ndarray::{Array, Array2, ArrayView, ArrayView1, ArrayView2, Dimension, Zip};
use netcdf::extent::Extents;
use num_traits::Float;
use sha2::{Digest, Sha256};

use crate::error::SmapError;

pub enum ShowProgress {
    Yes,
    No
}

pub fn progress_bar(len: u64, msg: String, show_progress: &ShowProgress) -> indicatif::ProgressBar {
    let pb = match show_progress {
        ShowProgress::Yes => indicatif::ProgressBar::new(len),
        ShowProgress::No => indicatif::ProgressBar::hidden(),
    };
    if let Ok(sty) = indicatif::ProgressStyle::with_template("{msg} {bar} {human_pos}/{human_len}") {
        pb.set_style(sty);
    }
    pb.set_message(msg);
    pb
}

/// Calendar date as the integer `YYYYMMDD` used in the containers' `time` variable
pub fn date_to_int(date: NaiveDate) -> i32 {
    date.year() * 10000 + date.month() as i32 * 100 + date.day() as i32
}

pub fn int_to_date(value: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(value / 10000, (value / 100 % 100) as u32, (value % 100) as u32)
}

/// Index of the first element where `a` and `b` are not exactly equal, or the length
/// of the shorter one if they differ in length.
pub fn first_mismatch(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Option<usize> {
    if let Some(i) = a.iter().zip(b.iter()).position(|(x, y)| x != y) {
        return Some(i);
    }
    if a.len() != b.len() {
        Some(a.len().min(b.len()))
    } else {
        None
    }
}

/// Accumulates 2D fields and averages them cell by cell, leaving out values that
/// are NaN or below a sentinel threshold. Cells with no valid value average to NaN.
#[derive(Debug, Clone)]
pub struct MaskedMean<T> {
    sum: Array2<T>,
    count: Array2<u32>,
    threshold: T,
}

impl<T: Float> MaskedMean<T> {
    pub fn new(shape: (usize, usize), threshold: T) -> Self {
        Self { sum: Array2::zeros(shape), count: Array2::zeros(shape), threshold }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.sum.dim()
    }

    pub fn add(&mut self, field: ArrayView2<T>) -> Result<(), SmapError> {
        if field.dim() != self.sum.dim() {
            return Err(SmapError::InternalError(format!(
                "Cannot average a field of shape {:?} into an accumulator of shape {:?}",
                field.dim(), self.sum.dim()
            )));
        }

        let threshold = self.threshold;
        Zip::from(&mut self.sum)
            .and(&mut self.count)
            .and(&field)
            .for_each(|s, c, &v| {
                if !v.is_nan() && v >= threshold {
                    *s = *s + v;
                    *c += 1;
                }
            });
        Ok(())
    }

    pub fn mean(&self) -> Array2<T> {
        Zip::from(&self.sum)
            .and(&self.count)
            .map_collect(|&s, &c| {
                if c == 0 {
                    T::nan()
                } else {
                    s / T::from(c).unwrap_or_else(T::nan)
                }
            })
    }
}

pub fn load_nc_var<T: netcdf::NcPutGet, D: Dimension>(ds: &netcdf::File, file: &Path, varname: &str) -> Result<Array<T, D>, SmapError> {
    let var = ds.variable(varname)
        .ok_or_else(|| SmapError::NetcdfMissingVar { file: file.to_owned(), varname: varname.to_owned() })?;
    let data = var.values_arr::<T, _>(Extents::All)
        .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?
        .into_dimensionality::<D>()
        .map_err(|e| SmapError::from_shape_error(e, file.to_owned(), varname.to_owned()))?;
    Ok(data)
}

pub fn write_nc_var<T: netcdf::NcPutGet + Clone, D: Dimension>(
    grp: &mut netcdf::GroupMut,
    file: &Path,
    data: ArrayView<T, D>,
    name: &str,
    dims: &[&str],
    units: Option<&str>,
    description: Option<&str>,
    compress: bool
) -> Result<(), SmapError> {
    let mut var = grp.add_variable::<T>(name, dims)
        .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?;
    if compress {
        var.compression(4, true)
            .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?;
    }

    let data = data.as_standard_layout();
    let values = data.as_slice()
        .ok_or_else(|| SmapError::InternalError(format!("Data for variable {name} is not contiguous")))?;
    var.put_values(values, Extents::All)
        .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?;

    if let Some(units) = units {
        var.add_attribute("units", units)
            .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?;
    }

    if let Some(description) = description {
        var.add_attribute("description", description)
            .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?;
    }

    Ok(())
}

pub fn write_string_nc_var(
    grp: &mut netcdf::GroupMut,
    file: &Path,
    data: &[String],
    name: &str,
    dim: &str,
    description: Option<&str>
) -> Result<(), SmapError> {
    if grp.dimension(dim).is_none() {
        grp.add_dimension(dim, data.len())
            .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?;
    }

    let mut var = grp.add_string_variable(name, &[dim])
        .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?;
    for (i, s) in data.iter().enumerate() {
        let ex: Extents = i.into();
        var.put_string(s, ex)
            .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?;
    }

    if let Some(description) = description {
        var.add_attribute("description", description)
            .map_err(|e| SmapError::from_nc_error(e, file.to_owned()))?;
    }

    Ok(())
}

pub fn file_sha256(file: &Path) -> Result<String, SmapError> {
    let mut f = std::fs::File::open(file)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut f, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array1};

    use super::*;

    #[test]
    fn test_date_int_conversion() {
        let d = NaiveDate::from_ymd_opt(2019, 4, 1).unwrap();
        assert_eq!(date_to_int(d), 20190401);
        assert_eq!(int_to_date(20190401), Some(d));
        assert_eq!(int_to_date(20190231), None);
    }

    #[test]
    fn test_masked_mean_ignores_sentinels() {
        let mut acc = MaskedMean::new((1, 3), -9000.0f32);
        acc.add(array![[1.0, -9999.0, -9999.0]].view()).unwrap();
        acc.add(array![[3.0, 0.5, f32::NAN]].view()).unwrap();
        let m = acc.mean();
        assert_eq!(m[[0, 0]], 2.0);
        assert_eq!(m[[0, 1]], 0.5);
        assert!(m[[0, 2]].is_nan());
    }

    #[test]
    fn test_masked_mean_threshold_is_inclusive() {
        let mut acc = MaskedMean::new((1, 1), -9000.0f32);
        acc.add(array![[-9000.0]].view()).unwrap();
        assert_eq!(acc.mean()[[0, 0]], -9000.0);
    }

    #[test]
    fn test_masked_mean_shape_checked() {
        let mut acc = MaskedMean::new((2, 2), -9000.0f32);
        assert!(acc.add(Array2::<f32>::zeros((2, 3)).view()).is_err());
    }

    #[test]
    fn test_first_mismatch() {
        let a: Array1<f32> = array![1.0, 2.0, 3.0];
        assert_eq!(first_mismatch(a.view(), a.view()), None);
        assert_eq!(first_mismatch(a.view(), array![1.0, 2.5, 3.0].view()), Some(1));
        assert_eq!(first_mismatch(a.view(), array![1.0, 2.0].view()), Some(2));
    }
}
