use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::info;
use ndarray::{concatenate, Axis};

use crate::container::FlatContainer;
use crate::error::SmapError;
use crate::utils::first_mismatch;

/// Concatenate flattened containers along time, keeping rows dated `start..=end`.
///
/// Every container must have exactly the same `lat_flat`/`lon_flat` as the first;
/// this is checked before anything is combined. The result is sorted by date and
/// must not repeat a date.
pub fn merge_containers(inputs: &[(PathBuf, FlatContainer)], start: i32, end: i32) -> Result<FlatContainer, SmapError> {
    let (_, reference) = inputs.first()
        .ok_or(SmapError::NoDataInRange { start, end })?;

    for (path, c) in &inputs[1..] {
        check_same_coordinates(reference, c, path)?;
    }

    let mut data_parts = Vec::with_capacity(inputs.len());
    let mut time_parts = Vec::with_capacity(inputs.len());
    for (path, c) in inputs {
        let rows = c.date_range_indices(start, end);
        info!("Keeping {} of {} days from {}", rows.len(), c.num_days(), path.display());
        data_parts.push(c.data.select(Axis(0), &rows));
        time_parts.push(c.time.select(Axis(0), &rows));
    }

    let data_views = data_parts.iter().map(|a| a.view()).collect_vec();
    let time_views = time_parts.iter().map(|a| a.view()).collect_vec();
    let data = concatenate(Axis(0), &data_views)
        .map_err(|e| SmapError::InternalError(format!("Could not concatenate data: {e}")))?;
    let time = concatenate(Axis(0), &time_views)
        .map_err(|e| SmapError::InternalError(format!("Could not concatenate time: {e}")))?;

    if time.is_empty() {
        return Err(SmapError::NoDataInRange { start, end });
    }

    let order = (0..time.len()).sorted_by_key(|&i| time[i]).collect_vec();
    if let Some((&a, _)) = order.iter().tuple_windows().find(|(a, b)| time[**a] == time[**b]) {
        return Err(SmapError::DuplicateDate { date: time[a] });
    }

    Ok(FlatContainer {
        data: data.select(Axis(0), &order),
        time: time.select(Axis(0), &order),
        lat_flat: reference.lat_flat.clone(),
        lon_flat: reference.lon_flat.clone(),
    })
}

fn check_same_coordinates(reference: &FlatContainer, other: &FlatContainer, path: &Path) -> Result<(), SmapError> {
    if let Some(index) = first_mismatch(reference.lat_flat.view(), other.lat_flat.view()) {
        return Err(SmapError::CoordinateMismatch { file: path.to_owned(), varname: "lat_flat".to_owned(), index });
    }
    if let Some(index) = first_mismatch(reference.lon_flat.view(), other.lon_flat.view()) {
        return Err(SmapError::CoordinateMismatch { file: path.to_owned(), varname: "lon_flat".to_owned(), index });
    }
    Ok(())
}
