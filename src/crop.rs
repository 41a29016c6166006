use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::config::BoundingBox;
use crate::error::SmapError;
use crate::granule::ReferenceGrid;

/// Row and column indices into the reference grid that fall inside a bounding box.
/// Both index lists are non-empty and ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropWindow {
    lat_idx: Vec<usize>,
    lon_idx: Vec<usize>,
}

impl CropWindow {
    pub fn from_grid(grid: &ReferenceGrid, bbox: &BoundingBox) -> Result<Self, SmapError> {
        let lat_idx: Vec<usize> = grid.latitude.iter()
            .enumerate()
            .filter_map(|(i, &lat)| bbox.contains_lat(lat).then_some(i))
            .collect();
        let lon_idx: Vec<usize> = grid.longitude.iter()
            .enumerate()
            .filter_map(|(i, &lon)| bbox.contains_lon(lon).then_some(i))
            .collect();

        if lat_idx.is_empty() || lon_idx.is_empty() {
            return Err(SmapError::EmptyCropWindow { n_lat: lat_idx.len(), n_lon: lon_idx.len() });
        }
        Ok(Self { lat_idx, lon_idx })
    }

    pub fn height(&self) -> usize {
        self.lat_idx.len()
    }

    pub fn width(&self) -> usize {
        self.lon_idx.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn lat_indices(&self) -> &[usize] {
        &self.lat_idx
    }

    pub fn lon_indices(&self) -> &[usize] {
        &self.lon_idx
    }

    pub fn crop<T: Clone>(&self, field: ArrayView2<T>) -> Array2<T> {
        field.select(Axis(0), &self.lat_idx)
            .select(Axis(1), &self.lon_idx)
    }

    pub fn cropped_latitude(&self, grid: &ReferenceGrid) -> Array1<f32> {
        grid.latitude.select(Axis(0), &self.lat_idx)
    }

    pub fn cropped_longitude(&self, grid: &ReferenceGrid) -> Array1<f32> {
        grid.longitude.select(Axis(0), &self.lon_idx)
    }
}
