use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, Ix2};

use crate::error::SmapError;
use crate::schema::SchemaVariant;
use crate::utils::load_nc_var;

/// The 1D latitude and longitude vectors of the global grid. Taken from the first
/// granule of a year and assumed to hold for every other granule in that year.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGrid {
    pub latitude: Array1<f32>,
    pub longitude: Array1<f32>,
}

impl ReferenceGrid {
    /// Reduce 2D `cell_lat`/`cell_lon` arrays (row = latitude, column = longitude)
    /// to their first column and first row respectively.
    pub fn from_cell_arrays(lat2d: ArrayView2<f32>, lon2d: ArrayView2<f32>) -> Result<Self, SmapError> {
        if lat2d.dim() != lon2d.dim() || lat2d.is_empty() {
            return Err(SmapError::InternalError(format!(
                "Latitude and longitude arrays must be the same non-empty shape, got {:?} and {:?}",
                lat2d.dim(), lon2d.dim()
            )));
        }
        Ok(Self {
            latitude: lat2d.column(0).to_owned(),
            longitude: lon2d.row(0).to_owned(),
        })
    }

    /// (rows, columns) of a field on this grid
    pub fn shape(&self) -> (usize, usize) {
        (self.latitude.len(), self.longitude.len())
    }
}

/// Source of granule contents. Each call opens, reads and closes the granule.
pub trait GranuleReader {
    fn read_grid(&self, granule: &Path) -> Result<ReferenceGrid, SmapError>;
    fn read_field(&self, granule: &Path) -> Result<Array2<f32>, SmapError>;
}

/// Reads granules from disk with the netCDF library, whichever layout they use
#[derive(Debug, Default, Clone, Copy)]
pub struct NcGranuleReader;

impl GranuleReader for NcGranuleReader {
    fn read_grid(&self, granule: &Path) -> Result<ReferenceGrid, SmapError> {
        let ds = netcdf::open(granule)
            .map_err(|e| SmapError::from_nc_error(e, granule.to_owned()))?;
        let paths = SchemaVariant::resolve_checked(&ds, granule)?.field_paths();
        let lat2d = load_nc_var::<f32, Ix2>(&ds, granule, paths.latitude)?;
        let lon2d = load_nc_var::<f32, Ix2>(&ds, granule, paths.longitude)?;
        ReferenceGrid::from_cell_arrays(lat2d.view(), lon2d.view())
    }

    fn read_field(&self, granule: &Path) -> Result<Array2<f32>, SmapError> {
        let ds = netcdf::open(granule)
            .map_err(|e| SmapError::from_nc_error(e, granule.to_owned()))?;
        let paths = SchemaVariant::resolve_checked(&ds, granule)?.field_paths();
        load_nc_var::<f32, Ix2>(&ds, granule, paths.geophysical)
    }
}
