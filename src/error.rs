use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SmapError {
    #[error("Error reading netCDF/HDF5 file {file}: {nc_error}")]
    NetcdfError{nc_error: netcdf::error::Error, file: PathBuf},
    #[error("No variable named '{varname}' in {file}")]
    NetcdfMissingVar{file: PathBuf, varname: String},
    #[error("Wrong type for attribute {attname} in file {file}: expected a {expected}")]
    NetcdfWrongAttrType{file: PathBuf, attname: String, expected: &'static str},
    #[error("Error in shape of variable '{varname}' in {file}: {nd_error}")]
    NetcdfShapeError{file: PathBuf, varname: String, nd_error: ndarray::ShapeError},
    #[error("Granule {file} has neither the hierarchical nor the flat field layout")]
    UnknownSchema{file: PathBuf},
    #[error("[{year}] {day} is missing time codes {}", .missing.join(","))]
    MissingTimeCodes{year: i32, day: String, missing: Vec<String>},
    #[error("Crop window is empty: {n_lat} latitude rows and {n_lon} longitude columns fall inside the bounding box")]
    EmptyCropWindow{n_lat: usize, n_lon: usize},
    #[error("Field in {file} has shape {actual:?}, but the reference grid is {expected:?}")]
    GridShapeMismatch{file: PathBuf, expected: (usize, usize), actual: (usize, usize)},
    #[error("Variable '{varname}' in {file} differs from the reference coordinates at index {index}")]
    CoordinateMismatch{file: PathBuf, varname: String, index: usize},
    #[error("{file} is not a flattened daily container")]
    NotFlattened{file: PathBuf},
    #[error("Container {file} is inconsistent: {reason}")]
    InconsistentContainer{file: PathBuf, reason: String},
    #[error("Date {date} appears more than once in the merged time series")]
    DuplicateDate{date: i32},
    #[error("No days between {start} and {end} were found in any yearly container")]
    NoDataInRange{start: i32, end: i32},
    #[error("Yearly container for {year} not found at {file}")]
    MissingYearContainer{year: i32, file: PathBuf},
    #[error("Integrity check failed for {years:?}")]
    IntegrityCheckFailed{years: Vec<i32>},
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Error walking directory tree: {0}")]
    WalkError(#[from] walkdir::Error),
    #[error("Could not parse configuration file: {0}")]
    ConfigDeError(#[from] toml::de::Error),
    #[error("Could not serialize configuration: {0}")]
    ConfigSerError(#[from] toml::ser::Error),
    #[error("Internal error in aggregation code, cause: {0}")]
    InternalError(String),
}

impl SmapError {
    pub fn from_nc_error(nc_error: netcdf::error::Error, file: PathBuf) -> Self {
        Self::NetcdfError { nc_error, file }
    }

    pub fn from_shape_error(nd_error: ndarray::ShapeError, file: PathBuf, varname: String) -> Self {
        Self::NetcdfShapeError { file, varname, nd_error }
    }
}
