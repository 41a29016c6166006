//! SMAP L4 granules come in two internal layouts. Older HDF-EOS5 files nest every
//! field below an `HDFEOS` group; newer files put the coordinates at the root and
//! the geophysical fields in one shallow group.
use std::collections::HashSet;
use std::path::Path;

use crate::error::SmapError;

/// Top-level group whose presence marks the hierarchical layout
pub const HIERARCHICAL_MARKER: &str = "HDFEOS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    Hierarchical,
    Flat,
}

/// Where each field lives inside a granule. Only the latitude, longitude and
/// geophysical paths are needed to aggregate; the rest are used by integrity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPaths {
    pub column_index: Option<&'static str>,
    pub latitude: &'static str,
    pub longitude: &'static str,
    pub row_index: Option<&'static str>,
    pub grid_x: Option<&'static str>,
    pub grid_y: Option<&'static str>,
    pub geophysical: &'static str,
}

const HIERARCHICAL_PATHS: FieldPaths = FieldPaths {
    column_index: Some("HDFEOS/GRIDS/FileMainGroup/Data Fields/cell_column"),
    latitude: "HDFEOS/GRIDS/FileMainGroup/Data Fields/cell_lat",
    longitude: "HDFEOS/GRIDS/FileMainGroup/Data Fields/cell_lon",
    row_index: Some("HDFEOS/GRIDS/FileMainGroup/Data Fields/cell_row"),
    grid_x: Some("HDFEOS/GRIDS/FileMainGroup/XDim"),
    grid_y: Some("HDFEOS/GRIDS/FileMainGroup/YDim"),
    geophysical: "HDFEOS/GRIDS/Geophysical_Data/Data Fields/sm_rootzone",
};

const FLAT_PATHS: FieldPaths = FieldPaths {
    column_index: None,
    latitude: "cell_lat",
    longitude: "cell_lon",
    row_index: None,
    grid_x: None,
    grid_y: None,
    geophysical: "Geophysical_Data/sm_rootzone",
};

impl FieldPaths {
    /// Every key a structurally complete granule of this layout must contain
    pub fn required_keys(&self) -> Vec<&'static str> {
        [self.column_index, Some(self.latitude), Some(self.longitude), self.row_index,
         self.grid_x, self.grid_y, Some(self.geophysical)]
            .into_iter()
            .flatten()
            .collect()
    }

    /// The keys aggregation cannot proceed without
    pub fn essential_keys(&self) -> [&'static str; 3] {
        [self.latitude, self.longitude, self.geophysical]
    }
}

/// What the resolver needs to know about an open granule
pub trait GranuleProbe {
    fn has_group(&self, path: &str) -> bool;

    /// Whether any group, variable or dimension exists at `path`
    fn contains(&self, path: &str) -> bool;
}

impl GranuleProbe for netcdf::File {
    fn has_group(&self, path: &str) -> bool {
        matches!(self.group(path), Ok(Some(_)))
    }

    fn contains(&self, path: &str) -> bool {
        self.variable(path).is_some() || self.has_group(path) || self.dimension(path).is_some()
    }
}

/// A set of paths standing in for a granule's contents
impl GranuleProbe for HashSet<&str> {
    fn has_group(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        self.iter().any(|k| k.starts_with(&prefix))
    }

    fn contains(&self, path: &str) -> bool {
        HashSet::contains(self, path) || self.has_group(path)
    }
}

impl SchemaVariant {
    pub fn resolve<P: GranuleProbe + ?Sized>(probe: &P) -> Self {
        if probe.has_group(HIERARCHICAL_MARKER) {
            Self::Hierarchical
        } else {
            Self::Flat
        }
    }

    /// Resolve the layout and confirm the fields aggregation needs are present.
    pub fn resolve_checked<P: GranuleProbe + ?Sized>(probe: &P, file: &Path) -> Result<Self, SmapError> {
        let variant = Self::resolve(probe);
        if variant.field_paths().essential_keys().iter().all(|k| probe.contains(k)) {
            Ok(variant)
        } else {
            Err(SmapError::UnknownSchema { file: file.to_owned() })
        }
    }

    pub fn field_paths(self) -> FieldPaths {
        match self {
            Self::Hierarchical => HIERARCHICAL_PATHS,
            Self::Flat => FLAT_PATHS,
        }
    }
}

/// Keys required by the granule's layout that it does not contain
pub fn missing_keys<P: GranuleProbe + ?Sized>(probe: &P) -> Vec<&'static str> {
    SchemaVariant::resolve(probe)
        .field_paths()
        .required_keys()
        .into_iter()
        .filter(|k| !probe.contains(k))
        .collect()
}
