use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{info, warn};
use ndarray::Array2;

use crate::config::{BoundingBox, PipelineConfig};
use crate::container::YearContainer;
use crate::crop::CropWindow;
use crate::error::SmapError;
use crate::granule::{GranuleReader, ReferenceGrid};
use crate::locator::{DayGroup, DayGroups, TIME_CODES};
use crate::utils::{first_mismatch, progress_bar, MaskedMean, ShowProgress};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationSettings {
    pub strict: bool,
    pub sentinel_threshold: f32,
    pub verify_coordinates: bool,
}

impl From<&PipelineConfig> for AggregationSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            strict: cfg.strict,
            sentinel_threshold: cfg.sentinel_threshold,
            verify_coordinates: cfg.verify_coordinates,
        }
    }
}

/// Mean of one day's 8 cropped fields
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRaster {
    pub date: NaiveDate,
    pub values: Array2<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DayOutcome {
    Complete(Array2<f32>),
    /// Time codes that were absent or could not be read
    Incomplete(Vec<String>),
}

pub struct DailyAggregator<'r, R: GranuleReader> {
    reader: &'r R,
    year: i32,
    grid: ReferenceGrid,
    window: CropWindow,
    settings: AggregationSettings,
}

impl<'r, R: GranuleReader> DailyAggregator<'r, R> {
    /// Set up aggregation for one year on the given reference grid.
    pub fn new(reader: &'r R, year: i32, grid: ReferenceGrid, bbox: &BoundingBox, settings: AggregationSettings) -> Result<Self, SmapError> {
        let window = CropWindow::from_grid(&grid, bbox)?;
        info!("{year}: cropping {:?} grid to {:?}", grid.shape(), window.shape());
        Ok(Self { reader, year, grid, window, settings })
    }

    pub fn grid(&self) -> &ReferenceGrid {
        &self.grid
    }

    pub fn window(&self) -> &CropWindow {
        &self.window
    }

    /// Average a day's granules. Absent time codes are reported without reading
    /// anything; otherwise every granule is read and all that fail are reported.
    pub fn average_day(&self, day: &DayGroup) -> Result<DayOutcome, SmapError> {
        let missing = day.missing_codes();
        if !missing.is_empty() {
            return Ok(DayOutcome::Incomplete(missing.into_iter().map(String::from).collect()));
        }

        let mut acc = MaskedMean::new(self.window.shape(), self.settings.sentinel_threshold);
        let mut unreadable = Vec::new();
        for tc in TIME_CODES {
            let path = day.get(tc)
                .ok_or_else(|| SmapError::InternalError(format!("No granule for time code {tc} after checking it was present")))?;

            let field = match self.reader.read_field(path) {
                Ok(f) => f,
                Err(e) => {
                    warn!("Could not read {}: {e}", path.display());
                    unreadable.push(tc.to_owned());
                    continue;
                }
            };

            if field.dim() != self.grid.shape() {
                return Err(SmapError::GridShapeMismatch { file: path.to_owned(), expected: self.grid.shape(), actual: field.dim() });
            }
            if self.settings.verify_coordinates {
                self.verify_grid(path)?;
            }

            acc.add(self.window.crop(field.view()).view())?;
        }

        if unreadable.is_empty() {
            Ok(DayOutcome::Complete(acc.mean()))
        } else {
            Ok(DayOutcome::Incomplete(unreadable))
        }
    }

    fn verify_grid(&self, granule: &Path) -> Result<(), SmapError> {
        let grid = self.reader.read_grid(granule)?;
        if let Some(index) = first_mismatch(grid.latitude.view(), self.grid.latitude.view()) {
            return Err(SmapError::CoordinateMismatch { file: granule.to_owned(), varname: "latitude".to_owned(), index });
        }
        if let Some(index) = first_mismatch(grid.longitude.view(), self.grid.longitude.view()) {
            return Err(SmapError::CoordinateMismatch { file: granule.to_owned(), varname: "longitude".to_owned(), index });
        }
        Ok(())
    }

    /// Average every day in `groups`, in date order. In strict mode the first
    /// incomplete day aborts the whole year; otherwise it is skipped with a warning.
    pub fn aggregate(&self, groups: &DayGroups, show_progress: &ShowProgress) -> Result<Vec<DailyRaster>, SmapError> {
        let pb = progress_bar(groups.num_days() as u64, format!("Averaging {} days", self.year), show_progress);
        let mut rasters = Vec::with_capacity(groups.num_days());

        for (&date, day) in groups.iter() {
            match self.average_day(day)? {
                DayOutcome::Complete(values) => rasters.push(DailyRaster { date, values }),
                DayOutcome::Incomplete(missing) => {
                    let err = SmapError::MissingTimeCodes { year: self.year, day: date.format("%Y%m%d").to_string(), missing };
                    if self.settings.strict {
                        pb.abandon();
                        return Err(err);
                    }
                    warn!("{err}, skipping this day");
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(rasters)
    }

    pub fn build_container(&self, rasters: &[DailyRaster]) -> Result<YearContainer, SmapError> {
        YearContainer::from_daily_rasters(
            rasters,
            self.window.cropped_latitude(&self.grid),
            self.window.cropped_longitude(&self.grid),
        )
    }
}

/// The grid of the first granule, in path order, whose coordinates can be read.
/// Granules that fail are skipped with a warning; they will also fail as fields and
/// so count as missing time codes for their day.
pub fn find_reference_grid<R: GranuleReader>(reader: &R, groups: &DayGroups) -> Option<(PathBuf, ReferenceGrid)> {
    for path in groups.all_paths() {
        match reader.read_grid(&path) {
            Ok(grid) => return Some((path, grid)),
            Err(e) => warn!("Cannot take the reference grid from {}: {e}", path.display()),
        }
    }
    None
}

/// Crop and average one year of granules. Returns `None` when no day qualified, in
/// which case no container should be written.
pub fn aggregate_year<R: GranuleReader>(
    reader: &R,
    groups: &DayGroups,
    year: i32,
    bbox: &BoundingBox,
    settings: AggregationSettings,
    show_progress: &ShowProgress
) -> Result<Option<YearContainer>, SmapError> {
    let (first_day, _) = if let Some(d) = groups.iter().next() {
        d
    } else {
        return Ok(None)
    };

    let (grid_file, grid) = if let Some(g) = find_reference_grid(reader, groups) {
        g
    } else if settings.strict {
        // Nothing in the year could be read, so the first day has no usable time code
        return Err(SmapError::MissingTimeCodes {
            year,
            day: first_day.format("%Y%m%d").to_string(),
            missing: TIME_CODES.iter().map(|tc| tc.to_string()).collect(),
        });
    } else {
        warn!("{year}: no granule could be read");
        return Ok(None)
    };

    info!("{year}: reference grid {:?} from {}", grid.shape(), grid_file.display());
    let aggregator = DailyAggregator::new(reader, year, grid, bbox, settings)?;
    let rasters = aggregator.aggregate(groups, show_progress)?;
    if rasters.is_empty() {
        return Ok(None)
    }
    aggregator.build_container(&rasters).map(Some)
}
