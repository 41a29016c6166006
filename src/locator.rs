use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::calendar::CalendarRules;
use crate::error::SmapError;

/// The 8 UTC acquisition times (hhmmss) of SMAP L4 granules within each day.
pub const TIME_CODES: [&str; 8] = [
    "013000", "043000", "073000", "103000",
    "133000", "163000", "193000", "223000",
];

const GRANULE_PATTERN: &str = r"(?i)SMAP_L4_SM_gph_(\d{8})T(\d{6})_.*\.he?5$";

/// The granules of one calendar day, keyed by time code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayGroup {
    granules: BTreeMap<String, PathBuf>,
}

impl DayGroup {
    pub fn get(&self, time_code: &str) -> Option<&Path> {
        self.granules.get(time_code).map(|p| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.granules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.granules.is_empty()
    }

    /// Canonical time codes that have no granule for this day, in canonical order
    pub fn missing_codes(&self) -> Vec<&'static str> {
        TIME_CODES.iter()
            .copied()
            .filter(|tc| !self.granules.contains_key(*tc))
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.granules.values().map(|p| p.as_path())
    }

    /// Add a granule; returns `false` (and leaves the group unchanged) if this time
    /// code already has one.
    fn insert(&mut self, time_code: String, path: PathBuf) -> bool {
        if self.granules.contains_key(&time_code) {
            return false;
        }
        self.granules.insert(time_code, path);
        true
    }
}

/// A year's granules grouped by (possibly calendar-adjusted) day
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayGroups {
    days: BTreeMap<NaiveDate, DayGroup>,
}

impl DayGroups {
    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &DayGroup)> {
        self.days.iter()
    }

    pub fn get(&self, day: &NaiveDate) -> Option<&DayGroup> {
        self.days.get(day)
    }

    pub fn num_days(&self) -> usize {
        self.days.len()
    }

    pub fn num_granules(&self) -> usize {
        self.days.values().map(|g| g.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Every granule, sorted by path
    pub fn all_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.days.values()
            .flat_map(|g| g.paths().map(|p| p.to_owned()))
            .collect();
        paths.sort();
        paths
    }

    /// The granule that defines the year's reference grid: the first one in path order
    pub fn first_granule(&self) -> Option<&Path> {
        self.days.values().flat_map(|g| g.paths()).min()
    }

    pub fn insert(&mut self, day: NaiveDate, time_code: String, path: PathBuf) -> bool {
        self.days.entry(day).or_default().insert(time_code, path)
    }
}

#[derive(Debug)]
pub struct GranuleLocator {
    pattern: Regex,
    calendar: CalendarRules,
}

impl GranuleLocator {
    pub fn new(calendar: CalendarRules) -> Result<Self, SmapError> {
        let pattern = Regex::new(GRANULE_PATTERN)
            .map_err(|e| SmapError::InternalError(format!("Invalid granule file name pattern: {e}")))?;
        Ok(Self { pattern, calendar })
    }

    /// Extract the acquisition date and time code from a granule file name. Returns
    /// `None` for names that do not follow the SMAP L4 convention.
    pub fn parse_name(&self, file_name: &str) -> Option<(NaiveDate, String)> {
        let caps = self.pattern.captures(file_name)?;
        let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y%m%d").ok()?;
        let time_code = caps.get(2)?.as_str().to_owned();
        Some((date, time_code))
    }

    /// Recursively find the granules for `year` under `root`, grouped by day.
    pub fn gather(&self, root: &Path, year: i32) -> Result<DayGroups, SmapError> {
        let mut groups = DayGroups::default();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            let (date, time_code) = if let Some(parsed) = self.parse_name(&name) {
                parsed
            } else {
                continue;
            };

            if date.year() != year {
                continue;
            }

            if !TIME_CODES.contains(&time_code.as_str()) {
                debug!("Ignoring {} with non-standard time code {time_code}", entry.path().display());
                continue;
            }

            let day = match self.calendar.adjust(date) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Skipping {name}: {e}");
                    continue;
                }
            };

            if !groups.insert(day, time_code.clone(), entry.path().to_owned()) {
                warn!("Duplicate granule for {day} {time_code}, ignoring {}", entry.path().display());
            }
        }

        Ok(groups)
    }
}
