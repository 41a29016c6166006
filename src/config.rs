use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate};
use clap::Args;
use serde::{Serialize, Deserialize};

use crate::calendar::{CalendarRules, MissionStart};
use crate::error::SmapError;

/// Geographic box that the yearly rasters are cropped to. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f32,
    pub lat_max: f32,
    pub lon_min: f32,
    pub lon_max: f32,
}

impl BoundingBox {
    pub fn validate(&self) -> Result<(), SmapError> {
        if !(self.lat_min <= self.lat_max) {
            return Err(SmapError::InvalidConfig(format!(
                "bbox.lat_min ({}) must not exceed bbox.lat_max ({})", self.lat_min, self.lat_max
            )));
        }
        if !(self.lon_min <= self.lon_max) {
            return Err(SmapError::InvalidConfig(format!(
                "bbox.lon_min ({}) must not exceed bbox.lon_max ({})", self.lon_min, self.lon_max
            )));
        }
        Ok(())
    }

    pub fn contains_lat(&self, lat: f32) -> bool {
        lat >= self.lat_min && lat <= self.lat_max
    }

    pub fn contains_lon(&self, lon: f32) -> bool {
        lon >= self.lon_min && lon <= self.lon_max
    }
}

/// A year whose data collection began partway through, so that granules before
/// `start` are rejected and the rest are relabeled by `offset_days`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarRuleConfig {
    pub year: i32,
    pub start: NaiveDate,
    #[serde(default)]
    pub offset_days: i64,
}

impl CalendarRuleConfig {
    /// The rule must start within its own year and every day it relabels (from
    /// `start` through December 31st) must stay within that year.
    pub fn validate(&self) -> Result<(), SmapError> {
        if self.start.year() != self.year {
            return Err(SmapError::InvalidConfig(format!(
                "calendar rule for {} starts on {}, which is in a different year", self.year, self.start
            )));
        }

        let out_of_year = || SmapError::InvalidConfig(format!(
            "calendar rule for {}: offset_days = {} moves dates out of {}", self.year, self.offset_days, self.year
        ));
        if !(-366..=366).contains(&self.offset_days) {
            return Err(out_of_year());
        }
        let shift = Duration::days(self.offset_days);
        let last = NaiveDate::from_ymd_opt(self.year, 12, 31)
            .ok_or_else(|| SmapError::InvalidConfig(format!("{} is not a valid year", self.year)))?;
        for day in [self.start, last] {
            match day.checked_add_signed(shift) {
                Some(d) if d.year() == self.year => (),
                _ => return Err(out_of_year()),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// First date (inclusive) to keep in the merged time series
    pub start: NaiveDate,
    /// Last date (inclusive) to keep in the merged time series
    pub end: NaiveDate,
    /// Path to write the merged container to
    pub output_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Leave granules where they are after checking them
    #[default]
    None,
    Copy,
    Move,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Number of granules to open and inspect per year
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// What to do with a year's granules once they pass the checks. They go into
    /// that year's source directory (see `year_dir`).
    #[serde(default)]
    pub transfer: TransferMode,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self { sample_size: default_sample_size(), transfer: TransferMode::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory that raw granules are found under
    pub source_root: PathBuf,
    /// Directory (relative to `source_root`) holding one year's granules. Chrono
    /// format specifiers are filled in with January 1st of that year.
    #[serde(default = "default_year_dir")]
    pub year_dir: String,
    /// Directory the yearly daily containers are written to
    pub output_dir: PathBuf,
    /// File name pattern for the yearly containers, formatted like `year_dir`
    #[serde(default = "default_year_file_format")]
    pub year_file_format: String,
    pub years: Vec<i32>,
    /// Abort a year's aggregation when a day lacks a time code, rather than skipping the day
    #[serde(default = "default_strict")]
    pub strict: bool,
    /// Field values below this are treated as missing
    #[serde(default = "default_sentinel_threshold")]
    pub sentinel_threshold: f32,
    /// Compare every granule's coordinates against the year's reference grid
    #[serde(default)]
    pub verify_coordinates: bool,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub calendar_rules: Vec<CalendarRuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeConfig>,
    #[serde(default)]
    pub check: CheckConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, SmapError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, SmapError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), SmapError> {
        self.bbox.validate()?;
        if self.years.is_empty() {
            return Err(SmapError::InvalidConfig("at least one year must be listed in `years`".to_owned()));
        }
        if let Some(merge) = &self.merge {
            if merge.start > merge.end {
                return Err(SmapError::InvalidConfig(format!(
                    "merge.start ({}) is after merge.end ({})", merge.start, merge.end
                )));
            }
        }
        for (i, rule) in self.calendar_rules.iter().enumerate() {
            if self.calendar_rules[..i].iter().any(|r| r.year == rule.year) {
                return Err(SmapError::InvalidConfig(format!("more than one calendar rule for {}", rule.year)));
            }
            rule.validate()?;
        }
        Ok(())
    }

    pub fn year_source_dir(&self, year: i32) -> Result<PathBuf, SmapError> {
        let jan1 = jan_first(year)?;
        Ok(self.source_root.join(jan1.format(&self.year_dir).to_string()))
    }

    pub fn year_container_path(&self, year: i32) -> Result<PathBuf, SmapError> {
        let jan1 = jan_first(year)?;
        Ok(self.output_dir.join(jan1.format(&self.year_file_format).to_string()))
    }

    pub fn calendar(&self) -> CalendarRules {
        let mut rules = CalendarRules::new();
        for r in &self.calendar_rules {
            rules.insert(r.year, MissionStart::new(r.start, r.offset_days));
        }
        rules
    }
}

fn jan_first(year: i32) -> Result<NaiveDate, SmapError> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| SmapError::InvalidConfig(format!("{year} is not a valid year")))
}

fn default_year_dir() -> String {
    "%Y".to_owned()
}

fn default_year_file_format() -> String {
    "%Y_daily.h5".to_owned()
}

fn default_strict() -> bool {
    true
}

fn default_sentinel_threshold() -> f32 {
    -9000.0
}

fn default_sample_size() -> usize {
    100
}


#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Path to the TOML configuration file
    pub config_file: PathBuf,

    /// Check only this year rather than every year listed in the configuration
    #[clap(short, long)]
    pub year: Option<i32>,

    /// Report problems but never copy or move granules, regardless of `check.transfer`
    #[clap(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    /// Path to the TOML configuration file
    pub config_file: PathBuf,

    /// Aggregate only these years rather than every year listed in the configuration
    #[clap(short, long)]
    pub year: Vec<i32>,

    /// Skip incomplete days with a warning instead of aborting the year
    #[clap(long)]
    pub lenient: bool,

    /// Do not display the per-day progress bar
    #[clap(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Path to the TOML configuration file; it must have a [merge] section
    pub config_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
source_root = "/data/SMAP"
output_dir = "/data/SMAP/SMAP_daily"
years = [2015, 2016]

[bbox]
lat_min = 18.0
lat_max = 54.0
lon_min = 73.0
lon_max = 136.0

[[calendar_rules]]
year = 2015
start = "2015-03-31"

[merge]
start = "2015-03-31"
end = "2016-12-31"
output_file = "/data/SMAP/SMAP_daily/SMAP_2015_2016_merged.h5"
"#;

    #[test]
    fn test_defaults_filled_in() {
        let cfg = PipelineConfig::from_toml_str(EXAMPLE).unwrap();
        assert!(cfg.strict);
        assert!(!cfg.verify_coordinates);
        assert_eq!(cfg.sentinel_threshold, -9000.0);
        assert_eq!(cfg.check.sample_size, 100);
        assert_eq!(cfg.check.transfer, TransferMode::None);
        assert_eq!(cfg.calendar_rules[0].offset_days, 0);
        assert_eq!(cfg.merge.unwrap().start, NaiveDate::from_ymd_opt(2015, 3, 31).unwrap());
    }

    #[test]
    fn test_year_paths() {
        let cfg = PipelineConfig::from_toml_str(EXAMPLE).unwrap();
        assert_eq!(cfg.year_source_dir(2019).unwrap(), PathBuf::from("/data/SMAP/2019"));
        assert_eq!(cfg.year_container_path(2019).unwrap(), PathBuf::from("/data/SMAP/SMAP_daily/2019_daily.h5"));
    }

    #[test]
    fn test_inverted_bbox_rejected() {
        let s = EXAMPLE.replace("lat_max = 54.0", "lat_max = 10.0");
        let err = PipelineConfig::from_toml_str(&s).unwrap_err();
        assert!(matches!(err, SmapError::InvalidConfig(_)));
    }

    #[test]
    fn test_calendar_offset_must_stay_in_year() {
        let s = EXAMPLE.replace("start = \"2015-03-31\"\n\n", "start = \"2015-03-31\"\noffset_days = -100\n\n");
        assert_ne!(s, EXAMPLE);
        let err = PipelineConfig::from_toml_str(&s).unwrap_err();
        assert!(matches!(err, SmapError::InvalidConfig(_)));

        // Any positive offset pushes December 31st into the next year
        let s = EXAMPLE.replace("start = \"2015-03-31\"\n\n", "start = \"2015-03-31\"\noffset_days = 1\n\n");
        assert!(PipelineConfig::from_toml_str(&s).is_err());

        let s = EXAMPLE.replace("start = \"2015-03-31\"\n\n", "start = \"2015-03-31\"\noffset_days = -89\n\n");
        assert_eq!(PipelineConfig::from_toml_str(&s).unwrap().calendar_rules[0].offset_days, -89);

        let s = EXAMPLE.replace("year = 2015\nstart = \"2015-03-31\"", "year = 2016\nstart = \"2015-03-31\"");
        assert!(PipelineConfig::from_toml_str(&s).is_err());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let cfg = PipelineConfig::from_toml_str(EXAMPLE).unwrap();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let cfg2 = PipelineConfig::from_toml_str(&s).unwrap();
        assert_eq!(cfg, cfg2);
    }
}
