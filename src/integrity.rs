//! Pre-aggregation checks on a year of raw granules: does every day have all 8
//! time codes, and does a random sample of granules contain the fields its layout
//! requires. Once a year passes, its granules can be copied or moved into the
//! directory the aggregation reads from.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::TransferMode;
use crate::error::SmapError;
use crate::locator::DayGroups;
use crate::schema::missing_keys;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteDay {
    pub day: NaiveDate,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranuleProblems {
    pub file: PathBuf,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub year: i32,
    pub num_granules: usize,
    pub incomplete_days: Vec<IncompleteDay>,
    pub num_sampled: usize,
    pub bad_granules: Vec<GranuleProblems>,
}

impl IntegrityReport {
    pub fn passed(&self) -> bool {
        self.incomplete_days.is_empty() && self.bad_granules.is_empty()
    }

    pub fn log_summary(&self) {
        for d in &self.incomplete_days {
            warn!("[missing time codes] {} lacks {}", d.day.format("%Y-%m-%d"), d.missing.join(", "));
        }
        if self.incomplete_days.is_empty() {
            info!("{}: every day has all 8 granules ({} granules total)", self.year, self.num_granules);
        }

        for g in &self.bad_granules {
            warn!("[missing content] {}", g.file.display());
            for p in &g.problems {
                warn!("   -> {p}");
            }
        }
        if self.bad_granules.is_empty() {
            info!("{}: all {} sampled granules are complete", self.year, self.num_sampled);
        }
    }
}

pub fn check_daily_counts(groups: &DayGroups) -> Vec<IncompleteDay> {
    groups.iter()
        .filter_map(|(&day, g)| {
            let missing = g.missing_codes();
            if missing.is_empty() {
                None
            } else {
                Some(IncompleteDay { day, missing })
            }
        })
        .collect()
}

/// Up to `n` granules chosen uniformly at random without replacement
pub fn sample_granules<R: Rng + ?Sized>(groups: &DayGroups, n: usize, rng: &mut R) -> Vec<PathBuf> {
    groups.all_paths()
        .choose_multiple(rng, n)
        .cloned()
        .collect()
}

/// List what is wrong with a granule: the keys its layout requires but it lacks,
/// or a single entry if it cannot be opened at all. An empty list means it is fine.
pub fn check_granule(path: &Path) -> Vec<String> {
    match netcdf::open(path) {
        Ok(ds) => missing_keys(&ds).into_iter().map(String::from).collect(),
        Err(e) => vec![format!("[cannot open]: {e}")],
    }
}

pub fn check_year<R: Rng + ?Sized>(groups: &DayGroups, year: i32, sample_size: usize, rng: &mut R) -> IntegrityReport {
    let incomplete_days = check_daily_counts(groups);
    let sample = sample_granules(groups, sample_size, rng);
    let bad_granules = sample.iter()
        .filter_map(|file| {
            let problems = check_granule(file);
            if problems.is_empty() {
                None
            } else {
                Some(GranuleProblems { file: file.clone(), problems })
            }
        })
        .collect();

    IntegrityReport {
        year,
        num_granules: groups.num_granules(),
        incomplete_days,
        num_sampled: sample.len(),
        bad_granules,
    }
}

/// Copy or move every granule in `groups` into `dest`, in path order. Granules
/// already in `dest` are left alone. Returns the number of files transferred.
pub fn transfer_granules(groups: &DayGroups, dest: &Path, mode: TransferMode) -> Result<usize, SmapError> {
    let verb = match mode {
        TransferMode::None => return Ok(0),
        TransferMode::Copy => "Copied",
        TransferMode::Move => "Moved",
    };

    fs::create_dir_all(dest)?;
    let mut n = 0;
    for src in groups.all_paths() {
        let name = src.file_name()
            .ok_or_else(|| SmapError::InternalError(format!("Granule path {} has no file name", src.display())))?;
        let target = dest.join(name);
        if target == src {
            continue;
        }

        if mode == TransferMode::Copy {
            fs::copy(&src, &target)?;
        } else if fs::rename(&src, &target).is_err() {
            // rename fails across filesystems, so fall back to copy + delete
            fs::copy(&src, &target)?;
            fs::remove_file(&src)?;
        }
        n += 1;
    }

    info!("{verb} {n} granules to {}", dest.display());
    Ok(n)
}
