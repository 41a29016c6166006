use std::path::PathBuf;

use log::{info, warn};

use crate::aggregate::{aggregate_year, AggregationSettings};
use crate::config::PipelineConfig;
use crate::container::FlatContainer;
use crate::error::SmapError;
use crate::granule::NcGranuleReader;
use crate::integrity::{check_year, transfer_granules, IntegrityReport};
use crate::locator::GranuleLocator;
use crate::merge::merge_containers;
use crate::utils::{date_to_int, ShowProgress};

/// Check each year's raw granules under `source_root` and, if a year passes and
/// `transfer` is allowed, copy/move its granules into that year's source directory.
pub fn run_check(config: &PipelineConfig, years: &[i32], transfer: bool) -> Result<Vec<IntegrityReport>, SmapError> {
    let locator = GranuleLocator::new(config.calendar())?;
    let mut rng = rand::thread_rng();
    let mut reports = Vec::with_capacity(years.len());

    for &year in years {
        info!("=== Checking {year} granules ===");
        let groups = locator.gather(&config.source_root, year)?;
        if groups.is_empty() {
            warn!("No granules for {year} found under {}", config.source_root.display());
        }

        let report = check_year(&groups, year, config.check.sample_size, &mut rng);
        report.log_summary();

        if !report.passed() {
            warn!("Problems found in {year}, granules were not transferred");
        } else if transfer && !groups.is_empty() {
            transfer_granules(&groups, &config.year_source_dir(year)?, config.check.transfer)?;
        }
        reports.push(report);
    }

    Ok(reports)
}

/// Aggregate each year's granules into a daily container. Years with no granules
/// or no complete days are skipped; returns the containers written.
pub fn run_aggregate(config: &PipelineConfig, years: &[i32], show_progress: ShowProgress) -> Result<Vec<PathBuf>, SmapError> {
    let locator = GranuleLocator::new(config.calendar())?;
    let settings = AggregationSettings::from(config);
    let mut written = Vec::new();

    for &year in years {
        let src = config.year_source_dir(year)?;
        if !src.is_dir() {
            warn!("{} does not exist, skipping {year}", src.display());
            continue;
        }

        let groups = locator.gather(&src, year)?;
        if groups.is_empty() {
            warn!("No granules found in {}, skipping {year}", src.display());
            continue;
        }
        info!("{year}: found {} granules over {} days", groups.num_granules(), groups.num_days());

        let container = if let Some(c) = aggregate_year(&NcGranuleReader, &groups, year, &config.bbox, settings, &show_progress)? {
            c
        } else {
            warn!("{year} has no complete days, nothing written");
            continue;
        };

        let out = config.year_container_path(year)?;
        container.write(&out)?;
        info!("{year} -> {}  (days={}, flat N={})", out.display(), container.num_days(), container.num_points());
        written.push(out);
    }

    Ok(written)
}

/// Merge the configured years' containers into the single file named in `[merge]`.
pub fn run_merge(config: &PipelineConfig) -> Result<PathBuf, SmapError> {
    let merge = config.merge.as_ref()
        .ok_or_else(|| SmapError::InvalidConfig("a [merge] section is required to merge yearly containers".to_owned()))?;

    let mut inputs = Vec::with_capacity(config.years.len());
    for &year in &config.years {
        let path = config.year_container_path(year)?;
        if !path.exists() {
            return Err(SmapError::MissingYearContainer { year, file: path });
        }
        let container = FlatContainer::load(&path)?;
        inputs.push((path, container));
    }

    info!("Stitching {} yearly containers along the time dimension", inputs.len());
    let merged = merge_containers(&inputs, date_to_int(merge.start), date_to_int(merge.end))?;
    let sources: Vec<PathBuf> = inputs.into_iter().map(|(p, _)| p).collect();
    merged.write(&merge.output_file, &sources)?;

    info!("Merged file saved to {}  (days = {})", merge.output_file.display(), merged.num_days());
    Ok(merge.output_file.clone())
}
