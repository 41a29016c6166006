use std::{path::PathBuf, io::Write};

use chrono::{Datelike, NaiveDate};
use clap::Parser;
use smap_l4_daily::{error::SmapError, config::{BoundingBox, CalendarRuleConfig, CheckConfig, MergeConfig, PipelineConfig, TransferMode}};

fn main() -> Result<(), SmapError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = MainArgs::parse();

    if args.start_date > args.end_date {
        return Err(SmapError::InvalidConfig(format!(
            "start date {} is after end date {}", args.start_date, args.end_date
        )));
    }

    let years = (args.start_date.year()..=args.end_date.year()).collect();

    // A span that starts mid-year gets a rule so that granules from before the start
    // of that year's collection are rejected when grouping
    let calendar_rules = if args.start_date.ordinal() > 1 {
        vec![CalendarRuleConfig { year: args.start_date.year(), start: args.start_date, offset_days: 0 }]
    } else {
        Vec::new()
    };

    let merged_file = args.merged_file.unwrap_or_else(|| {
        let name = format!("SMAP_{}_{}_merged.h5", args.start_date.year(), args.end_date.year());
        args.output_dir.join(name)
    });

    let cfg = PipelineConfig {
        source_root: args.source_root,
        year_dir: args.year_dir,
        output_dir: args.output_dir,
        year_file_format: args.year_file_format,
        years,
        strict: !args.lenient,
        sentinel_threshold: args.sentinel_threshold,
        verify_coordinates: args.verify_coordinates,
        bbox: BoundingBox { lat_min: args.lat_min, lat_max: args.lat_max, lon_min: args.lon_min, lon_max: args.lon_max },
        calendar_rules,
        merge: Some(MergeConfig { start: args.start_date, end: args.end_date, output_file: merged_file }),
        check: CheckConfig { sample_size: args.sample_size, transfer: args.transfer.into() },
    };
    cfg.validate()?;

    let cfg_str = toml::to_string_pretty(&cfg)?;
    let mut f = std::fs::File::create(&args.config_file)?;
    write!(f, "{}", cfg_str)?;
    log::info!("Wrote configuration for {} year(s) to {}", cfg.years.len(), args.config_file.display());
    Ok(())
}

/// Create a TOML file appropriate to pass to the `check`, `aggregate` and `merge`
/// subcommands of smap-l4-daily
#[derive(Debug, Parser)]
struct MainArgs {
    /// Root directory that the raw SMAP L4 granules are found under
    source_root: PathBuf,

    /// Directory to write the yearly daily containers to
    output_dir: PathBuf,

    /// First day of the time series, in YYYY-MM-DD format. If this is not January 1st,
    /// granules from earlier in that year will be rejected.
    start_date: NaiveDate,

    /// Last day (inclusive) of the merged time series, in YYYY-MM-DD format.
    end_date: NaiveDate,

    /// Path to write the configuration file as.
    config_file: PathBuf,

    /// Directory under SOURCE_ROOT holding one year's granules. This can include format
    /// substrings recognized by chrono, e.g. %Y for the four-digit year. See
    /// https://docs.rs/chrono/latest/chrono/format/strftime/index.html for the full list.
    #[arg(long, default_value = "%Y")]
    year_dir: String,

    /// Pattern for the yearly container file names, formatted like --year-dir.
    #[arg(long, default_value = "%Y_daily.h5")]
    year_file_format: String,

    /// Path for the merged container. Defaults to SMAP_<start year>_<end year>_merged.h5
    /// in OUTPUT_DIR.
    #[arg(long)]
    merged_file: Option<PathBuf>,

    #[arg(long, default_value_t = 18.0, allow_negative_numbers = true)]
    lat_min: f32,

    #[arg(long, default_value_t = 54.0, allow_negative_numbers = true)]
    lat_max: f32,

    #[arg(long, default_value_t = 73.0, allow_negative_numbers = true)]
    lon_min: f32,

    #[arg(long, default_value_t = 136.0, allow_negative_numbers = true)]
    lon_max: f32,

    /// Values below this are treated as missing data
    #[arg(long, default_value_t = -9000.0, allow_negative_numbers = true)]
    sentinel_threshold: f32,

    /// Skip days missing a time code instead of failing the year
    #[clap(long)]
    lenient: bool,

    /// Check every granule's coordinates against the first granule of its year
    #[clap(long)]
    verify_coordinates: bool,

    /// Number of granules per year the `check` subcommand opens
    #[arg(long, default_value_t = 100)]
    sample_size: usize,

    /// What `check` does with a year's granules once they pass: none, copy or move
    #[arg(long, value_enum, default_value_t = TransferModeArg::None)]
    transfer: TransferModeArg,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum TransferModeArg {
    None,
    Copy,
    Move,
}

impl From<TransferModeArg> for TransferMode {
    fn from(value: TransferModeArg) -> Self {
        match value {
            TransferModeArg::None => TransferMode::None,
            TransferModeArg::Copy => TransferMode::Copy,
            TransferModeArg::Move => TransferMode::Move,
        }
    }
}
