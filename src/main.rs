use clap::{Parser, Subcommand};
use smap_l4_daily::config::{AggregateArgs, CheckArgs, MergeArgs, PipelineConfig};
use smap_l4_daily::error::SmapError;
use smap_l4_daily::pipeline;
use smap_l4_daily::utils::ShowProgress;

fn main() -> Result<(), SmapError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::parse();

    match args.command {
        Commands::Check(args) => driver_check(args),
        Commands::Aggregate(args) => driver_aggregate(args),
        Commands::Merge(args) => driver_merge(args),
    }
}

fn driver_check(args: CheckArgs) -> Result<(), SmapError> {
    let cfg = PipelineConfig::from_toml_file(&args.config_file)?;
    let years = args.year.map(|y| vec![y]).unwrap_or_else(|| cfg.years.clone());

    let reports = pipeline::run_check(&cfg, &years, !args.dry_run)?;
    let failed: Vec<i32> = reports.iter().filter(|r| !r.passed()).map(|r| r.year).collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(SmapError::IntegrityCheckFailed { years: failed })
    }
}

fn driver_aggregate(args: AggregateArgs) -> Result<(), SmapError> {
    let mut cfg = PipelineConfig::from_toml_file(&args.config_file)?;
    if args.lenient {
        cfg.strict = false;
    }
    let years = if args.year.is_empty() { cfg.years.clone() } else { args.year };
    let show_progress = if args.no_progress { ShowProgress::No } else { ShowProgress::Yes };

    pipeline::run_aggregate(&cfg, &years, show_progress)?;
    Ok(())
}

fn driver_merge(args: MergeArgs) -> Result<(), SmapError> {
    let cfg = PipelineConfig::from_toml_file(&args.config_file)?;
    pipeline::run_merge(&cfg)?;
    Ok(())
}

/// Build daily, cropped SMAP L4 root zone soil moisture time series from 3-hourly granules
#[derive(Debug, Parser)]
struct Cli {
    #[clap(subcommand)]
    command: Commands
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Verify that a year of raw granules is complete, then optionally copy or move them
    /// into the directory that `aggregate` reads
    Check(CheckArgs),
    /// Crop and average each year's granules into one daily container per year
    Aggregate(AggregateArgs),
    /// Concatenate yearly containers into one continuous flattened time series
    Merge(MergeArgs),
}
