//! CLI tool for querying cached OMNI2 solar-wind data and inspecting cache
//! files.

mod error;
mod output;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use snafu::{OptionExt, ResultExt, ensure};
use timeseries_cache_core::{
    CacheConfig, SegmentCache,
    adapters::omni2::{DEFAULT_UNIT_SIZE, Omni2Adapter, Omni2Config, Omni2Field},
    codec,
    helpers::day_time::{HOUR, parse_days},
};

use crate::{
    error::{
        CacheFileMissingSnafu, CliResult, InspectCacheFileSnafu, InvalidDistanceSnafu,
        InvalidTimeSnafu, OpenCacheSnafu, QuerySnafu, SaveCacheSnafu, UnknownFieldSnafu,
        WriteOutputSnafu,
    },
    output::{render_point, write_gaps, write_inspect, write_range_csv},
};

/// Name of the persisted cache file inside the data directory.
const CACHE_FILE_NAME: &str = "omni2.tscache";

#[derive(Debug, Args)]
struct SourceArgs {
    /// Directory holding the yearly files and the cache file
    #[arg(long)]
    dir: PathBuf,

    /// Download URL with a {year} placeholder
    #[arg(long)]
    url_template: Option<String>,

    /// Use local files only; never download
    #[arg(long)]
    offline: bool,

    /// Cache unit size in days
    #[arg(long, default_value_t = DEFAULT_UNIT_SIZE)]
    unit_size: f64,
}

#[derive(Debug, Subcommand)]
enum Omni2Command {
    /// Print the nearest valid value of a field
    Value {
        #[command(flatten)]
        source: SourceArgs,

        /// Day number since 1950, RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long)]
        time: String,

        #[arg(long)]
        field: String,

        /// Largest accepted distance to a sample, in hours
        #[arg(long, default_value_t = 1.0)]
        max_distance: f64,
    },

    /// Dump all samples between two times as CSV
    Range {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Restrict the output to these fields (repeatable)
        #[arg(long)]
        field: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Query the hourly OMNI2 dataset through the segment cache
    Omni2 {
        #[command(subcommand)]
        cmd: Omni2Command,
    },

    /// Summarize a persisted cache file
    Inspect {
        #[arg(long = "cache-file")]
        cache_file: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[command(name = "tscache", version, about = "Segmented time-series cache")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn parse_time(text: &str) -> CliResult<f64> {
    parse_days(text).context(InvalidTimeSnafu { text })
}

fn check_field(field: &str) -> CliResult<()> {
    if Omni2Field::from_name(field).is_some() {
        return Ok(());
    }
    let known: Vec<&str> = Omni2Field::ALL.iter().map(|f| f.name()).collect();
    UnknownFieldSnafu {
        field,
        known: known.join(", "),
    }
    .fail()
}

async fn open_omni2(source: &SourceArgs) -> CliResult<SegmentCache<Omni2Adapter>> {
    let dir = source.dir.display().to_string();

    let mut config = Omni2Config::new(&source.dir);
    if let Some(template) = &source.url_template {
        config.url_template = template.clone();
    }
    config.offline = source.offline;

    let adapter = Omni2Adapter::new(config).context(OpenCacheSnafu { dir: dir.as_str() })?;
    let cache_config =
        CacheConfig::new(source.unit_size).with_cache_file(source.dir.join(CACHE_FILE_NAME));
    let cache = SegmentCache::open(adapter, cache_config)
        .await
        .context(OpenCacheSnafu { dir: dir.as_str() })?;

    let stats = cache.stats().await;
    debug!("Opened cache in {dir} with {} units", stats.units);
    Ok(cache)
}

/// Persist the store, keeping the command's own error if both fail.
async fn finish<T>(
    cache: &SegmentCache<Omni2Adapter>,
    outcome: CliResult<T>,
) -> CliResult<T> {
    let saved = cache.save().await.context(SaveCacheSnafu);
    let value = outcome?;
    saved?;
    info!("Cache saved after {} fetch calls", cache.fetch_calls());
    Ok(value)
}

async fn cmd_value(
    source: SourceArgs,
    time: String,
    field: String,
    max_distance: f64,
) -> CliResult<()> {
    let t = parse_time(&time)?;
    check_field(&field)?;
    ensure!(
        max_distance.is_finite() && max_distance >= 0.0,
        InvalidDistanceSnafu {
            value: max_distance
        }
    );

    let cache = open_omni2(&source).await?;
    let outcome = cache
        .nearest_value(t, &field, max_distance * HOUR, &())
        .await
        .context(QuerySnafu);
    let value = finish(&cache, outcome).await?;

    println!("{}", render_point(&field, &value));
    Ok(())
}

async fn cmd_range(source: SourceArgs, from: String, to: String, fields: Vec<String>) -> CliResult<()> {
    let begin = parse_time(&from)?;
    let end = parse_time(&to)?;
    for field in &fields {
        check_field(field)?;
    }

    let cache = open_omni2(&source).await?;
    let outcome = cache.request(begin, end, &()).await.context(QuerySnafu);
    let result = finish(&cache, outcome).await?;

    let mut stdout = std::io::stdout().lock();
    write_range_csv(&result, &fields, &mut stdout)?;
    stdout.flush().context(WriteOutputSnafu)?;

    write_gaps(&result, &mut std::io::stderr().lock())?;
    Ok(())
}

async fn cmd_inspect(cache_file: &Path) -> CliResult<()> {
    let path = cache_file.display().to_string();
    let bytes = tokio::fs::read(cache_file)
        .await
        .context(CacheFileMissingSnafu { path: path.as_str() })?;
    let summary = codec::inspect(&bytes).context(InspectCacheFileSnafu { path: path.as_str() })?;

    let mut stdout = std::io::stdout().lock();
    write_inspect(&summary, &mut stdout)?;
    stdout.flush().context(WriteOutputSnafu)?;
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Omni2 { cmd } => match cmd {
            Omni2Command::Value {
                source,
                time,
                field,
                max_distance,
            } => cmd_value(source, time, field, max_distance).await,

            Omni2Command::Range {
                source,
                from,
                to,
                field,
            } => cmd_range(source, from, to, field).await,
        },

        Command::Inspect { cache_file } => cmd_inspect(&cache_file).await,
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}
