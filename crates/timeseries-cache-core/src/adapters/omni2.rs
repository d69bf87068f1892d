//! OMNI2 hourly averages from fixed-column yearly text files.
//!
//! Every yearly file holds one line per hour with 55 fixed-width columns
//! (327 characters, line terminator excluded). Only a handful of columns are
//! read:
//!
//! | field               | column | fill string |
//! |---------------------|--------|-------------|
//! | `kp` (Kp * 10)      | 39     | `99`        |
//! | `dst`               | 41     | `99999`     |
//! | `imf_gse` (x, y, z) | 13-15  | `999.9`     |
//! | `imf_by_gsm`        | 16     | `999.9`     |
//! | `imf_bz_gsm`        | 17     | `999.9`     |
//! | `sw_velocity`       | 25     | `9999.`     |
//! | `sw_pressure`       | 29     | `99.99`     |
//! | `alfven_mach`       | 38     | `999.9`     |
//! | `magnetosonic_mach` | 55     | `99.9`      |
//!
//! Columns 1-3 (year, day of year, hour) give the row time on the
//! days-since-1950 axis. Fill strings map to the dataset fill value (NaN).
//!
//! Years before [`FIRST_YEAR`] or after the current UTC year have no data.
//! Failing to obtain the current year's file also yields no data, since
//! that file may not be published yet; any other failure is an error.
//!
//! Units from the first recent year (see [`StalenessPolicy`]) onward are
//! kept in memory only and never written to the cache file, so a session
//! started after a yearly file has been refreshed reads the new rows.

pub mod file_cache;

pub use file_cache::{StalenessPolicy, YearlyFileCache};

use std::{ops::Range, ops::RangeInclusive, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use futures::future::try_join_all;
use log::info;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    discretize::{Discretizer, TimeSpan, UnitIndex},
    error::{CacheResult, InvalidConfigSnafu},
    fetch::{DatasetDescriptor, FetchAdapter, FetchResult, ParseSnafu, partition_into_units},
    helpers::day_time::{HOUR, year_of_days, year_start_days},
    unit::{CacheUnit, DatasetSchema, FieldSpec},
};

/// Dataset identifier stored in cache file fingerprints.
pub const DATASET_ID: &str = "omni2-hourly";

/// Where NASA SPDF publishes the yearly files.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://spdf.gsfc.nasa.gov/pub/data/omni/low_res_omni/omni2_{year}.dat";

/// Local file name of a yearly file.
pub const DEFAULT_FILE_NAME_TEMPLATE: &str = "omni2_{year}.dat";

/// First year with hourly averages.
pub const FIRST_YEAR: i32 = 1963;

/// Suggested cache unit size, in days.
pub const DEFAULT_UNIT_SIZE: f64 = 30.0;

/// Suggested point-query tolerance: one hour.
pub const DEFAULT_MAX_DISTANCE: f64 = HOUR;

/// Widths of the 55 columns of a yearly file line.
pub const COLUMN_WIDTHS: [usize; 55] = [
    4, 4, 3, 5, 3, 3, 4, 4, //
    6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, //
    9, //
    6, 6, 6, 6, 6, 6, //
    9, //
    6, 6, 6, 6, 6, //
    7, 7, 6, 3, 4, 6, 5, 10, //
    9, 9, 9, 9, 9, //
    3, 4, 6, 6, 6, 6, 5,
];

/// Length of one line, terminator excluded.
pub const CHARS_PER_LINE: usize = {
    let mut total = 0;
    let mut i = 0;
    while i < COLUMN_WIDTHS.len() {
        total += COLUMN_WIDTHS[i];
        i += 1;
    }
    total
};

/// Byte range of a 1-based column.
fn column_range(column: usize) -> Range<usize> {
    let begin: usize = COLUMN_WIDTHS[..column - 1].iter().sum();
    begin..begin + COLUMN_WIDTHS[column - 1]
}

/// Quantities read from the yearly files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Omni2Field {
    /// Kp index times ten (`3+` is 33).
    Kp,
    /// Dst index, nT.
    Dst,
    /// IMF vector in GSE, nT.
    ImfGse,
    /// IMF y component in GSM, nT.
    ImfByGsm,
    /// IMF z component in GSM, nT.
    ImfBzGsm,
    /// Solar wind bulk speed, km/s.
    SwVelocity,
    /// Solar wind flow pressure, nPa.
    SwPressure,
    /// Alfven Mach number.
    AlfvenMach,
    /// Magnetosonic Mach number.
    MagnetosonicMach,
}

impl Omni2Field {
    /// Every field, in schema order.
    pub const ALL: [Omni2Field; 9] = [
        Omni2Field::Kp,
        Omni2Field::Dst,
        Omni2Field::ImfGse,
        Omni2Field::ImfByGsm,
        Omni2Field::ImfBzGsm,
        Omni2Field::SwVelocity,
        Omni2Field::SwPressure,
        Omni2Field::AlfvenMach,
        Omni2Field::MagnetosonicMach,
    ];

    /// Schema field name.
    pub fn name(&self) -> &'static str {
        match self {
            Omni2Field::Kp => "kp",
            Omni2Field::Dst => "dst",
            Omni2Field::ImfGse => "imf_gse",
            Omni2Field::ImfByGsm => "imf_by_gsm",
            Omni2Field::ImfBzGsm => "imf_bz_gsm",
            Omni2Field::SwVelocity => "sw_velocity",
            Omni2Field::SwPressure => "sw_pressure",
            Omni2Field::AlfvenMach => "alfven_mach",
            Omni2Field::MagnetosonicMach => "magnetosonic_mach",
        }
    }

    /// Look a field up by schema name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Source columns (1-based) and their fill strings, one per component.
    fn source_columns(&self) -> &'static [(usize, &'static str)] {
        match self {
            Omni2Field::Kp => &[(39, "99")],
            Omni2Field::Dst => &[(41, "99999")],
            Omni2Field::ImfGse => &[(13, "999.9"), (14, "999.9"), (15, "999.9")],
            Omni2Field::ImfByGsm => &[(16, "999.9")],
            Omni2Field::ImfBzGsm => &[(17, "999.9")],
            Omni2Field::SwVelocity => &[(25, "9999.")],
            Omni2Field::SwPressure => &[(29, "99.99")],
            Omni2Field::AlfvenMach => &[(38, "999.9")],
            Omni2Field::MagnetosonicMach => &[(55, "99.9")],
        }
    }
}

/// Schema of the OMNI2 dataset. Fill value is NaN.
pub fn schema() -> DatasetSchema {
    let fields = Omni2Field::ALL
        .iter()
        .map(|f| match f.source_columns().len() {
            1 => FieldSpec::scalar(f.name()),
            n => FieldSpec::vector(f.name(), n),
        })
        .collect();
    DatasetSchema::new(fields, f64::NAN)
}

/// Parsed rows of one or more yearly files, columns in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlyTable {
    /// Row times, days since 1950.
    pub times: Vec<f64>,
    /// One vector per schema column.
    pub columns: Vec<Vec<f64>>,
}

impl HourlyTable {
    fn with_columns(n: usize) -> Self {
        Self {
            times: Vec::new(),
            columns: vec![Vec::new(); n],
        }
    }

    fn append(&mut self, other: HourlyTable) {
        self.times.extend(other.times);
        for (dst, src) in self.columns.iter_mut().zip(other.columns) {
            dst.extend(src);
        }
    }
}

/// Parse the contents of one yearly file.
///
/// `path` is only used in error messages. Blank lines are skipped; every
/// other line must be exactly 327 characters long, and rows must be in
/// strictly increasing time order.
pub fn parse_hourly_file(bytes: &[u8], path: &str) -> FetchResult<HourlyTable> {
    let sources: Vec<(Range<usize>, &str)> = Omni2Field::ALL
        .iter()
        .flat_map(|f| f.source_columns())
        .map(|(col, fill)| (column_range(*col), *fill))
        .collect();
    let mut table = HourlyTable::with_columns(sources.len());

    for (n, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line_no = n + 1;
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let fail = |message: String| {
            ParseSnafu {
                path,
                line: line_no,
                message,
            }
            .build()
        };

        if line.len() != CHARS_PER_LINE {
            return Err(fail(format!(
                "expected {CHARS_PER_LINE} characters, found {}",
                line.len()
            )));
        }
        let text = std::str::from_utf8(line)
            .ok()
            .filter(|t| t.is_ascii())
            .ok_or_else(|| fail("line is not plain ASCII".to_string()))?;

        let int_at = |col: usize| -> FetchResult<i32> {
            let cell = text[column_range(col)].trim();
            cell.parse()
                .map_err(|_| fail(format!("column {col}: '{cell}' is not an integer")))
        };
        let year = int_at(1)?;
        let doy = int_at(2)?;
        let hour = int_at(3)?;
        if !(1..=366).contains(&doy) || !(0..=23).contains(&hour) {
            return Err(fail(format!("invalid day {doy} or hour {hour}")));
        }
        let start = year_start_days(year).ok_or_else(|| fail(format!("invalid year {year}")))?;
        let time = start + f64::from(doy - 1) + f64::from(hour) * HOUR;

        if let Some(prev) = table.times.last().filter(|prev| **prev >= time) {
            return Err(fail(format!("row time {time} does not follow {prev}")));
        }

        for ((range, fill), column) in sources.iter().zip(table.columns.iter_mut()) {
            let cell = text[range.clone()].trim();
            let value = if cell == *fill {
                f64::NAN
            } else {
                cell.parse::<f64>()
                    .map_err(|_| fail(format!("'{cell}' is not a number")))?
            };
            column.push(value);
        }
        table.times.push(time);
    }

    Ok(table)
}

/// Settings of the OMNI2 adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Omni2Config {
    /// Directory holding downloaded yearly files.
    pub data_dir: PathBuf,

    /// Download URL with a `{year}` placeholder.
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// Local file name with a `{year}` placeholder.
    #[serde(default = "default_file_name_template")]
    pub file_name_template: String,

    /// First year with data.
    #[serde(default = "default_first_year")]
    pub first_year: i32,

    /// Re-download policy.
    #[serde(default)]
    pub staleness: StalenessPolicy,

    /// Use local files only.
    #[serde(default)]
    pub offline: bool,
}

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}

fn default_file_name_template() -> String {
    DEFAULT_FILE_NAME_TEMPLATE.to_string()
}

fn default_first_year() -> i32 {
    FIRST_YEAR
}

impl Omni2Config {
    /// Defaults for everything except the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            url_template: default_url_template(),
            file_name_template: default_file_name_template(),
            first_year: FIRST_YEAR,
            staleness: StalenessPolicy::default(),
            offline: false,
        }
    }
}

/// [`FetchAdapter`] over the yearly OMNI2 files.
#[derive(Debug, Clone)]
pub struct Omni2Adapter {
    files: YearlyFileCache,
    first_year: i32,
    last_year: i32,
    bounds: TimeSpan,
    recent_begin: f64,
}

impl Omni2Adapter {
    /// Adapter whose "current year" is taken from the system clock.
    pub fn new(config: Omni2Config) -> CacheResult<Self> {
        Self::with_reference_now(config, Utc::now())
    }

    /// Adapter with an explicit reference time for the current year and
    /// for file staleness.
    pub fn with_reference_now(config: Omni2Config, now: DateTime<Utc>) -> CacheResult<Self> {
        let last_year = now.year();
        let first_year = config.first_year;
        ensure!(
            first_year <= last_year,
            InvalidConfigSnafu {
                message: format!("first year {first_year} is after the current year {last_year}"),
            }
        );
        let bounds = year_start_days(first_year)
            .zip(year_start_days(last_year + 1))
            .and_then(|(begin, end)| TimeSpan::try_new(begin, end))
            .context(InvalidConfigSnafu {
                message: format!("cannot represent years {first_year}..={last_year}"),
            })?;

        // Units from the start of the first recent year on are rebuilt from
        // a possibly refreshed yearly file in every session.
        let recent_year = config.staleness.boundary_year(now).max(first_year);
        let recent_begin = year_start_days(recent_year).context(InvalidConfigSnafu {
            message: format!("cannot represent year {recent_year}"),
        })?;

        let files = YearlyFileCache::new(
            config.data_dir,
            config.url_template,
            config.file_name_template,
            config.staleness,
            now,
        )
        .offline(config.offline);

        Ok(Self {
            files,
            first_year,
            last_year,
            bounds,
            recent_begin,
        })
    }

    /// The local file cache.
    pub fn files(&self) -> &YearlyFileCache {
        &self.files
    }

    /// Start of the recent years, whose units are never persisted.
    pub fn recent_begin(&self) -> f64 {
        self.recent_begin
    }

    /// Inclusive range of years with data.
    pub fn years(&self) -> RangeInclusive<i32> {
        self.first_year..=self.last_year
    }

    /// Parsed rows of `year`; empty for years without data.
    pub async fn load_year(&self, year: i32) -> FetchResult<HourlyTable> {
        let empty = || HourlyTable::with_columns(schema().column_count());
        if !self.years().contains(&year) {
            return Ok(empty());
        }

        let bytes = match self.files.ensure_file(year).await {
            Ok(bytes) => bytes,
            Err(e) if year == self.last_year => {
                info!("No data for the current year {year} ({e}); treating it as empty");
                return Ok(empty());
            }
            Err(e) => return Err(e),
        };

        let path = self.files.local_path_for(year).display().to_string();
        parse_hourly_file(&bytes, &path)
    }
}

#[async_trait]
impl FetchAdapter for Omni2Adapter {
    type Context = ();

    fn descriptor(&self) -> DatasetDescriptor {
        DatasetDescriptor {
            id: DATASET_ID.to_string(),
            schema: schema(),
            bounds: self.bounds,
        }
    }

    async fn fetch_units(
        &self,
        run: RangeInclusive<UnitIndex>,
        discretizer: &Discretizer,
        _ctx: &(),
    ) -> FetchResult<Vec<CacheUnit>> {
        let span = discretizer
            .span_of(*run.start())
            .hull(&discretizer.span_of(*run.end()));
        let years = years_overlapping(span)
            .into_iter()
            .flatten()
            .filter(|y| self.years().contains(y))
            .collect::<Vec<_>>();

        let tables = try_join_all(years.iter().map(|y| self.load_year(*y))).await?;
        let mut merged = HourlyTable::with_columns(schema().column_count());
        for table in tables {
            merged.append(table);
        }

        partition_into_units(run, discretizer, &merged.times, &merged.columns, false)
    }

    fn is_persistent(&self, unit: &CacheUnit) -> bool {
        unit.span().end() <= self.recent_begin
    }
}

/// Calendar years overlapping `[span.begin, span.end)`, or `None` outside
/// the calendar range chrono can represent.
fn years_overlapping(span: TimeSpan) -> Option<RangeInclusive<i32>> {
    let first = year_of_days(span.begin())?;
    let last = year_of_days(span.end())?;
    let last = match year_start_days(last) {
        Some(start) if start >= span.end() => last - 1,
        _ => last,
    };
    Some(first..=last)
}
