use std::io::Write;

use snafu::ResultExt;
use timeseries_cache_core::{
    PointValue, QueryResult, codec::CacheFileSummary, helpers::day_time::days_to_datetime,
};

use crate::error::{CliResult, WriteOutputSnafu};

/// ISO-8601 rendering of a day-based time, or the raw number when it does
/// not fit a calendar date.
pub fn format_time(days: f64) -> String {
    match days_to_datetime(days) {
        Some(ts) => ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => days.to_string(),
    }
}

fn column_names(result: &QueryResult, fields: &[String]) -> Vec<String> {
    let mut names = vec!["time".to_string()];
    for spec in result.schema().fields() {
        if !fields.is_empty() && !fields.contains(&spec.name) {
            continue;
        }
        if spec.components == 1 {
            names.push(spec.name.clone());
        } else {
            names.extend((0..spec.components).map(|i| format!("{}_{i}", spec.name)));
        }
    }
    names
}

fn selected_columns<'a>(result: &'a QueryResult, fields: &[String]) -> Vec<&'a [f64]> {
    if fields.is_empty() {
        return result.columns().iter().map(Vec::as_slice).collect();
    }
    result
        .schema()
        .fields()
        .iter()
        .filter(|spec| fields.contains(&spec.name))
        .filter_map(|spec| result.field(&spec.name))
        .flat_map(|cols| cols.iter().map(Vec::as_slice))
        .collect()
}

/// Samples of `result` as CSV, restricted to `fields` unless empty.
pub fn write_range_csv<W: Write>(
    result: &QueryResult,
    fields: &[String],
    out: &mut W,
) -> CliResult<()> {
    writeln!(out, "{}", column_names(result, fields).join(",")).context(WriteOutputSnafu)?;

    let columns = selected_columns(result, fields);
    for (row, &t) in result.times().iter().enumerate() {
        let mut line = format_time(t);
        for col in &columns {
            line.push(',');
            line.push_str(&col[row].to_string());
        }
        writeln!(out, "{line}").context(WriteOutputSnafu)?;
    }
    Ok(())
}

/// One line per gap of `result`.
pub fn write_gaps<W: Write>(result: &QueryResult, out: &mut W) -> CliResult<()> {
    for gap in result.gaps() {
        writeln!(
            out,
            "gap before row {}: {} .. {}",
            gap.position,
            format_time(gap.span.begin()),
            format_time(gap.span.end())
        )
        .context(WriteOutputSnafu)?;
    }
    Ok(())
}

pub fn render_point(field: &str, value: &PointValue) -> String {
    let rendered = match value.scalar() {
        Some(v) => v.to_string(),
        None => format!("{:?}", value.values),
    };
    format!("{field} = {rendered} at {}", format_time(value.time))
}

pub fn write_inspect<W: Write>(summary: &CacheFileSummary, out: &mut W) -> CliResult<()> {
    let fp = &summary.header.fingerprint;
    let fields: Vec<String> = fp
        .fields
        .iter()
        .map(|f| match f.components {
            1 => f.name.clone(),
            n => format!("{}({n})", f.name),
        })
        .collect();
    let empty = summary.units.iter().filter(|(_, _, empty)| *empty).count();
    let samples: usize = summary.units.iter().map(|(_, n, _)| n).sum();

    let mut lines = vec![
        format!("format_version: {}", summary.format_version),
        format!("writer: {}", summary.header.writer),
        format!("dataset: {}", fp.dataset_id),
        format!("unit_size: {}", fp.unit_size),
        format!(
            "bounds: [{}, {})",
            format_time(fp.global_begin),
            format_time(fp.global_end)
        ),
        format!("fields: {}", fields.join(", ")),
        format!(
            "units: {} ({empty} empty, {samples} samples)",
            summary.units.len()
        ),
    ];
    lines.extend(summary.units.iter().map(|(index, count, empty)| {
        if *empty {
            format!("  unit {index}: empty")
        } else {
            format!("  unit {index}: {count} samples")
        }
    }));

    for line in lines {
        writeln!(out, "{line}").context(WriteOutputSnafu)?;
    }
    Ok(())
}
