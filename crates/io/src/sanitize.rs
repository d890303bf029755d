//! Numeric-column export: tab-separated cell data to a plain CSV.
//!
//! A column survives when its header passes the include/exclude substring
//! filters and its value in the first data row looks numeric (a number, a
//! percentage, or one of the configured not-a-number tokens). Text columns
//! such as sample names or phenotypes are dropped.

use std::fs;
use std::path::{Path, PathBuf};

use phenosync_config::SanitizeConfig;
use serde::Serialize;

use crate::csv::{csv_error, read_records, writer};
use crate::error::ExportIoError;

#[derive(Debug, Clone, Serialize)]
pub struct SanitizeSummary {
    pub input: PathBuf,
    /// `None` when no column qualified and nothing was written.
    pub output: Option<PathBuf>,
    pub columns: usize,
    /// Data rows written, header excluded.
    pub rows: usize,
}

/// Whether a header passes the include/exclude substring filters.
pub fn header_selected(header: &str, include: &[String], exclude: &[String]) -> bool {
    let included = include.is_empty() || include.iter().any(|p| header.contains(p.as_str()));
    included && !exclude.iter().any(|p| header.contains(p.as_str()))
}

/// Whether a value is a number, a percentage, or a not-a-number token.
pub fn is_numeric_token(value: &str, nans: &[String]) -> bool {
    let value = value.trim();
    value.parse::<f64>().is_ok() || value.ends_with('%') || nans.iter().any(|n| n == value)
}

/// Indices of the columns that will be exported.
pub fn numeric_columns(
    header: &csv::StringRecord,
    first_row: &csv::StringRecord,
    config: &SanitizeConfig,
) -> Vec<usize> {
    header
        .iter()
        .zip(first_row.iter())
        .enumerate()
        .filter(|(_, (name, value))| {
            header_selected(name, &config.include, &config.exclude)
                && is_numeric_token(value, &config.nans)
        })
        .map(|(i, _)| i)
        .collect()
}

fn clean_value<'a>(value: &'a str, config: &'a SanitizeConfig) -> &'a str {
    let trimmed = value.trim();
    if config.nans.iter().any(|n| n == trimmed) {
        &config.nan_out
    } else if let Some(stripped) = trimmed.strip_suffix('%') {
        stripped
    } else {
        value
    }
}

/// Convert one file into `<out_dir>/<stem>.csv`.
pub fn sanitize_file(
    input: &Path,
    out_dir: &Path,
    config: &SanitizeConfig,
    delimiter: u8,
) -> Result<SanitizeSummary, ExportIoError> {
    let records = read_records(input, delimiter)?;
    let mut summary = SanitizeSummary {
        input: input.to_path_buf(),
        output: None,
        columns: 0,
        rows: 0,
    };

    let (Some(header), Some(first_row)) = (records.first(), records.get(1)) else {
        log::warn!("{}: no data row to classify columns, skipped", input.display());
        return Ok(summary);
    };

    let columns = numeric_columns(header, first_row, config);
    summary.columns = columns.len();
    if columns.is_empty() {
        log::warn!("{}: no numeric columns, skipped", input.display());
        return Ok(summary);
    }

    fs::create_dir_all(out_dir).map_err(|e| ExportIoError::CreateDir {
        path: out_dir.to_path_buf(),
        source: e,
    })?;
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".into());
    let output = out_dir.join(format!("{stem}.csv"));

    let delimiter_out = config.delimiter_out.to_string();
    let mut w = writer(&output, config.delimiter_out as u8)?;

    let header_out: Vec<String> = columns
        .iter()
        .map(|&i| header.get(i).unwrap_or("").replace(delimiter_out.as_str(), ""))
        .collect();
    w.write_record(&header_out).map_err(|e| csv_error(&output, e))?;

    for record in records.iter().skip(1) {
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let row: Vec<&str> = columns
            .iter()
            .map(|&i| clean_value(record.get(i).unwrap_or(""), config))
            .collect();
        w.write_record(&row).map_err(|e| csv_error(&output, e))?;
        summary.rows += 1;
    }
    w.flush().map_err(|e| ExportIoError::write(&output, e))?;

    log::info!(
        "{} -> {} ({} columns, {} rows)",
        input.display(),
        output.display(),
        summary.columns,
        summary.rows
    );
    summary.output = Some(output);
    Ok(summary)
}
