//! Per-sample numeric tables from a consolidated export.
//!
//! Columns whose value in the first data row parses as a number are kept;
//! every other column is dropped. Rows are grouped by the sample id column
//! into `<out_dir>/<stem> - <sample>.csv`, tab-separated, ready for an FCS
//! conversion tool. Rows are streamed one sample run at a time.

use std::fs;
use std::path::{Path, PathBuf};

use phenosync_config::SampleTablesConfig;
use serde::Serialize;

use crate::error::ExportIoError;
use crate::row::{DelimitedRow, LineReader};
use crate::runs::{file_name_safe, RunOutput, RunSink};

#[derive(Debug, Clone, Serialize)]
pub struct SampleTablesSummary {
    pub input: PathBuf,
    /// Numeric columns kept.
    pub columns: usize,
    pub samples: Vec<RunOutput>,
    /// Data rows without a sample id.
    pub skipped_rows: usize,
}

/// Indices of the fields that parse as a number.
pub fn number_columns(row: &DelimitedRow<'_>) -> Vec<usize> {
    row.fields()
        .enumerate()
        .filter(|(_, field)| {
            std::str::from_utf8(field).is_ok_and(|v| v.trim().parse::<f64>().is_ok())
        })
        .map(|(i, _)| i)
        .collect()
}

/// The selected fields of `row`, tab-joined and newline-terminated.
fn project(row: &DelimitedRow<'_>, columns: &[usize]) -> Vec<u8> {
    let fields: Vec<&[u8]> = row.fields().collect();
    let mut line = Vec::new();
    for (n, &i) in columns.iter().enumerate() {
        if n > 0 {
            line.push(b'\t');
        }
        line.extend_from_slice(fields.get(i).copied().unwrap_or_default());
    }
    line.push(b'\n');
    line
}

/// Split one consolidated file into per-sample numeric tables.
pub fn write_sample_tables(
    input: &Path,
    out_dir: &Path,
    config: &SampleTablesConfig,
    delimiter: u8,
) -> Result<SampleTablesSummary, ExportIoError> {
    let mut summary = SampleTablesSummary {
        input: input.to_path_buf(),
        columns: 0,
        samples: Vec::new(),
        skipped_rows: 0,
    };

    let mut reader = LineReader::open(input)?;
    let mut header = Vec::new();
    let mut raw = Vec::new();
    if !reader.next_into(&mut header)? {
        log::warn!("{}: empty file, skipped", input.display());
        return Ok(summary);
    }
    let mut has_row = reader.next_into(&mut raw)?;
    while has_row && DelimitedRow::new(&raw, delimiter).is_blank() {
        has_row = reader.next_into(&mut raw)?;
    }
    if !has_row {
        log::warn!("{}: no data row to classify columns, skipped", input.display());
        return Ok(summary);
    }

    let columns = number_columns(&DelimitedRow::new(&raw, delimiter));
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
    let sample_path = |sample: &str| out_dir.join(format!("{stem} - {}.csv", file_name_safe(sample)));
    let mut sink = RunSink::new(project(&DelimitedRow::new(&header, delimiter), &columns));

    let mut current: Option<String> = None;
    let mut run: Vec<Vec<u8>> = Vec::new();

    while has_row {
        let row = DelimitedRow::new(&raw, delimiter);
        if !row.is_blank() {
            match row.key(config.sample_column) {
                Some(sample) => {
                    if current.as_deref() != Some(sample.as_str()) {
                        if let Some(previous) = current.take() {
                            sink.write_run(&previous, &sample_path(&previous), &run)?;
                            run.clear();
                        }
                        current = Some(sample);
                    }
                    run.push(project(&row, &columns));
                }
                None => summary.skipped_rows += 1,
            }
        }
        has_row = reader.next_into(&mut raw)?;
    }
    if let Some(last) = current {
        sink.write_run(&last, &sample_path(&last), &run)?;
    }

    if summary.skipped_rows > 0 {
        log::warn!("{}: {} row(s) without sample id skipped", input.display(), summary.skipped_rows);
    }
    summary.samples = sink.into_outputs();
    log::info!(
        "{}: {} sample(s), {} numeric column(s)",
        input.display(),
        summary.samples.len(),
        summary.columns
    );
    Ok(summary)
}
