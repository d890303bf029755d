//! `phenosync split` / `sanitize` / `sample-tables` / `halo-split` /
//! `tileconfig`: file converters.

use std::path::{Path, PathBuf};

use phenosync_io::fs::list_files;
use phenosync_io::halo::{HaloSplitter, HaloSummary};
use phenosync_io::sample_tables::{write_sample_tables, SampleTablesSummary};
use phenosync_io::sanitize::{sanitize_file, SanitizeSummary};
use phenosync_io::split::{split_merge_file, SplitSummary};
use phenosync_io::tileconfig::{write_tileconfig, TileConfigSummary};
use phenosync_io::ExportIoError;

use crate::exit_codes::{EXIT_CONVERT_NO_INPUT, EXIT_CONVERT_OUTPUT_NOT_EMPTY, EXIT_SYNC_RUNTIME};
use crate::{load_config, CliError};

fn io_err(err: ExportIoError) -> CliError {
    match err {
        ExportIoError::OutputNotEmpty { .. } => {
            CliError::new(EXIT_CONVERT_OUTPUT_NOT_EMPTY, err.to_string())
                .with_hint("pass an empty or new folder with --out")
        }
        _ => CliError::new(EXIT_SYNC_RUNTIME, err.to_string()),
    }
}

/// Expand folder inputs to the files inside them whose name contains `target`.
fn resolve_inputs(inputs: &[PathBuf], target: &str) -> Result<Vec<PathBuf>, CliError> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for name in list_files(input, target).map_err(io_err)? {
                files.push(input.join(name));
            }
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            return Err(CliError::args(format!("{}: no such file or folder", input.display())));
        }
    }
    if files.is_empty() {
        return Err(CliError::new(EXIT_CONVERT_NO_INPUT, format!("no input file matches \"*{target}*\""))
            .with_hint("pass files directly or a folder that contains them"));
    }
    Ok(files)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let json_str = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
    println!("{json_str}");
    Ok(())
}

pub fn cmd_split(
    inputs: Vec<PathBuf>,
    out: PathBuf,
    config_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_ref())?;
    let files = resolve_inputs(&inputs, &config.split.target)?;

    let mut summaries: Vec<SplitSummary> = Vec::with_capacity(files.len());
    for file in &files {
        let summary =
            split_merge_file(file, &out, &config.split, config.delimiter_byte()).map_err(io_err)?;
        eprintln!(
            "{} -> {}: {} sample(s)",
            display_name(file),
            out.join(&summary.channel).display(),
            summary.samples.len()
        );
        summaries.push(summary);
    }

    if json_output {
        print_json(&summaries)?;
    }
    Ok(())
}

pub fn cmd_sanitize(
    inputs: Vec<PathBuf>,
    out: PathBuf,
    config_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_ref())?;
    let files = resolve_inputs(&inputs, &config.sanitize.target)?;

    let mut summaries: Vec<SanitizeSummary> = Vec::with_capacity(files.len());
    for file in &files {
        let summary =
            sanitize_file(file, &out, &config.sanitize, config.delimiter_byte()).map_err(io_err)?;
        match &summary.output {
            Some(path) => eprintln!(
                "{} -> {} ({} columns, {} rows)",
                display_name(file),
                path.display(),
                summary.columns,
                summary.rows
            ),
            None => eprintln!("{}: skipped, no numeric columns", display_name(file)),
        }
        summaries.push(summary);
    }

    let written = summaries.iter().filter(|s| s.output.is_some()).count();
    eprintln!("{written} of {} file(s) written", summaries.len());

    if json_output {
        print_json(&summaries)?;
    }
    Ok(())
}

pub fn cmd_sample_tables(
    inputs: Vec<PathBuf>,
    out: PathBuf,
    config_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_ref())?;
    let files = resolve_inputs(&inputs, &config.sample_tables.target)?;

    let mut summaries: Vec<SampleTablesSummary> = Vec::with_capacity(files.len());
    for file in &files {
        let summary = write_sample_tables(file, &out, &config.sample_tables, config.delimiter_byte())
            .map_err(io_err)?;
        eprintln!(
            "{}: {} sample(s), {} numeric column(s)",
            display_name(file),
            summary.samples.len(),
            summary.columns
        );
        summaries.push(summary);
    }

    if json_output {
        print_json(&summaries)?;
    }
    Ok(())
}

pub fn cmd_halo_split(
    inputs: Vec<PathBuf>,
    out: PathBuf,
    config_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_ref())?;
    let files = resolve_inputs(&inputs, &config.halo.target)?;

    let mut splitter = HaloSplitter::new(&out, &config.halo).map_err(io_err)?;
    let mut summaries: Vec<HaloSummary> = Vec::with_capacity(files.len());
    for file in &files {
        let summary = splitter.split_file(file).map_err(io_err)?;
        eprintln!(
            "{}: {} line(s), {} new image(s)",
            display_name(file),
            summary.lines,
            summary.new_images
        );
        summaries.push(summary);
    }
    let images = splitter.finish();
    eprintln!("{} image file(s) in {}", images.len(), out.display());

    if json_output {
        print_json(&serde_json::json!({ "files": summaries, "images": images }))?;
    }
    Ok(())
}

pub fn cmd_tileconfig(
    folders: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    invert_y: bool,
    json_output: bool,
) -> Result<(), CliError> {
    let mut config = load_config(config_path.as_ref())?;
    config.tileconfig.invert_y |= invert_y;

    let mut summaries: Vec<TileConfigSummary> = Vec::with_capacity(folders.len());
    for folder in &folders {
        if !folder.is_dir() {
            return Err(CliError::args(format!("{}: no such folder", folder.display())));
        }
        let summary = write_tileconfig(folder, &config.tileconfig).map_err(io_err)?;
        match &summary.output {
            Some(path) => eprintln!("{} ({} tiles)", path.display(), summary.tiles.len()),
            None => eprintln!("{}: no tiles, skipped", folder.display()),
        }
        summaries.push(summary);
    }

    if json_output {
        print_json(&summaries)?;
    }
    if summaries.iter().all(|s| s.output.is_none()) {
        return Err(CliError::new(
            EXIT_CONVERT_NO_INPUT,
            format!("no file matches \"*{}*\"", config.tileconfig.target),
        )
        .with_hint("pass the folders that hold the tile images"));
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
