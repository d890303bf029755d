//! `phenosync sync` / `inventory` / `validate`: the reconciliation pipeline.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use phenosync_config::SyncConfig;
use phenosync_recon::model::FileState;
use phenosync_recon::SyncReport;

use crate::exit_codes::{recon_exit_code, EXIT_SYNC_RUNTIME, EXIT_SYNC_UNRESOLVED};
use crate::{load_config, CliError};

fn recon_err(err: phenosync_recon::ReconError) -> CliError {
    let code = recon_exit_code(&err);
    let hint = match &err {
        phenosync_recon::ReconError::MissingKeyColumn { .. } => {
            Some("set [key] column (or index) to the cell identifier column".to_string())
        }
        phenosync_recon::ReconError::MalformedRow { .. } => {
            Some("set missing_key = \"drop\" to discard rows without a key".to_string())
        }
        phenosync_recon::ReconError::NoChannels(_) => {
            Some("expected <root>/<channel>/<batch>/<file>; check folder_exclusions".to_string())
        }
        _ => None,
    };
    CliError { code, message: err.to_string(), hint }
}

fn write_json(report: &SyncReport, json_output: bool, output_file: Option<&PathBuf>) -> Result<(), CliError> {
    if !json_output && output_file.is_none() {
        return Ok(());
    }
    let json_str = report
        .to_json_pretty()
        .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;

    if let Some(path) = output_file {
        std::fs::write(path, &json_str).map_err(|e| {
            CliError::new(EXIT_SYNC_RUNTIME, format!("cannot write {}: {e}", path.display()))
        })?;
        eprintln!("wrote {}", path.display());
    }
    if json_output {
        println!("{json_str}");
    }
    Ok(())
}

fn print_summary(report: &SyncReport) {
    let s = &report.summary;
    let prefix = if report.meta.dry_run { "dry run: " } else { "" };
    eprintln!(
        "{prefix}{} channel(s), {} batch(es): {} matching name(s), {} unmatched, {} checked, {} unbalanced, {} balanced, {} row(s) removed",
        s.channels,
        s.batches,
        s.consensus_files,
        s.unmatched_files,
        s.checked_files,
        s.unbalanced_files,
        s.balanced_files,
        s.removed_rows,
    );
    if s.absent_files > 0 {
        eprintln!("{} unmatched file(s) were already gone", s.absent_files);
    }
    if s.malformed_rows > 0 {
        eprintln!("{} row(s) without key dropped", s.malformed_rows);
    }

    for record in report.unresolved() {
        let detail = match &record.state {
            FileState::NoReference { lines, minimum, .. } => {
                format!("{lines} lines, no channel holds {minimum}")
            }
            FileState::Misaligned { output_lines, minimum, reference_channel, .. } => {
                format!("alignment against {reference_channel} gives {output_lines} lines, expected {minimum}")
            }
            FileState::Vanished { lines, minimum } => {
                format!("{lines} lines against {minimum}, gone before the copy")
            }
            _ => continue,
        };
        eprintln!(
            "unresolved: {} [{}] {detail}",
            record.path(&report.layout.root).display(),
            record.state.label()
        );
    }
}

fn pause() {
    eprint!("Press ENTER to exit this program.");
    let _ = io::stderr().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}

pub fn cmd_sync(
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    dry_run: bool,
    json_output: bool,
    output_file: Option<PathBuf>,
    wait: bool,
) -> Result<(), CliError> {
    let result = run_sync(root, config_path, dry_run, json_output, output_file);
    if !wait {
        return result;
    }

    // Report before the prompt; the exit code still carries the failure
    let result = result.map_err(|e| {
        eprintln!("error: {}", e.message);
        if let Some(hint) = &e.hint {
            eprintln!("hint:  {}", hint);
        }
        CliError { code: e.code, message: String::new(), hint: None }
    });
    pause();
    result
}

fn run_sync(
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    dry_run: bool,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let mut config = load_config(config_path.as_ref())?;
    if let Some(root) = root {
        config.export_root = root;
    }
    config.dry_run |= dry_run;

    let report = phenosync_recon::run(&config).map_err(recon_err)?;

    write_json(&report, json_output, output_file.as_ref())?;
    print_summary(&report);

    if !report.is_resolved() {
        return Err(CliError::new(
            EXIT_SYNC_UNRESOLVED,
            format!("{} file(s) left unbalanced", report.summary.unresolved_files),
        )
        .with_hint("originals are kept in each batch's unbalanced/ folder"));
    }
    Ok(())
}

pub fn cmd_inventory(
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_ref())?;
    let root = root.unwrap_or_else(|| config.export_root.clone());

    let layout = phenosync_recon::inventory(&root, &config.folder_exclusions).map_err(recon_err)?;

    if json_output {
        let json_str = serde_json::to_string_pretty(&layout)
            .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let io_err = |e: io::Error| CliError::general(e.to_string());
    writeln!(out, "EXPORT: {}", root.display()).map_err(io_err)?;
    for channel in &layout.channels {
        writeln!(out, "  CHANNEL: {channel}").map_err(io_err)?;
    }
    for batch in &layout.batches {
        writeln!(out, "  BATCH: {batch}").map_err(io_err)?;
    }
    writeln!(
        out,
        "CHANNELS: {}, BATCHES: {}",
        layout.channels.len(),
        layout.batches.len()
    )
    .map_err(io_err)?;
    Ok(())
}

pub fn cmd_validate(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let path = config_path.unwrap_or_else(SyncConfig::default_path);
    let config = SyncConfig::load(&path)?;

    let target = config.balance_target.as_deref().unwrap_or("every file");
    eprintln!(
        "valid: export_root {}, files \"*{}*\", balancing {}, key {}, reference {}",
        config.export_root.display(),
        config.file_target,
        target,
        config.key,
        config.reference.policy,
    );
    Ok(())
}
