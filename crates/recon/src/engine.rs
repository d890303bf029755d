use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use log::{debug, info, warn};
use phenosync_config::SyncConfig;
use phenosync_io::fs::{list_files, list_folders, write_atomic};
use phenosync_io::lines::count_lines;
use phenosync_io::row::read_keyed;
use phenosync_io::{relocate, KeyedFile, Relocation, RelocateMode, UNBALANCED_FOLDER, UNMATCHED_FOLDER};

use crate::align::align_greedy;
use crate::error::ReconError;
use crate::model::{
    Alignment, ExportLayout, FileRecord, FileState, LineCountTable, SyncMeta, SyncReport,
    TallyTable,
};
use crate::reference::select_reference;
use crate::summary::compute_summary;
use crate::tally::tally_files;

/// Run all six stages over `config.export_root`.
///
/// Each stage completes before the next one starts. With `dry_run` set the
/// export tree is only read: relocations are planned and alignments computed
/// but nothing is moved, copied, or rewritten.
pub fn run(config: &SyncConfig) -> Result<SyncReport, ReconError> {
    config.validate()?;
    let mode = if config.dry_run { "dry run" } else { "live" };
    info!("Synchronizing {} ({mode})", config.export_root.display());

    info!("Retrieving folder lists (1/6)");
    let layout = inventory(&config.export_root, &config.folder_exclusions)?;
    info!("channels: {}, batches: {}", layout.channels.len(), layout.batches.len());

    info!("Counting matching file names (2/6)");
    let tally = tally_presence(config, &layout)?;

    info!("Moving unmatched files to folder (3/6)");
    let mut files = quarantine_unmatched(config, &layout, &tally)?;

    info!("Checking line counts (4/6)");
    let table = count_consensus_lines(config, &layout, &tally)?;
    info!("checked files: {}", table.checked_files());

    info!("Copying files with unbalanced lines to folder (5/6)");
    let unbalanced = quarantine_unbalanced(config, &layout, &table)?;

    info!("Removing unbalanced lines (6/6)");
    files.extend(reconcile(config, &layout, &table, unbalanced)?);

    let summary = compute_summary(&layout, &tally, &table, &files);
    info!(
        "unmatched: {}, unbalanced: {}, balanced: {}, unresolved: {}, removed rows: {}",
        summary.unmatched_files,
        summary.unbalanced_files,
        summary.balanced_files,
        summary.unresolved_files,
        summary.removed_rows
    );

    Ok(SyncReport {
        meta: SyncMeta {
            export_root: config.export_root.display().to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            dry_run: config.dry_run,
            reference_policy: config.reference.policy.to_string(),
            key: config.key.to_string(),
        },
        layout,
        summary,
        files,
    })
}

// ---------------------------------------------------------------------------
// Stage 1: folder inventory
// ---------------------------------------------------------------------------

/// Channel folders of `root` (minus exclusions) and the union of their batch folders.
pub fn inventory(root: &Path, exclusions: &[String]) -> Result<ExportLayout, ReconError> {
    let channels = list_folders(root, exclusions)?;
    if channels.is_empty() {
        return Err(ReconError::NoChannels(root.to_path_buf()));
    }

    let mut batches = Vec::new();
    for channel in &channels {
        debug!("channel {:?}", channel);
        for batch in list_folders(&root.join(channel), &[])? {
            debug!("  batch {:?}", batch);
            batches.push(batch);
        }
    }
    batches.sort();
    batches.dedup();

    Ok(ExportLayout {
        root: root.to_path_buf(),
        channels,
        batches,
    })
}

// ---------------------------------------------------------------------------
// Stages 2-3: presence tally + unmatched quarantine
// ---------------------------------------------------------------------------

fn tally_presence(config: &SyncConfig, layout: &ExportLayout) -> Result<TallyTable, ReconError> {
    let mut listings: Vec<(&str, Vec<String>)> = Vec::new();
    for batch in &layout.batches {
        for channel in &layout.channels {
            let files = list_files(&layout.batch_dir(channel, batch), &config.file_target)?;
            debug!("{batch}/{channel}: {} file(s)", files.len());
            listings.push((batch.as_str(), files));
        }
    }

    let tally = tally_files(
        layout.channel_count(),
        listings.iter().map(|(batch, files)| (*batch, files.as_slice())),
    );
    let consensus: usize = layout.batches.iter().map(|b| tally.consensus(b).len()).sum();
    info!("matching names: {consensus}");
    Ok(tally)
}

fn quarantine_unmatched(
    config: &SyncConfig,
    layout: &ExportLayout,
    tally: &TallyTable,
) -> Result<Vec<FileRecord>, ReconError> {
    let mode = if config.dry_run { RelocateMode::Plan } else { RelocateMode::Move };
    let mut records = Vec::new();

    for channel in &layout.channels {
        for batch in &layout.batches {
            let dir = layout.batch_dir(channel, batch);
            for file in tally.unmatched(batch) {
                // Files this channel never had are not its concern
                if !dir.join(file).exists() {
                    continue;
                }
                let relocation = relocate(&dir, file, UNMATCHED_FOLDER, mode)?;
                match relocation.destination() {
                    Some(target) => {
                        info!("unmatched {} -> {}", dir.join(file).display(), target.display())
                    }
                    None => warn!("{}: already gone, skipped", dir.join(file).display()),
                }
                records.push(FileRecord {
                    batch: batch.clone(),
                    channel: channel.clone(),
                    file: file.to_string(),
                    state: FileState::Unmatched { relocation },
                });
            }
        }
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Stage 4: line counts
// ---------------------------------------------------------------------------

/// Count lines of every balance-target file present in all channels.
///
/// Non-consensus files are skipped even when a dry run left them in place,
/// so a dry run reports the same minimums a live run would use.
fn count_consensus_lines(
    config: &SyncConfig,
    layout: &ExportLayout,
    tally: &TallyTable,
) -> Result<LineCountTable, ReconError> {
    let mut counts = Vec::new();
    for batch in &layout.batches {
        for channel in &layout.channels {
            let dir = layout.batch_dir(channel, batch);
            for file in list_files(&dir, &config.file_target)? {
                if !config.is_balance_target(&file) || !tally.is_consensus(batch, &file) {
                    continue;
                }
                let lines = count_lines(&dir.join(&file))?;
                debug!("{batch}/{channel}/{file}: {lines} line(s)");
                counts.push((batch.clone(), channel.clone(), file, lines));
            }
        }
    }
    Ok(LineCountTable::from_counts(counts))
}

// ---------------------------------------------------------------------------
// Stage 5: unbalanced quarantine
// ---------------------------------------------------------------------------

struct Unbalanced {
    batch: String,
    channel: String,
    file: String,
    lines: usize,
    minimum: usize,
    quarantine: Relocation,
}

fn quarantine_unbalanced(
    config: &SyncConfig,
    layout: &ExportLayout,
    table: &LineCountTable,
) -> Result<Vec<Unbalanced>, ReconError> {
    let mode = if config.dry_run { RelocateMode::Plan } else { RelocateMode::Copy };
    let mut unbalanced = Vec::new();

    for (batch, channel, file, lines) in table.entries() {
        if !table.is_unbalanced(batch, channel, file) {
            continue;
        }
        let Some(minimum) = table.minimum(batch, file) else { continue };

        let dir = layout.batch_dir(channel, batch);
        let quarantine = relocate(&dir, file, UNBALANCED_FOLDER, mode)?;
        match quarantine.destination() {
            Some(target) => info!(
                "unbalanced {} ({lines} > {minimum} lines) -> {}",
                dir.join(file).display(),
                target.display()
            ),
            None => warn!("{}: vanished before quarantine", dir.join(file).display()),
        }

        unbalanced.push(Unbalanced {
            batch: batch.to_string(),
            channel: channel.to_string(),
            file: file.to_string(),
            lines,
            minimum,
            quarantine,
        });
    }
    Ok(unbalanced)
}

// ---------------------------------------------------------------------------
// Stage 6: row-key reconciliation
// ---------------------------------------------------------------------------

fn reconcile(
    config: &SyncConfig,
    layout: &ExportLayout,
    table: &LineCountTable,
    unbalanced: Vec<Unbalanced>,
) -> Result<Vec<FileRecord>, ReconError> {
    let mut records = Vec::new();

    for (batch, channel, file, lines) in table.entries() {
        if !table.is_unbalanced(batch, channel, file) {
            records.push(FileRecord {
                batch: batch.to_string(),
                channel: channel.to_string(),
                file: file.to_string(),
                state: FileState::Reference { lines },
            });
        }
    }

    // Reference keys are shared by every unbalanced copy of the same file
    let mut references: HashMap<(String, String), Vec<Option<String>>> = HashMap::new();

    for entry in unbalanced {
        if entry.quarantine.is_absent() {
            records.push(FileRecord {
                batch: entry.batch,
                channel: entry.channel,
                file: entry.file,
                state: FileState::Vanished { lines: entry.lines, minimum: entry.minimum },
            });
            continue;
        }

        let chosen = select_reference(table, &entry.batch, &entry.file, &config.reference);
        let Some(reference_channel) = chosen else {
            warn!(
                "{}: no channel holds {} lines, left untouched",
                layout.file_path(&entry.channel, &entry.batch, &entry.file).display(),
                entry.minimum
            );
            records.push(FileRecord {
                batch: entry.batch,
                channel: entry.channel,
                file: entry.file,
                state: FileState::NoReference {
                    lines: entry.lines,
                    minimum: entry.minimum,
                    quarantine: entry.quarantine,
                },
            });
            continue;
        };
        let reference_channel = reference_channel.to_string();

        let cache_key = (entry.batch.clone(), entry.file.clone());
        if !references.contains_key(&cache_key) {
            let path = layout.file_path(&reference_channel, &entry.batch, &entry.file);
            let keyed = read_keyed(&path, config.delimiter_byte(), &config.key)?;
            debug!("reference {}: {} key(s)", path.display(), keyed.keys.len());
            references.insert(cache_key.clone(), keyed.keys);
        }
        let reference_keys = references.get(&cache_key).map(Vec::as_slice).unwrap_or(&[]);

        let target = layout.file_path(&entry.channel, &entry.batch, &entry.file);
        let source = match &entry.quarantine {
            Relocation::Copied(copy) => copy.clone(),
            _ => target.clone(),
        };
        let (keyed, alignment) = align(config, &source, reference_keys)?;
        let (removed, malformed, output_lines) =
            (alignment.removed, alignment.malformed, alignment.output_lines());

        let state = if output_lines == entry.minimum {
            if !config.dry_run {
                write_kept_rows(&target, &keyed, &alignment)?;
            }
            info!(
                "balanced {} against {reference_channel}: {removed} row(s) removed",
                target.display()
            );
            FileState::Balanced {
                lines: entry.lines,
                minimum: entry.minimum,
                reference_channel,
                removed,
                malformed,
                quarantine: entry.quarantine,
            }
        } else {
            warn!(
                "{}: alignment against {reference_channel} leaves {output_lines} lines, expected {}; left untouched",
                target.display(),
                entry.minimum
            );
            FileState::Misaligned {
                lines: entry.lines,
                minimum: entry.minimum,
                output_lines,
                reference_channel,
                removed,
                malformed,
                quarantine: entry.quarantine,
            }
        };
        records.push(FileRecord {
            batch: entry.batch,
            channel: entry.channel,
            file: entry.file,
            state,
        });
    }

    Ok(records)
}

fn align(
    config: &SyncConfig,
    source: &Path,
    reference_keys: &[Option<String>],
) -> Result<(KeyedFile, Alignment), ReconError> {
    let keyed = read_keyed(source, config.delimiter_byte(), &config.key)?;
    let alignment = align_greedy(reference_keys, &keyed.keys, config.missing_key).map_err(|e| {
        ReconError::MalformedRow {
            path: source.to_path_buf(),
            line: e.row + 2,
        }
    })?;

    if alignment.malformed > 0 {
        warn!("{}: {} row(s) without key dropped", source.display(), alignment.malformed);
    }
    Ok((keyed, alignment))
}

/// Replace `target` with the header and the kept rows.
fn write_kept_rows(target: &Path, keyed: &KeyedFile, alignment: &Alignment) -> Result<(), ReconError> {
    write_atomic(target, |w| {
        w.write_all(&keyed.header)?;
        for &i in &alignment.kept {
            if let Some(row) = keyed.rows.get(i) {
                w.write_all(row)?;
            }
        }
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_gone_before_quarantine_is_reported() {
        let dir = tempdir().unwrap();
        let config = SyncConfig {
            export_root: dir.path().to_path_buf(),
            ..SyncConfig::default()
        };
        let layout = ExportLayout {
            root: dir.path().to_path_buf(),
            channels: vec!["CD3".into(), "CD8".into()],
            batches: vec!["b1".into()],
        };
        // counted in stage 4, then deleted before stage 5 reached it
        let table = LineCountTable::from_counts([
            ("b1".to_string(), "CD3".to_string(), "Merge_cell_seg_data.txt".to_string(), 5),
            ("b1".to_string(), "CD8".to_string(), "Merge_cell_seg_data.txt".to_string(), 6),
        ]);

        let unbalanced = quarantine_unbalanced(&config, &layout, &table).unwrap();
        assert_eq!(unbalanced.len(), 1);
        assert!(unbalanced[0].quarantine.is_absent());

        let records = reconcile(&config, &layout, &table, unbalanced).unwrap();
        assert_eq!(records.len(), 2);
        let vanished = records.iter().find(|r| r.channel == "CD8").unwrap();
        assert_eq!(vanished.state, FileState::Vanished { lines: 6, minimum: 5 });
        assert!(vanished.state.is_unresolved());
        assert_eq!(vanished.state.label(), "vanished");
    }
}
