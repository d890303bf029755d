use crate::model::{ExportLayout, FileRecord, FileState, LineCountTable, SyncSummary, TallyTable};

/// Compute summary statistics from the stage outputs and per-file records.
pub fn compute_summary(
    layout: &ExportLayout,
    tally: &TallyTable,
    table: &LineCountTable,
    files: &[FileRecord],
) -> SyncSummary {
    let mut summary = SyncSummary {
        channels: layout.channels.len(),
        batches: layout.batches.len(),
        consensus_files: layout.batches.iter().map(|b| tally.consensus(b).len()).sum(),
        checked_files: table.checked_files(),
        ..SyncSummary::default()
    };

    for record in files {
        match &record.state {
            FileState::Unmatched { relocation } => {
                if relocation.is_absent() {
                    summary.absent_files += 1;
                } else {
                    summary.unmatched_files += 1;
                }
            }
            FileState::Reference { .. } => {}
            FileState::Balanced { removed, malformed, .. } => {
                summary.unbalanced_files += 1;
                summary.balanced_files += 1;
                summary.removed_rows += removed;
                summary.malformed_rows += malformed;
            }
            FileState::Misaligned { .. } | FileState::NoReference { .. } => {
                summary.unbalanced_files += 1;
                summary.unresolved_files += 1;
            }
            FileState::Vanished { .. } => {
                summary.unbalanced_files += 1;
                summary.unresolved_files += 1;
                summary.absent_files += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenosync_io::Relocation;
    use std::path::PathBuf;

    fn record(state: FileState) -> FileRecord {
        FileRecord {
            batch: "b1".into(),
            channel: "CD8".into(),
            file: "Merge_cell_seg_data.txt".into(),
            state,
        }
    }

    fn copied() -> Relocation {
        Relocation::Copied(PathBuf::from("unbalanced/Merge_cell_seg_data.txt"))
    }

    #[test]
    fn summary_counts() {
        let layout = ExportLayout {
            root: PathBuf::from("export"),
            channels: vec!["CD3".into(), "CD8".into()],
            batches: vec!["b1".into()],
        };
        let files = vec![
            record(FileState::Unmatched {
                relocation: Relocation::Moved(PathBuf::from("unmatched/A.txt")),
            }),
            record(FileState::Unmatched { relocation: Relocation::AlreadyAbsent }),
            record(FileState::Reference { lines: 10 }),
            record(FileState::Balanced {
                lines: 12,
                minimum: 10,
                reference_channel: "CD3".into(),
                removed: 2,
                malformed: 1,
                quarantine: copied(),
            }),
            record(FileState::NoReference { lines: 12, minimum: 10, quarantine: copied() }),
            record(FileState::Vanished { lines: 11, minimum: 10 }),
        ];

        let summary =
            compute_summary(&layout, &TallyTable::default(), &LineCountTable::default(), &files);
        assert_eq!(summary.channels, 2);
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.unmatched_files, 1);
        assert_eq!(summary.absent_files, 2);
        assert_eq!(summary.unbalanced_files, 3);
        assert_eq!(summary.balanced_files, 1);
        assert_eq!(summary.unresolved_files, 2);
        assert_eq!(summary.removed_rows, 2);
        assert_eq!(summary.malformed_rows, 1);
    }
}
