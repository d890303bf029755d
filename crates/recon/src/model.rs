use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use phenosync_io::Relocation;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Channel and batch folder names of an export tree, sorted.
///
/// Batch names are the union over all channels; a channel without a given
/// batch folder simply contributes nothing to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportLayout {
    pub root: PathBuf,
    pub channels: Vec<String>,
    pub batches: Vec<String>,
}

impl ExportLayout {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// `<root>/<channel>/<batch>`
    pub fn batch_dir(&self, channel: &str, batch: &str) -> PathBuf {
        self.root.join(channel).join(batch)
    }

    pub fn file_path(&self, channel: &str, batch: &str, file: &str) -> PathBuf {
        self.batch_dir(channel, batch).join(file)
    }
}

// ---------------------------------------------------------------------------
// File presence
// ---------------------------------------------------------------------------

/// File name -> number of channels holding it, for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileTally {
    pub counts: BTreeMap<String, usize>,
}

impl FileTally {
    pub fn count(&self, file: &str) -> usize {
        self.counts.get(file).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TallyTable {
    pub channel_count: usize,
    pub batches: BTreeMap<String, FileTally>,
}

impl TallyTable {
    pub fn batch(&self, batch: &str) -> Option<&FileTally> {
        self.batches.get(batch)
    }

    /// Files of `batch` missing from at least one channel, sorted.
    pub fn unmatched(&self, batch: &str) -> Vec<&str> {
        self.filter(batch, |count| count < self.channel_count)
    }

    /// Files of `batch` present in every channel, sorted.
    pub fn consensus(&self, batch: &str) -> Vec<&str> {
        self.filter(batch, |count| count >= self.channel_count)
    }

    pub fn is_consensus(&self, batch: &str, file: &str) -> bool {
        self.batch(batch)
            .map(|t| t.count(file) >= self.channel_count)
            .unwrap_or(false)
    }

    fn filter(&self, batch: &str, keep: impl Fn(usize) -> bool) -> Vec<&str> {
        self.batch(batch)
            .map(|t| {
                t.counts
                    .iter()
                    .filter(|(_, &count)| keep(count))
                    .map(|(name, _)| name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Line counts
// ---------------------------------------------------------------------------

/// batch -> channel -> file -> lines, plus the per-batch minimum per file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineCountTable {
    pub lines: BTreeMap<String, BTreeMap<String, BTreeMap<String, usize>>>,
    pub minimums: BTreeMap<String, BTreeMap<String, usize>>,
}

// ---------------------------------------------------------------------------
// Alignment
// ---------------------------------------------------------------------------

/// Outcome of aligning one over-long file against its reference keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Alignment {
    /// Indices of retained data rows, ascending.
    pub kept: Vec<usize>,
    pub removed: usize,
    /// Removed rows that had no key field.
    pub malformed: usize,
}

impl Alignment {
    /// Line count of the rewritten file, header included.
    pub fn output_lines(&self) -> usize {
        self.kept.len() + 1
    }
}

// ---------------------------------------------------------------------------
// File lifecycle
// ---------------------------------------------------------------------------

/// Where a file ended up after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileState {
    /// Missing from some channel; relocated to `unmatched/`.
    Unmatched { relocation: Relocation },
    /// Line count equals the batch minimum.
    Reference { lines: usize },
    /// Over-long and rewritten to the batch minimum.
    Balanced {
        lines: usize,
        minimum: usize,
        reference_channel: String,
        removed: usize,
        malformed: usize,
        quarantine: Relocation,
    },
    /// The greedy walk did not land on the batch minimum; left untouched.
    Misaligned {
        lines: usize,
        minimum: usize,
        output_lines: usize,
        reference_channel: String,
        removed: usize,
        malformed: usize,
        quarantine: Relocation,
    },
    /// Over-long with no channel holding a minimum-count copy; left untouched.
    NoReference {
        lines: usize,
        minimum: usize,
        quarantine: Relocation,
    },
    /// Over-long when counted, but gone before it could be copied aside.
    Vanished { lines: usize, minimum: usize },
}

impl FileState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unmatched { .. } => "unmatched",
            Self::Reference { .. } => "reference",
            Self::Balanced { .. } => "balanced",
            Self::Misaligned { .. } => "misaligned",
            Self::NoReference { .. } => "no reference",
            Self::Vanished { .. } => "vanished",
        }
    }

    /// Still out of balance after the run.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Self::Misaligned { .. } | Self::NoReference { .. } | Self::Vanished { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub batch: String,
    pub channel: String,
    pub file: String,
    #[serde(flatten)]
    pub state: FileState,
}

impl FileRecord {
    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(&self.channel).join(&self.batch).join(&self.file)
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub channels: usize,
    pub batches: usize,
    /// Distinct (batch, file) pairs present in every channel.
    pub consensus_files: usize,
    pub unmatched_files: usize,
    /// Files already gone when their relocation was attempted.
    pub absent_files: usize,
    pub checked_files: usize,
    pub unbalanced_files: usize,
    pub balanced_files: usize,
    pub unresolved_files: usize,
    pub removed_rows: usize,
    pub malformed_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncMeta {
    pub export_root: String,
    pub engine_version: String,
    pub run_at: String,
    pub dry_run: bool,
    pub reference_policy: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub meta: SyncMeta,
    pub layout: ExportLayout,
    pub summary: SyncSummary,
    pub files: Vec<FileRecord>,
}

impl SyncReport {
    /// No file was left misaligned or without a reference.
    pub fn is_resolved(&self) -> bool {
        self.summary.unresolved_files == 0
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter().filter(|r| r.state.is_unresolved())
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
