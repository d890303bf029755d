// Sync settings
// Loaded from <config dir>/phenosync/phenosync.toml or an explicit --config path

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Everything the reconciliation pipeline and the file converters need.
///
/// The export tree is expected as `<export_root>/<channel>/<batch>/<file>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default = "default_export_root")]
    pub export_root: PathBuf,

    /// Substring a file name must contain to take part in the presence tally.
    #[serde(default = "default_file_target")]
    pub file_target: String,

    /// Substring selecting the files that are line-balanced.
    /// `None` balances every consensus file.
    #[serde(default = "default_balance_target")]
    pub balance_target: Option<String>,

    /// Channel folders whose name contains any of these are skipped.
    #[serde(default = "default_folder_exclusions")]
    pub folder_exclusions: Vec<String>,

    #[serde(default)]
    pub key: KeyColumn,

    #[serde(default)]
    pub reference: ReferenceConfig,

    #[serde(default)]
    pub missing_key: MissingKeyPolicy,

    /// Plan relocations and rewrites without touching the export tree.
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default)]
    pub split: SplitConfig,

    #[serde(default)]
    pub sanitize: SanitizeConfig,

    #[serde(default)]
    pub sample_tables: SampleTablesConfig,

    #[serde(default)]
    pub halo: HaloConfig,

    #[serde(default)]
    pub tileconfig: TileLayoutConfig,
}

fn default_export_root() -> PathBuf {
    PathBuf::from("export")
}

fn default_file_target() -> String {
    "_cell_seg_data".into()
}

fn default_balance_target() -> Option<String> {
    Some("Merge_cell_seg_data.txt".into())
}

fn default_folder_exclusions() -> Vec<String> {
    vec!["Stroma".into(), "Tumor".into()]
}

fn default_delimiter() -> char {
    '\t'
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            export_root: default_export_root(),
            file_target: default_file_target(),
            balance_target: default_balance_target(),
            folder_exclusions: default_folder_exclusions(),
            key: KeyColumn::default(),
            reference: ReferenceConfig::default(),
            missing_key: MissingKeyPolicy::default(),
            dry_run: false,
            delimiter: default_delimiter(),
            split: SplitConfig::default(),
            sanitize: SanitizeConfig::default(),
            sample_tables: SampleTablesConfig::default(),
            halo: HaloConfig::default(),
            tileconfig: TileLayoutConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Row key
// ---------------------------------------------------------------------------

/// Where the row key (cell identifier) lives in each data row.
///
/// When `column` is set the header is searched for it and `index` is ignored.
/// An explicit `[key]` table without `column` selects purely by position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyColumn {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default = "default_key_index")]
    pub index: usize,
}

fn default_key_index() -> usize {
    4
}

impl Default for KeyColumn {
    fn default() -> Self {
        Self {
            column: Some("Cell ID".into()),
            index: default_key_index(),
        }
    }
}

impl std::fmt::Display for KeyColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(name) => write!(f, "column \"{name}\""),
            None => write!(f, "column #{}", self.index),
        }
    }
}

// ---------------------------------------------------------------------------
// Reference selection
// ---------------------------------------------------------------------------

/// Which minimum-count copy of a file serves as the row-key reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceConfig {
    #[serde(default)]
    pub policy: ReferencePolicy,
    /// Preferred reference channel. Used whenever it holds a minimum-count copy.
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// First candidate in lexicographic channel order.
    #[default]
    FirstSorted,
    /// Last candidate in lexicographic channel order.
    LastSorted,
}

impl std::fmt::Display for ReferencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstSorted => write!(f, "first_sorted"),
            Self::LastSorted => write!(f, "last_sorted"),
        }
    }
}

/// What to do with a data row that has no field at the key position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Drop the row and count it as removed and malformed.
    #[default]
    Drop,
    /// Abort the run, naming the file and line.
    Fail,
}

// ---------------------------------------------------------------------------
// Converters
// ---------------------------------------------------------------------------

/// Merge-file splitting: one output file per sample.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub target: String,
    /// Zero-based column holding the sample name.
    pub sample_column: usize,
    /// First capture group is the sample id; the whole field is used on no match.
    pub sample_pattern: String,
    /// Output folder name when the input name carries no channel prefix.
    pub fallback_channel: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            target: "Merge_cell_seg_data.txt".into(),
            sample_column: 1,
            sample_pattern: r"^(.*?)_\[[^\]]*\]".into(),
            fallback_channel: "Unk".into(),
        }
    }
}

/// TXT-to-CSV sanitizing: numeric columns only.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SanitizeConfig {
    pub target: String,
    /// Header substrings to keep. Empty keeps every header.
    pub include: Vec<String>,
    /// Header substrings to drop, applied after `include`.
    pub exclude: Vec<String>,
    /// Input tokens treated as not-a-number.
    pub nans: Vec<String>,
    /// Replacement written for every not-a-number token.
    pub nan_out: String,
    pub delimiter_out: char,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            target: "_cell_seg_data.txt".into(),
            include: Vec::new(),
            exclude: Vec::new(),
            nans: vec!["#N/A".into(), "N/A".into(), "NA".into(), "NaN".into()],
            nan_out: "NaN".into(),
            delimiter_out: ',',
        }
    }
}

/// Per-sample numeric tables from a consolidated export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SampleTablesConfig {
    pub target: String,
    /// Zero-based column holding the sample id.
    pub sample_column: usize,
}

impl Default for SampleTablesConfig {
    fn default() -> Self {
        Self {
            target: "Consolidated_data.txt".into(),
            sample_column: 0,
        }
    }
}

/// HALO object results: one comma-separated file per image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HaloConfig {
    pub target: String,
    /// Applied to each raw line; the first capture group names the image.
    pub image_pattern: String,
}

impl Default for HaloConfig {
    fn default() -> Self {
        Self {
            target: "Total_Object_Results.csv".into(),
            // file name without extension from a Windows image path
            image_pattern: r"\\([^\\]+?)\.[^\\.]+".into(),
        }
    }
}

/// Fiji "Grid/Collection stitching" tile configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TileLayoutConfig {
    pub target: String,
    /// File written into each tile folder.
    pub output: String,
    /// Flip the Y axis (MIBIscope stage coordinates).
    pub invert_y: bool,
    /// Pixels added per grid column and row.
    pub offsets: [i64; 2],
}

impl Default for TileLayoutConfig {
    fn default() -> Self {
        Self {
            target: ".tif".into(),
            output: "TileConfiguration.txt".into(),
            invert_y: false,
            offsets: [0, 0],
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Default config location: `<config dir>/phenosync/phenosync.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("phenosync")
            .join("phenosync.toml")
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let mut config: SyncConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.export_root = expand_path(&config.export_root)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    /// Load `path` if given, else the default location if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Self::default_path();
                if default.is_file() {
                    Self::load(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_target.is_empty() {
            return Err(ConfigError::Validation("file_target must not be empty".into()));
        }

        if matches!(self.balance_target.as_deref(), Some("")) {
            return Err(ConfigError::Validation(
                "balance_target must not be empty (omit it to balance every file)".into(),
            ));
        }

        // An empty substring is contained in every name
        if let Some(pos) = self.folder_exclusions.iter().position(|e| e.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "folder_exclusions[{pos}] is empty and would exclude every channel"
            )));
        }

        if !self.delimiter.is_ascii() {
            return Err(ConfigError::Validation(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )));
        }

        if let Some(name) = &self.key.column {
            if name.is_empty() {
                return Err(ConfigError::Validation("key.column must not be empty".into()));
            }
        }

        if !self.sanitize.delimiter_out.is_ascii() {
            return Err(ConfigError::Validation(format!(
                "sanitize.delimiter_out must be a single ASCII character, got {:?}",
                self.sanitize.delimiter_out
            )));
        }
        if self.sanitize.delimiter_out == self.delimiter {
            return Err(ConfigError::Validation(
                "sanitize.delimiter_out must differ from the input delimiter".into(),
            ));
        }

        if self.split.target.is_empty() {
            return Err(ConfigError::Validation("split.target must not be empty".into()));
        }
        let pattern = Regex::new(&self.split.sample_pattern).map_err(|e| {
            ConfigError::Validation(format!("split.sample_pattern: {e}"))
        })?;
        if pattern.captures_len() < 2 {
            return Err(ConfigError::Validation(
                "split.sample_pattern needs a capture group for the sample id".into(),
            ));
        }

        if self.sample_tables.target.is_empty() {
            return Err(ConfigError::Validation("sample_tables.target must not be empty".into()));
        }

        if self.halo.target.is_empty() {
            return Err(ConfigError::Validation("halo.target must not be empty".into()));
        }
        let pattern = Regex::new(&self.halo.image_pattern)
            .map_err(|e| ConfigError::Validation(format!("halo.image_pattern: {e}")))?;
        if pattern.captures_len() < 2 {
            return Err(ConfigError::Validation(
                "halo.image_pattern needs a capture group for the image name".into(),
            ));
        }

        if self.tileconfig.target.is_empty() {
            return Err(ConfigError::Validation("tileconfig.target must not be empty".into()));
        }
        let output = &self.tileconfig.output;
        if output.is_empty() || output.contains(['/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "tileconfig.output must be a plain file name, got {output:?}"
            )));
        }

        Ok(())
    }

    /// Input delimiter as a byte. Validation guarantees it is ASCII.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    /// Names of the files taking part in line balancing.
    pub fn is_balance_target(&self, file: &str) -> bool {
        match &self.balance_target {
            Some(target) => file.contains(target.as_str()),
            None => true,
        }
    }
}

fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .map_err(|e| ConfigError::Validation(format!("export_root: {e}")))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
export_root = "/data/panel-63/export"
file_target = "_cell_seg_data"
balance_target = "Merge_cell_seg_data.txt"
folder_exclusions = ["Stroma", "Tumor", "Scoring"]
missing_key = "fail"
dry_run = true

[key]
column = "Cell ID"

[reference]
policy = "last_sorted"
channel = "CD8"

[split]
sample_column = 1

[sanitize]
exclude = ["Path", "Tissue Category"]
nan_out = "NA"
"#;

    #[test]
    fn parse_full_config() {
        let config = SyncConfig::from_toml(FULL).unwrap();
        assert_eq!(config.export_root, PathBuf::from("/data/panel-63/export"));
        assert_eq!(config.folder_exclusions.len(), 3);
        assert_eq!(config.missing_key, MissingKeyPolicy::Fail);
        assert!(config.dry_run);
        assert_eq!(config.reference.policy, ReferencePolicy::LastSorted);
        assert_eq!(config.reference.channel.as_deref(), Some("CD8"));
        assert_eq!(config.sanitize.exclude, vec!["Path", "Tissue Category"]);
        assert_eq!(config.sanitize.nan_out, "NA");
        // untouched sections keep their defaults
        assert_eq!(config.split.target, "Merge_cell_seg_data.txt");
        assert_eq!(config.delimiter, '\t');
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = SyncConfig::from_toml("").unwrap();
        assert_eq!(config.file_target, "_cell_seg_data");
        assert_eq!(config.balance_target.as_deref(), Some("Merge_cell_seg_data.txt"));
        assert_eq!(config.folder_exclusions, vec!["Stroma", "Tumor"]);
        assert_eq!(config.key, KeyColumn::default());
        assert_eq!(config.reference.policy, ReferencePolicy::FirstSorted);
        assert_eq!(config.missing_key, MissingKeyPolicy::Drop);
        assert!(!config.dry_run);
    }

    #[test]
    fn key_table_without_column_selects_by_index() {
        let config = SyncConfig::from_toml("[key]\nindex = 2\n").unwrap();
        assert_eq!(config.key.column, None);
        assert_eq!(config.key.index, 2);
        assert_eq!(config.key.to_string(), "column #2");
    }

    #[test]
    fn balance_target_predicate() {
        let mut config = SyncConfig::default();
        assert!(config.is_balance_target("CD3 Merge_cell_seg_data.txt"));
        assert!(!config.is_balance_target("slide_1_cell_seg_data.txt"));
        config.balance_target = None;
        assert!(config.is_balance_target("slide_1_cell_seg_data.txt"));
    }

    #[test]
    fn reject_empty_exclusion() {
        let err = SyncConfig::from_toml("folder_exclusions = [\"Stroma\", \"\"]\n").unwrap_err();
        assert!(err.to_string().contains("folder_exclusions[1]"));
    }

    #[test]
    fn reject_non_ascii_delimiter() {
        let err = SyncConfig::from_toml("delimiter = \"§\"\n").unwrap_err();
        assert!(err.to_string().contains("ASCII"));
    }

    #[test]
    fn reject_same_sanitize_delimiter() {
        let err = SyncConfig::from_toml("[sanitize]\ndelimiter_out = \"\\t\"\n").unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn reject_pattern_without_group() {
        let err = SyncConfig::from_toml("[split]\nsample_pattern = \"^S\\\\d+\"\n").unwrap_err();
        assert!(err.to_string().contains("capture group"));
    }

    #[test]
    fn converter_sections() {
        let config = SyncConfig::from_toml(
            "[tileconfig]\ninvert_y = true\noffsets = [-12, 8]\n\n[halo]\ntarget = \"Objects.csv\"\n",
        )
        .unwrap();
        assert!(config.tileconfig.invert_y);
        assert_eq!(config.tileconfig.offsets, [-12, 8]);
        assert_eq!(config.tileconfig.output, "TileConfiguration.txt");
        assert_eq!(config.halo.target, "Objects.csv");
        assert_eq!(config.sample_tables.sample_column, 0);
    }

    #[test]
    fn default_halo_pattern_takes_image_stem() {
        let pattern = Regex::new(&HaloConfig::default().image_pattern).unwrap();
        let line = "C:\\scans\\Slide 4_[1,2].qptiff,Tumor,17";
        let caps = pattern.captures(line).unwrap();
        assert_eq!(&caps[1], "Slide 4_[1,2]");
    }

    #[test]
    fn reject_tileconfig_output_path() {
        let err = SyncConfig::from_toml("[tileconfig]\noutput = \"../tiles.txt\"\n").unwrap_err();
        assert!(err.to_string().contains("plain file name"));
    }

    #[test]
    fn reject_unknown_policy() {
        let err = SyncConfig::from_toml("[reference]\npolicy = \"random\"\n");
        assert!(err.is_err(), "unknown policy should fail deserialization");
    }

    #[test]
    fn reject_unknown_field() {
        let err = SyncConfig::from_toml("exprt_root = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn default_path_ends_with_file_name() {
        let path = SyncConfig::default_path();
        assert!(path.ends_with("phenosync/phenosync.toml"));
    }
}
