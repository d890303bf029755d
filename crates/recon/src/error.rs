use std::fmt;
use std::path::PathBuf;

use phenosync_config::ConfigError;
use phenosync_io::ExportIoError;

#[derive(Debug)]
pub enum ReconError {
    /// Configuration rejected before any stage ran.
    Config(ConfigError),
    /// File system error while reading, relocating, or rewriting.
    Io(ExportIoError),
    /// The header of a file to reconcile (or its reference) lacks the key column.
    MissingKeyColumn { path: PathBuf, column: String },
    /// A data row without a key under the `fail` missing-key policy.
    /// `line` is 1-based and counts the header.
    MalformedRow { path: PathBuf, line: usize },
    /// The export root holds no channel folder after exclusions.
    NoChannels(PathBuf),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "{e}"),
            Self::MissingKeyColumn { path, column } => {
                write!(f, "{}: no key {column} in header", path.display())
            }
            Self::MalformedRow { path, line } => {
                write!(f, "{}:{line}: row has no key field", path.display())
            }
            Self::NoChannels(root) => {
                write!(f, "{}: no channel folders found", root.display())
            }
        }
    }
}

impl std::error::Error for ReconError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for ReconError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ExportIoError> for ReconError {
    fn from(e: ExportIoError) -> Self {
        match e {
            ExportIoError::MissingColumn { path, column } => Self::MissingKeyColumn { path, column },
            other => Self::Io(other),
        }
    }
}
