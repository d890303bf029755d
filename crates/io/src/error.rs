use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExportIoError {
    /// Directory listing or file read failed.
    Read { path: PathBuf, source: std::io::Error },
    /// File write, copy, or rename failed.
    Write { path: PathBuf, source: std::io::Error },
    /// Quarantine or output folder could not be created.
    CreateDir { path: PathBuf, source: std::io::Error },
    /// Delimited parse / write error.
    Csv { path: PathBuf, message: String },
    /// Header does not contain the configured key column.
    MissingColumn { path: PathBuf, column: String },
    /// Output folder holds files from an earlier run.
    OutputNotEmpty { path: PathBuf },
    /// Unreadable TIFF or a missing position/resolution tag.
    Tiff { path: PathBuf, message: String },
}

impl ExportIoError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read { path: path.into(), source }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write { path: path.into(), source }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Read { path, .. }
            | Self::Write { path, .. }
            | Self::CreateDir { path, .. }
            | Self::Csv { path, .. }
            | Self::MissingColumn { path, .. }
            | Self::OutputNotEmpty { path }
            | Self::Tiff { path, .. } => path,
        }
    }
}

impl fmt::Display for ExportIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            Self::Write { path, source } => write!(f, "cannot write {}: {source}", path.display()),
            Self::CreateDir { path, source } => {
                write!(f, "cannot create folder {}: {source}", path.display())
            }
            Self::Csv { path, message } => write!(f, "{}: {message}", path.display()),
            Self::MissingColumn { path, column } => {
                write!(f, "{}: header has no {column}", path.display())
            }
            Self::OutputNotEmpty { path } => {
                write!(f, "output folder {} is not empty", path.display())
            }
            Self::Tiff { path, message } => write!(f, "{}: {message}", path.display()),
        }
    }
}

impl std::error::Error for ExportIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } | Self::CreateDir { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}
