//! Quarantine folders inside a batch folder.
//!
//! Files that break consensus are relocated into `<batch>/unmatched/` or
//! copied into `<batch>/unbalanced/`. A source that is already gone is not an
//! error: earlier stages or earlier runs may have relocated it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ExportIoError;

/// Files present in fewer than all channels.
pub const UNMATCHED_FOLDER: &str = "unmatched";

/// Originals of files with surplus lines.
pub const UNBALANCED_FOLDER: &str = "unbalanced";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateMode {
    Move,
    Copy,
    /// Report the destination without touching the file system.
    Plan,
}

/// What happened to a quarantined file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "path", rename_all = "snake_case")]
pub enum Relocation {
    Moved(PathBuf),
    Copied(PathBuf),
    Planned(PathBuf),
    AlreadyAbsent,
}

impl Relocation {
    /// Destination path, if the file was (or would be) relocated.
    pub fn destination(&self) -> Option<&Path> {
        match self {
            Self::Moved(p) | Self::Copied(p) | Self::Planned(p) => Some(p),
            Self::AlreadyAbsent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::AlreadyAbsent)
    }
}

/// Relocate `dir/file` into `dir/folder/file`, creating `folder` on demand.
pub fn relocate(
    dir: &Path,
    file: &str,
    folder: &str,
    mode: RelocateMode,
) -> Result<Relocation, ExportIoError> {
    let source = dir.join(file);
    let target_dir = dir.join(folder);
    let target = target_dir.join(file);

    match fs::symlink_metadata(&source) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Relocation::AlreadyAbsent),
        Err(e) => return Err(ExportIoError::read(&source, e)),
    }

    if mode == RelocateMode::Plan {
        return Ok(Relocation::Planned(target));
    }

    fs::create_dir_all(&target_dir).map_err(|e| ExportIoError::CreateDir {
        path: target_dir.clone(),
        source: e,
    })?;

    let result = if mode == RelocateMode::Move {
        fs::rename(&source, &target).map(|_| Relocation::Moved(target.clone()))
    } else {
        fs::copy(&source, &target).map(|_| Relocation::Copied(target.clone()))
    };

    match result {
        Ok(relocation) => Ok(relocation),
        // Gone between the existence check and the operation
        Err(e) if e.kind() == ErrorKind::NotFound && !source.exists() => Ok(Relocation::AlreadyAbsent),
        Err(e) => Err(ExportIoError::write(&target, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn move_creates_folder() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("A.txt"), "a\n").unwrap();

        let outcome = relocate(dir.path(), "A.txt", UNMATCHED_FOLDER, RelocateMode::Move).unwrap();
        let target = dir.path().join("unmatched").join("A.txt");
        assert_eq!(outcome, Relocation::Moved(target.clone()));
        assert!(target.is_file());
        assert!(!dir.path().join("A.txt").exists());
    }

    #[test]
    fn copy_keeps_original() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("B.txt"), "b\n").unwrap();

        let outcome = relocate(dir.path(), "B.txt", UNBALANCED_FOLDER, RelocateMode::Copy).unwrap();
        assert!(matches!(outcome, Relocation::Copied(_)));
        assert!(dir.path().join("B.txt").is_file());
        assert_eq!(
            fs::read_to_string(dir.path().join("unbalanced/B.txt")).unwrap(),
            "b\n"
        );
    }

    #[test]
    fn absent_source_is_reported_not_failed() {
        let dir = tempdir().unwrap();
        let outcome = relocate(dir.path(), "gone.txt", UNMATCHED_FOLDER, RelocateMode::Move).unwrap();
        assert!(outcome.is_absent());
        assert_eq!(outcome.destination(), None);
        // no folder is created for a file that is not there
        assert!(!dir.path().join("unmatched").exists());
    }

    #[test]
    fn plan_touches_nothing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("C.txt"), "c\n").unwrap();

        let outcome = relocate(dir.path(), "C.txt", UNMATCHED_FOLDER, RelocateMode::Plan).unwrap();
        assert_eq!(outcome.destination(), Some(dir.path().join("unmatched/C.txt").as_path()));
        assert!(dir.path().join("C.txt").is_file());
        assert!(!dir.path().join("unmatched").exists());
    }

    #[test]
    fn second_move_is_absent() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("D.txt"), "d\n").unwrap();

        relocate(dir.path(), "D.txt", UNMATCHED_FOLDER, RelocateMode::Move).unwrap();
        let again = relocate(dir.path(), "D.txt", UNMATCHED_FOLDER, RelocateMode::Move).unwrap();
        assert_eq!(again, Relocation::AlreadyAbsent);
    }
}
