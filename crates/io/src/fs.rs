// Export tree traversal
// Only immediate children are listed; symbolic links are never followed.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ExportIoError;

/// Immediate child folder names of `root`, sorted.
///
/// Symbolic links are skipped, as is any folder whose name contains one of
/// `exclusions` (plain substring match).
pub fn list_folders(root: &Path, exclusions: &[String]) -> Result<Vec<String>, ExportIoError> {
    let entries = fs::read_dir(root).map_err(|e| ExportIoError::read(root, e))?;

    let mut folders = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExportIoError::read(root, e))?;
        // DirEntry::file_type does not traverse symlinks
        let file_type = entry.file_type().map_err(|e| ExportIoError::read(entry.path(), e))?;
        if !file_type.is_dir() {
            continue;
        }

        let Some(name) = utf8_name(&entry) else { continue };
        if exclusions.iter().any(|pattern| name.contains(pattern.as_str())) {
            log::debug!("skipping excluded folder {:?}", name);
            continue;
        }
        folders.push(name);
    }

    folders.sort();
    folders.dedup();
    Ok(folders)
}

/// Names of regular files directly inside `dir` whose name contains `pattern`, sorted.
///
/// A missing `dir` lists as empty: a channel without a given batch folder
/// simply contributes no files to that batch.
pub fn list_files(dir: &Path, pattern: &str) -> Result<Vec<String>, ExportIoError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ExportIoError::read(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExportIoError::read(dir, e))?;
        let file_type = entry.file_type().map_err(|e| ExportIoError::read(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        if let Some(name) = utf8_name(&entry) {
            if name.contains(pattern) {
                files.push(name);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn utf8_name(entry: &fs::DirEntry) -> Option<String> {
    match entry.file_name().into_string() {
        Ok(name) => Some(name),
        Err(raw) => {
            log::warn!("skipping non UTF-8 name {:?}", raw);
            None
        }
    }
}

/// Replace `path` with whatever `fill` writes, via a sibling temporary file.
///
/// The destination is only swapped in after `fill` succeeded and the data was
/// flushed, so an interrupted write never leaves a truncated file behind.
pub fn write_atomic<F>(path: &Path, fill: F) -> Result<(), ExportIoError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let partial = partial_path(path);

    let result = (|| -> std::io::Result<()> {
        let file = File::create(&partial)?;
        let mut writer = BufWriter::new(file);
        fill(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(ExportIoError::write(path, e));
    }

    fs::rename(&partial, path).map_err(|e| {
        let _ = fs::remove_file(&partial);
        ExportIoError::write(path, e)
    })
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn folders_are_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["CD8", "CD3", "Stroma", "Tumor scoring", "FoxP3"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "not a folder").unwrap();

        let exclusions = vec!["Stroma".to_string(), "Tumor".to_string()];
        let folders = list_folders(dir.path(), &exclusions).unwrap();
        assert_eq!(folders, vec!["CD3", "CD8", "FoxP3"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_folders_are_skipped() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let folders = list_folders(dir.path(), &[]).unwrap();
        assert_eq!(folders, vec!["real"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a_cell_seg_data.txt"), "x\n").unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("a_cell_seg_data.txt"),
            dir.path().join("b_cell_seg_data.txt"),
        )
        .unwrap();

        let files = list_files(dir.path(), "_cell_seg_data").unwrap();
        assert_eq!(files, vec!["a_cell_seg_data.txt"]);
    }

    #[test]
    fn files_match_by_substring() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("s1_cell_seg_data.txt"), "").unwrap();
        fs::write(dir.path().join("s1_cell_seg_data_summary.txt"), "").unwrap();
        fs::write(dir.path().join("s1_tissue_seg_data.txt"), "").unwrap();
        fs::create_dir(dir.path().join("unmatched_cell_seg_data")).unwrap();

        let files = list_files(dir.path(), "_cell_seg_data").unwrap();
        assert_eq!(files, vec!["s1_cell_seg_data.txt", "s1_cell_seg_data_summary.txt"]);
    }

    #[test]
    fn missing_folder_lists_empty() {
        let dir = tempdir().unwrap();
        let files = list_files(&dir.path().join("absent"), "").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let err = list_folders(&dir.path().join("absent"), &[]).unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old\n").unwrap();

        write_atomic(&path, |w| w.write_all(b"new\n")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn failed_atomic_write_keeps_original() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old\n").unwrap();

        let err = write_atomic(&path, |w| {
            w.write_all(b"half")?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "interrupted"))
        })
        .unwrap_err();

        assert!(err.to_string().contains("interrupted"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
        assert!(!partial_path(&path).exists());
    }
}
