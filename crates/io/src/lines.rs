use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::ExportIoError;

/// Number of lines in a file.
///
/// Every `\n` ends a line; trailing bytes after the last `\n` count as one
/// more line. An empty file has zero lines. Nothing but the count is kept.
pub fn count_lines(path: &Path) -> Result<usize, ExportIoError> {
    let file = File::open(path).map_err(|e| ExportIoError::read(path, e))?;
    let mut reader = BufReader::new(file);

    let mut count = 0usize;
    let mut last = None;
    loop {
        let buf = reader.fill_buf().map_err(|e| ExportIoError::read(path, e))?;
        if buf.is_empty() {
            break;
        }
        count += buf.iter().filter(|&&b| b == b'\n').count();
        last = buf.last().copied();
        let len = buf.len();
        reader.consume(len);
    }

    if matches!(last, Some(b) if b != b'\n') {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn count(content: &str) -> usize {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, content).unwrap();
        count_lines(&path).unwrap()
    }

    #[test]
    fn empty_file_has_no_lines() {
        assert_eq!(count(""), 0);
    }

    #[test]
    fn terminated_lines() {
        assert_eq!(count("header\nrow1\nrow2\n"), 3);
    }

    #[test]
    fn trailing_partial_line_counts() {
        assert_eq!(count("header\nrow1\nrow2"), 3);
        assert_eq!(count("x"), 1);
    }

    #[test]
    fn crlf_and_blank_lines() {
        assert_eq!(count("a\r\nb\r\n\r\n"), 3);
    }

    #[test]
    fn larger_than_buffer() {
        let content = "Path\tSample Name\tCell ID\n".repeat(2000);
        assert_eq!(count(&content), 2000);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(count_lines(&dir.path().join("absent.txt")).is_err());
    }
}
