// Delimited text import/export for the converters

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::ExportIoError;

/// Read file and convert to UTF-8 if needed (inForm on Windows writes Windows-1252, e.g. "µm")
pub fn read_file_as_utf8(path: &Path) -> Result<String, ExportIoError> {
    let mut file = File::open(path).map_err(|e| ExportIoError::read(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| ExportIoError::read(path, e))?;

    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// All records of a delimited file, header included. Quotes are literal text.
pub fn read_records(path: &Path, delimiter: u8) -> Result<Vec<csv::StringRecord>, ExportIoError> {
    let content = read_file_as_utf8(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| ExportIoError::Csv {
            path: path.to_path_buf(),
            message: format!("line {}: {e}", row_idx + 1),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Writer for a delimited output file. Rows may differ in width.
pub fn writer(path: &Path, delimiter: u8) -> Result<csv::Writer<File>, ExportIoError> {
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))
}

pub(crate) fn csv_error(path: &Path, e: csv::Error) -> ExportIoError {
    ExportIoError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.txt");
        // "Area (µm²)" in Windows-1252
        fs::write(&path, b"Area (\xb5m\xb2)\n").unwrap();

        let content = read_file_as_utf8(&path).unwrap();
        assert_eq!(content, "Area (µm²)\n");
    }

    #[test]
    fn tab_records_keep_quotes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.txt");
        fs::write(&path, "Name\tValue\n\"Slide 1\t5\nshort\n").unwrap();

        let records = read_records(&path, b'\t').unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].get(0), Some("\"Slide 1"));
        assert_eq!(records[1].get(1), Some("5"));
        assert_eq!(records[2].len(), 1);
    }

    #[test]
    fn writer_uses_delimiter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut w = writer(&path, b';').unwrap();
        w.write_record(["a", "b"]).unwrap();
        w.flush().unwrap();
        drop(w);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a;b\n");
    }
}
