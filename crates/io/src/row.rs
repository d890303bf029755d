//! Delimited rows addressed by column name.
//!
//! Rows are kept as raw bytes (terminator included) so a rewritten file keeps
//! the exact bytes and line endings of the rows it retains. Fields are only
//! decoded when a key is extracted.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use phenosync_config::KeyColumn;

use crate::error::ExportIoError;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Column names taken from a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn from_header(line: &[u8], delimiter: u8) -> Self {
        let row = DelimitedRow::new(line, delimiter);
        let columns = row
            .fields()
            .enumerate()
            .map(|(i, field)| {
                let name = String::from_utf8_lossy(field);
                let name: &str = if i == 0 {
                    name.trim_start_matches('\u{feff}')
                } else {
                    name.as_ref()
                };
                name.trim().to_string()
            })
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of the key field, or `None` if the header cannot provide it.
    pub fn resolve(&self, key: &KeyColumn) -> Option<usize> {
        match &key.column {
            Some(name) => self.position(name),
            None => (key.index < self.columns.len()).then_some(key.index),
        }
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One raw line split lazily on a single-byte delimiter.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedRow<'a> {
    raw: &'a [u8],
    delimiter: u8,
}

impl<'a> DelimitedRow<'a> {
    pub fn new(raw: &'a [u8], delimiter: u8) -> Self {
        Self { raw, delimiter }
    }

    /// Line content without its `\n` / `\r\n` terminator.
    pub fn content(&self) -> &'a [u8] {
        let mut end = self.raw.len();
        if end > 0 && self.raw[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && self.raw[end - 1] == b'\r' {
            end -= 1;
        }
        &self.raw[..end]
    }

    pub fn is_blank(&self) -> bool {
        self.content().iter().all(|b| b.is_ascii_whitespace())
    }

    pub fn fields(&self) -> impl Iterator<Item = &'a [u8]> {
        let delimiter = self.delimiter;
        self.content().split(move |&b| b == delimiter)
    }

    pub fn field(&self, index: usize) -> Option<&'a [u8]> {
        self.fields().nth(index)
    }

    /// Decoded, trimmed key at `index`. `None` for a missing or empty field.
    pub fn key(&self, index: usize) -> Option<String> {
        let field = self.field(index)?;
        let key = String::from_utf8_lossy(field);
        let key = key.trim();
        (!key.is_empty()).then(|| key.to_string())
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Line-by-line reader that reuses one buffer. Lines keep their terminator.
pub struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
}

impl LineReader {
    pub fn open(path: &Path) -> Result<Self, ExportIoError> {
        let file = File::open(path).map_err(|e| ExportIoError::read(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
        })
    }

    /// Replace `buf` with the next line. `false` at end of file.
    pub fn next_into(&mut self, buf: &mut Vec<u8>) -> Result<bool, ExportIoError> {
        buf.clear();
        let n = self
            .reader
            .read_until(b'\n', buf)
            .map_err(|e| ExportIoError::read(&self.path, e))?;
        Ok(n > 0)
    }
}

/// All lines of a file, each with its terminator (the last may lack one).
pub fn read_lines(path: &Path) -> Result<Vec<Vec<u8>>, ExportIoError> {
    let mut reader = LineReader::open(path)?;
    let mut lines = Vec::new();
    let mut line = Vec::new();
    while reader.next_into(&mut line)? {
        lines.push(std::mem::take(&mut line));
    }
    Ok(lines)
}

/// A data file split into header, raw data rows, and one key per row.
#[derive(Debug, Clone)]
pub struct KeyedFile {
    pub header: Vec<u8>,
    pub rows: Vec<Vec<u8>>,
    /// `keys[i]` belongs to `rows[i]`; `None` where the row has no key field.
    pub keys: Vec<Option<String>>,
    pub key_index: usize,
}

/// Read a file and extract the key of every data row.
///
/// Fails with [`ExportIoError::MissingColumn`] when the header (or an empty
/// file) cannot provide the configured key column.
pub fn read_keyed(path: &Path, delimiter: u8, key: &KeyColumn) -> Result<KeyedFile, ExportIoError> {
    let mut lines = read_lines(path)?.into_iter();
    let missing = || ExportIoError::MissingColumn {
        path: path.to_path_buf(),
        column: key.to_string(),
    };

    let header = lines.next().ok_or_else(missing)?;
    let key_index = Schema::from_header(&header, delimiter).resolve(key).ok_or_else(missing)?;

    let rows: Vec<Vec<u8>> = lines.collect();
    let keys = rows
        .iter()
        .map(|raw| DelimitedRow::new(raw, delimiter).key(key_index))
        .collect();

    Ok(KeyedFile { header, rows, keys, key_index })
}
