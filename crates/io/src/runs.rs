//! Contiguous runs of rows routed to one output file per key.
//!
//! The first run written to a path truncates it and starts with the header;
//! a later run for the same path appends without repeating the header.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ExportIoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutput {
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
}

pub(crate) struct RunSink {
    header: Vec<u8>,
    opened: HashSet<PathBuf>,
    outputs: Vec<RunOutput>,
}

impl RunSink {
    pub(crate) fn new(header: Vec<u8>) -> Self {
        Self {
            header,
            opened: HashSet::new(),
            outputs: Vec::new(),
        }
    }

    /// Header used for paths opened from now on.
    pub(crate) fn set_header(&mut self, header: Vec<u8>) {
        self.header = header;
    }

    pub(crate) fn write_run(&mut self, name: &str, path: &Path, rows: &[Vec<u8>]) -> Result<(), ExportIoError> {
        if rows.is_empty() {
            return Ok(());
        }

        let fresh = self.opened.insert(path.to_path_buf());
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(fresh)
            .append(!fresh)
            .open(path)
            .map_err(|e| ExportIoError::write(path, e))?;
        let mut out = BufWriter::new(file);

        let result = (|| -> std::io::Result<()> {
            if fresh {
                out.write_all(&self.header)?;
            }
            for row in rows {
                out.write_all(row)?;
            }
            out.flush()
        })();
        result.map_err(|e| ExportIoError::write(path, e))?;

        match self.outputs.iter_mut().find(|o| o.path == path) {
            Some(output) => output.rows += rows.len(),
            None => {
                log::debug!("{name:?} -> {}", path.display());
                self.outputs.push(RunOutput {
                    name: name.to_string(),
                    path: path.to_path_buf(),
                    rows: rows.len(),
                });
            }
        }
        Ok(())
    }

    /// Outputs first opened after the first `skip` ones.
    pub(crate) fn outputs_from(&self, skip: usize) -> &[RunOutput] {
        self.outputs.get(skip..).unwrap_or(&[])
    }

    pub(crate) fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub(crate) fn into_outputs(self) -> Vec<RunOutput> {
        self.outputs
    }
}

/// Keep a key usable as a file name.
pub(crate) fn file_name_safe(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect()
}

/// `line` with a `\n` terminator.
pub(crate) fn terminated(line: &[u8]) -> Vec<u8> {
    let mut line = line.to_vec();
    if !line.ends_with(b"\n") {
        line.push(b'\n');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn later_runs_append_without_header() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "stale\n").unwrap();

        let mut sink = RunSink::new(b"H\n".to_vec());
        sink.write_run("a", &a, &[b"1\n".to_vec()]).unwrap();
        sink.write_run("b", &b, &[b"2\n".to_vec()]).unwrap();
        sink.write_run("a", &a, &[b"3\n".to_vec(), b"4\n".to_vec()]).unwrap();

        assert_eq!(fs::read_to_string(&a).unwrap(), "H\n1\n3\n4\n");
        assert_eq!(fs::read_to_string(&b).unwrap(), "H\n2\n");
        let outputs = sink.into_outputs();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].rows, 3);
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        assert_eq!(file_name_safe("S1: a/b"), "S1_ a_b");
        assert_eq!(terminated(b"x"), b"x\n");
        assert_eq!(terminated(b"x\r\n"), b"x\r\n");
    }
}
