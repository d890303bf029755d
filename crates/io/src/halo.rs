//! Split HALO `Total_Object_Results.csv` exports into one file per image.
//!
//! The image name is the first capture group of `image_pattern` applied to
//! the raw line, so no column layout is assumed and lines are copied as-is.
//! The output folder must start out empty; images seen in an earlier input
//! file keep collecting rows from later ones.

use std::fs;
use std::path::{Path, PathBuf};

use phenosync_config::HaloConfig;
use regex::Regex;
use serde::Serialize;

use crate::error::ExportIoError;
use crate::row::{DelimitedRow, LineReader};
use crate::runs::{file_name_safe, terminated, RunOutput, RunSink};

#[derive(Debug, Clone, Serialize)]
pub struct HaloSummary {
    pub input: PathBuf,
    /// Data lines read, header excluded.
    pub lines: usize,
    /// Images first seen in this file.
    pub new_images: usize,
    /// Lines the image pattern did not match.
    pub unmatched_lines: usize,
}

pub struct HaloSplitter {
    out_dir: PathBuf,
    pattern: Regex,
    sink: RunSink,
}

impl HaloSplitter {
    /// Prepare `out_dir`, creating it when missing. Fails when it holds anything.
    pub fn new(out_dir: &Path, config: &HaloConfig) -> Result<Self, ExportIoError> {
        let pattern = Regex::new(&config.image_pattern).map_err(|e| ExportIoError::Csv {
            path: out_dir.to_path_buf(),
            message: format!("image pattern: {e}"),
        })?;

        fs::create_dir_all(out_dir).map_err(|e| ExportIoError::CreateDir {
            path: out_dir.to_path_buf(),
            source: e,
        })?;
        let mut entries = fs::read_dir(out_dir).map_err(|e| ExportIoError::read(out_dir, e))?;
        if entries.next().is_some() {
            return Err(ExportIoError::OutputNotEmpty { path: out_dir.to_path_buf() });
        }

        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            pattern,
            sink: RunSink::new(Vec::new()),
        })
    }

    fn image_name(&self, line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        self.pattern
            .captures(&line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|name| !name.is_empty())
    }

    pub fn split_file(&mut self, input: &Path) -> Result<HaloSummary, ExportIoError> {
        let mut summary = HaloSummary {
            input: input.to_path_buf(),
            lines: 0,
            new_images: 0,
            unmatched_lines: 0,
        };
        let seen_before = self.sink.output_count();

        let mut reader = LineReader::open(input)?;
        let mut header = Vec::new();
        if !reader.next_into(&mut header)? {
            log::warn!("{}: empty file, skipped", input.display());
            return Ok(summary);
        }
        let header = header.strip_prefix("\u{feff}".as_bytes()).unwrap_or(&header);
        self.sink.set_header(terminated(header));

        let mut current: Option<String> = None;
        let mut run: Vec<Vec<u8>> = Vec::new();
        let mut raw = Vec::new();

        while reader.next_into(&mut raw)? {
            if DelimitedRow::new(&raw, b',').is_blank() {
                continue;
            }
            summary.lines += 1;
            let Some(image) = self.image_name(&raw) else {
                summary.unmatched_lines += 1;
                continue;
            };

            if current.as_deref() != Some(image.as_str()) {
                if let Some(previous) = current.take() {
                    self.flush(&previous, &run)?;
                    run.clear();
                }
                current = Some(image);
            }
            run.push(terminated(&raw));
        }
        if let Some(last) = current {
            self.flush(&last, &run)?;
        }

        if summary.unmatched_lines > 0 {
            log::warn!(
                "{}: {} line(s) without image name skipped",
                input.display(),
                summary.unmatched_lines
            );
        }
        summary.new_images = self.sink.outputs_from(seen_before).len();
        log::info!(
            "{}: {} line(s), {} new image(s)",
            input.display(),
            summary.lines,
            summary.new_images
        );
        Ok(summary)
    }

    fn flush(&mut self, image: &str, rows: &[Vec<u8>]) -> Result<(), ExportIoError> {
        let path = self.out_dir.join(format!("{}.csv", file_name_safe(image)));
        self.sink.write_run(image, &path, rows)
    }

    /// One entry per image file written.
    pub fn finish(self) -> Vec<RunOutput> {
        self.sink.into_outputs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str = "Image Location,Analysis Region,Object Id,Cell Area\n";

    #[test]
    fn rows_grouped_by_image_across_files() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a_Total_Object_Results.csv");
        let second = dir.path().join("b_Total_Object_Results.csv");
        fs::write(
            &first,
            format!(
                "\u{feff}{HEADER}\
                 C:\\scans\\Slide 1.qptiff,Layer 1,0,12.1\n\
                 C:\\scans\\Slide 1.qptiff,Layer 1,1,9.8\n\
                 C:\\scans\\Slide 2.qptiff,Layer 1,0,14.0\n\
                 no image here,Layer 1,3,1.0\n"
            ),
        )
        .unwrap();
        fs::write(&second, format!("{HEADER}C:\\scans\\Slide 1.qptiff,Layer 1,2,7.5")).unwrap();
        let out = dir.path().join("export");

        let mut splitter = HaloSplitter::new(&out, &HaloConfig::default()).unwrap();
        let a = splitter.split_file(&first).unwrap();
        assert_eq!((a.lines, a.new_images, a.unmatched_lines), (4, 2, 1));
        let b = splitter.split_file(&second).unwrap();
        assert_eq!((b.lines, b.new_images), (1, 0));

        let outputs = splitter.finish();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].name, "Slide 1");
        assert_eq!(outputs[0].rows, 3);

        let slide1 = fs::read_to_string(out.join("Slide 1.csv")).unwrap();
        assert_eq!(
            slide1,
            format!(
                "{HEADER}C:\\scans\\Slide 1.qptiff,Layer 1,0,12.1\n\
                 C:\\scans\\Slide 1.qptiff,Layer 1,1,9.8\n\
                 C:\\scans\\Slide 1.qptiff,Layer 1,2,7.5\n"
            )
        );
    }

    #[test]
    fn non_empty_output_folder_is_refused() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Slide 1.csv"), "old\n").unwrap();

        let err = HaloSplitter::new(dir.path(), &HaloConfig::default()).err().unwrap();
        assert!(matches!(err, ExportIoError::OutputNotEmpty { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("Slide 1.csv")).unwrap(), "old\n");
    }
}
