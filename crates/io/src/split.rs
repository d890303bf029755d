//! Undo a merge: split a merged cell-data file into one file per sample.
//!
//! Output goes to `<out_root>/<channel>/<base> - <sample>.txt`, where the
//! channel is the first space-separated token of the input file name. Every
//! output file starts with the merged file's header; rows keep their order.
//! Rows are streamed: only the current run of rows for one sample is held in
//! memory.

use std::fs;
use std::path::{Path, PathBuf};

use phenosync_config::SplitConfig;
use regex::Regex;
use serde::Serialize;

use crate::error::ExportIoError;
use crate::row::{DelimitedRow, LineReader};
use crate::runs::{file_name_safe, terminated, RunOutput, RunSink};

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub input: PathBuf,
    pub channel: String,
    pub samples: Vec<RunOutput>,
    /// Data rows without a sample column.
    pub skipped_rows: usize,
}

/// Channel folder name for a merged file: text before the first space.
pub fn channel_of(file_name: &str, fallback: &str) -> String {
    match file_name.split_once(' ') {
        Some((channel, _)) if !channel.is_empty() => channel.to_string(),
        _ => fallback.to_string(),
    }
}

/// Output base name: the file stem without the merge target's stem.
pub fn base_name(file_name: &str, target: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target_stem = Path::new(target)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let base = stem.replace(target_stem.as_str(), "");
    let base = base.trim();
    if base.is_empty() {
        stem
    } else {
        base.to_string()
    }
}

/// Sample id: the pattern's first capture group, or the whole field.
pub fn sample_id(field: &str, pattern: &Regex) -> String {
    let field = field.trim();
    pattern
        .captures(field)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| field.to_string())
}

/// Split one merged file.
pub fn split_merge_file(
    input: &Path,
    out_root: &Path,
    config: &SplitConfig,
    delimiter: u8,
) -> Result<SplitSummary, ExportIoError> {
    let pattern = Regex::new(&config.sample_pattern).map_err(|e| ExportIoError::Csv {
        path: input.to_path_buf(),
        message: format!("sample pattern: {e}"),
    })?;

    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let channel = channel_of(&file_name, &config.fallback_channel);
    let folder = out_root.join(&channel);

    let mut reader = LineReader::open(input)?;
    let mut summary = SplitSummary {
        input: input.to_path_buf(),
        channel: channel.clone(),
        samples: Vec::new(),
        skipped_rows: 0,
    };
    let mut header = Vec::new();
    if !reader.next_into(&mut header)? {
        log::warn!("{}: empty file, nothing to split", input.display());
        return Ok(summary);
    }

    fs::create_dir_all(&folder).map_err(|e| ExportIoError::CreateDir {
        path: folder.clone(),
        source: e,
    })?;

    let base = base_name(&file_name, &config.target);
    let sample_path = |sample: &str| folder.join(format!("{base} - {}.txt", file_name_safe(sample)));
    let mut sink = RunSink::new(terminated(&header));

    let mut current: Option<String> = None;
    let mut run: Vec<Vec<u8>> = Vec::new();
    let mut raw = Vec::new();

    while reader.next_into(&mut raw)? {
        let row = DelimitedRow::new(&raw, delimiter);
        if row.is_blank() {
            continue;
        }
        let Some(field) = row.field(config.sample_column) else {
            summary.skipped_rows += 1;
            continue;
        };
        let sample = sample_id(&String::from_utf8_lossy(field), &pattern);

        if current.as_deref() != Some(sample.as_str()) {
            if let Some(previous) = current.take() {
                sink.write_run(&previous, &sample_path(&previous), &run)?;
                run.clear();
            }
            current = Some(sample);
        }
        run.push(terminated(&raw));
    }
    if let Some(last) = current {
        sink.write_run(&last, &sample_path(&last), &run)?;
    }

    if summary.skipped_rows > 0 {
        log::warn!(
            "{}: {} row(s) without column #{} skipped",
            input.display(),
            summary.skipped_rows,
            config.sample_column
        );
    }
    summary.samples = sink.into_outputs();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pattern() -> Regex {
        Regex::new(&SplitConfig::default().sample_pattern).unwrap()
    }

    #[test]
    fn channel_from_file_name() {
        assert_eq!(channel_of("CD8 Merge_cell_seg_data.txt", "Unk"), "CD8");
        assert_eq!(channel_of("Merge_cell_seg_data.txt", "Unk"), "Unk");
        assert_eq!(channel_of(" Merge_cell_seg_data.txt", "Unk"), "Unk");
    }

    #[test]
    fn base_from_file_name() {
        assert_eq!(base_name("CD8 Merge_cell_seg_data.txt", "Merge_cell_seg_data.txt"), "CD8");
        assert_eq!(
            base_name("Merge_cell_seg_data.txt", "Merge_cell_seg_data.txt"),
            "Merge_cell_seg_data"
        );
    }

    #[test]
    fn sample_from_field() {
        let p = pattern();
        assert_eq!(sample_id("Slide 12_[45123,10922].im3", &p), "Slide 12");
        assert_eq!(sample_id("Slide 12", &p), "Slide 12");
    }

    #[test]
    fn split_groups_rows_by_sample() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("CD8 Merge_cell_seg_data.txt");
        fs::write(
            &input,
            "Path\tSample Name\tCell ID\n\
             p\tS1_[1,2].im3\t1\n\
             p\tS1_[1,3].im3\t2\n\
             p\tS2_[5,5].im3\t1\n\
             p\tS1_[9,9].im3\t3\n\
             \n\
             p\n",
        )
        .unwrap();
        let out = dir.path().join("split");

        let summary = split_merge_file(&input, &out, &SplitConfig::default(), b'\t').unwrap();
        assert_eq!(summary.channel, "CD8");
        assert_eq!(summary.skipped_rows, 1);
        assert_eq!(summary.samples.len(), 2);
        assert_eq!(summary.samples[0].name, "S1");
        assert_eq!(summary.samples[0].rows, 3);
        assert_eq!(summary.samples[1].rows, 1);

        let s1 = fs::read_to_string(out.join("CD8/CD8 - S1.txt")).unwrap();
        assert_eq!(
            s1,
            "Path\tSample Name\tCell ID\np\tS1_[1,2].im3\t1\np\tS1_[1,3].im3\t2\np\tS1_[9,9].im3\t3\n"
        );
        let s2 = fs::read_to_string(out.join("CD8/CD8 - S2.txt")).unwrap();
        assert_eq!(s2, "Path\tSample Name\tCell ID\np\tS2_[5,5].im3\t1\n");
    }

    #[test]
    fn rerun_overwrites_instead_of_duplicating() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("CD3 Merge_cell_seg_data.txt");
        fs::write(&input, "H\tSample\n1\tA_[0,0]\n").unwrap();
        let out = dir.path().join("split");

        split_merge_file(&input, &out, &SplitConfig::default(), b'\t').unwrap();
        split_merge_file(&input, &out, &SplitConfig::default(), b'\t').unwrap();

        let a = fs::read_to_string(out.join("CD3/CD3 - A.txt")).unwrap();
        assert_eq!(a, "H\tSample\n1\tA_[0,0]\n");
    }

    #[test]
    fn alternating_runs_without_final_newline() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("FoxP3 Merge_cell_seg_data.txt");
        let mut content = String::from("Path\tSample Name\tCell ID\r\n");
        for i in 0..500 {
            let sample = if (i / 7) % 2 == 0 { "A" } else { "B" };
            content.push_str(&format!("p\t{sample}_[{i},0].im3\t{i}\r\n"));
        }
        content.push_str("p\tB_[9,9].im3\tlast");
        fs::write(&input, &content).unwrap();
        let out = dir.path().join("split");

        let summary = split_merge_file(&input, &out, &SplitConfig::default(), b'\t').unwrap();
        let rows: usize = summary.samples.iter().map(|s| s.rows).sum();
        assert_eq!(rows, 501);

        let b = fs::read_to_string(out.join("FoxP3/FoxP3 - B.txt")).unwrap();
        assert!(b.starts_with("Path\tSample Name\tCell ID\r\n"));
        assert!(b.ends_with("\tlast\n"));
        assert_eq!(b.lines().count(), 1 + summary.samples[1].rows);
    }

    #[test]
    fn empty_input_produces_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("CD3 Merge_cell_seg_data.txt");
        fs::write(&input, "").unwrap();

        let summary =
            split_merge_file(&input, &dir.path().join("split"), &SplitConfig::default(), b'\t')
                .unwrap();
        assert!(summary.samples.is_empty());
    }
}
