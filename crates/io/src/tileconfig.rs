//! Fiji stitching layout from TIFF stage positions.
//!
//! Each tile's pixel location is its `XPosition`/`YPosition` tag times its
//! resolution, both taken in centimeters when the file declares inches. The
//! locations are written as a `TileConfiguration.txt` for the "Grid/Collection
//! stitching" plugin ("Positions from file", "Defined by TileConfiguration").

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use phenosync_config::TileLayoutConfig;
use serde::Serialize;
use tiff::decoder::ifd::Value;
use tiff::decoder::Decoder;
use tiff::tags::Tag;

use crate::error::ExportIoError;
use crate::fs::{list_files, write_atomic};

const CM_PER_INCH: f64 = 2.54;
const TAG_X_POSITION: u16 = 286;
const TAG_Y_POSITION: u16 = 287;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Pixel,
    Centimeter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tile {
    pub name: String,
    pub unit: Unit,
    /// Pixels per `unit`.
    pub resolution: (f64, f64),
    /// Stage position in `unit`.
    pub position: (f64, f64),
    /// Pixel location before offsets and inversion.
    pub location: (i64, i64),
}

#[derive(Debug, Clone, Serialize)]
pub struct TileConfigSummary {
    pub folder: PathBuf,
    /// `None` when the folder held no tile.
    pub output: Option<PathBuf>,
    pub tiles: Vec<Tile>,
}

// ---------------------------------------------------------------------------
// TIFF tags
// ---------------------------------------------------------------------------

fn number(value: Value) -> Option<f64> {
    let ratio = |n: f64, d: f64| (d != 0.0).then(|| n / d);
    match value {
        Value::Rational(n, d) => ratio(n.into(), d.into()),
        Value::RationalBig(n, d) => ratio(n as f64, d as f64),
        Value::SRational(n, d) => ratio(n.into(), d.into()),
        Value::Short(v) => Some(v.into()),
        Value::Unsigned(v) => Some(v.into()),
        Value::Float(v) => Some(v.into()),
        Value::Double(v) => Some(v),
        Value::List(mut values) if values.len() == 1 => values.pop().and_then(number),
        _ => None,
    }
}

fn tag_number<R>(decoder: &mut Decoder<R>, tag: Tag, path: &Path) -> Result<Option<f64>, ExportIoError>
where
    R: std::io::Read + std::io::Seek,
{
    let value = decoder.find_tag(tag).map_err(|e| ExportIoError::Tiff {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(value.and_then(number))
}

fn required<R>(decoder: &mut Decoder<R>, tag: Tag, name: &str, path: &Path) -> Result<f64, ExportIoError>
where
    R: std::io::Read + std::io::Seek,
{
    tag_number(decoder, tag, path)?.ok_or_else(|| ExportIoError::Tiff {
        path: path.to_path_buf(),
        message: format!("no usable {name} tag"),
    })
}

/// Resolution and position in a common unit: inches become centimeters.
pub fn normalize(inches: bool, resolution: (f64, f64), position: (f64, f64)) -> ((f64, f64), (f64, f64), Unit) {
    if inches {
        (
            (resolution.0 / CM_PER_INCH, resolution.1 / CM_PER_INCH),
            (position.0 * CM_PER_INCH, position.1 * CM_PER_INCH),
            Unit::Centimeter,
        )
    } else {
        (resolution, position, Unit::Centimeter)
    }
}

/// Read the position and resolution tags of the first page.
pub fn read_tile(path: &Path) -> Result<Tile, ExportIoError> {
    let file = File::open(path).map_err(|e| ExportIoError::read(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| ExportIoError::Tiff {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // TIFF default unit is the inch
    let unit_code = tag_number(&mut decoder, Tag::ResolutionUnit, path)?.unwrap_or(2.0);
    let resolution = (
        required(&mut decoder, Tag::XResolution, "XResolution", path)?,
        required(&mut decoder, Tag::YResolution, "YResolution", path)?,
    );
    let position = (
        required(&mut decoder, Tag::from_u16_exhaustive(TAG_X_POSITION), "XPosition", path)?,
        required(&mut decoder, Tag::from_u16_exhaustive(TAG_Y_POSITION), "YPosition", path)?,
    );

    let (resolution, position, unit) = match unit_code as u16 {
        2 => normalize(true, resolution, position),
        3 => normalize(false, resolution, position),
        _ => (resolution, position, Unit::Pixel),
    };
    let location = (
        (resolution.0 * position.0).round() as i64,
        (resolution.1 * position.1).round() as i64,
    );

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    log::debug!(
        "{name}: RES = {},{} (1/{unit:?}), POS = [{},{}], LOC = [{},{}] px",
        resolution.0,
        resolution.1,
        position.0,
        position.1,
        location.0,
        location.1
    );
    Ok(Tile { name, unit, resolution, position, location })
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Sorted distinct X (columns) and Y (rows) locations.
pub fn grid_layout(locations: &[(i64, i64)]) -> (Vec<i64>, Vec<i64>) {
    let mut columns: Vec<i64> = locations.iter().map(|l| l.0).collect();
    let mut rows: Vec<i64> = locations.iter().map(|l| l.1).collect();
    columns.sort_unstable();
    columns.dedup();
    rows.sort_unstable();
    rows.dedup();
    (columns, rows)
}

/// Lines of a `TileConfiguration.txt` for `tiles`, in order.
pub fn tile_lines(tiles: &[(String, (i64, i64))], config: &TileLayoutConfig) -> Vec<String> {
    let [offset_x, offset_y] = config.offsets;
    let mut lines = vec![
        "# Define the number of dimensions we are working on".to_string(),
        "dim = 2".to_string(),
        format!("# Inversion:\t{}", config.invert_y),
        format!("# Offsets:\t\tX={offset_x}, Y={offset_y}"),
        "# Define the image coordinates (in pixels)".to_string(),
    ];

    let locations: Vec<(i64, i64)> = tiles.iter().map(|(_, l)| *l).collect();
    let (columns, rows) = grid_layout(&locations);
    let y_max = rows.last().copied().unwrap_or(0);
    let offset_y = if config.invert_y { -offset_y } else { offset_y };

    for (name, (x, y)) in tiles {
        let column = columns.binary_search(x).unwrap_or(0) as i64;
        let row = rows.binary_search(y).unwrap_or(0) as i64;
        let y = if config.invert_y { y_max - y } else { *y };
        let out_x = (x + offset_x * column) as f64;
        let out_y = (y + offset_y * row) as f64;
        lines.push(format!("{name}; ; ({out_x:.1}, {out_y:.1})"));
    }
    lines
}

/// Write `<folder>/<config.output>` from the TIFFs in `folder`.
pub fn write_tileconfig(folder: &Path, config: &TileLayoutConfig) -> Result<TileConfigSummary, ExportIoError> {
    let mut summary = TileConfigSummary {
        folder: folder.to_path_buf(),
        output: None,
        tiles: Vec::new(),
    };

    for name in list_files(folder, &config.target)? {
        summary.tiles.push(read_tile(&folder.join(name))?);
    }
    if summary.tiles.is_empty() {
        log::warn!("{}: no \"*{}*\" file, skipped", folder.display(), config.target);
        return Ok(summary);
    }

    let placed: Vec<(String, (i64, i64))> =
        summary.tiles.iter().map(|t| (t.name.clone(), t.location)).collect();
    let output = folder.join(&config.output);
    write_atomic(&output, |w| {
        for line in tile_lines(&placed, config) {
            writeln!(w, "{line}")?;
        }
        Ok(())
    })?;

    log::info!("{} -> {} ({} tiles)", folder.display(), output.display(), summary.tiles.len());
    summary.output = Some(output);
    Ok(summary)
}
