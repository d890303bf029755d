// File I/O operations over an inForm export tree

pub mod csv;
pub mod error;
pub mod fs;
pub mod halo;
pub mod lines;
pub mod quarantine;
pub mod row;
mod runs;
pub mod sample_tables;
pub mod sanitize;
pub mod split;
pub mod tileconfig;

pub use error::ExportIoError;
pub use quarantine::{relocate, Relocation, RelocateMode, UNBALANCED_FOLDER, UNMATCHED_FOLDER};
pub use row::{DelimitedRow, KeyedFile, LineReader, Schema};
pub use runs::RunOutput;
