//! `phenosync-recon` — cross-channel reconciliation of an inForm export tree.
//!
//! Pure stage functions (`tally`, `lines`, `reference`, `align`) plus the
//! `engine` that drives them over the file system in six ordered stages.

pub mod align;
pub mod engine;
pub mod error;
pub mod lines;
pub mod model;
pub mod reference;
pub mod summary;
pub mod tally;

pub use engine::{inventory, run};
pub use error::ReconError;
pub use model::{
    Alignment, ExportLayout, FileRecord, FileState, LineCountTable, SyncReport, SyncSummary,
    TallyTable,
};
