//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: batch scripts that chain a
//! sync with downstream analysis rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                              |
//! |---------|-----------|------------------------------------------|
//! | 0       | Universal | Success                                  |
//! | 1       | Universal | General error (unspecified)              |
//! | 2       | Universal | CLI usage error (bad args, missing file) |
//! | 3-9     | sync      | Export reconciliation codes              |
//! | 10-19   | convert   | split / sanitize / tile layout codes     |

use phenosync_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing input.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Sync (3-9)
// =============================================================================

/// Config file could not be parsed or failed validation.
pub const EXIT_SYNC_INVALID_CONFIG: u8 = 3;

/// File system error while reading, relocating, or rewriting export files.
pub const EXIT_SYNC_RUNTIME: u8 = 4;

/// Run completed, but some over-long files are still out of balance
/// (no minimum-count reference, or the greedy alignment missed the minimum).
pub const EXIT_SYNC_UNRESOLVED: u8 = 5;

/// A row without key field under `missing_key = "fail"`, or a file whose
/// header lacks the key column.
pub const EXIT_SYNC_MALFORMED: u8 = 6;

// =============================================================================
// Convert (10-19)
// =============================================================================

/// No input file matched for a converter, or no folder held a tile.
pub const EXIT_CONVERT_NO_INPUT: u8 = 10;

/// HALO split target folder already holds files.
pub const EXIT_CONVERT_OUTPUT_NOT_EMPTY: u8 = 11;

/// Map a ReconError to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::Config(_) => EXIT_SYNC_INVALID_CONFIG,
        ReconError::Io(_) | ReconError::NoChannels(_) => EXIT_SYNC_RUNTIME,
        ReconError::MissingKeyColumn { .. } | ReconError::MalformedRow { .. } => EXIT_SYNC_MALFORMED,
    }
}
