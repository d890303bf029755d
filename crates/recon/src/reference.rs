use phenosync_config::{ReferenceConfig, ReferencePolicy};

use crate::model::LineCountTable;

/// Channel whose copy of `file` serves as row-key reference for `batch`.
///
/// Candidates are the channels holding `file` with exactly the batch minimum
/// line count. The preferred channel wins when it is a candidate; otherwise
/// the policy picks from sorted channel order. `None` when nothing matches.
pub fn select_reference<'a>(
    table: &'a LineCountTable,
    batch: &str,
    file: &str,
    config: &ReferenceConfig,
) -> Option<&'a str> {
    let minimum = table.minimum(batch, file)?;
    let candidates: Vec<&str> = table
        .channels_with(batch, file)
        .into_iter()
        .filter(|&(_, lines)| lines == minimum)
        .map(|(channel, _)| channel)
        .collect();

    if let Some(preferred) = config.channel.as_deref() {
        if let Some(&channel) = candidates.iter().find(|&&c| c == preferred) {
            return Some(channel);
        }
    }

    match config.policy {
        ReferencePolicy::FirstSorted => candidates.first().copied(),
        ReferencePolicy::LastSorted => candidates.last().copied(),
    }
}
