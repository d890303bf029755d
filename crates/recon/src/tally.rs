use std::collections::BTreeMap;

use crate::model::{FileTally, TallyTable};

/// Build the presence tally from per-channel file listings.
///
/// `listings` yields `(batch, files)` once per channel and batch folder.
/// A name repeated within one listing counts once.
pub fn tally_files<'a, I>(channel_count: usize, listings: I) -> TallyTable
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let mut batches: BTreeMap<String, FileTally> = BTreeMap::new();

    for (batch, files) in listings {
        let tally = batches.entry(batch.to_string()).or_default();
        let mut seen: Vec<&str> = Vec::with_capacity(files.len());
        for file in files {
            if seen.contains(&file.as_str()) {
                continue;
            }
            seen.push(file);
            *tally.counts.entry(file.clone()).or_insert(0) += 1;
        }
    }

    TallyTable { channel_count, batches }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn file_missing_from_one_channel_is_unmatched() {
        let ch1 = names(&["A.txt", "B.txt"]);
        let ch2 = names(&["A.txt", "B.txt"]);
        let ch3 = names(&["B.txt"]);
        let table = tally_files(
            3,
            [("b1", ch1.as_slice()), ("b1", ch2.as_slice()), ("b1", ch3.as_slice())],
        );

        assert_eq!(table.batch("b1").unwrap().count("A.txt"), 2);
        assert_eq!(table.unmatched("b1"), vec!["A.txt"]);
        assert_eq!(table.consensus("b1"), vec!["B.txt"]);
        assert!(table.is_consensus("b1", "B.txt"));
        assert!(!table.is_consensus("b1", "A.txt"));
    }

    #[test]
    fn batches_are_tallied_separately() {
        let a = names(&["X.txt"]);
        let b = names(&["Y.txt"]);
        let table = tally_files(2, [("b1", a.as_slice()), ("b1", a.as_slice()), ("b2", b.as_slice())]);

        assert_eq!(table.consensus("b1"), vec!["X.txt"]);
        assert_eq!(table.unmatched("b2"), vec!["Y.txt"]);
        assert!(table.unmatched("absent").is_empty());
    }

    #[test]
    fn duplicate_names_in_one_listing_count_once() {
        let dup = names(&["A.txt", "A.txt"]);
        let table = tally_files(2, [("b1", dup.as_slice())]);
        assert_eq!(table.unmatched("b1"), vec!["A.txt"]);
    }
}
