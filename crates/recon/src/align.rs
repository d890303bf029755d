//! Greedy row alignment against a reference key sequence.
//!
//! The walk keeps a pointer into the reference equal to the number of rows
//! kept so far. A row is kept when its key equals the key under the pointer;
//! any other row is dropped. This is a single forward pass, not a longest
//! common subsequence: a row the reference skips ahead of can stall the
//! pointer and drop every row after it.
//!
//! The reference is positional: a keyless reference row (a blank trailing
//! line, say) is matched by a keyless candidate row at the same position.

use phenosync_config::MissingKeyPolicy;

use crate::model::Alignment;

/// An unpaired keyless data row under [`MissingKeyPolicy::Fail`]. `row` is
/// 0-based, header excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingKey {
    pub row: usize,
}

pub fn align_greedy(
    reference: &[Option<String>],
    candidate: &[Option<String>],
    policy: MissingKeyPolicy,
) -> Result<Alignment, MissingKey> {
    let mut alignment = Alignment::default();

    for (row, key) in candidate.iter().enumerate() {
        let expected = reference.get(alignment.kept.len());
        match (key, expected) {
            (Some(key), Some(Some(expected))) if key == expected => alignment.kept.push(row),
            (None, Some(None)) => alignment.kept.push(row),
            (None, _) => {
                if policy == MissingKeyPolicy::Fail {
                    return Err(MissingKey { row });
                }
                alignment.removed += 1;
                alignment.malformed += 1;
            }
            (Some(_), _) => alignment.removed += 1,
        }
    }

    Ok(alignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rows(list: &[&str]) -> Vec<Option<String>> {
        list.iter().map(|s| Some(s.to_string())).collect()
    }

    fn keys(list: &[&str]) -> Vec<Option<String>> {
        rows(list)
    }

    #[test]
    fn surplus_row_is_dropped() {
        let alignment = align_greedy(
            &keys(&["K1", "K2", "K3"]),
            &rows(&["K1", "K9", "K2", "K3"]),
            MissingKeyPolicy::Drop,
        )
        .unwrap();
        assert_eq!(alignment.kept, vec![0, 2, 3]);
        assert_eq!(alignment.removed, 1);
        assert_eq!(alignment.malformed, 0);
        assert_eq!(alignment.output_lines(), 4);
    }

    #[test]
    fn missing_leading_row_stalls_the_walk() {
        // K1 never shows up, so the pointer stays on it and every row is dropped
        let alignment = align_greedy(
            &keys(&["K1", "K2", "K3"]),
            &rows(&["K2", "K3", "K4"]),
            MissingKeyPolicy::Drop,
        )
        .unwrap();
        assert!(alignment.kept.is_empty());
        assert_eq!(alignment.removed, 3);
        assert_eq!(alignment.output_lines(), 1);
    }

    #[test]
    fn rows_past_the_reference_are_dropped() {
        let alignment = align_greedy(
            &keys(&["K1", "K2"]),
            &rows(&["K1", "K2", "K3", "K4"]),
            MissingKeyPolicy::Drop,
        )
        .unwrap();
        assert_eq!(alignment.kept, vec![0, 1]);
        assert_eq!(alignment.removed, 2);
    }

    #[test]
    fn keyless_rows_follow_policy() {
        let candidate = vec![Some("K1".to_string()), None, Some("K2".to_string())];
        let reference = keys(&["K1", "K2"]);

        let dropped = align_greedy(&reference, &candidate, MissingKeyPolicy::Drop).unwrap();
        assert_eq!(dropped.kept, vec![0, 2]);
        assert_eq!(dropped.removed, 1);
        assert_eq!(dropped.malformed, 1);

        let failed = align_greedy(&reference, &candidate, MissingKeyPolicy::Fail).unwrap_err();
        assert_eq!(failed, MissingKey { row: 1 });
    }

    #[test]
    fn keyless_reference_row_pairs_with_keyless_row() {
        let mut reference = keys(&["K1", "K2", "K3"]);
        reference.push(None);
        let mut candidate = rows(&["K1", "K9", "K2", "K3"]);
        candidate.push(None);

        for policy in [MissingKeyPolicy::Drop, MissingKeyPolicy::Fail] {
            let alignment = align_greedy(&reference, &candidate, policy).unwrap();
            assert_eq!(alignment.kept, vec![0, 2, 3, 4]);
            assert_eq!(alignment.removed, 1);
            assert_eq!(alignment.malformed, 0);
            assert_eq!(alignment.output_lines(), reference.len() + 1);
        }
    }

    #[test]
    fn keyless_row_against_keyed_reference_is_malformed() {
        let reference = keys(&["K1", "K2"]);
        let candidate = vec![Some("K1".to_string()), None, Some("K2".to_string()), None];

        let alignment = align_greedy(&reference, &candidate, MissingKeyPolicy::Drop).unwrap();
        assert_eq!(alignment.kept, vec![0, 2]);
        assert_eq!(alignment.malformed, 2);
        assert_eq!(alignment.removed, 2);
    }

    #[test]
    fn equal_sequences_keep_everything() {
        let reference = keys(&["1", "2", "3"]);
        let alignment =
            align_greedy(&reference, &rows(&["1", "2", "3"]), MissingKeyPolicy::Drop).unwrap();
        assert_eq!(alignment.kept, vec![0, 1, 2]);
        assert_eq!(alignment.removed, 0);
    }

    // Reference keys are distinct cell ids; extra rows use ids outside that range.
    fn reference_with_extras() -> impl Strategy<Value = (Vec<Option<String>>, Vec<Option<String>>)> {
        (1usize..40)
            .prop_flat_map(|n| (Just(n), prop::collection::vec((0..=n, 1000u32..2000), 0..10)))
            .prop_map(|(n, extras)| {
                let reference: Vec<Option<String>> = (0..n).map(|i| Some(i.to_string())).collect();
                let mut candidate = reference.clone();
                let mut extras = extras;
                // Insert from the back so earlier positions stay valid
                extras.sort_by(|a, b| b.0.cmp(&a.0));
                for (pos, id) in extras {
                    candidate.insert(pos, Some(id.to_string()));
                }
                (reference, candidate)
            })
    }

    proptest! {
        #[test]
        fn foreign_rows_are_removed_exactly((reference, candidate) in reference_with_extras()) {
            let alignment = align_greedy(&reference, &candidate, MissingKeyPolicy::Drop).unwrap();

            let kept: Vec<&Option<String>> = alignment.kept.iter().map(|&i| &candidate[i]).collect();
            let expected: Vec<&Option<String>> = reference.iter().collect();
            prop_assert_eq!(kept, expected);
            prop_assert_eq!(alignment.removed, candidate.len() - reference.len());
            prop_assert_eq!(alignment.output_lines(), reference.len() + 1);
        }

        #[test]
        fn kept_rows_preserve_order(
            reference in prop::collection::vec(prop::option::of("[a-d]"), 0..12),
            candidate in prop::collection::vec(prop::option::of("[a-d]"), 0..16),
        ) {
            let alignment = align_greedy(&reference, &candidate, MissingKeyPolicy::Drop).unwrap();

            prop_assert!(alignment.kept.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(alignment.kept.len() <= reference.len());
            prop_assert_eq!(alignment.kept.len() + alignment.removed, candidate.len());
            for (pos, &row) in alignment.kept.iter().enumerate() {
                prop_assert_eq!(&candidate[row], &reference[pos]);
            }
        }
    }
}
