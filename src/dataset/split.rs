//! Deterministic train/test partitioning.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("test fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),
    #[error("need at least 2 rows to split, got {0}")]
    TooFewRows(usize),
}

/// Row indices assigned to each partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `n_rows` rows into train and test partitions.
///
/// Rows are ordered by a blake3 key of `seed|row_index` and the first
/// `ceil(n_rows * test_fraction)` rows of that order form the test partition.
/// The result depends only on `(n_rows, seed, test_fraction)`, so a dataset
/// split twice with the same seed is partitioned identically. Both partitions
/// are kept non-empty. Indices within each partition are in the hashed order.
pub fn train_test_split(
    n_rows: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<SplitIndices, SplitError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(SplitError::InvalidFraction(test_fraction));
    }
    if n_rows < 2 {
        return Err(SplitError::TooFewRows(n_rows));
    }

    let mut keyed: Vec<(u128, usize)> = (0..n_rows)
        .map(|idx| (split_key(seed, idx), idx))
        .collect();
    keyed.sort_unstable();

    let test_n = ((n_rows as f64) * test_fraction).ceil() as usize;
    let test_n = test_n.clamp(1, n_rows - 1);
    let mut order = keyed.into_iter().map(|(_, idx)| idx);
    let test: Vec<usize> = order.by_ref().take(test_n).collect();
    let train: Vec<usize> = order.collect();
    Ok(SplitIndices { train, test })
}

fn split_key(seed: u64, row: usize) -> u128 {
    let hash = blake3::hash(format!("railcast-split|{seed}|{row}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[..16]);
    u128::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn split_is_deterministic_for_a_seed() {
        let a = train_test_split(100, 0.2, 42).unwrap();
        let b = train_test_split(100, 0.2, 42).unwrap();
        assert_eq!(a, b);
        let c = train_test_split(100, 0.2, 7).unwrap();
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn split_uses_eighty_twenty_and_covers_every_row_once() {
        let split = train_test_split(101, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 21);
        assert_eq!(split.train.len(), 80);
        let all: BTreeSet<usize> = split.train.iter().chain(&split.test).copied().collect();
        assert_eq!(all.len(), 101);
        assert_eq!(all.iter().next_back(), Some(&100));
    }

    #[test]
    fn tiny_datasets_keep_both_partitions() {
        let split = train_test_split(2, 0.9, 1).unwrap();
        assert_eq!(split.test.len(), 1);
        assert_eq!(split.train.len(), 1);
        let split = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 2);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert_eq!(
            train_test_split(10, 0.0, 1).unwrap_err(),
            SplitError::InvalidFraction(0.0)
        );
        assert!(matches!(
            train_test_split(10, f64::NAN, 1),
            Err(SplitError::InvalidFraction(_))
        ));
        assert_eq!(train_test_split(1, 0.2, 1).unwrap_err(), SplitError::TooFewRows(1));
    }
}
