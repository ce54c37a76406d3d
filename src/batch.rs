//! Fixed-size batching of feedback records.
//!
//! Splits the normalized record sequence into contiguous, non-overlapping
//! slices of `batch_size` records; the last slice holds the remainder.
//! Slices borrow from the input, nothing is copied.

use crate::error::PipelineError;
use crate::models::FeedbackRecord;

/// Split `records` into batches of at most `batch_size`.
///
/// Every returned slice is non-empty and the slices concatenate back to
/// the input in order.
pub fn batch_records(
    records: &[FeedbackRecord],
    batch_size: usize,
) -> Result<Vec<&[FeedbackRecord]>, PipelineError> {
    if batch_size == 0 {
        return Err(PipelineError::InvalidBatchSize);
    }
    if records.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    Ok(records.chunks(batch_size).collect())
}

/// Number of batches `len` records produce.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    len.div_ceil(batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<FeedbackRecord> {
        (0..n)
            .map(|i| FeedbackRecord::new(format!("feedback {}", i), (i % 11) as u8))
            .collect()
    }

    #[test]
    fn last_batch_holds_remainder() {
        let input = records(7);
        let batches = batch_records(&input, 3).unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn exact_multiple_has_no_short_batch() {
        let input = records(6);
        let batches = batch_records(&input, 3).unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 3));
    }

    #[test]
    fn batches_concatenate_to_input() {
        for len in 1..25 {
            let input = records(len);
            for size in 1..=(len + 2) {
                let batches = batch_records(&input, size).unwrap();
                assert!(batches.iter().all(|b| !b.is_empty()));
                let rejoined: Vec<FeedbackRecord> =
                    batches.iter().flat_map(|b| b.iter().cloned()).collect();
                assert_eq!(rejoined, input, "len={} size={}", len, size);
                assert_eq!(batches.len(), batch_count(len, size));
            }
        }
    }

    #[test]
    fn empty_input_fails() {
        let err = batch_records(&[], 40).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
    }

    #[test]
    fn zero_batch_size_fails() {
        let input = records(3);
        let err = batch_records(&input, 0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidBatchSize));
    }
}
