//! Splits the input identifier sequence into dispatchable jobs.

use crate::models::{Batch, Job};

/// Partition `identifiers` into jobs of at most `max_batch_size` each.
///
/// Produces `ceil(n / max_batch_size)` jobs that preserve input order and
/// concatenate back to the original sequence; the last job may be short.
/// Empty input yields no jobs. `max_batch_size` is validated upstream by
/// [`EngineConfig::validate`](crate::config::EngineConfig::validate).
pub fn split(identifiers: &[String], max_batch_size: usize) -> Vec<Job> {
    identifiers
        .chunks(max_batch_size)
        .enumerate()
        .map(|(index, chunk)| Job::new(index, Batch::new(chunk.to_vec())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("C{i}")).collect()
    }

    #[test]
    fn test_batch_count_is_ceil() {
        for (n, m, expected) in [(10, 3, 4), (10, 5, 2), (10, 10, 1), (10, 100, 1), (1, 1, 1)] {
            let jobs = split(&ids(n), m);
            assert_eq!(jobs.len(), expected, "n={n} m={m}");
            assert!(jobs.iter().all(|j| j.batch.len() <= m));
        }
    }

    #[test]
    fn test_batches_concatenate_to_input_order() {
        let input = ids(13);
        let jobs = split(&input, 4);

        let rejoined: Vec<String> = jobs
            .iter()
            .flat_map(|j| j.batch.identifiers().to_vec())
            .collect();
        assert_eq!(rejoined, input);

        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.index, i);
            assert_eq!(job.attempts, 0);
        }
    }

    #[test]
    fn test_last_batch_may_be_short() {
        let jobs = split(&ids(7), 3);
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].batch.len(), 3);
        assert_eq!(jobs[1].batch.len(), 3);
        assert_eq!(jobs[2].batch.len(), 1);
    }

    #[test]
    fn test_empty_input_yields_no_jobs() {
        assert!(split(&[], 10).is_empty());
    }

    #[test]
    fn test_size_one_degenerates_to_one_job_per_identifier() {
        let jobs = split(&ids(5), 1);
        assert_eq!(jobs.len(), 5);
        assert!(jobs.iter().all(|j| j.batch.len() == 1));
    }
}
