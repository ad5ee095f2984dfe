use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::PhaseKind;
use crate::state::WorkerStatus;

/// The plan for one worker within one phase invocation: a disjoint slice of
/// the phase's sequence-number range (spec.md §3, §4.4 partitioning rule).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInput {
    pub worker_id: u32,
    #[serde(skip)]
    pub phase: Option<PhaseKind>,
    pub start_sn: i64,
    pub end_sn: i64,
    pub started_at: DateTime<Utc>,
    pub status: WorkerStatus,
}

impl WorkerInput {
    /// An empty range (`start_sn > end_sn`) completes with no work, per the
    /// partitioning rule's "extra workers receive an empty range" clause.
    pub fn is_empty_range(&self) -> bool {
        self.start_sn > self.end_sn
    }
}

/// The plan for one `(phase, iter)` invocation: its overall sequence-number
/// range and the worker inputs it was partitioned into (spec.md §3, §4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseInput {
    pub phase: PhaseKind,
    pub start_sn: i64,
    pub end_sn: i64,
    pub worker_count: u32,
    pub started_at: DateTime<Utc>,
    pub worker_inputs: Vec<WorkerInput>,
}

impl PhaseInput {
    pub fn delta(&self) -> i64 {
        self.end_sn - self.start_sn
    }
}

/// Partitions `[start_sn, end_sn]` evenly across `worker_count` workers per
/// the rule in spec.md §4.4: worker 1 gets `[start, start+per]`, each
/// subsequent worker starts where the previous ended + 1, and the last
/// worker's end is clamped to `end_sn`. If `delta < worker_count`, the extra
/// trailing workers receive an empty range.
///
/// This is property 1 of spec.md §8 ("Plan determinism"): for any inputs,
/// the ranges produced here are disjoint, contiguous, and together cover
/// `[start_sn, end_sn]` exactly.
pub fn partition_range(start_sn: i64, end_sn: i64, worker_count: u32) -> Vec<(i64, i64)> {
    assert!(worker_count > 0, "worker_count must be at least 1");
    let delta = end_sn - start_sn;
    let per = delta / i64::from(worker_count);

    let mut ranges = Vec::with_capacity(worker_count as usize);
    let mut cursor = start_sn;
    for i in 0..worker_count {
        let is_last = i == worker_count - 1;
        if cursor > end_sn {
            // No sequence numbers left: an empty, degenerate range that
            // completes immediately.
            ranges.push((cursor, cursor - 1));
            continue;
        }
        let this_end = if is_last {
            end_sn
        } else {
            (cursor + per).min(end_sn)
        };
        ranges.push((cursor, this_end));
        cursor = this_end + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn partitions_four_ways_as_in_scenario_s2() {
        let ranges = partition_range(1, 1000, 4);
        assert_eq!(
            ranges,
            vec![(1, 250), (251, 500), (501, 750), (751, 1000)]
        );
    }

    #[test]
    fn trailing_workers_get_empty_ranges_when_delta_is_small() {
        // S6: threshold=0 single-shot Downtime range [endSN+1, endSN+1] with
        // more workers than sequence numbers available.
        let ranges = partition_range(1001, 1001, 4);
        assert_eq!(ranges[0], (1001, 1001));
        for empty in &ranges[1..] {
            assert!(empty.1 < empty.0);
        }
    }

    proptest! {
        #[test]
        fn ranges_are_disjoint_contiguous_and_cover_the_whole_span(
            start in 0i64..1_000_000,
            span in 0i64..100_000,
            worker_count in 1u32..64,
        ) {
            let end = start + span;
            let ranges = partition_range(start, end, worker_count);
            prop_assert_eq!(ranges.len(), worker_count as usize);

            // Contiguity: each non-empty range starts exactly where the
            // previous non-empty range ended, plus one.
            let mut expected_next = start;
            for (s, e) in &ranges {
                if *e < *s {
                    continue; // empty trailing range
                }
                prop_assert_eq!(*s, expected_next);
                expected_next = *e + 1;
            }
            prop_assert_eq!(expected_next, end + 1);
        }
    }
}
