//! Rescue Map - ordered, non-overlapping set of rescued byte ranges
//!
//! Every other component asks this map two questions: "which rescued run
//! covers this address?" and "where do two images' rescued runs overlap?".
//!
//! # Invariants
//!
//! - Runs are keyed by start address and never overlap.
//! - Runs read from a rescue log never touch either; [`RescueMap::compact`]
//!   is the only thing that produces a run ending exactly where the next
//!   began, by merging the two.

pub mod log;

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RescueError, Result};

pub use log::{load_rescue_log, parse_rescue_log};

/// A byte range `[start, start + length)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: u64,
    pub length: u64,
}

impl Interval {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// True when `[start, start + length)` lies entirely inside this interval
    pub fn contains_range(&self, start: u64, length: u64) -> bool {
        start >= self.start && start.saturating_add(length) <= self.end()
    }
}

/// Rescued runs of one image, keyed by start address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescueMap {
    runs: BTreeMap<u64, u64>,
}

impl RescueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Runs in ascending address order
    pub fn iter(&self) -> impl Iterator<Item = Interval> + '_ {
        self.runs
            .iter()
            .map(|(&start, &length)| Interval::new(start, length))
    }

    /// Sum of all run lengths
    pub fn total_bytes(&self) -> u64 {
        self.runs.values().sum()
    }

    /// Insert a run read from a rescue log.
    ///
    /// Rejects any run that overlaps *or touches* an existing one: the log is
    /// authoritative and never lists the same bytes twice.
    pub fn insert(&mut self, interval: Interval) -> Result<()> {
        self.check_conflict(interval, true)?;
        self.runs.insert(interval.start, interval.length);
        Ok(())
    }

    /// Insert a run that may touch, but not overlap, existing runs.
    ///
    /// The log parser always goes through [`RescueMap::insert`]. This is for
    /// library callers assembling a map themselves, such as merging runs from
    /// several logs or building fixtures; call [`RescueMap::compact`]
    /// afterwards to coalesce touching runs.
    pub fn insert_run(&mut self, interval: Interval) -> Result<()> {
        self.check_conflict(interval, false)?;
        self.runs.insert(interval.start, interval.length);
        Ok(())
    }

    fn check_conflict(&self, interval: Interval, reject_touching: bool) -> Result<()> {
        if interval.start.checked_add(interval.length).is_none() {
            return Err(RescueError::RangeOverflow {
                start: interval.start,
                len: interval.length,
            });
        }

        let conflict = |existing_start: u64, existing_len: u64| RescueError::Overlap {
            existing_start,
            existing_len,
            start: interval.start,
            len: interval.length,
        };

        // First run at or after the new start
        if let Some((&start, &length)) = self.runs.range(interval.start..).next() {
            let hit = if reject_touching {
                start <= interval.end()
            } else {
                start < interval.end()
            };
            if hit {
                return Err(conflict(start, length));
            }
        }

        // Last run before the new start
        if let Some((&start, &length)) = self.runs.range(..interval.start).next_back() {
            let hit = if reject_touching {
                interval.start <= start + length
            } else {
                interval.start < start + length
            };
            if hit {
                return Err(conflict(start, length));
            }
        }

        Ok(())
    }

    /// Merge runs where one ends exactly where the next begins.
    ///
    /// Single pass, idempotent, never changes [`RescueMap::total_bytes`].
    /// Returns the number of merges performed.
    pub fn compact(&mut self) -> usize {
        let mut merged = BTreeMap::new();
        let mut merges = 0;
        let mut current: Option<(u64, u64)> = None;

        for (&start, &length) in &self.runs {
            current = match current {
                Some((cur_start, cur_len)) if cur_start + cur_len == start => {
                    merges += 1;
                    Some((cur_start, cur_len + length))
                }
                Some((cur_start, cur_len)) => {
                    merged.insert(cur_start, cur_len);
                    Some((start, length))
                }
                None => Some((start, length)),
            };
        }
        if let Some((start, length)) = current {
            merged.insert(start, length);
        }

        self.runs = merged;
        merges
    }

    /// The run with the greatest start `<= address`, if any.
    ///
    /// The run does not necessarily contain `address`; callers check the
    /// bounds they care about.
    pub fn find_covering_run(&self, address: u64) -> Option<Interval> {
        self.runs
            .range(..=address)
            .next_back()
            .map(|(&start, &length)| Interval::new(start, length))
    }

    /// True when `[start, start + length)` lies entirely inside one run
    pub fn covers(&self, start: u64, length: u64) -> bool {
        self.find_covering_run(start)
            .is_some_and(|run| run.contains_range(start, length))
    }

    /// Lazily yield every sub-range rescued in both `self` and `other`,
    /// in ascending address order.
    pub fn intersect_runs<'a>(&'a self, other: &'a RescueMap) -> Overlaps<'a> {
        Overlaps {
            runs: self.runs.iter(),
            other,
            current: None,
            cursor: None,
        }
    }
}

impl std::fmt::Display for RescueMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, run) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "0x{:x}:0x{:x}", run.start, run.length)?;
        }
        write!(f, "}}")
    }
}

/// Iterator returned by [`RescueMap::intersect_runs`]
pub struct Overlaps<'a> {
    runs: btree_map::Iter<'a, u64, u64>,
    other: &'a RescueMap,
    current: Option<Interval>,
    cursor: Option<btree_map::Range<'a, u64, u64>>,
}

impl Iterator for Overlaps<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        loop {
            if let (Some(run), Some(cursor)) = (self.current, self.cursor.as_mut()) {
                for (&start, &length) in cursor.by_ref() {
                    if start >= run.end() {
                        break;
                    }
                    let end = start + length;
                    if end > run.start {
                        let begin = start.max(run.start);
                        let finish = end.min(run.end());
                        return Some(Interval::new(begin, finish - begin));
                    }
                }
            }

            let (&start, &length) = self.runs.next()?;
            let run = Interval::new(start, length);
            // Back up to the other run that may begin before this one and
            // extend into it
            let from = self
                .other
                .find_covering_run(start)
                .map_or(start, |covering| covering.start);
            self.current = Some(run);
            self.cursor = Some(self.other.runs.range(from..));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map_of(runs: &[(u64, u64)]) -> RescueMap {
        let mut map = RescueMap::new();
        for &(start, length) in runs {
            map.insert_run(Interval::new(start, length)).unwrap();
        }
        map
    }

    fn runs_of(map: &RescueMap) -> Vec<(u64, u64)> {
        map.iter().map(|r| (r.start, r.length)).collect()
    }

    #[test]
    fn test_insert_rejects_overlap() {
        let mut map = RescueMap::new();
        map.insert(Interval::new(0x600, 0x300)).unwrap();

        let err = map.insert(Interval::new(0x500, 0x200)).unwrap_err();
        match err {
            RescueError::Overlap {
                existing_start,
                existing_len,
                start,
                len,
            } => {
                assert_eq!((existing_start, existing_len), (0x600, 0x300));
                assert_eq!((start, len), (0x500, 0x200));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_insert_rejects_touching_either_side() {
        let mut map = RescueMap::new();
        map.insert(Interval::new(0x400, 0x100)).unwrap();

        assert!(map.insert(Interval::new(0x300, 0x100)).is_err());
        assert!(map.insert(Interval::new(0x500, 0x10)).is_err());
        assert!(map.insert(Interval::new(0x400, 0x10)).is_err());
        map.insert(Interval::new(0x501, 0x10)).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_insert_run_allows_touching() {
        let mut map = RescueMap::new();
        map.insert_run(Interval::new(0, 0x400)).unwrap();
        map.insert_run(Interval::new(0x400, 0x200)).unwrap();
        assert!(map.insert_run(Interval::new(0x5ff, 0x10)).is_err());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_insert_rejects_range_past_address_space() {
        let mut map = RescueMap::new();
        let err = map.insert(Interval::new(u64::MAX - 0xff, 0x200)).unwrap_err();
        assert!(matches!(err, RescueError::RangeOverflow { .. }));
        assert!(map.insert_run(Interval::new(u64::MAX, 1)).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn test_compact_merges_chains() {
        let mut map = map_of(&[(0, 0x100), (0x100, 0x100), (0x200, 0x50), (0x300, 0x10)]);
        let merges = map.compact();

        assert_eq!(merges, 2);
        assert_eq!(runs_of(&map), vec![(0, 0x250), (0x300, 0x10)]);
        assert_eq!(map.compact(), 0);
    }

    #[test]
    fn test_find_covering_run() {
        let map = map_of(&[(0x100, 0x100), (0x400, 0x100)]);

        assert_eq!(map.find_covering_run(0x50), None);
        assert_eq!(map.find_covering_run(0x100), Some(Interval::new(0x100, 0x100)));
        assert_eq!(map.find_covering_run(0x1ff), Some(Interval::new(0x100, 0x100)));
        // Greatest start <= address, even past the run's end
        assert_eq!(map.find_covering_run(0x300), Some(Interval::new(0x100, 0x100)));
        assert_eq!(map.find_covering_run(0x400), Some(Interval::new(0x400, 0x100)));
    }

    #[test]
    fn test_covers() {
        let map = map_of(&[(0x100, 0x100), (0x200, 0x100)]);

        assert!(map.covers(0x100, 0x100));
        assert!(map.covers(0x180, 0x10));
        // Straddles two runs that were never compacted
        assert!(!map.covers(0x1f0, 0x20));
        assert!(!map.covers(0x0, 0x10));
        assert!(!map.covers(0x2f0, 0x20));
    }

    #[test]
    fn test_intersect_runs_spanning_run() {
        let a = map_of(&[(0, 0x100), (0x200, 0x100), (0x400, 0x100)]);
        let b = map_of(&[(0x80, 0x400)]);

        let overlaps: Vec<_> = a.intersect_runs(&b).collect();
        assert_eq!(
            overlaps,
            vec![
                Interval::new(0x80, 0x80),
                Interval::new(0x200, 0x100),
                Interval::new(0x400, 0x80),
            ]
        );
    }

    #[test]
    fn test_intersect_runs_none() {
        let a = map_of(&[(0, 0x100)]);
        let b = map_of(&[(0x100, 0x100)]);
        assert_eq!(a.intersect_runs(&b).count(), 0);
        assert_eq!(a.intersect_runs(&RescueMap::new()).count(), 0);
    }

    #[test]
    fn test_display() {
        let map = map_of(&[(0, 0x400), (0x600, 0x300)]);
        assert_eq!(map.to_string(), "{0x0:0x400, 0x600:0x300}");
    }

    /// Runs separated by gaps of at least `min_gap` bytes
    fn arb_runs(min_gap: u64) -> impl Strategy<Value = Vec<(u64, u64)>> {
        prop::collection::vec((min_gap..64u64, 1..64u64), 0..24).prop_map(|pieces| {
            let mut pos = 0;
            pieces
                .into_iter()
                .map(|(gap, len)| {
                    pos += gap;
                    let run = (pos, len);
                    pos += len;
                    run
                })
                .collect()
        })
    }

    fn brute_force_overlaps(a: &RescueMap, b: &RescueMap) -> Vec<Interval> {
        let mut out = Vec::new();
        for x in a.iter() {
            for y in b.iter() {
                let begin = x.start.max(y.start);
                let end = x.end().min(y.end());
                if begin < end {
                    out.push(Interval::new(begin, end - begin));
                }
            }
        }
        out.sort();
        out
    }

    proptest! {
        #[test]
        fn prop_strict_inserts_stay_sorted_and_disjoint(runs in arb_runs(1)) {
            let mut map = RescueMap::new();
            for &(start, length) in &runs {
                map.insert(Interval::new(start, length)).unwrap();
            }
            let collected: Vec<_> = map.iter().collect();
            for pair in collected.windows(2) {
                prop_assert!(pair[0].end() < pair[1].start);
            }
        }

        #[test]
        fn prop_compact_idempotent_and_preserves_bytes(runs in arb_runs(0)) {
            let mut map = map_of(&runs);
            let total = map.total_bytes();

            map.compact();
            let once = map.clone();
            map.compact();

            prop_assert_eq!(&map, &once);
            prop_assert_eq!(map.total_bytes(), total);
            let collected: Vec<_> = map.iter().collect();
            for pair in collected.windows(2) {
                prop_assert!(pair[0].end() < pair[1].start);
            }
        }

        #[test]
        fn prop_intersection_symmetric(a in arb_runs(0), b in arb_runs(0)) {
            let a = map_of(&a);
            let b = map_of(&b);

            let ab: Vec<_> = a.intersect_runs(&b).collect();
            let mut ba: Vec<_> = b.intersect_runs(&a).collect();
            ba.sort();

            let mut sorted_ab = ab.clone();
            sorted_ab.sort();
            prop_assert_eq!(&ab, &sorted_ab, "overlaps must come out in address order");
            prop_assert_eq!(&sorted_ab, &ba);
            prop_assert_eq!(sorted_ab, brute_force_overlaps(&a, &b));
        }
    }
}
