use std::hash::Hash;

use radsort::sort_by_key;
use rustc_hash::FxHashMap;

use crate::rugaps_structs::{Event, Interval, Segment};

/// Groups `(key, interval)` pairs by key, keeping input order within each
/// group.
pub fn split_by_chromosome<K, T>(entries: Vec<(K, Interval<T>)>) -> FxHashMap<K, Vec<Interval<T>>>
where
    K: Eq + Hash,
{
    let mut result: FxHashMap<K, Vec<Interval<T>>> = FxHashMap::default();
    for (chr, interval) in entries {
        result.entry(chr).or_default().push(interval);
    }
    result
}

/// Groups by chromosome and sorts every group by start. The sort is a
/// stable radix sort, so entries sharing a start keep their input order.
pub fn build_sorted_buckets<K, T>(entries: Vec<(K, Interval<T>)>) -> FxHashMap<K, Vec<Interval<T>>>
where
    K: Eq + Hash,
{
    let mut buckets = split_by_chromosome(entries);
    for intervals in buckets.values_mut() {
        sort_by_key(intervals, |i| i.start);
    }
    buckets
}

/// Builds the sorted event list for a sweep over one chromosome: query
/// regions form the first set, index entries the second.
///
/// Events are sorted by:
/// 1. pos (ascending)
/// 2. end before start when positions tie, so half-open intervals that
///    merely touch are not reported as overlapping
pub fn build_sorted_events<T>(queries: &[(usize, i64, i64)], entries: &[Interval<T>]) -> Vec<Event> {
    let mut events: Vec<Event> = Vec::with_capacity(2 * (queries.len() + entries.len()));

    for &(idx, start, end) in queries {
        events.push(Event {
            pos: start,
            is_start: true,
            first_set: true,
            idx,
        });
        events.push(Event {
            pos: end,
            is_start: false,
            first_set: true,
            idx,
        });
    }

    for (idx, interval) in entries.iter().enumerate() {
        events.push(Event {
            pos: interval.start,
            is_start: true,
            first_set: false,
            idx,
        });
        events.push(Event {
            pos: interval.end,
            is_start: false,
            first_set: false,
            idx,
        });
    }

    sort_by_key(&mut events, |e| e.is_start);
    sort_by_key(&mut events, |e| e.pos);

    events
}

/// Orders segments by start; ties keep their input order.
pub fn sort_segments(segments: &mut [Segment]) {
    sort_by_key(segments, |s| s.start);
}
