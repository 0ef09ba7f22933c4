use serde::Serialize;

use crate::chromosome::Chromosome;

/// One index entry: a half-open `[start, end)` key and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval<T> {
    pub start: i64,
    pub end: i64,
    pub val: T,
}

impl<T> Interval<T> {
    #[inline]
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.start < end && self.end > start
    }
}

/// An "event" in the sweep line:
/// - `pos`: the coordinate (start or end of an interval)
/// - `is_start`: true if it's a start event, false if it's an end event
/// - `first_set`: true for query regions, false for index entries
/// - `idx`: position of the interval in its own collection
#[derive(Debug, Clone, Hash)]
pub struct Event {
    pub pos: i64,
    pub is_start: bool,
    pub first_set: bool,
    pub idx: usize,
}

/// A copy-number style segment for one sample on one chromosome.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub sample: String,
    pub chr: Chromosome,
    pub start: i64,
    pub end: i64,
    pub markers: i64,
    pub value: f64,
    /// True for segments synthesised to cover uncovered markers.
    pub filler: bool,
}

/// Flat output row, ready for any tabular sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRow {
    pub sample: String,
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
    pub markers: i64,
    pub value: f64,
}

impl From<&Segment> for SegmentRow {
    fn from(segment: &Segment) -> Self {
        SegmentRow {
            sample: segment.sample.clone(),
            chromosome: segment.chr.name().to_string(),
            start: segment.start,
            end: segment.end,
            markers: segment.markers,
            value: segment.value,
        }
    }
}
