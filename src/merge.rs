use std::time::Instant;

use log::debug;

use crate::chromosome::Chromosome;
use crate::error::Result;
use crate::index::MarkerIndex;
use crate::rugaps_structs::Segment;

/// Merges touching or overlapping neighbours of a start-sorted run until a
/// full scan finds nothing left to merge. A merge keeps the earlier
/// segment's value, extends its end and recounts its markers; the scan then
/// restarts from the front of the shortened run.
///
/// Returns the number of merges performed.
pub fn merge_overlapping(segments: &mut Vec<Segment>, markers: &MarkerIndex, chr: &Chromosome) -> Result<usize> {
    let start = Instant::now();
    let mut merges = 0;

    loop {
        let Some(i) = (1..segments.len()).find(|&i| segments[i - 1].end >= segments[i].start) else {
            break;
        };

        let next_end = segments[i].end;
        let current = &mut segments[i - 1];
        current.end = current.end.max(next_end);
        current.markers = markers.count_between(chr, current.start, current.end)?;
        segments.remove(i);
        merges += 1;
    }

    if merges > 0 {
        debug!(
            "merged {} overlapping segments on {} in {:?}",
            merges,
            chr,
            start.elapsed()
        );
    }
    Ok(merges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::{ChromosomeRegistry, Genome};

    fn segment(chr: &Chromosome, start: i64, end: i64, value: f64) -> Segment {
        Segment {
            sample: "s1".to_string(),
            chr: chr.clone(),
            start,
            end,
            markers: 0,
            value,
            filler: false,
        }
    }

    #[test]
    fn merges_chains_until_stable() {
        let registry = ChromosomeRegistry::standard();
        let genome = Genome::hg19();
        let chr1 = registry.chromosome(&genome, "chr1").unwrap();
        let markers = MarkerIndex::build(
            &registry,
            &genome,
            (1..=10).map(|i| (chr1.clone(), i * 10)),
        )
        .unwrap();

        let mut segments = vec![
            segment(&chr1, 10, 30, 1.0),
            segment(&chr1, 30, 40, 2.0),
            segment(&chr1, 20, 60, 3.0),
            segment(&chr1, 80, 100, 4.0),
        ];
        // callers sort first
        segments.sort_by_key(|s| s.start);

        let merges = merge_overlapping(&mut segments, &markers, &chr1).unwrap();
        assert_eq!(merges, 2);
        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].start, segments[0].end), (10, 60));
        assert_eq!(segments[0].markers, 6);
        assert_eq!(segments[0].value, 1.0);
        assert_eq!((segments[1].start, segments[1].end), (80, 100));

        for pair in segments.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn contained_segments_do_not_shrink_the_span() {
        let registry = ChromosomeRegistry::standard();
        let genome = Genome::hg19();
        let chr1 = registry.chromosome(&genome, "chr1").unwrap();
        let markers = MarkerIndex::build(&registry, &genome, [10, 20, 30].map(|p| (chr1.clone(), p))).unwrap();

        let mut segments = vec![segment(&chr1, 10, 30, 1.0), segment(&chr1, 20, 20, 9.0)];
        merge_overlapping(&mut segments, &markers, &chr1).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start, segments[0].end, segments[0].markers), (10, 30, 3));
    }
}
