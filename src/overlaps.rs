use std::time::Instant;

use log::debug;
use radsort::sort_by_key;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::chromosome::Chromosome;
use crate::index::ContainmentIndex;
use crate::region::GenomicRegion;
use crate::rugaps_structs::Interval;
use crate::sorts;

/// Returns every (query index, entry) pair where a query region overlaps an
/// index entry. Answers the same question as calling
/// [`ContainmentIndex::find_region`] once per query, but in one sweep per
/// chromosome, which pays off for large query batches.
///
/// Algorithm steps:
///   1. Group the queries by chromosome and key them as half-open intervals.
///   2. Build the sorted event list against that chromosome's bucket; on
///      ties ends sort before starts.
///   3. Maintain one active set per side. A starting query overlaps every
///      active entry and vice versa.
///   4. Sort the pairs by query, then by entry start.
pub fn sweep_line_overlaps<'a, T>(
    index: &'a ContainmentIndex<T>,
    queries: &[GenomicRegion],
) -> Vec<(usize, &'a Interval<T>)> {
    let start = Instant::now();

    let mut by_chr: FxHashMap<&Chromosome, Vec<(usize, i64, i64)>> = FxHashMap::default();
    for (idx, region) in queries.iter().enumerate() {
        let (qstart, qend) = region.to_half_open();
        by_chr.entry(&region.chr).or_default().push((idx, qstart, qend));
    }

    // (query idx, entry rank within its bucket, entry)
    let mut pairs: Vec<(usize, usize, &'a Interval<T>)> = Vec::new();

    for (chr, chr_queries) in by_chr {
        let Some(bucket) = index.bucket(chr) else {
            continue;
        };

        let events = sorts::build_sorted_events(&chr_queries, bucket);

        let mut active_queries = FxHashSet::default();
        let mut active_entries = FxHashSet::default();

        for e in events {
            if e.is_start {
                if e.first_set {
                    for &entry in active_entries.iter() {
                        pairs.push((e.idx, entry, &bucket[entry]));
                    }
                    active_queries.insert(e.idx);
                } else {
                    for &query in active_queries.iter() {
                        pairs.push((query, e.idx, &bucket[e.idx]));
                    }
                    active_entries.insert(e.idx);
                }
            } else if e.first_set {
                active_queries.remove(&e.idx);
            } else {
                active_entries.remove(&e.idx);
            }
        }
    }

    sort_by_key(&mut pairs, |p| p.1);
    sort_by_key(&mut pairs, |p| p.0);

    debug!(
        "swept {} queries into {} overlaps in {:?}",
        queries.len(),
        pairs.len(),
        start.elapsed()
    );

    pairs.into_iter().map(|(query, _, entry)| (query, entry)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::{ChromosomeRegistry, Genome};

    #[test]
    fn sweep_agrees_with_point_queries() {
        let registry = ChromosomeRegistry::standard();
        let genome = Genome::hg19();
        let chr1 = registry.chromosome(&genome, "chr1").unwrap();
        let chr2 = registry.chromosome(&genome, "chr2").unwrap();

        let genes = vec![
            (GenomicRegion::new(chr1.clone(), 100, 200).unwrap(), "a"),
            (GenomicRegion::new(chr1.clone(), 150, 400).unwrap(), "b"),
            (GenomicRegion::new(chr1.clone(), 500, 600).unwrap(), "c"),
            (GenomicRegion::new(chr2.clone(), 1, 1000).unwrap(), "d"),
        ];
        let index = ContainmentIndex::from_regions(&registry, &genome, genes).unwrap();

        let queries = vec![
            GenomicRegion::new(chr1.clone(), 200, 210).unwrap(),
            GenomicRegion::new(chr2.clone(), 5, 5).unwrap(),
            GenomicRegion::new(chr1.clone(), 401, 499).unwrap(),
            GenomicRegion::new(chr1, 50, 1000).unwrap(),
        ];

        let swept: Vec<(usize, &str)> = sweep_line_overlaps(&index, &queries)
            .into_iter()
            .map(|(q, i)| (q, i.val))
            .collect();
        assert_eq!(
            swept,
            vec![(0, "a"), (0, "b"), (1, "d"), (3, "a"), (3, "b"), (3, "c")]
        );

        for (q, query) in queries.iter().enumerate() {
            let direct: Vec<&str> = index.find_region(query).iter().map(|i| i.val).collect();
            let from_sweep: Vec<&str> = swept.iter().filter(|(i, _)| *i == q).map(|(_, v)| *v).collect();
            assert_eq!(direct, from_sweep);
        }
    }
}
