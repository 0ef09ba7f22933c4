use std::time::Instant;

use log::debug;
use rustc_hash::FxHashMap;

use crate::chromosome::{Chromosome, ChromosomeRegistry, Genome};
use crate::error::{GapsError, Result};
use crate::region::GenomicRegion;
use crate::rugaps_structs::Interval;
use crate::sorts;
use crate::table::{find_column, TabularSource};

#[derive(Debug, Clone)]
pub struct SortedIntervals<T> {
    genome: Genome,
    buckets: FxHashMap<Chromosome, Vec<Interval<T>>>,
}

impl<T> SortedIntervals<T> {
    /// Every chromosome must be known to `registry` for `genome` and every
    /// interval must be non-empty; otherwise nothing is built.
    pub fn build<I>(registry: &ChromosomeRegistry, genome: &Genome, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Chromosome, Interval<T>)>,
    {
        let entries: Vec<(Chromosome, Interval<T>)> = entries.into_iter().collect();
        for (chr, interval) in &entries {
            if !registry.contains(genome, chr) {
                return Err(GapsError::index_build(GapsError::unknown_chromosome(
                    genome.to_string(),
                    chr.name(),
                )));
            }
            if interval.start >= interval.end {
                return Err(GapsError::index_build(GapsError::parse(
                    0,
                    format!("interval {chr}:[{}, {}) is empty", interval.start, interval.end),
                )));
            }
        }

        Ok(SortedIntervals {
            genome: genome.clone(),
            buckets: sorts::build_sorted_buckets(entries),
        })
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn bucket(&self, chr: &Chromosome) -> Option<&[Interval<T>]> {
        self.buckets.get(chr).map(|b| b.as_slice())
    }

    pub fn contains_chromosome(&self, chr: &Chromosome) -> bool {
        self.buckets.contains_key(chr)
    }

    /// Chromosomes with at least one entry, in genome order.
    pub fn chromosomes(&self) -> Vec<&Chromosome> {
        let mut chrs: Vec<&Chromosome> = self.buckets.keys().collect();
        chrs.sort();
        chrs
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|b| b.is_empty())
    }
}

/// Overlap index over `(interval, payload)` entries.
#[derive(Debug, Clone)]
pub struct ContainmentIndex<T> {
    intervals: SortedIntervals<T>,
    max_len: FxHashMap<Chromosome, i64>,
}

impl<T> ContainmentIndex<T> {
    pub fn build<I>(registry: &ChromosomeRegistry, genome: &Genome, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Chromosome, Interval<T>)>,
    {
        let start = Instant::now();
        let intervals = SortedIntervals::build(registry, genome, entries)?;
        let max_len = intervals
            .buckets
            .iter()
            .map(|(chr, bucket)| {
                let longest = bucket.iter().map(|i| i.end - i.start).max().unwrap_or(0);
                (chr.clone(), longest)
            })
            .collect();
        debug!(
            "built containment index over {} entries for {} in {:?}",
            intervals.len(),
            genome,
            start.elapsed()
        );
        Ok(ContainmentIndex { intervals, max_len })
    }

    /// Builds from inclusive regions; each is keyed as `[start, end + 1)`.
    pub fn from_regions<I>(registry: &ChromosomeRegistry, genome: &Genome, regions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (GenomicRegion, T)>,
    {
        Self::build(
            registry,
            genome,
            regions.into_iter().map(|(region, val)| {
                let (start, end) = region.to_half_open();
                (region.chr, Interval { start, end, val })
            }),
        )
    }

    /// All entries intersecting `[start, end)`, ascending by start. A
    /// chromosome without entries simply yields nothing.
    pub fn find_overlapping(&self, chr: &Chromosome, start: i64, end: i64) -> Vec<&Interval<T>> {
        let Some(bucket) = self.intervals.bucket(chr) else {
            return Vec::new();
        };
        let max_len = self.max_len.get(chr).copied().unwrap_or(0);

        // Entries starting at or before `start - max_len` end at or before
        // `start` and cannot overlap.
        let lo = bucket.partition_point(|i| i.start + max_len <= start);
        let hi = bucket.partition_point(|i| i.start < end);
        if lo >= hi {
            return Vec::new();
        }

        bucket[lo..hi]
            .iter()
            .filter(|i| i.overlaps(start, end))
            .collect()
    }

    /// Entries overlapping an inclusive region.
    pub fn find_region(&self, region: &GenomicRegion) -> Vec<&Interval<T>> {
        let (start, end) = region.to_half_open();
        self.find_overlapping(&region.chr, start, end)
    }

    pub fn bucket(&self, chr: &Chromosome) -> Option<&[Interval<T>]> {
        self.intervals.bucket(chr)
    }

    pub fn genome(&self) -> &Genome {
        self.intervals.genome()
    }

    pub fn chromosomes(&self) -> Vec<&Chromosome> {
        self.intervals.chromosomes()
    }

    pub fn contains_chromosome(&self, chr: &Chromosome) -> bool {
        self.intervals.contains_chromosome(chr)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Entries in genome order, then by start.
    pub fn iter(&self) -> impl Iterator<Item = (&Chromosome, &Interval<T>)> {
        self.chromosomes().into_iter().flat_map(move |chr| {
            self.intervals
                .bucket(chr)
                .unwrap_or_default()
                .iter()
                .map(move |i| (chr, i))
        })
    }
}

/// Rank index over single-point markers. Each marker is stored as the
/// one-base interval `[pos, pos + 1)`. Duplicate positions are kept and
/// show up as adjacent identical keys.
#[derive(Debug, Clone)]
pub struct MarkerIndex {
    intervals: SortedIntervals<()>,
}

impl MarkerIndex {
    pub fn build<I>(registry: &ChromosomeRegistry, genome: &Genome, markers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Chromosome, i64)>,
    {
        let start = Instant::now();
        let intervals = SortedIntervals::build(
            registry,
            genome,
            markers.into_iter().map(|(chr, pos)| {
                (
                    chr,
                    Interval {
                        start: pos,
                        end: pos + 1,
                        val: (),
                    },
                )
            }),
        )?;
        debug!(
            "built marker index over {} markers for {} in {:?}",
            intervals.len(),
            genome,
            start.elapsed()
        );
        Ok(MarkerIndex { intervals })
    }

    /// Uses each region's start as the marker position.
    pub fn from_regions<'a, I>(registry: &ChromosomeRegistry, genome: &Genome, regions: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a GenomicRegion>,
    {
        Self::build(
            registry,
            genome,
            regions.into_iter().map(|r| (r.chr.clone(), r.start)),
        )
    }

    /// Reads markers from a table with a chromosome column and a
    /// `start|position|pos` column.
    pub fn from_table<S>(registry: &ChromosomeRegistry, genome: &Genome, table: &S) -> Result<Self>
    where
        S: TabularSource + ?Sized,
    {
        if table.row_count() == 0 {
            return Err(GapsError::EmptyInput("marker table has no rows".to_string()));
        }
        let chr_col = find_column(table, &["chr", "chrom", "chromosome"])?;
        let pos_col = find_column(table, &["start", "position", "pos"])?;

        let mut markers = Vec::with_capacity(table.row_count());
        for row in 0..table.row_count() {
            let line = row + 1;
            let chr_text = table
                .text(row, chr_col)
                .ok_or_else(|| GapsError::index_build(GapsError::parse(line, "missing chromosome")))?;
            let chr = registry
                .chromosome(genome, &chr_text)
                .map_err(GapsError::index_build)?;
            let pos = table
                .value(row, pos_col)
                .filter(|v| v.is_finite())
                .ok_or_else(|| GapsError::index_build(GapsError::parse(line, "missing or non-numeric marker position")))?;
            markers.push((chr, pos as i64));
        }

        Self::build(registry, genome, markers)
    }

    fn positions(&self, chr: &Chromosome) -> Result<&[Interval<()>]> {
        self.intervals.bucket(chr).ok_or_else(|| {
            GapsError::unknown_chromosome(self.intervals.genome().to_string(), chr.name())
        })
    }

    pub fn contains_chromosome(&self, chr: &Chromosome) -> bool {
        self.intervals.contains_chromosome(chr)
    }

    /// Index of the first marker at or after `position`; the marker count
    /// when every marker lies before it.
    pub fn start_index(&self, chr: &Chromosome, position: i64) -> Result<i64> {
        let markers = self.positions(chr)?;
        Ok(markers.partition_point(|m| m.start < position) as i64)
    }

    /// Index of the last marker at or before `position`; `-1` when every
    /// marker lies after it.
    pub fn end_index(&self, chr: &Chromosome, position: i64) -> Result<i64> {
        let markers = self.positions(chr)?;
        Ok(markers.partition_point(|m| m.start <= position) as i64 - 1)
    }

    /// Number of markers inside the inclusive span `[start, end]`.
    pub fn count_between(&self, chr: &Chromosome, start: i64, end: i64) -> Result<i64> {
        let first = self.start_index(chr, start)?;
        let last = self.end_index(chr, end)?;
        Ok((last - first + 1).max(0))
    }

    /// Position of the marker at rank `index`.
    pub fn marker(&self, chr: &Chromosome, index: i64) -> Result<i64> {
        let markers = self.positions(chr)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| markers.get(i))
            .map(|m| m.start)
            .ok_or_else(|| {
                GapsError::OutOfRange(format!(
                    "marker rank {index} on {chr} ({} markers)",
                    markers.len()
                ))
            })
    }

    pub fn marker_count(&self, chr: &Chromosome) -> Result<i64> {
        Ok(self.positions(chr)?.len() as i64)
    }

    pub fn markers(&self, chr: &Chromosome) -> Result<Vec<i64>> {
        Ok(self.positions(chr)?.iter().map(|m| m.start).collect())
    }

    pub fn first_marker(&self, chr: &Chromosome) -> Result<i64> {
        self.marker(chr, 0)
    }

    pub fn last_marker(&self, chr: &Chromosome) -> Result<i64> {
        let count = self.marker_count(chr)?;
        self.marker(chr, count - 1)
    }

    pub fn genome(&self) -> &Genome {
        self.intervals.genome()
    }

    pub fn chromosomes(&self) -> Vec<&Chromosome> {
        self.intervals.chromosomes()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}
