//! Segment gap filling against a marker grid.

use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, warn};
use polars::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::chromosome::{Chromosome, ChromosomeRegistry, Genome};
use crate::error::{GapsError, Result};
use crate::index::MarkerIndex;
use crate::merge;
use crate::rugaps_structs::{Segment, SegmentRow};
use crate::sorts;
use crate::table::{find_column, find_optional_column, TabularSource};

/// Neutral value carried by filler segments unless configured otherwise.
pub const SEGMENT_MEAN_ZERO: f64 = 0.0001;

const CHR_COLUMN: [&str; 3] = ["chr", "chrom", "chromosome"];
const START_COLUMN: [&str; 2] = ["start", "loc.start"];
const END_COLUMN: [&str; 2] = ["end", "loc.end"];
const MARKERS_COLUMN: [&str; 4] = ["markers", "probes", "num.mark", "num.markers"];
const SAMPLE_COLUMN: [&str; 3] = ["segment", "sample", "id"];
const MEAN_COLUMN: [&str; 3] = ["mean", "seg.mean", "value"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillGapsConfig {
    /// Value given to every filler segment.
    pub mean_zero: f64,
    /// Samples to process. `None` keeps every sample in the input; a
    /// listed sample without any rows still gets whole-chromosome fillers.
    pub samples: Option<Vec<String>>,
}

impl Default for FillGapsConfig {
    fn default() -> Self {
        FillGapsConfig {
            mean_zero: SEGMENT_MEAN_ZERO,
            samples: None,
        }
    }
}

/// Segments grouped by sample, then chromosome. Iteration follows sample
/// name, then genome chromosome order, then the order within each group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentSet {
    groups: BTreeMap<String, BTreeMap<Chromosome, Vec<Segment>>>,
}

impl SegmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the segment's (sample, chromosome) group.
    pub fn push(&mut self, segment: Segment) {
        self.groups
            .entry(segment.sample.clone())
            .or_default()
            .entry(segment.chr.clone())
            .or_default()
            .push(segment);
    }

    pub fn group(&self, sample: &str, chr: &Chromosome) -> Option<&[Segment]> {
        self.groups.get(sample)?.get(chr).map(|g| g.as_slice())
    }

    pub fn contains_group(&self, sample: &str, chr: &Chromosome) -> bool {
        self.group(sample, chr).is_some_and(|g| !g.is_empty())
    }

    pub fn samples(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn chromosomes(&self, sample: &str) -> Vec<&Chromosome> {
        self.groups
            .get(sample)
            .map(|chrs| chrs.keys().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().flat_map(|c| c.values()).all(|g| g.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.groups
            .values()
            .flat_map(|chrs| chrs.values())
            .flat_map(|group| group.iter())
    }

    fn groups(&self) -> impl Iterator<Item = (&Chromosome, &Vec<Segment>)> {
        self.groups.values().flat_map(|chrs| chrs.iter())
    }

    fn groups_mut(&mut self) -> impl Iterator<Item = (&Chromosome, &mut Vec<Segment>)> {
        self.groups.values_mut().flat_map(|chrs| chrs.iter_mut())
    }

    pub fn rows(&self) -> Vec<SegmentRow> {
        self.iter().map(SegmentRow::from).collect()
    }

    /// Columns `segment, chromosome, start, end, num.markers, seg.mean`.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let rows = self.rows();
        let frame = df!(
            "segment" => rows.iter().map(|r| r.sample.as_str()).collect::<Vec<_>>(),
            "chromosome" => rows.iter().map(|r| r.chromosome.as_str()).collect::<Vec<_>>(),
            "start" => rows.iter().map(|r| r.start).collect::<Vec<_>>(),
            "end" => rows.iter().map(|r| r.end).collect::<Vec<_>>(),
            "num.markers" => rows.iter().map(|r| r.markers).collect::<Vec<_>>(),
            "seg.mean" => rows.iter().map(|r| r.value).collect::<Vec<_>>()
        )?;
        Ok(frame)
    }
}

/// The three stages of a run: snapped and sorted, overlaps merged, and
/// gaps filled.
#[derive(Debug, Clone, PartialEq)]
pub struct FillGapsReport {
    pub closest_markers: SegmentSet,
    pub merged: SegmentSet,
    pub filled: SegmentSet,
}

fn numeric_cell<S>(table: &S, row: usize, col: usize, what: &str) -> Result<f64>
where
    S: TabularSource + ?Sized,
{
    table
        .value(row, col)
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            let text = table.text(row, col).map(|t| t.into_owned()).unwrap_or_default();
            GapsError::parse(row + 1, format!("{what} '{text}' is not a number"))
        })
}

/// Reads raw segments from a table. Rows of unselected samples are skipped;
/// any malformed row aborts the read.
pub fn segments_from_table<S>(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    table: &S,
    config: &FillGapsConfig,
) -> Result<SegmentSet>
where
    S: TabularSource + ?Sized,
{
    if table.row_count() == 0 {
        return Err(GapsError::EmptyInput("segment table has no rows".to_string()));
    }

    let chr_col = find_column(table, &CHR_COLUMN)?;
    let start_col = find_column(table, &START_COLUMN)?;
    let end_col = find_column(table, &END_COLUMN)?;
    let markers_col = find_optional_column(table, &MARKERS_COLUMN);
    let sample_col = find_column(table, &SAMPLE_COLUMN)?;
    let mean_col = find_column(table, &MEAN_COLUMN)?;

    let selected: Option<FxHashSet<&str>> = config
        .samples
        .as_ref()
        .map(|samples| samples.iter().map(String::as_str).collect());

    let mut segments = SegmentSet::new();
    let mut skipped = 0usize;

    for row in 0..table.row_count() {
        let line = row + 1;
        let sample = table
            .text(row, sample_col)
            .ok_or_else(|| GapsError::parse(line, "missing sample name"))?;
        let sample = sample.trim();
        if selected.as_ref().is_some_and(|s| !s.contains(sample)) {
            skipped += 1;
            continue;
        }

        let chr_text = table
            .text(row, chr_col)
            .ok_or_else(|| GapsError::parse(line, "missing chromosome"))?;
        let chr = registry.chromosome(genome, &chr_text)?;
        let start = numeric_cell(table, row, start_col, "start")? as i64;
        let end = numeric_cell(table, row, end_col, "end")? as i64;
        if start > end {
            return Err(GapsError::parse(
                line,
                format!("segment {chr}:{start}-{end} has start after end"),
            ));
        }
        let markers = markers_col
            .and_then(|col| table.value(row, col))
            .filter(|v| v.is_finite())
            .map(|v| v as i64)
            .unwrap_or(0);
        let value = numeric_cell(table, row, mean_col, "mean")?;

        segments.push(Segment {
            sample: sample.to_string(),
            chr,
            start,
            end,
            markers,
            value,
            filler: false,
        });
    }

    if skipped > 0 {
        warn!("ignored {skipped} segment rows belonging to unselected samples");
    }
    Ok(segments)
}

/// Moves a segment's bounds outward onto the marker grid: the start onto
/// the last marker at or before it, the end onto the first marker at or
/// after it, clamped to the chromosome's first and last markers. The
/// marker count is recomputed. Snapping a snapped segment changes nothing.
pub fn snap(markers: &MarkerIndex, segment: &mut Segment) -> Result<()> {
    let chr = &segment.chr;
    let count = markers.marker_count(chr)?;
    let first = markers.end_index(chr, segment.start)?.max(0);
    let last = markers.start_index(chr, segment.end)?.min(count - 1);

    segment.start = markers.marker(chr, first)?;
    segment.end = markers.marker(chr, last)?;
    segment.markers = markers.count_between(chr, segment.start, segment.end)?;
    Ok(())
}

fn filler(
    markers: &MarkerIndex,
    sample: &str,
    chr: &Chromosome,
    first: i64,
    last: i64,
    mean_zero: f64,
) -> Result<Segment> {
    Ok(Segment {
        sample: sample.to_string(),
        chr: chr.clone(),
        start: markers.marker(chr, first)?,
        end: markers.marker(chr, last)?,
        markers: last - first + 1,
        value: mean_zero,
        filler: true,
    })
}

/// Pads one merged (sample, chromosome) run with leading, inter-segment
/// and trailing fillers.
fn fill_group(markers: &MarkerIndex, chr: &Chromosome, segments: &[Segment], mean_zero: f64) -> Result<Vec<Segment>> {
    let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
        return Ok(Vec::new());
    };
    let sample = first.sample.as_str();
    let count = markers.marker_count(chr)?;
    let mut filled = Vec::with_capacity(2 * segments.len() + 1);

    let first_rank = markers.start_index(chr, first.start)?;
    if first_rank > 0 {
        filled.push(filler(markers, sample, chr, 0, first_rank - 1, mean_zero)?);
    }
    filled.push(first.clone());

    for pair in segments.windows(2) {
        let previous = markers.end_index(chr, pair[0].end)?;
        let next = markers.start_index(chr, pair[1].start)?;
        if next - previous > 1 {
            filled.push(filler(markers, sample, chr, previous + 1, next - 1, mean_zero)?);
        }
        filled.push(pair[1].clone());
    }

    let last_rank = markers.end_index(chr, last.end)?;
    if last_rank < count - 1 {
        filled.push(filler(markers, sample, chr, last_rank + 1, count - 1, mean_zero)?);
    }

    Ok(filled)
}

/// Runs snap, sort, merge and fill over segments already in memory.
pub fn fill_segments(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    markers: &MarkerIndex,
    mut segments: SegmentSet,
    config: &FillGapsConfig,
) -> Result<FillGapsReport> {
    let start = Instant::now();

    for (_, group) in segments.groups_mut() {
        for segment in group.iter_mut() {
            snap(markers, segment)?;
        }
        sorts::sort_segments(group);
    }
    let closest_markers = segments.clone();

    for (chr, group) in segments.groups_mut() {
        merge::merge_overlapping(group, markers, chr)?;
    }
    let merged = segments.clone();

    let mut filled = SegmentSet::new();
    for (chr, group) in segments.groups() {
        for segment in fill_group(markers, chr, group, config.mean_zero)? {
            filled.push(segment);
        }
    }

    let samples: Vec<String> = match &config.samples {
        Some(samples) => samples.clone(),
        None => segments.samples().map(str::to_string).collect(),
    };
    for sample in &samples {
        for chr in registry.chromosomes(genome)? {
            if filled.contains_group(sample, chr) || !markers.contains_chromosome(chr) {
                continue;
            }
            let count = markers.marker_count(chr)?;
            filled.push(filler(markers, sample, chr, 0, count - 1, config.mean_zero)?);
        }
    }

    debug!(
        "filled {} samples: {} raw segments, {} after merging, {} after filling in {:?}",
        samples.len(),
        closest_markers.len(),
        merged.len(),
        filled.len(),
        start.elapsed()
    );

    Ok(FillGapsReport {
        closest_markers,
        merged,
        filled,
    })
}

/// Reads raw segments from `table` and fills their gaps against `markers`.
pub fn fill_gaps<S>(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    markers: &MarkerIndex,
    table: &S,
    config: &FillGapsConfig,
) -> Result<FillGapsReport>
where
    S: TabularSource + ?Sized,
{
    let segments = segments_from_table(registry, genome, table, config)?;
    fill_segments(registry, genome, markers, segments, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ChromosomeRegistry, Genome, MarkerIndex, Chromosome) {
        let registry = ChromosomeRegistry::standard();
        let genome = Genome::hg19();
        let chr1 = registry.chromosome(&genome, "chr1").unwrap();
        let markers = MarkerIndex::build(
            &registry,
            &genome,
            [10, 20, 30, 40, 50].map(|p| (chr1.clone(), p)),
        )
        .unwrap();
        (registry, genome, markers, chr1)
    }

    fn raw(chr: &Chromosome, start: i64, end: i64) -> Segment {
        Segment {
            sample: "s1".to_string(),
            chr: chr.clone(),
            start,
            end,
            markers: 99,
            value: 1.0,
            filler: false,
        }
    }

    #[test]
    fn snapping_moves_bounds_outward() {
        let (_, _, markers, chr1) = setup();

        let mut segment = raw(&chr1, 22, 38);
        snap(&markers, &mut segment).unwrap();
        assert_eq!((segment.start, segment.end, segment.markers), (20, 40, 3));

        let mut before = raw(&chr1, 1, 5);
        snap(&markers, &mut before).unwrap();
        assert_eq!((before.start, before.end, before.markers), (10, 10, 1));

        let mut after = raw(&chr1, 60, 90);
        snap(&markers, &mut after).unwrap();
        assert_eq!((after.start, after.end), (50, 50));

        let mut again = segment.clone();
        snap(&markers, &mut again).unwrap();
        assert_eq!(again, segment);
    }

    #[test]
    fn snapping_needs_markers_on_the_chromosome() {
        let (registry, genome, markers, _) = setup();
        let chr2 = registry.chromosome(&genome, "chr2").unwrap();
        let mut segment = raw(&chr2, 1, 5);
        assert!(matches!(
            snap(&markers, &mut segment),
            Err(GapsError::UnknownChromosome { .. })
        ));
    }

    #[test]
    fn fills_leading_inner_and_trailing_gaps() {
        let (_, _, markers, chr1) = setup();
        let segments = vec![
            Segment { markers: 1, ..raw(&chr1, 20, 20) },
            Segment { markers: 1, ..raw(&chr1, 40, 40) },
        ];
        let filled = fill_group(&markers, &chr1, &segments, 0.5).unwrap();
        let spans: Vec<(i64, i64, i64, bool)> = filled
            .iter()
            .map(|s| (s.start, s.end, s.markers, s.filler))
            .collect();
        assert_eq!(
            spans,
            vec![
                (10, 10, 1, true),
                (20, 20, 1, false),
                (30, 30, 1, true),
                (40, 40, 1, false),
                (50, 50, 1, true),
            ]
        );
        assert!(filled.iter().filter(|s| s.filler).all(|s| s.value == 0.5));
    }

    #[test]
    fn adjacent_segments_need_no_filler() {
        let (_, _, markers, chr1) = setup();
        let segments = vec![raw(&chr1, 10, 20), raw(&chr1, 30, 50)];
        let filled = fill_group(&markers, &chr1, &segments, 0.0).unwrap();
        assert_eq!(filled.len(), 2);
    }

    fn segment_table() -> DataFrame {
        df!(
            "ID" => ["s2", "s1", "s1", "s3"],
            "chrom" => ["chr1", "chr1", "1", "chr1"],
            "loc.start" => [10i64, 22, 45, 10],
            "loc.end" => [50i64, 38, 50, 20],
            "num.mark" => [5i64, 2, 1, 2],
            "seg.mean" => [0.3f64, 1.2, -0.4, 2.0]
        )
        .unwrap()
    }

    #[test]
    fn reads_selected_samples_only() {
        let (registry, genome, _, chr1) = setup();
        let config = FillGapsConfig {
            samples: Some(vec!["s1".to_string(), "s2".to_string()]),
            ..FillGapsConfig::default()
        };
        let segments = segments_from_table(&registry, &genome, &segment_table(), &config).unwrap();
        assert_eq!(segments.samples().collect::<Vec<_>>(), vec!["s1", "s2"]);
        assert_eq!(segments.group("s1", &chr1).unwrap().len(), 2);
        assert_eq!(segments.group("s1", &chr1).unwrap()[0].value, 1.2);
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn run_keeps_every_stage() {
        let (registry, genome, markers, chr1) = setup();
        let report = fill_gaps(&registry, &genome, &markers, &segment_table(), &FillGapsConfig::default()).unwrap();

        let s1 = report.closest_markers.group("s1", &chr1).unwrap();
        assert_eq!((s1[0].start, s1[0].end), (20, 40));
        assert_eq!((s1[1].start, s1[1].end), (40, 50));

        let merged = report.merged.group("s1", &chr1).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!((merged[0].start, merged[0].end, merged[0].markers), (20, 50, 4));
        assert_eq!(merged[0].value, 1.2);

        let filled = report.filled.group("s1", &chr1).unwrap();
        assert_eq!(filled.len(), 2);
        assert!(filled[0].filler);
        assert_eq!((filled[0].start, filled[0].end), (10, 10));

        // s3 covers 10-20; the rest of chr1 is padded
        let s3 = report.filled.group("s3", &chr1).unwrap();
        assert_eq!(s3.len(), 2);
        assert_eq!((s3[1].start, s3[1].end, s3[1].markers), (30, 50, 3));
    }

    #[test]
    fn frame_output_is_ordered() {
        let (registry, genome, markers, _) = setup();
        let report = fill_gaps(&registry, &genome, &markers, &segment_table(), &FillGapsConfig::default()).unwrap();
        let frame = report.filled.to_frame().unwrap();
        assert_eq!(
            frame.column_names(),
            vec!["segment", "chromosome", "start", "end", "num.markers", "seg.mean"]
        );
        assert_eq!(frame.height(), report.filled.len());
        let rows = report.filled.rows();
        assert_eq!(rows[0].sample, "s1");
        assert_eq!(rows.last().unwrap().sample, "s3");
    }

    #[test]
    fn malformed_input_aborts() {
        let (registry, genome, markers, _) = setup();
        let config = FillGapsConfig::default();

        let backwards = df!(
            "sample" => ["s1"],
            "chr" => ["chr1"],
            "start" => [40i64],
            "end" => [20i64],
            "mean" => [1.0f64]
        )
        .unwrap();
        assert!(matches!(
            fill_gaps(&registry, &genome, &markers, &backwards, &config),
            Err(GapsError::Parse { line: 1, .. })
        ));

        let not_numeric = df!(
            "sample" => ["s1"],
            "chr" => ["chr1"],
            "start" => ["ten"],
            "end" => ["20"],
            "mean" => ["1"]
        )
        .unwrap();
        assert!(matches!(
            fill_gaps(&registry, &genome, &markers, &not_numeric, &config),
            Err(GapsError::Parse { .. })
        ));

        let no_mean = df!(
            "sample" => ["s1"],
            "chr" => ["chr1"],
            "start" => [1i64],
            "end" => [2i64]
        )
        .unwrap();
        assert!(matches!(
            fill_gaps(&registry, &genome, &markers, &no_mean, &config),
            Err(GapsError::MissingColumn(_))
        ));

        let empty = no_mean.head(Some(0));
        assert!(matches!(
            fill_gaps(&registry, &genome, &markers, &empty, &config),
            Err(GapsError::EmptyInput(_))
        ));
    }

    #[test]
    fn config_defaults_and_serde() {
        let config: FillGapsConfig = serde_json::from_str("{\"samples\": [\"a\"]}").unwrap();
        assert_eq!(config.mean_zero, SEGMENT_MEAN_ZERO);
        assert_eq!(config.samples, Some(vec!["a".to_string()]));

        let text = serde_json::to_string(&FillGapsConfig::default()).unwrap();
        let back: FillGapsConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, FillGapsConfig::default());
    }
}
