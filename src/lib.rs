//! Genomic interval indices and a segment gap filler.
//!
//! A [`ContainmentIndex`] answers overlap queries against annotated
//! features; a [`MarkerIndex`] answers rank queries against ordered marker
//! positions. [`fill_gaps`] uses the latter to turn sparse, overlapping
//! per-sample segments into a gapless marker-aligned partition.

pub mod annotation;
pub mod catalog;
pub mod chromosome;
pub mod error;
pub mod fill_gaps;
pub mod index;
pub mod merge;
pub mod overlaps;
pub mod region;
pub mod rugaps_structs;
pub mod sorts;
pub mod table;

pub use annotation::AnnotatedFeature;
pub use catalog::{AnnotationCatalog, AnnotationSource, IndexKey};
pub use chromosome::{Chromosome, ChromosomeRegistry, Genome};
pub use error::{GapsError, Result};
pub use fill_gaps::{fill_gaps, fill_segments, FillGapsConfig, FillGapsReport, SegmentSet, SEGMENT_MEAN_ZERO};
pub use index::{ContainmentIndex, MarkerIndex, SortedIntervals};
pub use region::{GenomicRegion, Strand};
pub use rugaps_structs::{Interval, Segment, SegmentRow};
pub use table::{read_gff3, read_tsv, TabularSource};
