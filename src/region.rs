//! Coordinate model. Regions are 1-based and inclusive at both ends; UCSC
//! input (0-based, half-open) is converted with `from_ucsc`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::annotation::AnnotatedFeature;
use crate::chromosome::{Chromosome, ChromosomeRegistry, Genome};
use crate::error::{GapsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    Sense,
    Antisense,
    None,
}

impl Strand {
    pub fn parse(text: &str) -> Option<Strand> {
        match text.trim() {
            "+" => Some(Strand::Sense),
            "-" => Some(Strand::Antisense),
            "." => Some(Strand::None),
            _ => None,
        }
    }

    pub fn is_sense(self) -> bool {
        self == Strand::Sense
    }

    pub fn symbol(self) -> char {
        match self {
            Strand::Sense => '+',
            Strand::Antisense => '-',
            Strand::None => '.',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicRegion {
    pub chr: Chromosome,
    pub start: i64,
    pub end: i64,
    pub strand: Option<Strand>,
}

impl GenomicRegion {
    /// Fails when `start > end`.
    pub fn new(chr: Chromosome, start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(GapsError::parse(
                0,
                format!("region {chr}:{start}-{end} has start after end"),
            ));
        }
        Ok(GenomicRegion {
            chr,
            start,
            end,
            strand: None,
        })
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = Some(strand);
        self
    }

    /// UCSC coordinates are 0-based half-open: only the start moves.
    pub fn from_ucsc(chr: Chromosome, start0: i64, end: i64) -> Result<Self> {
        Self::new(chr, start0 + 1, end)
    }

    /// Parses `chr1:100-200` (thousands separators allowed).
    pub fn parse(registry: &ChromosomeRegistry, genome: &Genome, text: &str) -> Result<Self> {
        let bad = || GapsError::parse(0, format!("'{text}' is not a genomic location"));
        let (chr_text, range) = text.trim().split_once(':').ok_or_else(bad)?;
        let (start_text, end_text) = range.split_once('-').ok_or_else(bad)?;
        let start = parse_coordinate(start_text).ok_or_else(bad)?;
        let end = parse_coordinate(end_text).ok_or_else(bad)?;
        let chr = registry.chromosome(genome, chr_text)?;
        Self::new(chr, start, end)
    }

    /// Cheap syntactic check used when sniffing table columns.
    pub fn looks_like_location(text: &str) -> bool {
        let Some((chr_text, range)) = text.trim().split_once(':') else {
            return false;
        };
        let Some((start_text, end_text)) = range.split_once('-') else {
            return false;
        };
        !chr_text.is_empty()
            && parse_coordinate(start_text).is_some()
            && parse_coordinate(end_text).is_some()
    }

    pub fn length(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn mid(&self) -> i64 {
        (self.start + self.end) / 2
    }

    pub fn overlaps(&self, other: &GenomicRegion) -> bool {
        self.chr == other.chr && self.start <= other.end && other.start <= self.end
    }

    /// The `[start, end + 1)` key the containment index stores.
    pub fn to_half_open(&self) -> (i64, i64) {
        (self.start, self.end + 1)
    }

    /// Signed distance from this region's mid point to the feature's TSS,
    /// positive when the mid point lies downstream on the feature's strand.
    pub fn distance_to_tss(&self, feature: &AnnotatedFeature) -> i64 {
        feature.tss_mid_distance(self.mid())
    }
}

impl fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chr, self.start, self.end)
    }
}

fn parse_coordinate(text: &str) -> Option<i64> {
    let cleaned: String = text.trim().chars().filter(|&c| c != ',').collect();
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chr(name: &str) -> Chromosome {
        ChromosomeRegistry::standard()
            .chromosome(&Genome::hg19(), name)
            .unwrap()
    }

    #[test]
    fn parses_and_formats_locations() {
        let registry = ChromosomeRegistry::standard();
        let region = GenomicRegion::parse(&registry, &Genome::hg19(), "11:1,000-2,500").unwrap();
        assert_eq!(region.chr.name(), "chr11");
        assert_eq!(region.start, 1000);
        assert_eq!(region.end, 2500);
        assert_eq!(region.to_string(), "chr11:1000-2500");
        assert_eq!(region.length(), 1501);
        assert_eq!(region.mid(), 1750);
    }

    #[test]
    fn rejects_malformed_locations() {
        let registry = ChromosomeRegistry::standard();
        let hg19 = Genome::hg19();
        assert!(GenomicRegion::parse(&registry, &hg19, "chr1-100-200").is_err());
        assert!(GenomicRegion::parse(&registry, &hg19, "chr1:abc-200").is_err());
        assert!(GenomicRegion::parse(&registry, &hg19, "chr1:300-200").is_err());
        assert!(matches!(
            GenomicRegion::parse(&registry, &hg19, "chrQ:1-2"),
            Err(GapsError::UnknownChromosome { .. })
        ));
        assert!(GenomicRegion::looks_like_location("chr3:10-20"));
        assert!(!GenomicRegion::looks_like_location("BRCA1"));
    }

    #[test]
    fn ucsc_conversion_shifts_start_only() {
        let region = GenomicRegion::from_ucsc(chr("chr1"), 99, 200).unwrap();
        assert_eq!((region.start, region.end), (100, 200));
        assert_eq!(region.to_half_open(), (100, 201));
    }

    #[test]
    fn inclusive_overlap() {
        let a = GenomicRegion::new(chr("chr1"), 10, 20).unwrap();
        let touching = GenomicRegion::new(chr("chr1"), 20, 30).unwrap();
        let apart = GenomicRegion::new(chr("chr1"), 21, 30).unwrap();
        let other_chr = GenomicRegion::new(chr("chr2"), 10, 20).unwrap();
        assert!(a.overlaps(&touching));
        assert!(!a.overlaps(&apart));
        assert!(!a.overlaps(&other_chr));
    }

    #[test]
    fn strand_symbols() {
        assert_eq!(Strand::parse("+"), Some(Strand::Sense));
        assert_eq!(Strand::parse(" - "), Some(Strand::Antisense));
        assert_eq!(Strand::parse("."), Some(Strand::None));
        assert_eq!(Strand::parse("x"), None);
        assert_eq!(Strand::Antisense.symbol(), '-');
    }
}
