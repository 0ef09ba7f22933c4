use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use std::time::Instant;

use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::chromosome::{Chromosome, ChromosomeRegistry, Genome};
use crate::error::{GapsError, Result};
use crate::index::ContainmentIndex;
use crate::region::{GenomicRegion, Strand};
use crate::rugaps_structs::Interval;
use crate::table::TabularSource;

/// Value reported for an alternate name a feature does not carry.
pub const NA: &str = "NA";

const SYMBOL_TYPES: [&str; 5] = ["Gene Name", "gene_name", "gene_symbol", "symbol", "Symbol"];
const ENTREZ_TYPES: [&str; 4] = ["Entrez Id", "entrez_id", "entrez", "Entrez"];
const REFSEQ_TYPES: [&str; 5] = ["Transcript Id", "transcript_id", "RefSeq Id", "refseq_id", "RefSeq"];

// gene table layout
const SYMBOL_COL: usize = 0;
const CHR_COL: usize = 1;
const STRAND_COL: usize = 2;
const START_COL: usize = 3;
const END_COL: usize = 4;
const EXON_COUNT_COL: usize = 5;
const EXON_START_COL: usize = 6;
const EXON_END_COL: usize = 7;
const ALT_COL: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedFeature {
    id: String,
    strand: Strand,
    region: GenomicRegion,
    exons: Vec<GenomicRegion>,
    tss: GenomicRegion,
    alt_names: BTreeMap<String, String>,
}

impl AnnotatedFeature {
    /// The TSS is fixed here: the start for sense features, the end
    /// otherwise.
    pub fn new(id: impl Into<String>, strand: Strand, region: GenomicRegion) -> Self {
        let tss_pos = if strand.is_sense() { region.start } else { region.end };
        let tss = GenomicRegion {
            chr: region.chr.clone(),
            start: tss_pos,
            end: tss_pos,
            strand: Some(strand),
        };
        AnnotatedFeature {
            id: id.into(),
            strand,
            region,
            exons: Vec::new(),
            tss,
            alt_names: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn region(&self) -> &GenomicRegion {
        &self.region
    }

    pub fn chr(&self) -> &Chromosome {
        &self.region.chr
    }

    pub fn exons(&self) -> &[GenomicRegion] {
        &self.exons
    }

    pub fn tss(&self) -> &GenomicRegion {
        &self.tss
    }

    pub fn add_exon(&mut self, exon: GenomicRegion) {
        self.exons.push(exon);
    }

    pub fn add_alt_name(&mut self, name_type: impl Into<String>, name: impl Into<String>) {
        self.alt_names.insert(name_type.into(), name.into());
    }

    /// Alternate name of the given type, or `"NA"`.
    pub fn alt_name(&self, name_type: &str) -> &str {
        self.alt_names.get(name_type).map(String::as_str).unwrap_or(NA)
    }

    /// Name types this feature carries, sorted.
    pub fn alt_types(&self) -> impl Iterator<Item = &str> {
        self.alt_names.keys().map(String::as_str)
    }

    fn first_alt_name(&self, types: &[&str]) -> &str {
        types
            .iter()
            .find_map(|t| self.alt_names.get(*t))
            .map(String::as_str)
            .unwrap_or(NA)
    }

    pub fn symbol(&self) -> &str {
        self.first_alt_name(&SYMBOL_TYPES)
    }

    pub fn entrez(&self) -> &str {
        self.first_alt_name(&ENTREZ_TYPES)
    }

    pub fn refseq(&self) -> &str {
        self.first_alt_name(&REFSEQ_TYPES)
    }

    /// Distance from `mid` to the TSS, positive when `mid` lies downstream.
    pub fn tss_mid_distance(&self, mid: i64) -> i64 {
        if self.strand.is_sense() {
            mid - self.region.start
        } else {
            self.region.end - mid
        }
    }

    /// Half-open index key after promoter extension: sense features grow
    /// `ext5p` upstream, everything else grows `ext3p` past the end.
    fn index_key(&self, ext5p: u32, ext3p: u32) -> (i64, i64) {
        let (mut start, mut end) = (self.region.start, self.region.end);
        if self.strand.is_sense() {
            start -= i64::from(ext5p);
        } else {
            end += i64::from(ext3p);
        }
        (start, end + 1)
    }
}

impl fmt::Display for AnnotatedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.alt_names.is_empty() {
            let alts: Vec<&str> = self.alt_names.values().map(String::as_str).collect();
            write!(f, " ({})", alts.join(", "))?;
        }
        Ok(())
    }
}

fn into_index(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    features: Vec<AnnotatedFeature>,
    ext5p: u32,
    ext3p: u32,
) -> Result<ContainmentIndex<AnnotatedFeature>> {
    ContainmentIndex::build(
        registry,
        genome,
        features.into_iter().map(|feature| {
            let (start, end) = feature.index_key(ext5p, ext3p);
            (
                feature.region.chr.clone(),
                Interval {
                    start,
                    end,
                    val: feature,
                },
            )
        }),
    )
}

fn required_text<'a, S>(table: &'a S, row: usize, col: usize, what: &str) -> Result<Cow<'a, str>>
where
    S: TabularSource + ?Sized,
{
    table
        .text(row, col)
        .ok_or_else(|| GapsError::parse(row + 1, format!("missing {what}")))
}

fn parse_int(text: &str, line: usize, what: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| GapsError::parse(line, format!("{what} '{}' is not an integer", text.trim())))
}

fn parse_strand(text: &str, line: usize) -> Result<Strand> {
    Strand::parse(text).ok_or_else(|| GapsError::parse(line, format!("unknown strand '{}'", text.trim())))
}

fn parse_int_list(text: &str, line: usize, what: &str) -> Result<Vec<i64>> {
    text.split(';')
        .filter(|t| !t.trim().is_empty())
        .map(|t| parse_int(t, line, what))
        .collect()
}

fn region_at(line: usize, chr: Chromosome, start: i64, end: i64) -> Result<GenomicRegion> {
    if start > end {
        return Err(GapsError::parse(
            line,
            format!("{chr}:{start}-{end} has start after end"),
        ));
    }
    GenomicRegion::new(chr, start, end)
}

/// Loads a UCSC-style gene table: symbol, chromosome, strand, start, end,
/// exon count, exon starts, exon ends, then one column per alternate id
/// type named by the header. Start fields are 0-based and shifted by one.
pub fn load_gene_table<S>(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    table: &S,
    ext5p: u32,
    ext3p: u32,
) -> Result<ContainmentIndex<AnnotatedFeature>>
where
    S: TabularSource + ?Sized,
{
    let start = Instant::now();
    let features = gene_table_features(registry, genome, table).map_err(GapsError::index_build)?;
    debug!("parsed {} genes in {:?}", features.len(), start.elapsed());
    into_index(registry, genome, features, ext5p, ext3p)
}

fn gene_table_features<S>(registry: &ChromosomeRegistry, genome: &Genome, table: &S) -> Result<Vec<AnnotatedFeature>>
where
    S: TabularSource + ?Sized,
{
    let alt_types: Vec<String> = table.column_names().into_iter().skip(ALT_COL).collect();
    let mut features = Vec::with_capacity(table.row_count());

    for row in 0..table.row_count() {
        let line = row + 1;
        let symbol = required_text(table, row, SYMBOL_COL, "symbol")?;
        if symbol.trim().is_empty() {
            return Err(GapsError::parse(line, "missing symbol"));
        }
        let chr = registry.chromosome(genome, &required_text(table, row, CHR_COL, "chromosome")?)?;
        let strand = parse_strand(&required_text(table, row, STRAND_COL, "strand")?, line)?;
        let start = parse_int(&required_text(table, row, START_COL, "start")?, line, "start")? + 1;
        let end = parse_int(&required_text(table, row, END_COL, "end")?, line, "end")?;
        let region = region_at(line, chr.clone(), start, end)?;

        let exon_count = parse_int(&required_text(table, row, EXON_COUNT_COL, "exon count")?, line, "exon count")?;
        let exon_starts = parse_int_list(&required_text(table, row, EXON_START_COL, "exon starts")?, line, "exon start")?;
        let exon_ends = parse_int_list(&required_text(table, row, EXON_END_COL, "exon ends")?, line, "exon end")?;
        let exon_count = usize::try_from(exon_count)
            .map_err(|_| GapsError::parse(line, format!("negative exon count {exon_count}")))?;
        if exon_starts.len() < exon_count || exon_ends.len() < exon_count {
            return Err(GapsError::parse(
                line,
                format!(
                    "{exon_count} exons declared but {} starts and {} ends listed",
                    exon_starts.len(),
                    exon_ends.len()
                ),
            ));
        }

        let mut feature = AnnotatedFeature::new(symbol.trim(), strand, region);
        for (&exon_start, &exon_end) in exon_starts.iter().zip(&exon_ends).take(exon_count) {
            feature.add_exon(region_at(line, chr.clone(), exon_start + 1, exon_end)?);
        }

        for (offset, name_type) in alt_types.iter().enumerate() {
            if let Some(alt) = table.text(row, ALT_COL + offset) {
                let alt = alt.trim();
                if !alt.is_empty() && alt != NA {
                    feature.add_alt_name(name_type.as_str(), alt);
                }
            }
        }

        features.push(feature);
    }

    Ok(features)
}

/// Alternate id types a gene table offers, sorted.
pub fn gene_table_id_types<S>(table: &S) -> Vec<String>
where
    S: TabularSource + ?Sized,
{
    let mut types: Vec<String> = table.column_names().into_iter().skip(ALT_COL).collect();
    types.sort();
    types
}

/// Parses a GFF3/GTF attribute column. Accepts `key=value`, `key="value"`
/// and `key "value"` pairs separated by `;`. Keys come back sorted; the
/// first occurrence of a key wins.
pub fn parse_gff3_attributes(text: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    for pair in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let split = pair
            .split_once('=')
            .or_else(|| pair.split_once(char::is_whitespace));
        let Some((key, value)) = split else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        attributes
            .entry(key.trim().to_string())
            .or_insert_with(|| value.to_string());
    }
    attributes
}

/// `gene_name` -> `Gene Name`.
pub fn format_attribute_name(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exons grouped by transcript, then by chromosome, in first-seen order.
#[derive(Default)]
struct TranscriptGroups {
    order: Vec<String>,
    groups: FxHashMap<String, Transcript>,
}

struct Transcript {
    symbol: String,
    attributes: BTreeMap<String, String>,
    exons: Vec<(Chromosome, Vec<GenomicRegion>)>,
}

impl TranscriptGroups {
    /// Takes the nine GFF3 columns of one record.
    fn push_record(
        &mut self,
        registry: &ChromosomeRegistry,
        genome: &Genome,
        line: usize,
        fields: &[&str],
    ) -> Result<()> {
        if fields.len() < 9 {
            return Err(GapsError::parse(
                line,
                format!("expected 9 GFF3 columns, found {}", fields.len()),
            ));
        }
        if fields[2].trim() != "exon" {
            return Ok(());
        }

        let attributes = parse_gff3_attributes(fields[8]);
        let (Some(symbol), Some(transcript)) = (attributes.get("gene_name"), attributes.get("transcript_id")) else {
            return Ok(());
        };
        let (symbol, transcript) = (symbol.clone(), transcript.clone());

        let chr = registry.chromosome(genome, fields[0])?;
        let strand = parse_strand(fields[6], line)?;
        let start = parse_int(fields[3], line, "start")?;
        let end = parse_int(fields[4], line, "end")?;
        let exon = region_at(line, chr.clone(), start, end)?.with_strand(strand);

        if !self.groups.contains_key(&transcript) {
            self.order.push(transcript.clone());
        }
        // the last exon's symbol and attributes describe the transcript
        let entry = self.groups.entry(transcript).or_insert_with(|| Transcript {
            symbol: String::new(),
            attributes: BTreeMap::new(),
            exons: Vec::new(),
        });
        entry.symbol = symbol;
        entry.attributes = attributes;

        match entry.exons.iter_mut().find(|(c, _)| *c == chr) {
            Some((_, exons)) => exons.push(exon),
            None => entry.exons.push((chr, vec![exon])),
        }
        Ok(())
    }

    /// One feature per (transcript, chromosome). The strand comes from the
    /// first exon seen; later exons are not consulted.
    fn into_features(mut self) -> Vec<AnnotatedFeature> {
        let mut features = Vec::new();
        for transcript in &self.order {
            let Some(group) = self.groups.remove(transcript) else {
                continue;
            };
            for (chr, exons) in group.exons {
                let Some(first) = exons.first() else {
                    continue;
                };
                let strand = first.strand.unwrap_or(Strand::None);
                let start = exons.iter().map(|e| e.start).min().unwrap_or(first.start);
                let end = exons.iter().map(|e| e.end).max().unwrap_or(first.end);
                let region = GenomicRegion {
                    chr,
                    start,
                    end,
                    strand: None,
                };

                let mut feature = AnnotatedFeature::new(group.symbol.clone(), strand, region);
                for exon in exons {
                    feature.add_exon(exon);
                }
                for (key, value) in &group.attributes {
                    feature.add_alt_name(format_attribute_name(key), value.as_str());
                }
                features.push(feature);
            }
        }
        features
    }
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Loads GFF3 exons from a nine-column table (no header row expected).
pub fn load_gff3_table<S>(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    table: &S,
    ext5p: u32,
    ext3p: u32,
) -> Result<ContainmentIndex<AnnotatedFeature>>
where
    S: TabularSource + ?Sized,
{
    let start = Instant::now();
    let mut groups = TranscriptGroups::default();
    for row in 0..table.row_count() {
        let cells: Vec<Cow<'_, str>> = (0..9)
            .map_while(|col| table.text(row, col))
            .collect();
        if cells.first().is_some_and(|c| is_comment(c)) {
            continue;
        }
        let fields: Vec<&str> = cells.iter().map(|c| c.as_ref()).collect();
        groups
            .push_record(registry, genome, row + 1, &fields)
            .map_err(GapsError::index_build)?;
    }
    let features = groups.into_features();
    debug!("grouped {} GFF3 transcripts in {:?}", features.len(), start.elapsed());
    into_index(registry, genome, features, ext5p, ext3p)
}

/// Loads GFF3 exons from tab-separated text. Comment and blank lines are
/// skipped.
pub fn load_gff3_reader<R: BufRead>(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    reader: R,
    ext5p: u32,
    ext3p: u32,
) -> Result<ContainmentIndex<AnnotatedFeature>> {
    let start = Instant::now();
    let mut groups = TranscriptGroups::default();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if is_comment(&line) {
            continue;
        }
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        groups
            .push_record(registry, genome, i + 1, &fields)
            .map_err(GapsError::index_build)?;
    }
    let features = groups.into_features();
    debug!("grouped {} GFF3 transcripts in {:?}", features.len(), start.elapsed());
    into_index(registry, genome, features, ext5p, ext3p)
}

/// Alternate id types offered by the first GFF3 record of a table,
/// formatted and sorted.
pub fn gff3_id_types<S>(table: &S) -> Vec<String>
where
    S: TabularSource + ?Sized,
{
    let first_record = (0..table.row_count()).find(|&row| {
        table
            .text(row, 0)
            .is_some_and(|c| !is_comment(&c))
    });
    let Some(attributes) = first_record.and_then(|row| table.text(row, 8)) else {
        return Vec::new();
    };
    let mut types: Vec<String> = parse_gff3_attributes(&attributes)
        .keys()
        .map(|k| format_attribute_name(k))
        .collect();
    types.sort();
    types
}

fn is_bed_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("track") || trimmed.starts_with("browser") || trimmed.starts_with('#')
}

/// Loads BED records (`chr start end [name [score [strand]]]`, 0-based
/// starts). Blank lines and track, browser and comment lines are skipped.
pub fn load_bed_reader<R: BufRead>(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    reader: R,
    ext5p: u32,
    ext3p: u32,
) -> Result<ContainmentIndex<AnnotatedFeature>> {
    let start = Instant::now();
    let mut features = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        if line.trim().is_empty() {
            info!("skipping blank BED line {line_no}");
            continue;
        }
        if is_bed_header(&line) {
            info!("skipping BED header line {line_no}: {}", line.trim());
            continue;
        }
        let feature = bed_feature(registry, genome, line_no, &line).map_err(GapsError::index_build)?;
        features.push(feature);
    }
    debug!("parsed {} BED records in {:?}", features.len(), start.elapsed());
    into_index(registry, genome, features, ext5p, ext3p)
}

pub fn load_bed(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    text: &str,
    ext5p: u32,
    ext3p: u32,
) -> Result<ContainmentIndex<AnnotatedFeature>> {
    load_bed_reader(registry, genome, text.as_bytes(), ext5p, ext3p)
}

fn bed_feature(registry: &ChromosomeRegistry, genome: &Genome, line: usize, text: &str) -> Result<AnnotatedFeature> {
    let fields: Vec<&str> = text.trim_end_matches(['\r', '\n']).split('\t').collect();
    if fields.len() < 3 {
        return Err(GapsError::parse(
            line,
            format!("expected at least 3 BED columns, found {}", fields.len()),
        ));
    }
    let chr = registry.chromosome(genome, fields[0])?;
    let start = parse_int(fields[1], line, "start")? + 1;
    let end = parse_int(fields[2], line, "end")?;
    let region = region_at(line, chr, start, end)?;

    let strand = match fields.get(5) {
        Some(s) => parse_strand(s, line)?,
        None => Strand::None,
    };
    let id = fields
        .get(3)
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| region.to_string());

    Ok(AnnotatedFeature::new(id, strand, region))
}

/// Loads plain regions: either a `chr:start-end` location in the first
/// column, or chromosome, start and end in the first three. Coordinates
/// are taken as 1-based; no promoter extension applies.
pub fn load_regions<S>(
    registry: &ChromosomeRegistry,
    genome: &Genome,
    table: &S,
) -> Result<ContainmentIndex<AnnotatedFeature>>
where
    S: TabularSource + ?Sized,
{
    let features = region_features(registry, genome, table).map_err(GapsError::index_build)?;
    into_index(registry, genome, features, 0, 0)
}

fn region_features<S>(registry: &ChromosomeRegistry, genome: &Genome, table: &S) -> Result<Vec<AnnotatedFeature>>
where
    S: TabularSource + ?Sized,
{
    let mut features = Vec::with_capacity(table.row_count());
    for row in 0..table.row_count() {
        let line = row + 1;
        let first = required_text(table, row, 0, "location")?;
        let region = if GenomicRegion::looks_like_location(&first) {
            GenomicRegion::parse(registry, genome, &first)?
        } else {
            let chr = registry.chromosome(genome, &first)?;
            let start = parse_int(&required_text(table, row, 1, "start")?, line, "start")?;
            let end = parse_int(&required_text(table, row, 2, "end")?, line, "end")?;
            region_at(line, chr, start, end)?
        };
        features.push(AnnotatedFeature::new(region.to_string(), Strand::None, region));
    }
    Ok(features)
}
