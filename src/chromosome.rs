use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{GapsError, Result};

/// A genome is identified by a name/assembly/track triple. It is only ever
/// used as a lookup key; nothing is inferred from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Genome {
    pub name: String,
    pub assembly: String,
    pub track: String,
}

impl Genome {
    pub fn new(name: impl Into<String>, assembly: impl Into<String>, track: impl Into<String>) -> Self {
        Genome {
            name: name.into(),
            assembly: assembly.into(),
            track: track.into(),
        }
    }

    pub fn hg18() -> Self {
        Genome::new("Human", "hg18", "ucsc")
    }

    pub fn hg19() -> Self {
        Genome::new("Human", "hg19", "ucsc")
    }

    pub fn grch38() -> Self {
        Genome::new("Human", "grch38", "ucsc")
    }

    pub fn mm9() -> Self {
        Genome::new("Mouse", "mm9", "ucsc")
    }

    pub fn mm10() -> Self {
        Genome::new("Mouse", "mm10", "ucsc")
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.assembly)
    }
}

/// Canonical chromosome handle. Equality and hashing use genome + name;
/// ordering follows the registry's per-genome chromosome table, so chr2
/// sorts before chr10 and chrX after chr22.
#[derive(Debug, Clone)]
pub struct Chromosome {
    assembly: Arc<str>,
    name: Arc<str>,
    rank: u32,
}

impl Chromosome {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    /// Position of this chromosome in its genome's ordering table.
    pub fn rank(&self) -> u32 {
        self.rank
    }
}

impl PartialEq for Chromosome {
    fn eq(&self, other: &Self) -> bool {
        self.assembly == other.assembly && self.name == other.name
    }
}

impl Eq for Chromosome {}

impl Hash for Chromosome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.assembly.hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for Chromosome {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Chromosome {
    fn cmp(&self, other: &Self) -> Ordering {
        self.assembly
            .cmp(&other.assembly)
            .then(self.rank.cmp(&other.rank))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone)]
struct GenomeLayout {
    chromosomes: Vec<Chromosome>,
    aliases: FxHashMap<String, usize>,
}

impl GenomeLayout {
    fn new(genome: &Genome, names: &[String]) -> Self {
        let assembly: Arc<str> = Arc::from(genome.assembly.as_str());
        let mut chromosomes = Vec::with_capacity(names.len());
        let mut aliases = FxHashMap::default();

        for (rank, name) in names.iter().enumerate() {
            let canonical = canonical_name(name);
            chromosomes.push(Chromosome {
                assembly: Arc::clone(&assembly),
                name: Arc::from(canonical.as_str()),
                rank: rank as u32,
            });

            let core = canonical[3..].to_ascii_lowercase();
            aliases.insert(canonical.to_ascii_lowercase(), rank);
            aliases.insert(core.clone(), rank);
            if core == "m" {
                aliases.insert("mt".to_string(), rank);
                aliases.insert("chrmt".to_string(), rank);
            }
        }

        GenomeLayout { chromosomes, aliases }
    }
}

/// "11" -> "chr11", "chrx" -> "chrX", "MT" -> "chrM".
fn canonical_name(name: &str) -> String {
    let trimmed = name.trim();
    let core = if trimmed.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("chr")) {
        &trimmed[3..]
    } else {
        trimmed
    };
    if core.eq_ignore_ascii_case("mt") {
        return "chrM".to_string();
    }
    if core.len() == 1 {
        return format!("chr{}", core.to_ascii_uppercase());
    }
    format!("chr{core}")
}

fn human_names() -> Vec<String> {
    (1..=22)
        .map(|i| format!("chr{i}"))
        .chain(["chrX", "chrY", "chrM"].iter().map(|s| s.to_string()))
        .collect()
}

fn mouse_names() -> Vec<String> {
    (1..=19)
        .map(|i| format!("chr{i}"))
        .chain(["chrX", "chrY", "chrM"].iter().map(|s| s.to_string()))
        .collect()
}

/// Maps (genome, chromosome text) to canonical [`Chromosome`] handles and
/// enumerates each genome's chromosomes in order. Immutable once built, so
/// it can be shared across threads behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ChromosomeRegistry {
    layouts: FxHashMap<Genome, GenomeLayout>,
}

impl ChromosomeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with hg18, hg19, GRCh38, mm9 and mm10.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for genome in [Genome::hg18(), Genome::hg19(), Genome::grch38()] {
            registry.register(genome, &human_names());
        }
        for genome in [Genome::mm9(), Genome::mm10()] {
            registry.register(genome, &mouse_names());
        }
        registry
    }

    /// Registers (or replaces) a genome. The order of `names` is the
    /// chromosome order used for sorting and enumeration.
    pub fn register<S: AsRef<str>>(&mut self, genome: Genome, names: &[S]) {
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        let layout = GenomeLayout::new(&genome, &names);
        self.layouts.insert(genome, layout);
    }

    fn layout(&self, genome: &Genome) -> Result<&GenomeLayout> {
        self.layouts
            .get(genome)
            .ok_or_else(|| GapsError::UnknownGenome(genome.to_string()))
    }

    /// Resolves a textual chromosome name for `genome`.
    pub fn chromosome(&self, genome: &Genome, name: &str) -> Result<Chromosome> {
        let layout = self.layout(genome)?;
        let key = name.trim().to_ascii_lowercase();
        layout
            .aliases
            .get(&key)
            .map(|&rank| layout.chromosomes[rank].clone())
            .ok_or_else(|| GapsError::unknown_chromosome(genome.to_string(), name.trim()))
    }

    /// All chromosomes of `genome` in registry order.
    pub fn chromosomes(&self, genome: &Genome) -> Result<&[Chromosome]> {
        Ok(&self.layout(genome)?.chromosomes)
    }

    pub fn contains(&self, genome: &Genome, chromosome: &Chromosome) -> bool {
        self.layouts.get(genome).is_some_and(|layout| {
            layout
                .chromosomes
                .get(chromosome.rank as usize)
                .is_some_and(|known| known == chromosome)
        })
    }

    pub fn genomes(&self) -> impl Iterator<Item = &Genome> {
        self.layouts.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_aliases_to_the_same_handle() {
        let registry = ChromosomeRegistry::standard();
        let hg19 = Genome::hg19();
        let a = registry.chromosome(&hg19, "chr11").unwrap();
        let b = registry.chromosome(&hg19, "11").unwrap();
        let c = registry.chromosome(&hg19, "CHR11").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.name(), "chr11");

        let x = registry.chromosome(&hg19, "chrx").unwrap();
        assert_eq!(x.name(), "chrX");
        let m = registry.chromosome(&hg19, "MT").unwrap();
        assert_eq!(m.name(), "chrM");
        assert_eq!(registry.chromosome(&hg19, "chrMT").unwrap(), m);
    }

    #[test]
    fn ordering_follows_the_genome_table() {
        let registry = ChromosomeRegistry::standard();
        let hg19 = Genome::hg19();
        let chr2 = registry.chromosome(&hg19, "chr2").unwrap();
        let chr10 = registry.chromosome(&hg19, "chr10").unwrap();
        let chr_x = registry.chromosome(&hg19, "chrX").unwrap();
        let chr22 = registry.chromosome(&hg19, "chr22").unwrap();
        assert!(chr2 < chr10);
        assert!(chr22 < chr_x);

        let names: Vec<&str> = registry
            .chromosomes(&hg19)
            .unwrap()
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(names.len(), 25);
        assert_eq!(names[0], "chr1");
        assert_eq!(names[24], "chrM");
    }

    #[test]
    fn unknown_names_and_genomes_fail() {
        let registry = ChromosomeRegistry::standard();
        let err = registry.chromosome(&Genome::mm10(), "chr21").unwrap_err();
        assert!(matches!(err, GapsError::UnknownChromosome { .. }));

        let err = registry
            .chromosome(&Genome::new("Fly", "dm6", "ucsc"), "chr2L")
            .unwrap_err();
        assert!(matches!(err, GapsError::UnknownGenome(_)));
    }

    #[test]
    fn custom_layouts_and_membership() {
        let mut registry = ChromosomeRegistry::new();
        let fly = Genome::new("Fly", "dm6", "ucsc");
        registry.register(fly.clone(), &["chr2L", "chr2R", "chr3L"]);
        let chr2r = registry.chromosome(&fly, "2r").unwrap();
        assert_eq!(chr2r.name(), "chr2R");
        assert_eq!(chr2r.rank(), 1);
        assert!(registry.contains(&fly, &chr2r));

        let standard = ChromosomeRegistry::standard();
        let human_chr1 = standard.chromosome(&Genome::hg19(), "chr1").unwrap();
        assert!(!registry.contains(&fly, &human_chr1));
    }
}
