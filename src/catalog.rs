//! Named annotation sources and the cache of indices built from them.
//!
//! The host application builds one [`AnnotationCatalog`], registers its
//! sources, and shares it. Indices are built on first request for a
//! `(source, ext5p, ext3p)` key and kept for the catalog's lifetime.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use parking_lot::Mutex;
use polars::prelude::DataFrame;
use rustc_hash::FxHashMap;

use crate::annotation::{self, AnnotatedFeature};
use crate::chromosome::{ChromosomeRegistry, Genome};
use crate::error::{GapsError, Result};
use crate::index::ContainmentIndex;

pub type AnnotationIndex = ContainmentIndex<AnnotatedFeature>;

#[derive(Debug, Clone)]
pub enum AnnotationSource {
    /// UCSC-style gene table with a header row.
    GeneTable(DataFrame),
    /// Nine-column GFF3 records.
    Gff3(DataFrame),
    /// BED text.
    Bed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub source: String,
    pub ext5p: u32,
    pub ext3p: u32,
}

#[derive(Debug)]
struct RegisteredSource {
    genome: Genome,
    source: AnnotationSource,
}

#[derive(Debug)]
pub struct AnnotationCatalog {
    registry: Arc<ChromosomeRegistry>,
    sources: BTreeMap<String, RegisteredSource>,
    cache: Mutex<FxHashMap<IndexKey, Arc<AnnotationIndex>>>,
}

impl AnnotationCatalog {
    pub fn new(registry: Arc<ChromosomeRegistry>) -> Self {
        AnnotationCatalog {
            registry,
            sources: BTreeMap::new(),
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn registry(&self) -> &ChromosomeRegistry {
        &self.registry
    }

    /// Registers a source under `name`, replacing any previous one and
    /// dropping indices cached for it.
    pub fn add_source(&mut self, name: impl Into<String>, genome: Genome, source: AnnotationSource) {
        let name = name.into();
        self.cache.get_mut().retain(|key, _| key.source != name);
        self.sources.insert(name, RegisteredSource { genome, source });
    }

    /// Genomes with at least one source, sorted.
    pub fn genomes(&self) -> Vec<&Genome> {
        let mut genomes: Vec<&Genome> = self.sources.values().map(|s| &s.genome).collect();
        genomes.sort();
        genomes.dedup();
        genomes
    }

    /// Source names registered for `genome`, sorted.
    pub fn annotations(&self, genome: &Genome) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|(_, s)| &s.genome == genome)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn source(&self, name: &str) -> Result<&RegisteredSource> {
        self.sources
            .get(name)
            .ok_or_else(|| GapsError::UnknownSource(name.to_string()))
    }

    pub fn genome(&self, name: &str) -> Result<&Genome> {
        Ok(&self.source(name)?.genome)
    }

    /// Alternate id types a source offers, sorted. BED sources offer none.
    pub fn id_types(&self, name: &str) -> Result<Vec<String>> {
        Ok(match &self.source(name)?.source {
            AnnotationSource::GeneTable(table) => annotation::gene_table_id_types(table),
            AnnotationSource::Gff3(table) => annotation::gff3_id_types(table),
            AnnotationSource::Bed(_) => Vec::new(),
        })
    }

    /// The index for `name` with the given promoter extension. Built on the
    /// first request and shared afterwards; builds are serialised so a key
    /// is never built twice.
    pub fn search(&self, name: &str, ext5p: u32, ext3p: u32) -> Result<Arc<AnnotationIndex>> {
        let registered = self.source(name)?;
        let key = IndexKey {
            source: name.to_string(),
            ext5p,
            ext3p,
        };

        let mut cache = self.cache.lock();
        if let Some(index) = cache.get(&key) {
            debug!("annotation cache hit for {key:?}");
            return Ok(Arc::clone(index));
        }

        let start = Instant::now();
        let index = Arc::new(self.build(registered, ext5p, ext3p)?);
        debug!("built annotation index for {key:?} in {:?}", start.elapsed());
        cache.insert(key, Arc::clone(&index));
        Ok(index)
    }

    fn build(&self, registered: &RegisteredSource, ext5p: u32, ext3p: u32) -> Result<AnnotationIndex> {
        let genome = &registered.genome;
        match &registered.source {
            AnnotationSource::GeneTable(table) => {
                annotation::load_gene_table(&self.registry, genome, table, ext5p, ext3p)
            }
            AnnotationSource::Gff3(table) => annotation::load_gff3_table(&self.registry, genome, table, ext5p, ext3p),
            AnnotationSource::Bed(text) => annotation::load_bed(&self.registry, genome, text, ext5p, ext3p),
        }
    }

    /// Number of indices currently cached.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> AnnotationCatalog {
        let mut catalog = AnnotationCatalog::new(Arc::new(ChromosomeRegistry::standard()));
        catalog.add_source(
            "peaks",
            Genome::hg19(),
            AnnotationSource::Bed("chr1\t99\t200\tp1\t0\t+\n".to_string()),
        );
        catalog.add_source(
            "mouse_peaks",
            Genome::mm10(),
            AnnotationSource::Bed("chr19\t0\t10\n".to_string()),
        );
        catalog
    }

    #[test]
    fn lists_sources_by_genome() {
        let catalog = catalog();
        assert_eq!(catalog.genomes(), vec![&Genome::hg19(), &Genome::mm10()]);
        assert_eq!(catalog.annotations(&Genome::mm10()), vec!["mouse_peaks"]);
        assert!(catalog.annotations(&Genome::grch38()).is_empty());
        assert!(catalog.id_types("peaks").unwrap().is_empty());
    }

    #[test]
    fn unknown_sources_fail() {
        let catalog = catalog();
        assert!(matches!(catalog.search("nope", 0, 0), Err(GapsError::UnknownSource(_))));
        assert!(matches!(catalog.id_types("nope"), Err(GapsError::UnknownSource(_))));
    }

    #[test]
    fn indices_are_cached_per_extension() {
        let catalog = catalog();
        let a = catalog.search("peaks", 0, 0).unwrap();
        let b = catalog.search("peaks", 0, 0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = catalog.search("peaks", 1000, 0).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(catalog.cached(), 2);
    }

    #[test]
    fn replacing_a_source_drops_its_indices() {
        let mut catalog = catalog();
        catalog.search("peaks", 0, 0).unwrap();
        catalog.search("mouse_peaks", 0, 0).unwrap();
        catalog.add_source(
            "peaks",
            Genome::hg19(),
            AnnotationSource::Bed("chr2\t0\t5\n".to_string()),
        );
        assert_eq!(catalog.cached(), 1);
        let index = catalog.search("peaks", 0, 0).unwrap();
        assert_eq!(index.chromosomes()[0].name(), "chr2");
    }

    #[test]
    fn concurrent_searches_share_one_build() {
        let catalog = catalog();
        let indices: Vec<Arc<AnnotationIndex>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| catalog.search("peaks", 0, 0).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for index in &indices[1..] {
            assert!(Arc::ptr_eq(&indices[0], index));
        }
        assert_eq!(catalog.cached(), 1);
    }

    #[test]
    fn failed_builds_are_not_cached() {
        let mut catalog = catalog();
        catalog.add_source("broken", Genome::hg19(), AnnotationSource::Bed("chrQ\t1\t2\n".to_string()));
        assert!(matches!(catalog.search("broken", 0, 0), Err(GapsError::IndexBuild(_))));
        assert_eq!(catalog.cached(), 0);
    }
}
