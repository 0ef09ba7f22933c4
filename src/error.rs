//! Error types shared by the index, the annotation loaders and the gap filler.

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GapsError {
    /// Malformed row or coordinate in source input.
    #[error("parse error at record {line}: {message}")]
    Parse { line: usize, message: String },

    /// A chromosome the registry (or a marker index) does not know.
    #[error("unknown chromosome '{name}' for genome {genome}")]
    UnknownChromosome { genome: String, name: String },

    #[error("unknown genome: {0}")]
    UnknownGenome(String),

    /// A parse or lookup failure raised while an index was being built.
    /// Index builds are all-or-nothing, so the partial index is discarded.
    #[error("index build failed: {0}")]
    IndexBuild(#[source] Box<GapsError>),

    #[error("rank out of range: {0}")]
    OutOfRange(String),

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("unknown annotation source: {0}")]
    UnknownSource(String),

    #[error("table error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GapsError>;

impl GapsError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn unknown_chromosome(genome: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownChromosome {
            genome: genome.into(),
            name: name.into(),
        }
    }

    /// Wraps a failure raised during index construction. Already-wrapped
    /// errors are passed through unchanged.
    pub fn index_build(err: GapsError) -> Self {
        match err {
            GapsError::IndexBuild(_) => err,
            other => GapsError::IndexBuild(Box::new(other)),
        }
    }

    /// The innermost error of an [`GapsError::IndexBuild`] chain.
    pub fn root(&self) -> &GapsError {
        match self {
            GapsError::IndexBuild(inner) => inner.root(),
            other => other,
        }
    }
}
