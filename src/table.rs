use std::borrow::Cow;
use std::path::PathBuf;

use polars::prelude::*;

use crate::error::{GapsError, Result};

pub trait TabularSource {
    fn column_names(&self) -> Vec<String>;

    fn row_count(&self) -> usize;

    /// Cell as text; `None` for nulls and out-of-range cells.
    fn text(&self, row: usize, col: usize) -> Option<Cow<'_, str>>;

    /// Cell as a number. Text cells are parsed; `None` when the cell is
    /// null or not numeric.
    fn value(&self, row: usize, col: usize) -> Option<f64>;
}

impl TabularSource for DataFrame {
    fn column_names(&self) -> Vec<String> {
        self.get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    fn row_count(&self) -> usize {
        self.height()
    }

    fn text(&self, row: usize, col: usize) -> Option<Cow<'_, str>> {
        let value = self.get_columns().get(col)?.get(row).ok()?;
        match value {
            AnyValue::Null => None,
            AnyValue::String(s) => Some(Cow::Borrowed(s)),
            AnyValue::StringOwned(s) => Some(Cow::Owned(s.to_string())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    fn value(&self, row: usize, col: usize) -> Option<f64> {
        let value = self.get_columns().get(col)?.get(row).ok()?;
        match value {
            AnyValue::Null => None,
            AnyValue::String(s) => s.trim().parse().ok(),
            AnyValue::StringOwned(s) => s.trim().parse().ok(),
            other => other.extract::<f64>(),
        }
    }
}

/// Finds a column by case-insensitive synonyms. An exact match on any
/// synonym wins over a substring match; synonyms shorter than three
/// characters only ever match exactly.
pub fn find_column<S>(table: &S, synonyms: &[&str]) -> Result<usize>
where
    S: TabularSource + ?Sized,
{
    let names: Vec<String> = table
        .column_names()
        .iter()
        .map(|n| n.trim().to_ascii_lowercase())
        .collect();

    for synonym in synonyms {
        if let Some(col) = names.iter().position(|n| n == synonym) {
            return Ok(col);
        }
    }
    for synonym in synonyms.iter().filter(|s| s.len() >= 3) {
        if let Some(col) = names.iter().position(|n| n.contains(synonym)) {
            return Ok(col);
        }
    }

    Err(GapsError::MissingColumn(synonyms.join("|")))
}

/// Like [`find_column`] but `None` when nothing matches.
pub fn find_optional_column<S>(table: &S, synonyms: &[&str]) -> Option<usize>
where
    S: TabularSource + ?Sized,
{
    find_column(table, synonyms).ok()
}

/// Reads a tab-separated file with every column as text and no quote
/// handling, so GFF attribute columns survive untouched.
pub fn read_tsv(path: impl Into<PathBuf>, has_header: bool) -> Result<DataFrame> {
    read_text_table(path.into(), has_header, None)
}

/// Reads a headerless GFF3 file; `#` directive and comment lines are
/// dropped.
pub fn read_gff3(path: impl Into<PathBuf>) -> Result<DataFrame> {
    read_text_table(path.into(), false, Some("#"))
}

fn read_text_table(path: PathBuf, has_header: bool, comment_prefix: Option<&str>) -> Result<DataFrame> {
    let parse_options = CsvParseOptions::default()
        .with_separator(b'\t')
        .with_quote_char(None)
        .with_comment_prefix(comment_prefix);
    let frame = CsvReadOptions::default()
        .with_has_header(has_header)
        .with_infer_schema_length(Some(0))
        .with_rechunk(true)
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path))?
        .finish()?;
    Ok(frame)
}
