use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::{BuilderOptions, GraphIndex, IndexBuilder, IndexEntry, Key};
use crate::types::IndexError;

/// Separator between key elements in CSV cells and text output.
pub const ELEMENT_SEPARATOR: char = ':';
/// Separator between keys inside one CSV ref-list cell.
pub const REF_SEPARATOR: char = '|';

/// Layout of an import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// One JSON [`EntryRecord`] per line.
    JsonLines,
    /// A CSV file with a `key` column, an optional `value` column and one
    /// `refs<N>` column per ref list.
    Csv,
}

/// Configuration for building an index file from a flat file.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Input file.
    pub input: PathBuf,
    /// Layout of the input file.
    pub format: InputFormat,
    /// Index file to write.
    pub output: PathBuf,
    /// Page slot size of the written index.
    pub page_size: u32,
    /// Number of elements in every key.
    pub key_elements: usize,
    /// Number of ref lists on every key.
    pub node_ref_lists: usize,
}

/// One index entry as it appears in JSON lines files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Key elements.
    pub key: Vec<String>,
    /// Entry value.
    #[serde(default)]
    pub value: String,
    /// Ref lists, each a list of keys.
    #[serde(default)]
    pub refs: Vec<Vec<Vec<String>>>,
}

impl EntryRecord {
    fn into_parts(self) -> (Key, String, Vec<Vec<Key>>) {
        let refs = self
            .refs
            .into_iter()
            .map(|list| list.into_iter().map(Key::from_slices).collect())
            .collect();
        (Key::from_slices(self.key), self.value, refs)
    }

    fn from_entry(entry: &IndexEntry) -> Self {
        Self {
            key: elements_to_strings(&entry.key),
            value: String::from_utf8_lossy(&entry.value).into_owned(),
            refs: entry
                .ref_lists
                .iter()
                .map(|list| list.iter().map(elements_to_strings).collect())
                .collect(),
        }
    }
}

/// Summary of an import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    /// Entries written to the index.
    pub entries_imported: u64,
    /// Pages written to the index file.
    pub pages_written: u64,
}

/// Summary of an export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    /// Entries written to the output.
    pub entries_exported: u64,
}

/// Error type for import and export operations.
#[derive(Error, Debug)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// CSV parsing error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// JSON parsing or writing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Index layer error.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<&str> for CliError {
    fn from(value: &str) -> Self {
        CliError::Message(value.to_string())
    }
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        CliError::Message(value)
    }
}

/// Builds an index file from `cfg.input`.
pub fn run_import(cfg: &ImportConfig) -> Result<ImportSummary, CliError> {
    let options = BuilderOptions::default().page_size(cfg.page_size);
    let mut builder = IndexBuilder::with_options(cfg.node_ref_lists, cfg.key_elements, options);
    match cfg.format {
        InputFormat::JsonLines => import_json_lines(cfg, &mut builder)?,
        InputFormat::Csv => import_csv(cfg, &mut builder)?,
    }
    let entries_imported = builder.len() as u64;
    let pages_written = builder.finish_to_file(&cfg.output)?;
    tracing::info!(
        target: "refgraph::cli",
        entries = entries_imported,
        pages = pages_written,
        output = %cfg.output.display(),
        "index written"
    );
    Ok(ImportSummary {
        entries_imported,
        pages_written,
    })
}

fn import_json_lines(cfg: &ImportConfig, builder: &mut IndexBuilder) -> Result<(), CliError> {
    let reader = BufReader::new(File::open(&cfg.input)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EntryRecord = serde_json::from_str(&line)
            .map_err(|err| CliError::Message(format!("line {}: {err}", line_no + 1)))?;
        let (key, value, refs) = record.into_parts();
        builder.add_node(key, value, refs)?;
    }
    Ok(())
}

fn import_csv(cfg: &ImportConfig, builder: &mut IndexBuilder) -> Result<(), CliError> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(&cfg.input)?;
    let headers = reader.headers()?.clone();
    let key_idx = headers
        .iter()
        .position(|h| h == "key")
        .ok_or_else(|| CliError::Message("CSV input needs a `key` column".into()))?;
    let value_idx = headers.iter().position(|h| h == "value");
    let ref_idx = (0..cfg.node_ref_lists)
        .map(|n| {
            let name = format!("refs{n}");
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| CliError::Message(format!("CSV input needs a `{name}` column")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for row in reader.records() {
        let row = row?;
        let key = parse_key(row.get(key_idx).unwrap_or_default());
        let value = value_idx.and_then(|idx| row.get(idx)).unwrap_or_default().to_string();
        let refs = ref_idx
            .iter()
            .map(|idx| {
                row.get(*idx)
                    .unwrap_or_default()
                    .split(REF_SEPARATOR)
                    .filter(|cell| !cell.is_empty())
                    .map(parse_key)
                    .collect()
            })
            .collect();
        builder.add_node(key, value, refs)?;
    }
    Ok(())
}

/// Writes every entry of `index` as JSON lines.
pub fn run_export(index: &GraphIndex, out: &mut dyn Write) -> Result<ExportSummary, CliError> {
    let mut writer = BufWriter::new(out);
    let mut summary = ExportSummary::default();
    for entry in index.iter_all_entries()? {
        serde_json::to_writer(&mut writer, &EntryRecord::from_entry(&entry))?;
        writer.write_all(b"\n")?;
        summary.entries_exported += 1;
    }
    writer.flush()?;
    Ok(summary)
}

/// Parses `a:b:c` into a three-element key.
pub fn parse_key(text: &str) -> Key {
    Key::from_slices(text.split(ELEMENT_SEPARATOR))
}

/// Renders a key as `a:b:c`, replacing invalid UTF-8.
pub fn format_key(key: &Key) -> String {
    elements_to_strings(key).join(&ELEMENT_SEPARATOR.to_string())
}

fn elements_to_strings(key: &Key) -> Vec<String> {
    key.elements()
        .iter()
        .map(|e| String::from_utf8_lossy(e).into_owned())
        .collect()
}
