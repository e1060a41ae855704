#![forbid(unsafe_code)]

//! Command-line support: building indices from flat files, dumping them
//! back out, and rendering query results.

/// Index import and export operations.
///
/// Builds an index from JSON lines or CSV and writes index entries back out
/// as JSON lines.
pub mod import_export;

/// Serializable reports produced by the command-line tool.
pub mod report;
