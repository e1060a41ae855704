//! Binary entry point for the refgraph index tool.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use refgraph::{
    cli::{
        import_export::{format_key, parse_key, run_export, run_import, ImportConfig, InputFormat},
        report::{AncestryReport, IndexSummary, ValidationReport},
    },
    index::{CombinedIndex, GraphIndex, IndexOptions, Key},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "refgraph",
    version,
    about = "Build and query paged graph indices",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(long, global = true, default_value_t = 4096, help = "Index page size (bytes)")]
    page_size: u32,

    #[arg(long, global = true, help = "Override leaf cache size (nodes)")]
    leaf_cache: Option<usize>,

    #[arg(long, global = true, help = "Skip page checksum verification")]
    no_verify_checksums: bool,
}

#[derive(Args, Debug)]
struct ImportCmd {
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[arg(value_name = "INDEX")]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = InputFormatArg::Jsonl)]
    input_format: InputFormatArg,

    #[arg(long, default_value_t = 1, help = "Elements per key")]
    key_elements: usize,

    #[arg(long, default_value_t = 1, help = "Ref lists per key")]
    ref_lists: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an index file from JSON lines or CSV.
    Import(ImportCmd),
    /// Dump every entry of an index as JSON lines.
    Export {
        #[arg(value_name = "INDEX")]
        index: PathBuf,
    },
    /// Resolve keys and all their ancestors across indices, first index first.
    Ancestry {
        #[arg(value_name = "INDEX", required = true)]
        indices: Vec<PathBuf>,

        #[arg(long = "key", value_name = "a:b", required = true)]
        keys: Vec<String>,

        #[arg(long, default_value_t = 0)]
        ref_list: usize,
    },
    /// List the entries whose key starts with the given elements.
    Prefix {
        #[arg(value_name = "INDEX")]
        index: PathBuf,

        #[arg(value_name = "a:b")]
        prefix: String,
    },
    /// Check the structure of each index.
    Validate {
        #[arg(value_name = "INDEX", required = true)]
        indices: Vec<PathBuf>,
    },
    /// Print header fields and read counters of an index.
    Stats {
        #[arg(value_name = "INDEX")]
        index: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum InputFormatArg {
    Jsonl,
    Csv,
}

impl From<InputFormatArg> for InputFormat {
    fn from(format: InputFormatArg) -> Self {
        match format {
            InputFormatArg::Jsonl => InputFormat::JsonLines,
            InputFormatArg::Csv => InputFormat::Csv,
        }
    }
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let options = build_index_options(&cli.open);
    let page_size = cli.open.page_size;

    match cli.command {
        Command::Import(cmd) => {
            let cfg = ImportConfig {
                input: cmd.input,
                format: cmd.input_format.into(),
                output: cmd.output,
                page_size,
                key_elements: cmd.key_elements,
                node_ref_lists: cmd.ref_lists,
            };
            let summary = run_import(&cfg)?;
            emit(&cli.format, &summary, || {
                println!(
                    "Imported {} entries into {} pages",
                    summary.entries_imported, summary.pages_written
                )
            })?;
        }
        Command::Export { index } => {
            let index = open_index(&index, page_size, &options)?;
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            run_export(&index, &mut lock)?;
        }
        Command::Ancestry {
            indices,
            keys,
            ref_list,
        } => {
            let members = indices
                .iter()
                .map(|path| open_index(path, page_size, &options).map(Arc::new))
                .collect::<Result<Vec<_>, _>>()?;
            let combined = CombinedIndex::new(members);
            let keys: Vec<Key> = keys.iter().map(|k| parse_key(k)).collect();
            let ancestry = combined.find_ancestry(&keys, ref_list)?;
            let report = AncestryReport::from(&ancestry);
            emit(&cli.format, &report, || print_ancestry_text(&report))?;
        }
        Command::Prefix { index, prefix } => {
            let index = open_index(&index, page_size, &options)?;
            let prefix = parse_key(&prefix);
            for entry in index.iter_entries_prefix(prefix.elements())? {
                println!("{}", format_key(&entry.key));
            }
        }
        Command::Validate { indices } => {
            let mut failed = false;
            let mut reports = Vec::with_capacity(indices.len());
            for path in &indices {
                let report = ValidationReport::open_and_run(path, page_size, &options);
                failed |= !report.success;
                reports.push(report);
            }
            emit(&cli.format, &reports, || {
                for report in &reports {
                    match &report.error {
                        None => println!("{}: ok", report.path),
                        Some(err) => println!("{}: FAILED ({err})", report.path),
                    }
                }
            })?;
            if failed {
                std::process::exit(2);
            }
        }
        Command::Stats { index: path } => {
            let index = open_index(&path, page_size, &options)?;
            let summary = IndexSummary::collect(&path, &index)?;
            emit(&cli.format, &summary, || print_summary_text(&summary))?;
        }
    }

    Ok(())
}

fn build_index_options(args: &OpenArgs) -> IndexOptions {
    let mut opts = IndexOptions::default().verify_checksums(!args.no_verify_checksums);
    if let Some(leaves) = args.leaf_cache {
        opts = opts.leaf_cache_capacity(leaves);
    }
    opts
}

fn open_index(path: &Path, page_size: u32, options: &IndexOptions) -> refgraph::Result<GraphIndex> {
    GraphIndex::open_file(path, page_size, options.clone())
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_ancestry_text(report: &AncestryReport) {
    println!("Found {} keys:", report.parent_map.len());
    for (key, parents) in &report.parent_map {
        println!("  {key} -> [{}]", parents.join(", "));
    }
    println!("Missing {} keys:", report.missing_keys.len());
    for key in &report.missing_keys {
        println!("  {key}");
    }
}

fn print_summary_text(summary: &IndexSummary) {
    println!(
        "{}: key_count={} ref_lists={} key_elements={}",
        summary.path, summary.key_count, summary.node_ref_lists, summary.key_elements
    );
    println!(
        "  page_fetches={} leaf_reads={} internal_reads={} cache_hits={} cache_misses={}",
        summary.stats.page_fetches,
        summary.stats.leaf_reads,
        summary.stats.internal_reads,
        summary.stats.cache_hits,
        summary.stats.cache_misses
    );
}
