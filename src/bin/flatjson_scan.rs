//! flatjson-scan: write NDJSON as a flat JSON column, then read it back
//!
//! Usage:
//!   # Flatten with default thresholds and print every document
//!   flatjson-scan events.jsonl --flat
//!
//!   # Project two paths, one of them cast
//!   flatjson-scan events.jsonl --flat --project user.id:BIGINT --project kind
//!
//!   # Settings from a file, flags win over it
//!   flatjson-scan events.jsonl --settings scan.json --page-rows 1024 --plan

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use flatjson::storage::{FileSystem, LocalFileSystem};
use flatjson::{
    read_ndjson, AccessPath, ColumnReader, Compression, FlatJsonConfig, FlatJsonWriter, WriterOptions,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{stdin, BufRead, BufReader};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flatjson-scan")]
#[command(about = "Write NDJSON as a flat JSON column and scan it back", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Column file to write
    #[arg(long, short = 'o', default_value = "column.flatjson")]
    output: PathBuf,

    /// Flatten the column (otherwise one plain JSON sub-column is stored)
    #[arg(long)]
    flat: bool,

    /// JSON settings file; command line flags override it
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Minimum fraction of non-null rows a path must occur in
    #[arg(long)]
    sparsity_factor: Option<f64>,

    /// Minimum fraction of SQL NULL rows for a nulls child
    #[arg(long)]
    null_factor: Option<f64>,

    /// Path to flatten regardless of sparsity, as `a.b[:TYPE]` (repeatable)
    #[arg(long = "force", value_name = "PATH")]
    force: Vec<String>,

    /// Path to read instead of whole documents, as `a.b[:TYPE]` (repeatable)
    #[arg(long = "project", value_name = "PATH")]
    project: Vec<String>,

    /// Maximum rows per page
    #[arg(long)]
    page_rows: Option<usize>,

    /// Rows per read batch
    #[arg(long, default_value_t = 1024)]
    batch_size: usize,

    /// Store pages uncompressed
    #[arg(long)]
    no_compression: bool,

    /// Print the byte ranges a full scan reads, then exit
    #[arg(long)]
    plan: bool,
}

/// Contents of a `--settings` file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScanSettings {
    flat: bool,
    flat_json: Option<FlatJsonConfig>,
    force: Vec<String>,
    project: Vec<String>,
    page_rows: Option<usize>,
    compression: Option<Compression>,
}

impl ScanSettings {
    fn load(path: &PathBuf) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open settings {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse settings {}", path.display()))
    }

    /// Merge command line flags over the file contents
    fn apply(mut self, args: &Args) -> Result<Self> {
        self.flat |= args.flat;
        if args.sparsity_factor.is_some() || args.null_factor.is_some() {
            let base = match self.flat_json {
                Some(config) => config,
                None => FlatJsonConfig::process_default()?,
            };
            self.flat_json = Some(FlatJsonConfig::new(
                args.sparsity_factor.unwrap_or(base.sparsity_factor),
                args.null_factor.unwrap_or(base.null_factor),
            )?);
        }
        self.force.extend(args.force.iter().cloned());
        self.project.extend(args.project.iter().cloned());
        if args.page_rows.is_some() {
            self.page_rows = args.page_rows;
        }
        if args.no_compression {
            self.compression = Some(Compression::None);
        }
        Ok(self)
    }

    fn writer_options(&self) -> Result<WriterOptions> {
        let mut options = if self.flat {
            WriterOptions::flat()
        } else {
            WriterOptions::default()
        };
        if let Some(config) = self.flat_json {
            options = options.with_config(config);
        }
        if !self.force.is_empty() {
            options = options.with_access_path(AccessPath::from_specs(&self.force).context("Invalid --force")?);
        }
        if let Some(page_rows) = self.page_rows {
            options = options.with_page_rows(page_rows);
        }
        if let Some(compression) = self.compression {
            options.compression = compression;
        }
        Ok(options)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => ScanSettings::load(path)?,
        None => ScanSettings::default(),
    }
    .apply(&args)?;

    let reader: Box<dyn BufRead> = if let Some(file_path) = &args.input {
        Box::new(BufReader::new(
            File::open(file_path).with_context(|| format!("Failed to open {}", file_path))?,
        ))
    } else {
        Box::new(BufReader::new(stdin()))
    };
    let column = read_ndjson(reader).context("Failed to read NDJSON input")?;

    let fs = LocalFileSystem;
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs.create_dir(parent)?;
    }

    let mut writer = FlatJsonWriter::new(settings.writer_options()?, fs.new_writable_file(&args.output)?)?;
    writer.append(&column)?;
    let meta = writer.finish().context("Failed to write column")?;
    eprintln!("Wrote {} rows to {}: {:?}", meta.num_rows, args.output.display(), meta.child_names());

    let file = fs.new_random_access_file(&args.output)?;
    let reader = ColumnReader::open(file.as_ref()).context("Failed to open column")?;
    let projection = if settings.project.is_empty() {
        None
    } else {
        Some(AccessPath::from_specs(&settings.project).context("Invalid --project")?)
    };

    let mut iter = reader.new_iterator(projection.as_ref());
    iter.init(file)?;

    if args.plan {
        for range in iter.read_plan(0, reader.num_rows())? {
            println!("{}..{}", range.offset, range.end());
        }
        return Ok(());
    }

    iter.seek_to_first()?;
    loop {
        let batch = iter.next_batch(args.batch_size.max(1))?;
        if batch.is_empty() {
            break;
        }
        for i in 0..batch.len() {
            println!("{}", batch.debug_item(i));
        }
    }

    let stats = iter.stats();
    info!(
        rows = stats.rows_read,
        pages = stats.pages_read,
        bytes = stats.bytes_read,
        sub_columns = ?iter.sub_column_names(),
        "scan finished"
    );
    Ok(())
}
