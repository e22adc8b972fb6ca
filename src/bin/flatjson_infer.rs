//! flatjson-infer: show the flat schema a batch of NDJSON would be written with
//!
//! Usage:
//!   # Read from file, output to stdout
//!   flatjson-infer events.jsonl
//!
//!   # Read from stdin with a lower sparsity threshold
//!   cat events.jsonl | flatjson-infer --sparsity-factor 0.5
//!
//!   # Force a sparse path into its own column
//!   flatjson-infer events.jsonl --path payload.user.id:BIGINT --compact

use anyhow::{Context, Result};
use clap::Parser;
use flatjson::{read_ndjson, AccessPath, FlatJsonConfig, SchemaInferrer};
use serde_json::json;
use std::fs::File;
use std::io::{stdin, BufRead, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flatjson-infer")]
#[command(about = "Infer the flat JSON schema of an NDJSON batch", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Minimum fraction of non-null rows a path must occur in
    #[arg(long, env = "FLATJSON_SPARSITY_FACTOR", default_value_t = flatjson::config::DEFAULT_SPARSITY_FACTOR)]
    sparsity_factor: f64,

    /// Minimum fraction of SQL NULL rows for a nulls child
    #[arg(long, env = "FLATJSON_NULL_FACTOR", default_value_t = flatjson::config::DEFAULT_NULL_FACTOR)]
    null_factor: f64,

    /// Path to flatten regardless of sparsity, as `a.b[:TYPE]` (repeatable)
    #[arg(long = "path", value_name = "PATH")]
    paths: Vec<String>,

    /// Compact output (no pretty-printing)
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let reader: Box<dyn BufRead> = if let Some(file_path) = &args.input {
        Box::new(BufReader::new(
            File::open(file_path).with_context(|| format!("Failed to open {}", file_path))?,
        ))
    } else {
        Box::new(BufReader::new(stdin()))
    };
    let column = read_ndjson(reader).context("Failed to read NDJSON input")?;
    if column.is_empty() {
        eprintln!("Warning: No JSON documents found in input");
    }

    let config = FlatJsonConfig::new(args.sparsity_factor, args.null_factor)?;
    let forced = if args.paths.is_empty() {
        None
    } else {
        Some(AccessPath::from_specs(&args.paths).context("Invalid --path")?)
    };

    let mut inferrer = SchemaInferrer::new(config);
    if let Some(path) = &forced {
        inferrer = inferrer.with_access_path(path);
    }
    let schema = inferrer.infer(&column);
    info!(rows = column.len(), is_flat = schema.is_flat, "inferred schema");

    let children: Vec<_> = schema
        .children()
        .into_iter()
        .map(|(name, ty)| json!({"name": name, "type": ty.as_str()}))
        .collect();
    let output = json!({
        "rows": column.len(),
        "null_rows": column.null_count(),
        "is_flat": schema.is_flat,
        "has_nulls": schema.has_nulls,
        "has_remain": schema.has_remain,
        "children": children,
    });

    let output = if args.compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{}", output);

    Ok(())
}
