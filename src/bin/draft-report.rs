//! draft-report - export a stored radiology report as a draft PDF.
//!
//! Usage:
//!   draft-report reports.json --id r1 --out-dir ./out
//!   draft-report report.json --config export.json --at 2025-10-06T14:30:00Z --verify

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use clap::Parser;
use draftreport::{
    DirectoryDelivery, DraftExporterBuilder, EmbedFailurePolicy, ExportConfig, ExportError,
    inspect_pdf_bytes, load_stored_reports, require_readable_report,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "draft-report")]
#[command(about = "Export a stored radiology report as a draft PDF")]
#[command(version)]
struct Args {
    /// JSON file holding one stored report or an array of them
    report: PathBuf,

    /// Report id to export when the file holds several
    #[arg(long)]
    id: Option<String>,

    /// Directory the PDF is written into
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Export settings (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory site-relative image paths resolve under
    #[arg(long)]
    asset_root: Option<PathBuf>,

    /// Extra image placed ahead of the report's own images (repeatable)
    #[arg(long = "sample-image")]
    sample_images: Vec<String>,

    /// Leave out images the PDF writer cannot decode instead of failing
    #[arg(long)]
    skip_bad_images: bool,

    /// Generation time (RFC 3339) instead of now
    #[arg(long)]
    at: Option<String>,

    /// Re-open the written PDF and check it is readable
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(&args) {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Some(export_err) = err.downcast_ref::<ExportError>() {
                eprintln!("{}", export_err.user_message());
            }
            Err(err)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ExportConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => ExportConfig::default(),
    }
    .with_env_overrides();

    let mut builder = DraftExporterBuilder::from_config(&config)?;
    if let Some(root) = &args.asset_root {
        builder = builder.asset_root(root.clone());
    }
    for reference in &args.sample_images {
        builder = builder.sample_image(reference.clone());
    }
    if args.skip_bad_images {
        builder = builder.embed_failure(EmbedFailurePolicy::Skip);
    }
    let exporter = builder.build()?;

    let raw = std::fs::read_to_string(&args.report)
        .with_context(|| format!("Failed to read {}", args.report.display()))?;
    let stored = load_stored_reports(&raw)?;
    let stored = match &args.id {
        Some(id) => stored
            .into_iter()
            .find(|report| &report.id == id)
            .ok_or_else(|| anyhow!("no report with id {id}"))?,
        None => match stored.len() {
            1 => stored.into_iter().next().ok_or_else(|| anyhow!("empty report file"))?,
            0 => bail!("report file holds no reports"),
            n => bail!("report file holds {n} reports; pick one with --id"),
        },
    };
    let record = stored.to_record();

    let generated_at = match &args.at {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid --at timestamp: {raw}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let exported = exporter.export_at(&record, generated_at)?;
    for skipped in &exported.skipped_images {
        eprintln!(
            "skipped image {} ({}): {}",
            skipped.position, skipped.reference, skipped.error
        );
    }
    if args.verify {
        let report = inspect_pdf_bytes(&exported.bytes)?;
        require_readable_report(&report)?;
    }

    let path = exported.deliver(&DirectoryDelivery::new(&args.out_dir))?;
    println!(
        "{} ({} page{})",
        path.display(),
        exported.page_count(),
        if exported.page_count() == 1 { "" } else { "s" }
    );
    Ok(())
}
