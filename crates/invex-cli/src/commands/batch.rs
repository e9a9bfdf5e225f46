//! Batch processing command for a directory of invoice PDFs.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use invex_core::pipeline::list_pdf_files;
use invex_core::{BatchReport, InvoicePipeline};

use super::{load_config, prepare_output_dir};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Directory containing the invoice PDFs (default: INVOICE_FOLDER)
    input: Option<PathBuf>,

    /// Output directory for the XML documents and summary workbook
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let input = match args.input.or_else(|| config.pipeline.invoice_dir.clone()) {
        Some(dir) => dir,
        None => anyhow::bail!("No input directory given. Pass DIR or set INVOICE_FOLDER."),
    };
    if !input.is_dir() {
        anyhow::bail!("Input directory not found: {}", input.display());
    }

    let found = list_pdf_files(&input, usize::MAX)?.len();
    if found == 0 {
        anyhow::bail!("No PDF files found in {}", input.display());
    }
    let limit = config.pipeline.batch_limit;
    println!("{} Found {} PDF files to process", style("ℹ").blue(), found);
    if found > limit {
        println!(
            "{} Only the first {} files are processed",
            style("⚠").yellow(),
            limit
        );
    }

    let pipeline = InvoicePipeline::from_config(&config)?;
    let output_dir = prepare_output_dir(args.output_dir, &config)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Processing {}", input.display()));

    let result = pipeline.process_directory(&input, &output_dir).await;
    pb.finish_and_clear();
    let report = result?;

    print_report(&report, &output_dir);

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        report.attempted(),
        start.elapsed()
    );
    println!("  Successful: {}", style(report.summary.len()).green());
    if !report.skipped.is_empty() {
        println!("  Failed: {}", style(report.skipped.len()).red());
    }

    match &report.summary_path {
        Some(path) => println!(
            "{} Summary written to {}",
            style("✓").green(),
            path.display()
        ),
        None => println!(
            "{} No information extracted, no summary written",
            style("⚠").yellow()
        ),
    }

    Ok(())
}

fn print_report(report: &BatchReport, output_dir: &Path) {
    for record in report.summary.records() {
        let name = record.source_file().unwrap_or_default();
        println!(
            "  {} {:<32} {}",
            style("✓").green(),
            name,
            output_dir.join(format!("{}.xml", name)).display()
        );
    }

    for skipped in &report.skipped {
        let name = skipped
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "  {} {:<32} [{}] {}",
            style("✗").red(),
            name,
            skipped.error.stage(),
            skipped.error
        );
    }
}
