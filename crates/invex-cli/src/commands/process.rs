//! Process command - extract data from a single invoice PDF.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use invex_core::models::invoice::value_to_text;
use invex_core::{InvoicePipeline, InvoiceRecord, TextSource};

use super::{load_config, prepare_output_dir};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output directory for the XML document and summary workbook
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print the extracted record as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let pipeline = InvoicePipeline::from_config(&config)?;
    let output_dir = prepare_output_dir(args.output_dir, &config)?;

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Extracting {}", args.input.display()));

    let result = pipeline.process_document(&args.input, &output_dir).await;
    pb.finish_and_clear();
    let processed = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&processed.record)?);
    } else {
        print!("{}", format_record(&processed.record));
    }

    let source = match processed.source {
        TextSource::Direct => "text layer",
        TextSource::Recognition => "OCR",
    };
    eprintln!("{} Text obtained from {}", style("ℹ").blue(), source);
    eprintln!(
        "{} XML written to {}",
        style("✓").green(),
        processed.xml_path.display()
    );
    eprintln!(
        "{} Summary written to {}",
        style("✓").green(),
        processed.summary_path.display()
    );

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// One `key: value` line per field, keys aligned.
fn format_record(record: &InvoiceRecord) -> String {
    let width = record.keys().map(|k| k.chars().count()).max().unwrap_or(0);

    let mut output = String::new();
    for (key, value) in record.iter() {
        let pad = width - key.chars().count();
        output.push_str(&format!("{}{}  {}\n", key, " ".repeat(pad), value_to_text(value)));
    }
    output
}
