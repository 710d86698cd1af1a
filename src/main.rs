// src/main.rs

use anyhow::{Context, Result};
use civic_detect::image_input::find_image_files;
use civic_detect::report::{issue_records, upload_records};
use civic_detect::{BatchEntry, CivicIssueSystem, Config};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "civic-detect")]
#[command(about = "Detect potholes, garbage, broken lights, waterlogging and fallen trees in street photos")]
#[command(version)]
struct Cli {
    /// YAML configuration file; defaults apply when it does not exist
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify images and write the results and formatted issue files
    Classify {
        /// Images to classify; when empty, `batch.input_dir` is scanned
        images: Vec<PathBuf>,
        #[arg(long)]
        input_dir: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Also write draft records (with locality) for the upload step
        #[arg(long)]
        upload_records: Option<PathBuf>,
    },
    /// Detailed JSON report for one image
    Report {
        image: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Garbage overflow severity for one image
    Severity { image: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("civic_detect={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🏙️  Civic infrastructure monitoring starting");
    let mut system = CivicIssueSystem::new(&config).context("Failed to build detection system")?;

    match cli.command {
        Command::Classify {
            images,
            input_dir,
            output_dir,
            upload_records: upload_path,
        } => {
            let images = if images.is_empty() {
                let dir = input_dir.unwrap_or_else(|| PathBuf::from(&config.batch.input_dir));
                find_image_files(&dir)
            } else {
                images
            };
            if images.is_empty() {
                error!("No images to process");
                return Ok(());
            }
            let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&config.batch.output_dir));
            run_classify(
                &mut system,
                &images,
                &output_dir,
                upload_path.as_deref(),
                &config,
            )
        }
        Command::Report { image, output } => {
            let report = system
                .generate_report(&image)
                .with_context(|| format!("Failed to analyse {}", image.display()))?;
            let json = serde_json::to_string_pretty(&report)?;
            if let Some(path) = output {
                fs::write(&path, &json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Report saved to: {}", path.display());
            }
            println!("{}", json);
            Ok(())
        }
        Command::Severity { image } => {
            let result = system
                .assess_overflow(&image)
                .with_context(|| format!("Failed to analyse {}", image.display()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

fn run_classify(
    system: &mut CivicIssueSystem,
    images: &[PathBuf],
    output_dir: &Path,
    upload_path: Option<&Path>,
    config: &Config,
) -> Result<()> {
    info!("Found {} image(s) to process", images.len());
    let entries = system.process_batch(images);

    let mut failed = 0;
    for entry in &entries {
        match entry {
            BatchEntry::Classified {
                image_path,
                verdict,
            } => info!(
                "{}: potholes={:?} garbage={:?} lights={:?} water={:?} trees={:?}",
                image_path,
                verdict.potholes.status,
                verdict.garbage.status,
                verdict.street_lights.status,
                verdict.waterlogging.status,
                verdict.fallen_trees.status
            ),
            BatchEntry::Failed { image_path, error } => {
                failed += 1;
                warn!("❌ {}: {}", image_path, error);
            }
        }
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let results_path = output_dir.join(&config.batch.results_file);
    fs::write(&results_path, serde_json::to_string_pretty(&entries)?)
        .with_context(|| format!("Failed to write {}", results_path.display()))?;
    info!("💾 Results saved to: {}", results_path.display());

    let formatted: Vec<_> = entries
        .iter()
        .filter_map(|e| e.verdict().map(|v| issue_records(v, e.image_path(), false)))
        .flatten()
        .collect();
    let issues_path = output_dir.join(&config.batch.issues_file);
    fs::write(&issues_path, serde_json::to_string_pretty(&formatted)?)
        .with_context(|| format!("Failed to write {}", issues_path.display()))?;
    info!("💾 Formatted issues saved to: {}", issues_path.display());

    if let Some(path) = upload_path {
        let drafts: Vec<_> = entries
            .iter()
            .filter_map(|e| e.verdict().map(|v| upload_records(v, e.image_path())))
            .flatten()
            .collect();
        fs::write(path, serde_json::to_string_pretty(&drafts)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("💾 {} draft record(s) saved to: {}", drafts.len(), path.display());
    }

    info!(
        "✓ Processed {} image(s): {} failed, {} issue record(s)",
        entries.len(),
        failed,
        formatted.len()
    );
    Ok(())
}
