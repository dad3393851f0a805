use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use dose_volume::{
    archive::{DicomArchive, PatientArchive, PatientSession},
    batch::BatchOrchestrator,
    config::AnalysisConfig,
    logging,
};

/// Dose-volume histograms and per-slice dose from DICOM-RT plans
#[derive(Parser, Debug)]
#[command(name = "dose-volume", version)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worklist overriding the configured one
    #[arg(short, long)]
    worklist: Option<PathBuf>,

    /// Output directory overriding the configured one
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse every worklist entry (default)
    Run,
    /// Print the courses and plans of a patient
    List { patient_id: String },
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init();

    let mut config = AnalysisConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(worklist) = args.worklist {
        config.worklist = worklist;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }

    let archive = DicomArchive::new(&config.archive_root);
    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let summary = BatchOrchestrator::new(&archive, &config)?
                .run()
                .with_context(|| format!("Failed to run worklist {}", config.worklist.display()))?;
            info!(
                analysed = summary.analysed(),
                skipped = summary.skipped,
                output = %config.output_dir.display(),
                "Done"
            );
        }
        Command::List { patient_id } => list_patient(&archive, &patient_id)?,
    }
    Ok(())
}

fn list_patient(archive: &impl PatientArchive, patient_id: &str) -> Result<()> {
    let session = PatientSession::open(archive, patient_id)?;
    let record = session.record();
    println!("Patient {}", record.id);
    for course in &record.courses {
        println!("  Course {}", course.id);
        for plan in &course.plans {
            println!("    Plan {}", plan.id);
        }
    }
    Ok(())
}
