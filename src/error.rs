use std::path::PathBuf;

use thiserror::Error;

use crate::dvh::DvhError;
use crate::rt_loader::RtLoaderError;
use crate::scanner::ScanError;
use crate::worklist::WorklistError;

/// Everything that can go wrong while analysing one patient.
///
/// The batch orchestrator catches these at the patient boundary, logs them
/// and moves on to the next worklist entry.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Patient {0} not found in archive")]
    PatientNotFound(String),

    #[error("Plan {plan_id} not found for patient {patient_id}")]
    PlanNotFound { patient_id: String, plan_id: String },

    #[error("Plan {plan_id} matches {matches} plans for patient {patient_id}")]
    DuplicatePlan {
        patient_id: String,
        plan_id: String,
        matches: usize,
    },

    #[error("Structure {0} not found in structure set")]
    StructureNotFound(String),

    #[error("Plan {0} has no dose")]
    MissingDose(String),

    #[error("Plan {0} has no structure set")]
    MissingStructureSet(String),

    #[error("Dose grids of plan combination {0} do not share the same geometry")]
    IncompatibleDoseGrids(String),

    #[error("Invalid worklist: {0}")]
    InputFormat(#[from] WorklistError),

    #[error("DVH error: {0}")]
    Dvh(#[from] DvhError),

    #[error("DICOM-RT error in {path}: {source}")]
    RtLoader {
        path: PathBuf,
        #[source]
        source: RtLoaderError,
    },

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Report error: {0}")]
    Report(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
