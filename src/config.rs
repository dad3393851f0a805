use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::debug;

use crate::enums::{DoseUnit, DuplicatePlanPolicy};
use crate::error::AnalysisError;
use crate::scanner::ScanResolution;

/// Prefix of environment variables overriding file settings, e.g.
/// `DOSE_VOLUME__OUTPUT_DIR` or `DOSE_VOLUME__SCAN_RESOLUTION__XRES`.
pub const ENV_PREFIX: &str = "DOSE_VOLUME";

/// Settings of one batch run.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Root of the `{patient}/{course}/{plan}/*.dcm` tree.
    pub archive_root: PathBuf,
    pub worklist: PathBuf,
    /// Directory receiving the per-patient tables and the summary file.
    pub output_dir: PathBuf,
    /// File name of the aggregate summary inside `output_dir`.
    pub summary_file: String,
    /// Candidate names of the analysed structure, in priority order.
    pub structure_names: Vec<String>,
    /// Unit all reported doses are expressed in.
    pub dose_unit: DoseUnit,
    /// Dose spacing of cumulative curves, in `dose_unit`.
    pub dvh_bin_width: f64,
    pub scan_resolution: ScanResolution,
    pub duplicate_plans: DuplicatePlanPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            archive_root: PathBuf::from("archive"),
            worklist: PathBuf::from("plan list.txt"),
            output_dir: PathBuf::from("."),
            summary_file: "basic dosimetric.txt".to_string(),
            structure_names: vec!["Esophagus".to_string(), "esophagus".to_string()],
            dose_unit: DoseUnit::CGy,
            dvh_bin_width: 1.0,
            scan_resolution: ScanResolution::default(),
            duplicate_plans: DuplicatePlanPolicy::Reject,
        }
    }
}

impl AnalysisConfig {
    /// Load defaults, then `path` (if given), then `DOSE_VOLUME__*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Fails when `path` does not exist or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self, AnalysisError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let config: AnalysisConfig = settings.try_deserialize()?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(&self.summary_file)
    }

    pub fn dvh_path(&self, patient_id: &str) -> PathBuf {
        self.output_dir.join(format!("{patient_id}_DVH.txt"))
    }

    pub fn slices_path(&self, patient_id: &str) -> PathBuf {
        self.output_dir.join(format!("{patient_id}_slices.txt"))
    }
}
