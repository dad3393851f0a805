//! Worklist-driven batch analysis.
//!
//! For each worklist entry the orchestrator opens the patient, resolves the
//! plan, locates the target structure and writes the DVH table, a summary
//! row and the per-slice table. A failing patient is logged and skipped.

use std::fs;

use tracing::{info, warn};

use crate::archive::{PatientArchive, PatientSession};
use crate::config::AnalysisConfig;
use crate::dvh::{DoseStatistics, StructureDose, VolumeLookup};
use crate::enums::{DoseUnit, PlanKind, VolumePresentation};
use crate::error::AnalysisError;
use crate::plan::PlanReference;
use crate::report::{
    DvhRow, SummaryRow, append_summary, summary_thresholds_gy, write_dvh_table,
    write_slice_table,
};
use crate::scanner::{ProfileScanner, covered_slice_count};
use crate::worklist::read_worklist;

/// Outcome of one analysed worklist entry.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientReport {
    pub patient_id: String,
    pub plan_id: String,
    pub kind: PlanKind,
    pub statistics: DoseStatistics,
    pub dvh_rows: usize,
    pub slices: usize,
    pub covered_slices: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub reports: Vec<PatientReport>,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn analysed(&self) -> usize {
        self.reports.len()
    }
}

pub struct BatchOrchestrator<'a, A: PatientArchive + ?Sized> {
    archive: &'a A,
    config: &'a AnalysisConfig,
    scanner: ProfileScanner,
}

impl<'a, A: PatientArchive + ?Sized> BatchOrchestrator<'a, A> {
    pub fn new(archive: &'a A, config: &'a AnalysisConfig) -> Result<Self, AnalysisError> {
        let scanner = ProfileScanner::new(config.scan_resolution)?;
        Ok(Self {
            archive,
            config,
            scanner,
        })
    }

    /// Analyse every entry of the configured worklist.
    ///
    /// # Errors
    ///
    /// Only an unreadable worklist or output directory aborts the batch.
    pub fn run(&self) -> Result<BatchSummary, AnalysisError> {
        let references = read_worklist(&self.config.worklist)?;
        self.run_references(&references)
    }

    pub fn run_references(
        &self,
        references: &[PlanReference],
    ) -> Result<BatchSummary, AnalysisError> {
        fs::create_dir_all(&self.config.output_dir)?;

        let mut summary = BatchSummary::default();
        for reference in references {
            match self.analyse(reference) {
                Ok(report) => summary.reports.push(report),
                Err(error) => {
                    warn!(
                        patient = %reference.patient_id,
                        plan = %reference.plan_id,
                        %error,
                        "Patient skipped"
                    );
                    summary.skipped += 1;
                }
            }
        }

        info!(
            analysed = summary.analysed(),
            skipped = summary.skipped,
            "Batch finished"
        );
        Ok(summary)
    }

    /// Analyse one worklist entry and write its reports.
    pub fn analyse(&self, reference: &PlanReference) -> Result<PatientReport, AnalysisError> {
        let patient_id = reference.patient_id.as_str();
        info!(patient = %patient_id, plan = %reference.plan_id, "Analysing patient");

        let session = PatientSession::open(self.archive, patient_id)?;
        let item = session.load_plan(reference, self.config.duplicate_plans)?;

        let structure = item
            .structure_set()?
            .find(&self.config.structure_names)
            .ok_or_else(|| {
                AnalysisError::StructureNotFound(self.config.structure_names.join("/"))
            })?;

        let unit = self.config.dose_unit;
        let dose = item.dose()?.into_owned().converted_to(unit);
        let structure_dose = StructureDose::sample(&dose, structure);
        let statistics = structure_dose.statistics();
        let lookup = item.volume_lookup(structure_dose, self.config.dvh_bin_width);
        lookup.validate()?;

        let rows = dvh_rows(&lookup)?;
        write_dvh_table(self.config.dvh_path(patient_id), &rows)?;

        let summary = summary_row(&lookup, statistics, self.config.dose_unit)?;
        append_summary(self.config.summary_path(), &summary)?;

        let slices = self.scanner.scan(&dose, structure);
        write_slice_table(self.config.slices_path(patient_id), &slices)?;
        let covered_slices = covered_slice_count(&slices);

        info!(
            patient = %patient_id,
            plan = %item.id(),
            structure = %structure.id,
            max_dose = statistics.max,
            unit = %self.config.dose_unit,
            covered_slices,
            "Patient analysed"
        );

        Ok(PatientReport {
            patient_id: patient_id.to_string(),
            plan_id: item.id().to_string(),
            kind: item.kind(),
            statistics,
            dvh_rows: rows.len(),
            slices: slices.len(),
            covered_slices,
        })
    }
}

/// One row per whole dose unit from zero up to the rounded-up maximum.
fn dvh_rows(lookup: &VolumeLookup) -> Result<Vec<DvhRow>, AnalysisError> {
    let last = lookup.max_dose().ceil() as u64;
    (0..=last)
        .map(|step| {
            let dose = step as f64;
            Ok(DvhRow {
                dose,
                volume_absolute: lookup.volume_at(dose, VolumePresentation::AbsoluteCm3)?,
                volume_relative: lookup.volume_at(dose, VolumePresentation::Relative)?,
            })
        })
        .collect()
}

fn summary_row(
    lookup: &VolumeLookup,
    statistics: DoseStatistics,
    unit: DoseUnit,
) -> Result<SummaryRow, AnalysisError> {
    let factor = DoseUnit::Gy.factor_to(unit);
    let volumes = |presentation: VolumePresentation| {
        summary_thresholds_gy()
            .map(|gy| lookup.volume_at(f64::from(gy) * factor, presentation))
            .collect::<Result<Vec<_>, _>>()
    };
    Ok(SummaryRow {
        absolute: volumes(VolumePresentation::AbsoluteCm3)?,
        relative: volumes(VolumePresentation::Relative)?,
        statistics,
    })
}
