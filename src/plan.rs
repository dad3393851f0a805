use std::borrow::Cow;

use tracing::debug;

use crate::dose_grid::DoseGrid;
use crate::dvh::{StructureDose, VolumeLookup};
use crate::enums::{PlanKind, VolumePresentation};
use crate::error::AnalysisError;
use crate::structure::StructureSet;

/// Identifies a plan or plan combination of one patient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanReference {
    pub patient_id: String,
    /// When set, only this course is searched.
    pub course_id: Option<String>,
    pub plan_id: String,
}

impl PlanReference {
    pub fn new(patient_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            course_id: None,
            plan_id: plan_id.into(),
        }
    }
}

/// A single treatment plan with its calculated dose.
#[derive(Clone, Debug)]
pub struct Plan {
    pub id: String,
    pub course_id: String,
    pub dose: Option<DoseGrid>,
    pub structure_set: Option<StructureSet>,
}

/// What a plan identifier resolved to.
#[derive(Clone, Debug)]
pub enum PlanningItem {
    Single(Plan),
    /// Summed plans. The structure set is taken from the first member.
    Combination { id: String, plans: Vec<Plan> },
}

impl PlanningItem {
    pub fn id(&self) -> &str {
        match self {
            PlanningItem::Single(plan) => &plan.id,
            PlanningItem::Combination { id, .. } => id,
        }
    }

    pub fn kind(&self) -> PlanKind {
        match self {
            PlanningItem::Single(_) => PlanKind::Single,
            PlanningItem::Combination { .. } => PlanKind::Combination,
        }
    }

    pub fn structure_set(&self) -> Result<&StructureSet, AnalysisError> {
        let plan = match self {
            PlanningItem::Single(plan) => Some(plan),
            PlanningItem::Combination { plans, .. } => plans.first(),
        };
        plan.and_then(|plan| plan.structure_set.as_ref())
            .ok_or_else(|| AnalysisError::MissingStructureSet(self.id().to_string()))
    }

    /// The plan's dose, or the voxel-wise sum of all member doses.
    pub fn dose(&self) -> Result<Cow<'_, DoseGrid>, AnalysisError> {
        match self {
            PlanningItem::Single(plan) => plan
                .dose
                .as_ref()
                .map(Cow::Borrowed)
                .ok_or_else(|| AnalysisError::MissingDose(plan.id.clone())),
            PlanningItem::Combination { id, plans } => {
                let grids = plans
                    .iter()
                    .map(|plan| {
                        plan.dose
                            .clone()
                            .ok_or_else(|| AnalysisError::MissingDose(plan.id.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let total = DoseGrid::sum(&grids)
                    .ok_or_else(|| AnalysisError::IncompatibleDoseGrids(id.clone()))?;
                debug!(plan = %id, members = plans.len(), "Summed plan combination dose");
                Ok(Cow::Owned(total))
            }
        }
    }

    /// Direct lookups for single plans; combinations only get cumulative
    /// curves sampled at `bin_width`.
    pub fn volume_lookup(&self, structure_dose: StructureDose, bin_width: f64) -> VolumeLookup {
        match self {
            PlanningItem::Single(_) => VolumeLookup::Direct(structure_dose),
            PlanningItem::Combination { .. } => VolumeLookup::Indexed {
                absolute: structure_dose.cumulative_dvh(VolumePresentation::AbsoluteCm3, bin_width),
                relative: structure_dose.cumulative_dvh(VolumePresentation::Relative, bin_width),
            },
        }
    }
}
