//! Patient archives and scoped patient sessions.
//!
//! An archive lists the courses and plans of a patient and loads a plan's
//! dose and structure set on request. Access goes through a
//! [`PatientSession`], which releases the patient when dropped so that only
//! one patient is held open at a time.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::enums::DuplicatePlanPolicy;
use crate::error::AnalysisError;
use crate::plan::{Plan, PlanReference, PlanningItem};
use crate::rt_loader::{RtLoader, RtLoaderError, RtObject};

#[derive(Clone, Debug, PartialEq)]
pub struct PlanEntry {
    pub id: String,
    pub course_id: String,
    /// Archive-specific location of the plan data.
    pub location: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Course {
    pub id: String,
    pub plans: Vec<PlanEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PatientRecord {
    pub id: String,
    pub courses: Vec<Course>,
}

impl PatientRecord {
    /// Find the plan a worklist entry refers to.
    ///
    /// Courses are searched in order; with [`DuplicatePlanPolicy::LastMatchWins`]
    /// the last matching plan is returned.
    pub fn resolve(
        &self,
        reference: &PlanReference,
        policy: DuplicatePlanPolicy,
    ) -> Result<&PlanEntry, AnalysisError> {
        let matches: Vec<&PlanEntry> = self
            .courses
            .iter()
            .filter(|course| {
                reference
                    .course_id
                    .as_ref()
                    .is_none_or(|course_id| *course_id == course.id)
            })
            .flat_map(|course| course.plans.iter())
            .filter(|plan| plan.id == reference.plan_id)
            .collect();

        for plan in &matches {
            info!(course = %plan.course_id, plan = %plan.id, "Found plan");
        }

        match (matches.as_slice(), policy) {
            ([], _) => Err(AnalysisError::PlanNotFound {
                patient_id: self.id.clone(),
                plan_id: reference.plan_id.clone(),
            }),
            ([.., last], DuplicatePlanPolicy::LastMatchWins) => Ok(*last),
            ([only], DuplicatePlanPolicy::Reject) => Ok(*only),
            (all, DuplicatePlanPolicy::Reject) => Err(AnalysisError::DuplicatePlan {
                patient_id: self.id.clone(),
                plan_id: reference.plan_id.clone(),
                matches: all.len(),
            }),
        }
    }
}

pub trait PatientArchive {
    fn open_patient(&self, patient_id: &str) -> Result<PatientRecord, AnalysisError>;

    fn load_plan(&self, entry: &PlanEntry) -> Result<PlanningItem, AnalysisError>;

    fn close_patient(&self, _patient_id: &str) {}
}

/// An open patient. The patient is closed when the session is dropped.
pub struct PatientSession<'a, A: PatientArchive + ?Sized> {
    archive: &'a A,
    record: PatientRecord,
}

impl<'a, A: PatientArchive + ?Sized> PatientSession<'a, A> {
    pub fn open(archive: &'a A, patient_id: &str) -> Result<Self, AnalysisError> {
        let record = archive.open_patient(patient_id)?;
        debug!(patient = %record.id, courses = record.courses.len(), "Opened patient session");
        Ok(Self { archive, record })
    }

    pub fn record(&self) -> &PatientRecord {
        &self.record
    }

    pub fn load_plan(
        &self,
        reference: &PlanReference,
        policy: DuplicatePlanPolicy,
    ) -> Result<PlanningItem, AnalysisError> {
        let entry = self.record.resolve(reference, policy)?;
        self.archive.load_plan(entry)
    }
}

impl<A: PatientArchive + ?Sized> Drop for PatientSession<'_, A> {
    fn drop(&mut self) {
        self.archive.close_patient(&self.record.id);
        debug!(patient = %self.record.id, "Closed patient session");
    }
}

/// DICOM-RT files laid out as `{root}/{patient}/{course}/{plan}/*.dcm`.
///
/// A plan directory with several RTDOSE files is a plan combination.
pub struct DicomArchive {
    root: PathBuf,
}

impl DicomArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn sorted_subdirectories(path: &Path) -> Result<Vec<(String, PathBuf)>, AnalysisError> {
        let mut directories: Vec<_> = fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?.to_string();
                Some((name, path))
            })
            .collect();
        directories.sort();
        Ok(directories)
    }

    fn dicom_files(path: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
        let mut paths: Vec<_> = fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl PatientArchive for DicomArchive {
    fn open_patient(&self, patient_id: &str) -> Result<PatientRecord, AnalysisError> {
        let patient_dir = self.root.join(patient_id);
        if !patient_dir.is_dir() {
            return Err(AnalysisError::PatientNotFound(patient_id.to_string()));
        }

        let courses = Self::sorted_subdirectories(&patient_dir)?
            .into_iter()
            .map(|(course_id, course_dir)| {
                let plans = Self::sorted_subdirectories(&course_dir)?
                    .into_iter()
                    .map(|(plan_id, location)| PlanEntry {
                        id: plan_id,
                        course_id: course_id.clone(),
                        location,
                    })
                    .collect();
                Ok(Course {
                    id: course_id,
                    plans,
                })
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        Ok(PatientRecord {
            id: patient_id.to_string(),
            courses,
        })
    }

    fn load_plan(&self, entry: &PlanEntry) -> Result<PlanningItem, AnalysisError> {
        let mut doses = Vec::new();
        let mut structure_set = None;

        for path in Self::dicom_files(&entry.location)? {
            match RtLoader::load_file(&path) {
                Ok(RtObject::Dose(dose)) => doses.push(dose),
                Ok(RtObject::StructureSet(set)) => {
                    if structure_set.is_some() {
                        warn!(path = %path.display(), "Ignoring additional structure set");
                    } else {
                        structure_set = Some(set);
                    }
                }
                Err(RtLoaderError::UnsupportedModality(modality)) => {
                    debug!(path = %path.display(), %modality, "Skipping file");
                }
                Err(source) => return Err(AnalysisError::RtLoader { path, source }),
            }
        }

        let plan = |id: String, dose| Plan {
            id,
            course_id: entry.course_id.clone(),
            dose,
            structure_set: structure_set.clone(),
        };

        if doses.len() <= 1 {
            return Ok(PlanningItem::Single(plan(entry.id.clone(), doses.pop())));
        }
        let plans = doses
            .into_iter()
            .enumerate()
            .map(|(i, dose)| plan(format!("{}#{}", entry.id, i + 1), Some(dose)))
            .collect();
        Ok(PlanningItem::Combination {
            id: entry.id.clone(),
            plans,
        })
    }
}
