//! # Dose-volume library
//!
//! This crate extracts dose-volume information for a delineated structure
//! from radiotherapy plans stored as DICOM-RT files.
//!
//! It builds on the dicom-rs ecosystem to read RTDOSE grids and RTSTRUCT
//! contours from an archive laid out as
//! `{root}/{patient}/{course}/{plan}/*.dcm`. A worklist names one plan per
//! patient; for every entry the library
//!  - resolves the plan (a plan directory with several dose files is a plan
//!    combination whose dose is the voxel-wise sum),
//!  - samples the dose inside the target structure,
//!  - writes a cumulative dose-volume table, one summary row with V10..V70,
//!    mean, median and maximum dose, and a per-slice minimum/maximum table.
//!
//! Single plans answer volume-at-dose queries exactly from the sampled
//! voxels. Plan combinations answer them from precomputed cumulative
//! curves by bucket lookup:
//!
//! ```text
//! index = floor(len * dose / max_dose), clamped to len - 1
//! ```
//!
//! The per-slice scan only reads dose at the first and last sample of each
//! scan-line inside the structure. See [`scanner`] for the consequences on
//! non-convex cross-sections.
//!
//! Everything runs on one thread. Patients are opened one at a time through
//! [`archive::PatientSession`], which closes the patient when dropped.
//!
//! # Examples
//!
//! ## Analysing a worklist
//!
//! ```no_run
//! # use dose_volume::{archive::DicomArchive, batch::BatchOrchestrator, config::AnalysisConfig};
//! let config = AnalysisConfig::load(None).expect("should have loaded configuration");
//! let archive = DicomArchive::new(&config.archive_root);
//! let summary = BatchOrchestrator::new(&archive, &config)
//!     .expect("should have accepted scan resolution")
//!     .run()
//!     .expect("should have read worklist");
//! println!("{} analysed, {} skipped", summary.analysed(), summary.skipped);
//! ```
//!
//! ## Volume at dose from a cumulative curve
//!
//! ```
//! # use dose_volume::dvh::DvhCurve;
//! # use dose_volume::enums::{DoseUnit, VolumePresentation};
//! let curve = DvhCurve::new(
//!     vec![12.0, 9.0, 4.0, 0.0],
//!     4000.0,
//!     VolumePresentation::AbsoluteCm3,
//!     DoseUnit::CGy,
//! );
//! assert_eq!(curve.volume_at_dose_indexed(1000.0), Ok(9.0));
//! ```

pub mod archive;
pub mod batch;
pub mod config;
pub mod dose_grid;
pub mod dvh;
pub mod enums;
pub mod error;
pub mod geometry;
mod interpolator;
pub mod logging;
pub mod plan;
pub mod report;
pub mod rt_loader;
pub mod sampling;
pub mod scanner;
pub mod structure;
pub mod worklist;
