//! Slice-by-slice sweep of a dose grid against a structure.
//!
//! Every slice is covered by parallel scan-lines running along the grid's
//! x axis. On each line only the dose at the first and last sample inside
//! the structure is read, so the per-slice cost is two dose reads per row.
//! This gives the true extremes only when the structure's cross-section is
//! convex along the line and dose varies monotonically between its edges;
//! gaps inside a line (`[F, T, F, T, F]`) are not detected.
//!
//! Boundary samples without dose (outside the grid) are left out of the
//! slice extremes. A slice can therefore be covered yet carry no dose.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::dose_grid::GridGeometry;
use crate::sampling::{DoseSampler, StructureSampler};

#[derive(Debug, Error, PartialEq)]
pub enum ScanError {
    #[error("Scan resolution must be positive, got ({xres}, {yres})")]
    InvalidResolution { xres: f64, yres: f64 },
}

/// In-plane sample spacing in mm, independent of the grid's own voxels.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScanResolution {
    pub xres: f64,
    pub yres: f64,
}

impl Default for ScanResolution {
    fn default() -> Self {
        Self {
            xres: 2.5,
            yres: 2.5,
        }
    }
}

/// Per-slice result. `min_dose` and `max_dose` are only present when the
/// slice is covered and at least one boundary sample has dose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceSummary {
    pub slice_index: usize,
    pub min_dose: Option<f64>,
    pub max_dose: Option<f64>,
    pub covered: bool,
}

/// First and last index of `mask` that is inside the structure.
pub fn boundary_indices(mask: &[bool]) -> Option<(usize, usize)> {
    let first = mask.iter().position(|&inside| inside)?;
    let last = mask.iter().rposition(|&inside| inside)?;
    Some((first, last))
}

pub fn covered_slice_count(slices: &[SliceSummary]) -> usize {
    slices.iter().filter(|slice| slice.covered).count()
}

pub struct ProfileScanner {
    resolution: ScanResolution,
}

impl ProfileScanner {
    pub fn new(resolution: ScanResolution) -> Result<Self, ScanError> {
        let ScanResolution { xres, yres } = resolution;
        if !(xres > 0.0 && yres > 0.0 && xres.is_finite() && yres.is_finite()) {
            return Err(ScanError::InvalidResolution { xres, yres });
        }
        Ok(Self { resolution })
    }

    /// Samples per scan-line: the grid's x extent divided by `xres`.
    pub fn sample_count(&self, geometry: &GridGeometry) -> usize {
        (geometry.extent().0 / self.resolution.xres) as usize
    }

    /// One summary per integer z (mm) in `[0, z extent)`, ascending.
    pub fn scan<D, S>(&self, dose: &D, mask: &S) -> Vec<SliceSummary>
    where
        D: DoseSampler + ?Sized,
        S: StructureSampler + ?Sized,
    {
        let geometry = dose.geometry();
        let count = self.sample_count(geometry);
        let mut dose_profile = vec![None; count];
        let mut segment_profile = vec![false; count];

        let z_extent = geometry.extent().2;
        let slices: Vec<SliceSummary> = (0_usize..)
            .take_while(|&z| (z as f64) < z_extent)
            .map(|z| self.scan_slice(dose, mask, z, &mut dose_profile, &mut segment_profile))
            .collect();

        debug!(
            slices = slices.len(),
            covered = covered_slice_count(&slices),
            samples_per_line = count,
            "Dose profile scan finished"
        );
        slices
    }

    fn scan_slice<D, S>(
        &self,
        dose: &D,
        mask: &S,
        z: usize,
        dose_profile: &mut [Option<f64>],
        segment_profile: &mut [bool],
    ) -> SliceSummary
    where
        D: DoseSampler + ?Sized,
        S: StructureSampler + ?Sized,
    {
        let geometry = dose.geometry();
        let (x_extent, y_extent, _) = geometry.extent();

        let mut min_dose: Option<f64> = None;
        let mut max_dose: Option<f64> = None;
        let mut covered = false;

        let rows = (0_usize..)
            .map(|row| row as f64 * self.resolution.yres)
            .take_while(|&y| y < y_extent);
        for y in rows {
            let start =
                geometry.origin + geometry.y_direction * y + geometry.z_direction * z as f64;
            let end = start + geometry.x_direction * x_extent;

            mask.segment_profile(start, end, segment_profile);
            let Some((x1, x2)) = boundary_indices(segment_profile) else {
                continue;
            };
            covered = true;

            dose.dose_profile(start, end, dose_profile);
            for boundary_dose in [dose_profile[x1], dose_profile[x2]].into_iter().flatten() {
                min_dose = Some(min_dose.map_or(boundary_dose, |m| m.min(boundary_dose)));
                max_dose = Some(max_dose.map_or(boundary_dose, |m| m.max(boundary_dose)));
            }
        }

        SliceSummary {
            slice_index: z,
            min_dose,
            max_dose,
            covered,
        }
    }
}
