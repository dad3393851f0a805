use ndarray::Zip;
use thiserror::Error;
use tracing::debug;

use crate::dose_grid::DoseGrid;
use crate::enums::{DoseUnit, VolumePresentation};
use crate::structure::Structure;

#[derive(Debug, Error, PartialEq)]
pub enum DvhError {
    #[error("DVH curve has no calculated dose")]
    InvalidCurve,

    #[error("Dose {dose} outside of curve range [0, {max_dose}]")]
    OutOfRange { dose: f64, max_dose: f64 },
}

/// A cumulative dose-volume histogram.
///
/// Sample `i` holds the volume receiving at least `i * max_dose / N`.
#[derive(Clone, Debug, PartialEq)]
pub struct DvhCurve {
    volumes: Vec<f64>,
    max_dose: f64,
    pub presentation: VolumePresentation,
    pub unit: DoseUnit,
}

impl DvhCurve {
    pub fn new(
        volumes: Vec<f64>,
        max_dose: f64,
        presentation: VolumePresentation,
        unit: DoseUnit,
    ) -> Self {
        Self {
            volumes,
            max_dose,
            presentation,
            unit,
        }
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn max_dose(&self) -> f64 {
        self.max_dose
    }

    pub fn dose_at_index(&self, index: usize) -> f64 {
        index as f64 * self.max_dose / self.volumes.len() as f64
    }

    pub fn validate(&self) -> Result<(), DvhError> {
        if self.volumes.is_empty() || !(self.max_dose > 0.0) || !self.max_dose.is_finite() {
            return Err(DvhError::InvalidCurve);
        }
        Ok(())
    }

    /// Volume at `dose` by bucket lookup: `curve[floor(N * dose / max_dose)]`.
    ///
    /// This reads the volume at the start of the bucket containing `dose`
    /// and never interpolates, so results are quantised to `max_dose / N`.
    /// `dose == max_dose` reads the last bucket.
    pub fn volume_at_dose_indexed(&self, dose: f64) -> Result<f64, DvhError> {
        self.validate()?;
        if !(0.0..=self.max_dose).contains(&dose) {
            return Err(DvhError::OutOfRange {
                dose,
                max_dose: self.max_dose,
            });
        }
        let len = self.volumes.len();
        let index = ((len as f64 * dose / self.max_dose).floor() as usize).min(len - 1);
        Ok(self.volumes[index])
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DoseStatistics {
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub volume_cm3: f64,
}

/// Doses sampled at every dose-grid voxel centre inside a structure.
#[derive(Clone, Debug)]
pub struct StructureDose {
    /// Ascending.
    doses: Vec<f64>,
    voxel_volume_cm3: f64,
    pub unit: DoseUnit,
}

impl StructureDose {
    pub fn new(mut doses: Vec<f64>, voxel_volume_cm3: f64, unit: DoseUnit) -> Self {
        doses.sort_by(f64::total_cmp);
        Self {
            doses,
            voxel_volume_cm3,
            unit,
        }
    }

    pub fn sample(grid: &DoseGrid, structure: &Structure) -> Self {
        let geometry = &grid.geometry;
        let mut doses = Vec::new();
        Zip::indexed(&grid.data).for_each(|(z, y, x), &dose| {
            if structure.contains(&geometry.voxel_centre(z, y, x)) {
                doses.push(f64::from(dose));
            }
        });
        debug!(
            structure = %structure.id,
            voxels = doses.len(),
            "Sampled structure dose"
        );
        Self::new(doses, geometry.voxel_volume_cm3(), grid.unit)
    }

    pub fn is_empty(&self) -> bool {
        self.doses.is_empty()
    }

    pub fn total_volume(&self) -> f64 {
        self.doses.len() as f64 * self.voxel_volume_cm3
    }

    pub fn max_dose(&self) -> f64 {
        self.doses.last().copied().unwrap_or(0.0)
    }

    pub fn statistics(&self) -> DoseStatistics {
        let count = self.doses.len();
        let mean = if count == 0 {
            0.0
        } else {
            self.doses.iter().sum::<f64>() / count as f64
        };
        let median = match count {
            0 => 0.0,
            n if n % 2 == 1 => self.doses[n / 2],
            n => (self.doses[n / 2 - 1] + self.doses[n / 2]) / 2.0,
        };
        DoseStatistics {
            mean,
            median,
            max: self.max_dose(),
            volume_cm3: self.total_volume(),
        }
    }

    /// Exact volume receiving at least `dose`.
    pub fn volume_at_dose(&self, dose: f64, presentation: VolumePresentation) -> f64 {
        if self.doses.is_empty() {
            return 0.0;
        }
        let count = self.doses.len() - self.doses.partition_point(|&d| d < dose);
        match presentation {
            VolumePresentation::AbsoluteCm3 => count as f64 * self.voxel_volume_cm3,
            VolumePresentation::Relative => count as f64 * 100.0 / self.doses.len() as f64,
        }
    }

    /// Cumulative DVH with `ceil(max_dose / bin_width)` samples.
    ///
    /// A structure without dose yields an empty curve, which fails
    /// validation.
    pub fn cumulative_dvh(&self, presentation: VolumePresentation, bin_width: f64) -> DvhCurve {
        let max_dose = self.max_dose();
        if !(max_dose > 0.0) || !(bin_width > 0.0) {
            return DvhCurve::new(Vec::new(), max_dose.max(0.0), presentation, self.unit);
        }
        let bins = (max_dose / bin_width).ceil().max(1.0) as usize;
        let volumes = (0..bins)
            .map(|i| self.volume_at_dose(i as f64 * max_dose / bins as f64, presentation))
            .collect();
        DvhCurve::new(volumes, max_dose, presentation, self.unit)
    }
}

/// Volume-at-dose capability of a planning item.
#[derive(Clone, Debug)]
pub enum VolumeLookup {
    /// Exact lookups against the sampled structure dose.
    Direct(StructureDose),
    /// Bucket lookups against precomputed cumulative curves.
    Indexed {
        absolute: DvhCurve,
        relative: DvhCurve,
    },
}

impl VolumeLookup {
    pub fn max_dose(&self) -> f64 {
        match self {
            VolumeLookup::Direct(dose) => dose.max_dose(),
            VolumeLookup::Indexed { absolute, .. } => absolute.max_dose(),
        }
    }

    /// Fails with [`DvhError::InvalidCurve`] when no dose was calculated
    /// for the structure.
    pub fn validate(&self) -> Result<(), DvhError> {
        match self {
            VolumeLookup::Direct(dose) if dose.max_dose() > 0.0 => Ok(()),
            VolumeLookup::Direct(_) => Err(DvhError::InvalidCurve),
            VolumeLookup::Indexed { absolute, relative } => {
                absolute.validate()?;
                relative.validate()
            }
        }
    }

    /// Volume receiving at least `dose`. Doses above the maximum receive no
    /// volume and are answered without consulting the curve.
    pub fn volume_at(&self, dose: f64, presentation: VolumePresentation) -> Result<f64, DvhError> {
        match self {
            VolumeLookup::Direct(structure_dose) => {
                Ok(structure_dose.volume_at_dose(dose, presentation))
            }
            VolumeLookup::Indexed { absolute, relative } => {
                let curve = match presentation {
                    VolumePresentation::AbsoluteCm3 => absolute,
                    VolumePresentation::Relative => relative,
                };
                curve.validate()?;
                if dose > curve.max_dose() {
                    return Ok(0.0);
                }
                curve.volume_at_dose_indexed(dose)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_curve() -> DvhCurve {
        DvhCurve::new(
            vec![12.0, 9.0, 4.0, 0.0],
            4000.0,
            VolumePresentation::AbsoluteCm3,
            DoseUnit::CGy,
        )
    }

    #[test]
    fn indexed_lookup_reads_bucket_start() {
        let curve = scenario_curve();
        assert_eq!(curve.volume_at_dose_indexed(0.0), Ok(12.0));
        assert_eq!(curve.volume_at_dose_indexed(999.0), Ok(12.0));
        assert_eq!(curve.volume_at_dose_indexed(1000.0), Ok(9.0));
        assert_eq!(curve.volume_at_dose_indexed(3999.0), Ok(0.0));
    }

    #[test]
    fn indexed_lookup_accepts_the_maximum_dose() {
        let curve = scenario_curve();
        assert_eq!(curve.volume_at_dose_indexed(4000.0), Ok(0.0));
    }

    #[test]
    fn indexed_lookup_rejects_doses_outside_the_curve() {
        let curve = scenario_curve();
        assert_eq!(
            curve.volume_at_dose_indexed(4000.5),
            Err(DvhError::OutOfRange {
                dose: 4000.5,
                max_dose: 4000.0
            })
        );
        assert!(matches!(
            curve.volume_at_dose_indexed(-1.0),
            Err(DvhError::OutOfRange { .. })
        ));
    }

    #[test]
    fn zero_max_dose_is_invalid_for_every_dose() {
        let curve = DvhCurve::new(
            vec![5.0, 5.0],
            0.0,
            VolumePresentation::AbsoluteCm3,
            DoseUnit::CGy,
        );
        for dose in [0.0, 1.0, 100.0, -3.0] {
            assert_eq!(
                curve.volume_at_dose_indexed(dose),
                Err(DvhError::InvalidCurve)
            );
        }
        let empty = DvhCurve::new(Vec::new(), 10.0, VolumePresentation::Relative, DoseUnit::Gy);
        assert_eq!(
            empty.volume_at_dose_indexed(0.0),
            Err(DvhError::InvalidCurve)
        );
    }

    #[test]
    fn indexed_lookup_is_bounded_and_non_increasing() {
        let doses: Vec<f64> = (0..200).map(|i| (i % 37) as f64 * 1.7).collect();
        let curve = StructureDose::new(doses, 0.1, DoseUnit::Gy)
            .cumulative_dvh(VolumePresentation::AbsoluteCm3, 0.5);
        let total = curve.volumes()[0];
        let max_dose = curve.max_dose();

        let mut previous = f64::INFINITY;
        for step in 0..=1000 {
            let dose = max_dose * step as f64 / 1000.0;
            let volume = curve.volume_at_dose_indexed(dose).unwrap();
            assert!((0.0..=total).contains(&volume));
            assert!(volume <= previous);
            previous = volume;
        }
    }

    #[test]
    fn structure_dose_statistics() {
        let dose = StructureDose::new(vec![40.0, 10.0, 30.0, 20.0], 0.5, DoseUnit::Gy);
        let stats = dose.statistics();
        assert_eq!(stats.mean, 25.0);
        assert_eq!(stats.median, 25.0);
        assert_eq!(stats.max, 40.0);
        assert_eq!(stats.volume_cm3, 2.0);
    }

    #[test]
    fn direct_lookup_counts_voxels_at_or_above_dose() {
        use VolumePresentation::{AbsoluteCm3, Relative};

        let dose = StructureDose::new(vec![10.0, 20.0, 30.0, 40.0], 0.5, DoseUnit::Gy);
        assert_eq!(dose.volume_at_dose(0.0, AbsoluteCm3), 2.0);
        assert_eq!(dose.volume_at_dose(20.0, AbsoluteCm3), 1.5);
        assert_eq!(dose.volume_at_dose(25.0, Relative), 50.0);
        assert_eq!(dose.volume_at_dose(41.0, Relative), 0.0);
    }

    #[test]
    fn cumulative_curve_starts_at_total_volume() {
        let dose = StructureDose::new(vec![10.0, 20.0, 30.0, 40.0], 0.5, DoseUnit::Gy);
        let curve = dose.cumulative_dvh(VolumePresentation::AbsoluteCm3, 10.0);
        assert_eq!(curve.volumes(), &[2.0, 2.0, 1.5, 1.0]);
        assert_eq!(curve.max_dose(), 40.0);
        assert_eq!(curve.dose_at_index(2), 20.0);
    }

    #[test]
    fn structure_without_dose_gives_invalid_lookups() {
        let dose = StructureDose::new(vec![0.0, 0.0], 0.5, DoseUnit::Gy);
        let indexed = VolumeLookup::Indexed {
            absolute: dose.cumulative_dvh(VolumePresentation::AbsoluteCm3, 0.1),
            relative: dose.cumulative_dvh(VolumePresentation::Relative, 0.1),
        };
        assert_eq!(indexed.validate(), Err(DvhError::InvalidCurve));
        assert_eq!(
            VolumeLookup::Direct(dose).validate(),
            Err(DvhError::InvalidCurve)
        );
    }

    #[test]
    fn indexed_lookup_above_maximum_reads_zero() {
        let lookup = VolumeLookup::Indexed {
            absolute: scenario_curve(),
            relative: DvhCurve::new(
                vec![100.0, 75.0, 33.3, 0.0],
                4000.0,
                VolumePresentation::Relative,
                DoseUnit::CGy,
            ),
        };
        let absolute = lookup.volume_at(5000.0, VolumePresentation::AbsoluteCm3);
        assert_eq!(absolute, Ok(0.0));
        let relative = lookup.volume_at(1500.0, VolumePresentation::Relative);
        assert_eq!(relative, Ok(75.0));
    }
}
