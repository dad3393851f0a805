//! Line sampling of dose and structure membership.
//!
//! The scanner only talks to these two traits, so any dose source or mask
//! can be swept as long as both fill their buffers point-for-point along
//! the same segment.

use nalgebra::Point3;

use crate::dose_grid::{DoseGrid, GridGeometry};
use crate::geometry::sample_points;
use crate::structure::Structure;

pub trait DoseSampler {
    fn geometry(&self) -> &GridGeometry;

    /// Fill `profile` with doses at `profile.len()` evenly spaced points
    /// from `start` to `end`. Points without dose, such as those outside
    /// the grid, are `None`.
    fn dose_profile(&self, start: Point3<f64>, end: Point3<f64>, profile: &mut [Option<f64>]);
}

pub trait StructureSampler {
    /// Fill `profile` with the membership of `profile.len()` evenly spaced
    /// points from `start` to `end`.
    fn segment_profile(&self, start: Point3<f64>, end: Point3<f64>, profile: &mut [bool]);
}

impl DoseSampler for DoseGrid {
    fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    fn dose_profile(&self, start: Point3<f64>, end: Point3<f64>, profile: &mut [Option<f64>]) {
        let count = profile.len();
        for (value, point) in profile.iter_mut().zip(sample_points(start, end, count)) {
            *value = self.dose_at(&point);
        }
    }
}

impl StructureSampler for Structure {
    fn segment_profile(&self, start: Point3<f64>, end: Point3<f64>, profile: &mut [bool]) {
        let count = profile.len();
        for (inside, point) in profile.iter_mut().zip(sample_points(start, end, count)) {
            *inside = self.contains(&point);
        }
    }
}
