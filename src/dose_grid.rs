use nalgebra::{Point3, Vector3};
use ndarray::{Array3, Zip};

use crate::enums::DoseUnit;
use crate::geometry::within_tolerance;
use crate::interpolator::Interpolator;

/// Placement of a rectilinear grid in patient coordinates.
///
/// `origin` is the centre of the first voxel. Resolutions are in mm and
/// sizes are voxel counts, both ordered (x, y, z).
#[derive(Clone, Debug, PartialEq)]
pub struct GridGeometry {
    pub origin: Point3<f64>,
    pub x_direction: Vector3<f64>,
    pub y_direction: Vector3<f64>,
    pub z_direction: Vector3<f64>,
    pub resolution: (f64, f64, f64),
    pub size: (usize, usize, usize),
}

impl GridGeometry {
    /// Axis-aligned geometry with unit directions.
    pub fn axial(
        origin: Point3<f64>,
        resolution: (f64, f64, f64),
        size: (usize, usize, usize),
    ) -> Self {
        Self {
            origin,
            x_direction: Vector3::x(),
            y_direction: Vector3::y(),
            z_direction: Vector3::z(),
            resolution,
            size,
        }
    }

    /// Physical length of each axis, `size * resolution`.
    pub fn extent(&self) -> (f64, f64, f64) {
        (
            self.size.0 as f64 * self.resolution.0,
            self.size.1 as f64 * self.resolution.1,
            self.size.2 as f64 * self.resolution.2,
        )
    }

    pub fn voxel_volume_cm3(&self) -> f64 {
        self.resolution.0 * self.resolution.1 * self.resolution.2 / 1000.0
    }

    pub fn voxel_centre(&self, z: usize, y: usize, x: usize) -> Point3<f64> {
        self.origin
            + self.x_direction * (x as f64 * self.resolution.0)
            + self.y_direction * (y as f64 * self.resolution.1)
            + self.z_direction * (z as f64 * self.resolution.2)
    }

    /// Continuous (z, y, x) voxel coordinates of a patient-space point.
    pub fn voxel_coordinates(&self, point: &Point3<f64>) -> (f64, f64, f64) {
        let offset = *point - self.origin;
        (
            offset.dot(&self.z_direction) / self.resolution.2,
            offset.dot(&self.y_direction) / self.resolution.1,
            offset.dot(&self.x_direction) / self.resolution.0,
        )
    }

    pub fn approx_eq(&self, other: &GridGeometry, tolerance: f64) -> bool {
        self.size == other.size
            && within_tolerance(&self.origin.coords, &other.origin.coords, tolerance)
            && within_tolerance(&self.x_direction, &other.x_direction, tolerance)
            && within_tolerance(&self.y_direction, &other.y_direction, tolerance)
            && within_tolerance(&self.z_direction, &other.z_direction, tolerance)
            && (self.resolution.0 - other.resolution.0).abs() <= tolerance
            && (self.resolution.1 - other.resolution.1).abs() <= tolerance
            && (self.resolution.2 - other.resolution.2).abs() <= tolerance
    }
}

/// A computed dose distribution.
#[derive(Clone, Debug)]
pub struct DoseGrid {
    /// Dose values indexed (z, y, x).
    pub data: Array3<f32>,
    pub geometry: GridGeometry,
    pub unit: DoseUnit,
}

impl DoseGrid {
    /// The voxel counts of `geometry` are taken from the shape of `data`.
    pub fn new(data: Array3<f32>, mut geometry: GridGeometry, unit: DoseUnit) -> Self {
        let (depth, height, width) = data.dim();
        geometry.size = (width, height, depth);
        Self {
            data,
            geometry,
            unit,
        }
    }

    /// Get the dimensions of the grid (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn max_dose(&self) -> f64 {
        self.data.iter().copied().fold(0.0_f32, f32::max).into()
    }

    /// Dose at a patient-space point, trilinearly interpolated.
    ///
    /// Returns `None` when the point lies outside the grid.
    pub fn dose_at(&self, point: &Point3<f64>) -> Option<f64> {
        let (depth, height, width) = self.dim();
        let (z, y, x) = self.geometry.voxel_coordinates(point);
        let z = Interpolator::clamp_to_grid(z, depth)?;
        let y = Interpolator::clamp_to_grid(y, height)?;
        let x = Interpolator::clamp_to_grid(x, width)?;
        Some(Interpolator::trilinear_interpolate(&self.data.view(), z, y, x))
    }

    pub fn converted_to(mut self, unit: DoseUnit) -> Self {
        let factor = self.unit.factor_to(unit) as f32;
        if factor != 1.0 {
            self.data.mapv_inplace(|dose| dose * factor);
        }
        self.unit = unit;
        self
    }

    /// Voxel-wise sum of grids sharing one geometry and unit.
    ///
    /// Returns `None` for an empty slice or mismatching grids.
    pub fn sum(grids: &[DoseGrid]) -> Option<DoseGrid> {
        let (first, rest) = grids.split_first()?;
        let mut total = first.clone();
        for grid in rest {
            if grid.unit != total.unit || !grid.geometry.approx_eq(&total.geometry, 1e-3) {
                return None;
            }
            Zip::from(&mut total.data)
                .and(&grid.data)
                .for_each(|sum, &dose| *sum += dose);
        }
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_grid() -> DoseGrid {
        // dose grows along x by 10 per voxel
        let data = Array3::from_shape_fn((2, 3, 4), |(_, _, i)| (i * 10) as f32);
        let geometry = GridGeometry::axial(Point3::origin(), (2.0, 2.0, 3.0), (0, 0, 0));
        DoseGrid::new(data, geometry, DoseUnit::Gy)
    }

    #[test]
    fn new_takes_size_from_data() {
        let grid = ramp_grid();
        assert_eq!(grid.geometry.size, (4, 3, 2));
        assert_eq!(grid.geometry.extent(), (8.0, 6.0, 6.0));
    }

    #[test]
    fn dose_at_interpolates_between_voxel_centres() {
        let grid = ramp_grid();
        assert_eq!(grid.dose_at(&Point3::new(2.0, 0.0, 0.0)), Some(10.0));
        let between = grid.dose_at(&Point3::new(3.0, 2.0, 1.5)).unwrap();
        assert!((between - 15.0).abs() < 1e-9);
    }

    #[test]
    fn dose_at_outside_grid_is_none() {
        let grid = ramp_grid();
        assert_eq!(grid.dose_at(&Point3::new(-5.0, 0.0, 0.0)), None);
        assert_eq!(grid.dose_at(&Point3::new(8.0, 0.0, 0.0)), None);
    }

    #[test]
    fn conversion_scales_values() {
        let grid = ramp_grid().converted_to(DoseUnit::CGy);
        assert_eq!(grid.unit, DoseUnit::CGy);
        assert_eq!(grid.max_dose(), 3000.0);
    }

    #[test]
    fn sum_adds_matching_grids_and_rejects_others() {
        let grid = ramp_grid();
        let total = DoseGrid::sum(&[grid.clone(), grid.clone()]).unwrap();
        assert_eq!(total.max_dose(), 60.0);

        let mut shifted = grid.clone();
        shifted.geometry.origin = Point3::new(1.0, 0.0, 0.0);
        assert!(DoseGrid::sum(&[grid, shifted]).is_none());
        assert!(DoseGrid::sum(&[]).is_none());
    }
}
