use nalgebra::{Point3, Vector3};

/// `count` evenly spaced points from `start` to `end`, both included.
pub fn sample_points(
    start: Point3<f64>,
    end: Point3<f64>,
    count: usize,
) -> impl Iterator<Item = Point3<f64>> {
    let step = (end - start) / count.saturating_sub(1).max(1) as f64;
    (0..count).map(move |i| start + step * i as f64)
}

/// Whether two directions or offsets agree within `tolerance` mm.
pub fn within_tolerance(a: &Vector3<f64>, b: &Vector3<f64>, tolerance: f64) -> bool {
    (a - b).norm() <= tolerance
}
