use ndarray::ArrayView3;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Clamp a continuous voxel coordinate onto `[0, len - 1]`.
    ///
    /// Coordinates up to half a voxel outside the grid belong to the edge
    /// voxel; anything further out is outside the grid.
    #[inline]
    pub(crate) fn clamp_to_grid(coordinate: f64, len: usize) -> Option<f64> {
        if len == 0 {
            return None;
        }
        let last = (len - 1) as f64;
        if coordinate < -0.5 || coordinate > last + 0.5 {
            return None;
        }
        Some(coordinate.clamp(0.0, last))
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(corners: [f64; 4], dy: f64, dx: f64) -> f64 {
        let [v00, v01, v10, v11] = corners;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Trilinear interpolation in a (depth, height, width) volume at
    /// already clamped voxel coordinates.
    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &ArrayView3<f32>, z: f64, y: f64, x: f64) -> f64 {
        let (depth, height, width) = volume.dim();

        let z0 = z.floor() as usize;
        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let z1 = (z0 + 1).min(depth - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dz = z - z0 as f64;
        let dy = y - y0 as f64;
        let dx = x - x0 as f64;

        let at = |k: usize, j: usize, i: usize| f64::from(volume[[k, j, i]]);

        let plane = |k: usize| [at(k, y0, x0), at(k, y0, x1), at(k, y1, x0), at(k, y1, x1)];

        let front = Self::bilinear_interpolate(plane(z0), dy, dx);
        let back = Self::bilinear_interpolate(plane(z1), dy, dx);

        front.mul_add(1.0 - dz, back * dz)
    }
}
