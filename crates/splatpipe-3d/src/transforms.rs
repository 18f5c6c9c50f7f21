//! Conversions between the point cloud convention (right, forward, +Z up) and the COLMAP
//! camera convention (right, +Y down, +Z forward).
//!
//! Apply a transform exactly once, at the boundary where reference clouds meet COLMAP
//! points. Applying it twice still yields plausible coordinates, just wrong ones.

/// Map a Z-up point cloud position into the COLMAP convention.
///
/// `(x, y, z) -> (x, -z, y)`
///
/// Example:
///
/// ```
/// use splatpipe_3d::transforms::z_up_to_colmap;
///
/// assert_eq!(z_up_to_colmap(&[1.0, 2.0, 3.0]), [1.0, -3.0, 2.0]);
/// ```
#[inline]
pub fn z_up_to_colmap(point: &[f64; 3]) -> [f64; 3] {
    [point[0], -point[2], point[1]]
}

/// Inverse of [`z_up_to_colmap`].
#[inline]
pub fn colmap_to_z_up(point: &[f64; 3]) -> [f64; 3] {
    [point[0], point[2], -point[1]]
}

/// A 3x3 axis mapping applied to reference positions, stored row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTransform {
    /// Row-major matrix.
    pub matrix: [[f64; 3]; 3],
}

impl AxisTransform {
    /// The mapping performed by [`z_up_to_colmap`].
    pub const Z_UP_TO_COLMAP: AxisTransform = AxisTransform {
        matrix: [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]],
    };

    /// The identity mapping, for reference clouds already in the COLMAP convention.
    pub const IDENTITY: AxisTransform = AxisTransform {
        matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// Build from nine row-major values.
    pub fn from_row_major(values: [f64; 9]) -> Self {
        Self {
            matrix: [
                [values[0], values[1], values[2]],
                [values[3], values[4], values[5]],
                [values[6], values[7], values[8]],
            ],
        }
    }

    /// Transform one point.
    #[inline]
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        self.matrix
            .map(|row| row[0] * point[0] + row[1] * point[1] + row[2] * point[2])
    }

    /// Transform a slice of points.
    pub fn apply_all(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        points.iter().map(|p| self.apply(p)).collect()
    }
}

impl Default for AxisTransform {
    fn default() -> Self {
        Self::Z_UP_TO_COLMAP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_z_up_to_colmap() {
        assert_eq!(z_up_to_colmap(&[1.0, 2.0, 3.0]), [1.0, -3.0, 2.0]);
        // up in the point cloud is -Y (up) in COLMAP
        assert_eq!(z_up_to_colmap(&[0.0, 0.0, 1.0]), [0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_inverse() {
        let p = [0.25, -7.0, 3.5];
        assert_eq!(colmap_to_z_up(&z_up_to_colmap(&p)), p);
        assert_eq!(z_up_to_colmap(&colmap_to_z_up(&p)), p);
        // applying the forward mapping twice is not the identity
        assert_ne!(z_up_to_colmap(&z_up_to_colmap(&p)), p);
    }

    #[test]
    fn test_axis_transform_matches_function() {
        let transform = AxisTransform::default();
        for p in [[1.0, 2.0, 3.0], [-0.5, 0.0, 9.0], [0.0, -4.0, -1.0]] {
            assert_eq!(transform.apply(&p), z_up_to_colmap(&p));
        }
        assert_eq!(
            AxisTransform::from_row_major([1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0]),
            AxisTransform::Z_UP_TO_COLMAP
        );
        assert_eq!(AxisTransform::IDENTITY.apply(&[1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }
}
