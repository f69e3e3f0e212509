//! Patient-space geometry of a volume grid.
//!
//! The volume is stored as (depth, height, width) but addressed here in
//! voxel coordinates `[x, y, z]`. Patient coordinates follow the usual
//! convention: `origin + x * sx * row_dir + y * sy * col_dir + z * sz * normal`.

use serde::{Deserialize, Serialize};

pub type Vec3 = [f64; 3];

/// Row and column direction cosines used when a slice carries none.
pub const IDENTITY_ORIENTATION: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn normalize(v: Vec3) -> Option<Vec3> {
    let len = dot(v, v).sqrt();
    if len > f64::EPSILON && len.is_finite() {
        Some([v[0] / len, v[1] / len, v[2] / len])
    } else {
        None
    }
}

/// Slice normal from row/column direction cosines.
pub fn stack_normal(orientation: &[f64; 6]) -> Option<Vec3> {
    let row = [orientation[0], orientation[1], orientation[2]];
    let col = [orientation[3], orientation[4], orientation[5]];
    normalize(cross(row, col))
}

/// Unit vector of the coordinate axis along which `positions` vary most.
pub fn dominant_axis(positions: &[Vec3]) -> Vec3 {
    let mut best = (2, 0.0);
    for axis in 0..3 {
        let (min, max) = positions
            .iter()
            .map(|p| p[axis])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;
        if range > best.1 {
            best = (axis, range);
        }
    }
    let mut axis = [0.0; 3];
    axis[best.0] = 1.0;
    axis
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn invert(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = determinant(m);
    if det.abs() < 1e-10 {
        return None;
    }
    let inv_det = 1.0 / det;
    let mut inv = [[0.0; 3]; 3];
    inv[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
    inv[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
    inv[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
    inv[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
    inv[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
    inv[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
    inv[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
    inv[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
    inv[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;
    Some(inv)
}

/// Affine map between voxel indices and patient coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientTransform {
    /// Columns are the scaled x, y and z axes of the grid.
    linear: [[f64; 3]; 3],
    origin: Vec3,
    inverse: Option<[[f64; 3]; 3]>,
}

impl PatientTransform {
    pub fn new(origin: Vec3, orientation: &[f64; 6], normal: Vec3, spacing: Vec3) -> Self {
        let row = [orientation[0], orientation[1], orientation[2]];
        let col = [orientation[3], orientation[4], orientation[5]];
        let mut linear = [[0.0; 3]; 3];
        for i in 0..3 {
            linear[i][0] = row[i] * spacing[0];
            linear[i][1] = col[i] * spacing[1];
            linear[i][2] = normal[i] * spacing[2];
        }
        Self {
            inverse: invert(&linear),
            linear,
            origin,
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn is_invertible(&self) -> bool {
        self.inverse.is_some()
    }

    pub fn voxel_to_patient(&self, voxel: Vec3) -> Vec3 {
        let m = &self.linear;
        [
            self.origin[0] + m[0][0] * voxel[0] + m[0][1] * voxel[1] + m[0][2] * voxel[2],
            self.origin[1] + m[1][0] * voxel[0] + m[1][1] * voxel[1] + m[1][2] * voxel[2],
            self.origin[2] + m[2][0] * voxel[0] + m[2][1] * voxel[1] + m[2][2] * voxel[2],
        ]
    }

    /// `None` when the grid axes are degenerate.
    pub fn patient_to_voxel(&self, point: Vec3) -> Option<Vec3> {
        let inv = self.inverse.as_ref()?;
        let d = sub(point, self.origin);
        Some([
            inv[0][0] * d[0] + inv[0][1] * d[1] + inv[0][2] * d[2],
            inv[1][0] * d[0] + inv[1][1] * d[1] + inv[1][2] * d[2],
            inv[2][0] * d[0] + inv[2][1] * d[1] + inv[2][2] * d[2],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axial_orientation_has_z_normal() {
        let normal = stack_normal(&IDENTITY_ORIENTATION).unwrap();
        assert_eq!(normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn degenerate_orientation_has_no_normal() {
        assert!(stack_normal(&[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn dominant_axis_follows_largest_range() {
        let positions = [[0.0, 5.0, 1.0], [0.5, -20.0, 1.0], [0.2, 3.0, 1.0]];
        assert_eq!(dominant_axis(&positions), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn transform_round_trips() {
        let orientation = [0.0, 1.0, 0.0, 0.0, 0.0, -1.0];
        let normal = stack_normal(&orientation).unwrap();
        let transform =
            PatientTransform::new([-120.0, 30.0, 80.5], &orientation, normal, [0.7, 0.7, 2.5]);
        let voxel = [12.0, 200.0, 33.0];
        let back = transform
            .patient_to_voxel(transform.voxel_to_patient(voxel))
            .unwrap();
        for i in 0..3 {
            assert!((back[i] - voxel[i]).abs() < 1e-9);
        }
    }
}
