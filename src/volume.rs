use ndarray::{Array3, ArrayView2, s};
use serde::{Deserialize, Serialize};

use crate::config::MAX_OUTPUT_PIXELS;
use crate::enums::{Orientation, SortBy};
use crate::geometry::{PatientTransform, Vec3};
use crate::interpolator::Interpolator;

/// Records which depth planes hold regularly spaced acquired data.
///
/// Every voxel of a plane shares the plane's flag, so the mask is stored per
/// plane and expanded on query.
#[derive(Debug, Clone, PartialEq)]
pub struct FillMask {
    planes: Vec<bool>,
    plane_voxels: usize,
}

impl FillMask {
    pub fn new(planes: Vec<bool>, plane_voxels: usize) -> Self {
        Self {
            planes,
            plane_voxels,
        }
    }

    #[inline]
    pub fn is_real_plane(&self, z: usize) -> bool {
        self.planes.get(z).copied().unwrap_or(false)
    }

    #[inline]
    pub fn is_real(&self, _x: usize, _y: usize, z: usize) -> bool {
        self.is_real_plane(z)
    }

    pub fn planes(&self) -> &[bool] {
        &self.planes
    }

    pub fn real_voxels(&self) -> usize {
        self.planes.iter().filter(|&&real| real).count() * self.plane_voxels
    }

    pub fn total_voxels(&self) -> usize {
        self.planes.len() * self.plane_voxels
    }

    pub fn fill_ratio(&self) -> f64 {
        let total = self.total_voxels();
        if total == 0 {
            return 0.0;
        }
        self.real_voxels() as f64 / total as f64
    }
}

/// Inspectable summary of the resident volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// `(width, height, depth)`.
    pub dimensions: (usize, usize, usize),
    /// `(x, y, z)` in mm.
    pub spacing: (f64, f64, f64),
    pub origin: Vec3,
    pub value_range: (f32, f32),
    pub fill_ratio: f64,
    pub sorted_by: SortBy,
    /// Slices dropped for mismatched dimensions, bad buffers or duplicate positions.
    pub excluded_slices: usize,
}

/// Dense scalar volume built from one series.
///
/// Samples are physical values (rescale already applied) stored in
/// `(depth, height, width)` order.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<f32>,
    spacing: (f64, f64, f64),
    value_range: (f32, f32),
    fill_mask: FillMask,
    transform: PatientTransform,
    sorted_by: SortBy,
    excluded_slices: usize,
}

impl Volume {
    pub(crate) fn new(
        data: Array3<f32>,
        spacing: (f64, f64, f64),
        fill_mask: FillMask,
        transform: PatientTransform,
        sorted_by: SortBy,
        excluded_slices: usize,
    ) -> Self {
        let value_range = data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Self {
            data,
            spacing,
            value_range,
            fill_mask,
            transform,
            sorted_by,
            excluded_slices,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn spacing(&self) -> (f64, f64, f64) {
        self.spacing
    }

    pub fn value_range(&self) -> (f32, f32) {
        self.value_range
    }

    pub fn fill_mask(&self) -> &FillMask {
        &self.fill_mask
    }

    pub fn transform(&self) -> &PatientTransform {
        &self.transform
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    pub fn info(&self) -> VolumeInfo {
        let (depth, height, width) = self.dim();
        VolumeInfo {
            dimensions: (width, height, depth),
            spacing: self.spacing,
            origin: self.transform.origin(),
            value_range: self.value_range,
            fill_ratio: self.fill_mask.fill_ratio(),
            sorted_by: self.sorted_by,
            excluded_slices: self.excluded_slices,
        }
    }

    /// Number of native planes along the axis an orientation steps through.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        let (depth, height, width) = self.dim();
        match orientation {
            Orientation::Axial => depth,
            Orientation::Coronal => height,
            Orientation::Sagittal => width,
        }
    }

    /// Native plane at `index`, without interpolation.
    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        if index >= self.slice_count(orientation) {
            return None;
        }
        let view = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(view)
    }

    /// Default output size `(columns, rows)` for an orientation. Reformatted
    /// planes are resampled to an isotropic grid to preserve aspect ratio,
    /// unless that grid would exceed [`MAX_OUTPUT_PIXELS`].
    pub fn output_dimensions(&self, orientation: Orientation) -> (usize, usize) {
        let (depth, height, width) = self.dim();
        let (z, y, x) = Interpolator::get_isotropic_dimensions(self.spacing, self.dim());
        let (isotropic, native) = match orientation {
            // Axial doesn't need interpolation (already the acquisition plane)
            Orientation::Axial => return (width, height),
            // Looking down Y-axis: X is width, Z is height
            Orientation::Coronal => ((x, z), (width, depth)),
            // Looking down X-axis: Y is width, Z is height
            Orientation::Sagittal => ((y, z), (height, depth)),
        };
        match isotropic.0.checked_mul(isotropic.1) {
            Some(pixels) if pixels <= MAX_OUTPUT_PIXELS => isotropic,
            _ => native,
        }
    }

    /// Pixel spacing `(column, row)` in mm of a native-size output plane.
    pub fn plane_spacing(&self, orientation: Orientation) -> (f64, f64) {
        let (sx, sy, sz) = self.spacing;
        match orientation {
            Orientation::Axial => (sx, sy),
            Orientation::Coronal => (sx, sz),
            Orientation::Sagittal => (sy, sz),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::IDENTITY_ORIENTATION;

    fn volume(depth: usize, height: usize, width: usize, spacing: (f64, f64, f64)) -> Volume {
        let data = Array3::from_shape_fn((depth, height, width), |(z, y, x)| {
            (z * 100 + y * 10 + x) as f32
        });
        let transform = PatientTransform::new(
            [0.0; 3],
            &IDENTITY_ORIENTATION,
            [0.0, 0.0, 1.0],
            [spacing.0, spacing.1, spacing.2],
        );
        Volume::new(
            data,
            spacing,
            FillMask::new(vec![true; depth], height * width),
            transform,
            SortBy::StackPosition,
            0,
        )
    }

    #[test]
    fn slices_native_planes() {
        let volume = volume(3, 4, 5, (1.0, 1.0, 1.0));
        let sagittal = volume.get_slice_from_axis(2, Orientation::Sagittal).unwrap();
        assert_eq!(sagittal.dim(), (3, 4));
        assert_eq!(sagittal[[1, 3]], 132.0);
        assert!(volume.get_slice_from_axis(3, Orientation::Axial).is_none());
    }

    #[test]
    fn output_dimensions_preserve_aspect() {
        let volume = volume(5, 8, 6, (1.0, 1.0, 2.0));
        assert_eq!(volume.output_dimensions(Orientation::Axial), (6, 8));

        let anisotropic = self::volume(2, 4, 4, (0.5, 1.0, 1.0));
        assert_eq!(anisotropic.output_dimensions(Orientation::Axial), (4, 4));
        assert_eq!(volume.output_dimensions(Orientation::Coronal), (6, 10));
        assert_eq!(volume.output_dimensions(Orientation::Sagittal), (8, 10));
    }

    #[test]
    fn degenerate_spacing_keeps_native_extent() {
        let volume = volume(3, 4, 5, (1e-9, 1.0, 1.0));
        assert_eq!(volume.output_dimensions(Orientation::Sagittal), (4, 3));
        assert_eq!(volume.output_dimensions(Orientation::Coronal), (5, 3));
        assert_eq!(volume.output_dimensions(Orientation::Axial), (5, 4));
    }

    #[test]
    fn fill_mask_counts_planes() {
        let mask = FillMask::new(vec![true, false, true, true], 10);
        assert_eq!(mask.real_voxels(), 30);
        assert_eq!(mask.total_voxels(), 40);
        assert!((mask.fill_ratio() - 0.75).abs() < 1e-12);
        assert!(!mask.is_real(3, 3, 1));
        assert!(!mask.is_real_plane(9));
    }

    #[test]
    fn info_reports_width_height_depth() {
        let volume = volume(3, 4, 5, (0.5, 0.5, 2.0));
        let info = volume.info();
        assert_eq!(info.dimensions, (5, 4, 3));
        assert_eq!(info.value_range, (0.0, 234.0));
        assert_eq!(info.fill_ratio, 1.0);
    }
}
