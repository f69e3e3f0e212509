use ndarray::Array3;

use crate::enums::Interpolation;
use crate::volume::FillMask;

/// Free parameter of the Keys cubic convolution kernel.
const CUBIC_A: f32 = -0.5;

#[derive(Debug, Clone, Copy, Default)]
struct Tap {
    index: usize,
    weight: f32,
    in_range: bool,
}

/// Non-zero-weight taps along one axis.
#[derive(Debug, Clone, Copy, Default)]
struct AxisTaps {
    taps: [Tap; 4],
    len: usize,
}

impl AxisTaps {
    fn push(&mut self, index: isize, weight: f32, axis_len: usize) {
        if weight == 0.0 {
            return;
        }
        let last = axis_len as isize - 1;
        self.taps[self.len] = Tap {
            index: index.clamp(0, last) as usize,
            weight,
            in_range: (0..=last).contains(&index),
        };
        self.len += 1;
    }

    fn as_slice(&self) -> &[Tap] {
        &self.taps[..self.len]
    }

    fn in_range(&self) -> usize {
        self.as_slice().iter().filter(|t| t.in_range).count()
    }
}

/// Interpolated value plus how much of its neighbourhood was real data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Sample {
    pub value: f32,
    pub taps: u32,
    pub real_taps: u32,
}

pub(crate) struct Interpolator;

impl Interpolator {
    pub(crate) fn get_isotropic_dimensions(
        spacing: (f64, f64, f64),
        original_dim: (usize, usize, usize),
    ) -> (usize, usize, usize) {
        let (x_spacing, y_spacing, z_spacing) = spacing;
        let min_spacing = x_spacing.min(y_spacing).min(z_spacing);
        if !(min_spacing > 0.0) || !min_spacing.is_finite() {
            return original_dim;
        }
        let inv_min_spacing = 1.0 / min_spacing; // Multiply instead of divide

        // original_dim is (depth, height, width) corresponding to (z, y, x)
        let scale = |n: usize, s: f64| ((n as f64 * s * inv_min_spacing).round() as usize).max(1);
        let new_x = scale(original_dim.2, x_spacing);
        let new_y = scale(original_dim.1, y_spacing);
        let new_z = scale(original_dim.0, z_spacing);

        (new_z, new_y, new_x)
    }

    /// Keys cubic convolution weight for a tap at distance `t`.
    #[inline]
    pub(crate) fn cubic_weight(t: f32) -> f32 {
        let t = t.abs();
        if t <= 1.0 {
            ((CUBIC_A + 2.0) * t - (CUBIC_A + 3.0)) * t * t + 1.0
        } else if t < 2.0 {
            ((CUBIC_A * t - 5.0 * CUBIC_A) * t + 8.0 * CUBIC_A) * t - 4.0 * CUBIC_A
        } else {
            0.0
        }
    }

    fn axis_taps(method: Interpolation, coord: f32, axis_len: usize) -> AxisTaps {
        let mut taps = AxisTaps::default();
        match method {
            Interpolation::Nearest => {
                taps.push(coord.round() as isize, 1.0, axis_len);
            }
            Interpolation::Trilinear => {
                let i0 = coord.floor();
                let frac = coord - i0;
                let i0 = i0 as isize;
                taps.push(i0, 1.0 - frac, axis_len);
                taps.push(i0 + 1, frac, axis_len);
            }
            Interpolation::Cubic => {
                let i0 = coord.floor() as isize;
                for offset in -1..=2 {
                    let i = i0 + offset;
                    taps.push(i, Self::cubic_weight(coord - i as f32), axis_len);
                }
            }
        }
        taps
    }

    /// Sample `data` at voxel coordinates `(x, y, z)`.
    ///
    /// Coordinates are clamped into the volume first; kernel taps that still
    /// fall outside are clamped to the edge voxel and counted as non-real.
    pub(crate) fn sample(
        data: &Array3<f32>,
        mask: &FillMask,
        method: Interpolation,
        x: f32,
        y: f32,
        z: f32,
    ) -> Sample {
        let (depth, height, width) = data.dim();
        let clamp = |c: f32, len: usize| {
            if c.is_nan() {
                0.0
            } else {
                c.clamp(0.0, (len - 1) as f32)
            }
        };
        let xs = Self::axis_taps(method, clamp(x, width), width);
        let ys = Self::axis_taps(method, clamp(y, height), height);
        let zs = Self::axis_taps(method, clamp(z, depth), depth);

        let mut value = 0.0f32;
        for tz in zs.as_slice() {
            let mut plane = 0.0f32;
            for ty in ys.as_slice() {
                let mut row = 0.0f32;
                for tx in xs.as_slice() {
                    row = data[[tz.index, ty.index, tx.index]].mul_add(tx.weight, row);
                }
                plane = row.mul_add(ty.weight, plane);
            }
            value = plane.mul_add(tz.weight, value);
        }

        let real_z = zs
            .as_slice()
            .iter()
            .filter(|t| t.in_range && mask.is_real_plane(t.index))
            .count();
        Sample {
            value,
            taps: (xs.len * ys.len * zs.len) as u32,
            real_taps: (xs.in_range() * ys.in_range() * real_z) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(depth: usize, height: usize, width: usize) -> Array3<f32> {
        Array3::from_shape_fn((depth, height, width), |(z, y, x)| {
            (z * 100 + y * 10 + x) as f32
        })
    }

    fn full_mask(depth: usize) -> FillMask {
        FillMask::new(vec![true; depth], 1)
    }

    #[test]
    fn isotropic_dimensions_scale_coarse_axis() {
        let dims = Interpolator::get_isotropic_dimensions((0.5, 0.5, 2.5), (10, 64, 32));
        assert_eq!(dims, (50, 64, 32));
    }

    #[test]
    fn cubic_kernel_interpolates_grid_points() {
        assert_eq!(Interpolator::cubic_weight(0.0), 1.0);
        assert_eq!(Interpolator::cubic_weight(1.0), 0.0);
        assert_eq!(Interpolator::cubic_weight(-2.0), 0.0);
        let sum: f32 = [-1.25f32, -0.25, 0.75, 1.75]
            .iter()
            .map(|&t| Interpolator::cubic_weight(t))
            .sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nearest_rounds_to_closest_voxel() {
        let data = ramp(3, 3, 3);
        let mask = full_mask(3);
        let sample = Interpolator::sample(&data, &mask, Interpolation::Nearest, 1.4, 0.6, 1.5);
        assert_eq!(sample.value, 211.0);
        assert_eq!((sample.taps, sample.real_taps), (1, 1));
    }

    #[test]
    fn trilinear_midpoint_is_mean_of_neighbours() {
        let mut data = Array3::from_elem((2, 2, 2), 5.0f32);
        data[[0, 0, 0]] = 10.0;
        data[[0, 0, 1]] = 30.0;
        let mask = full_mask(2);
        let sample = Interpolator::sample(&data, &mask, Interpolation::Trilinear, 0.5, 0.0, 0.0);
        assert!((sample.value - 20.0).abs() < 1e-5);
        assert_eq!(sample.taps, 2);
    }

    #[test]
    fn trilinear_reproduces_linear_field() {
        let data = ramp(4, 4, 4);
        let mask = full_mask(4);
        let sample = Interpolator::sample(&data, &mask, Interpolation::Trilinear, 1.25, 2.5, 0.75);
        assert!((sample.value - (75.0 + 25.0 + 1.25)).abs() < 1e-3);
        assert_eq!(sample.taps, 8);
    }

    #[test]
    fn cubic_is_exact_on_grid_and_linear_fields() {
        let data = ramp(6, 6, 6);
        let mask = full_mask(6);
        let on_grid = Interpolator::sample(&data, &mask, Interpolation::Cubic, 2.0, 3.0, 1.0);
        assert_eq!(on_grid.value, 132.0);
        assert_eq!(on_grid.taps, 1);

        let off_grid = Interpolator::sample(&data, &mask, Interpolation::Cubic, 2.5, 2.5, 2.5);
        assert!((off_grid.value - 277.5).abs() < 1e-2);
        assert_eq!(off_grid.taps, 64);
        assert_eq!(off_grid.real_taps, 64);
    }

    #[test]
    fn out_of_range_coordinates_are_clamped() {
        let data = ramp(3, 3, 3);
        let mask = full_mask(3);
        let inside = Interpolator::sample(&data, &mask, Interpolation::Trilinear, 2.0, 2.0, 2.0);
        let outside = Interpolator::sample(&data, &mask, Interpolation::Trilinear, 9.0, 5.0, -3.0);
        let corner = Interpolator::sample(&data, &mask, Interpolation::Trilinear, 2.0, 2.0, 0.0);
        assert_eq!(outside.value, corner.value);
        assert_eq!(inside.value, 222.0);
    }

    #[test]
    fn cubic_taps_past_the_edge_lower_real_count() {
        let data = ramp(4, 4, 4);
        let mask = full_mask(4);
        let sample = Interpolator::sample(&data, &mask, Interpolation::Cubic, 0.5, 1.0, 1.0);
        assert_eq!(sample.taps, 4);
        assert_eq!(sample.real_taps, 3);
    }

    #[test]
    fn gap_planes_do_not_count_as_real() {
        let data = ramp(3, 2, 2);
        let mask = FillMask::new(vec![true, false, true], 4);
        let sample = Interpolator::sample(&data, &mask, Interpolation::Trilinear, 0.0, 0.0, 0.5);
        assert_eq!(sample.taps, 2);
        assert_eq!(sample.real_taps, 1);
    }
}
