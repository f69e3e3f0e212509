use std::cmp::Ordering;
use std::collections::HashMap;

use ndarray::{Array3, Axis, s};
use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::config::{DUPLICATE_POSITION_EPSILON, SPACING_TOLERANCE};
use crate::enums::SortBy;
use crate::error::BuildError;
use crate::geometry::{self, IDENTITY_ORIENTATION, PatientTransform, Vec3};
use crate::progress::{BuildProgress, BuildStage, ProgressEvent};
use crate::slice::Slice;
use crate::volume::{FillMask, Volume};

/// Planes copied between two progress reports.
const PROGRESS_CHUNK: usize = 16;

/// A slice that passed validation, with its place in the stack.
struct Ordered<'a> {
    slice: &'a Slice,
    /// Distance along the stack normal; `None` when ordering fell back.
    distance: Option<f64>,
}

/// Result of ordering the validated slices.
struct Stack<'a> {
    planes: Vec<Ordered<'a>>,
    normal: Vec3,
    sorted_by: SortBy,
    duplicates: usize,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Build a volume from decoded slices
    ///
    /// # Arguments
    ///
    /// * `slices` - Decoded slices of one series, in any order
    /// * `max_volume_bytes` - Optional upper bound for the voxel buffer
    /// * `pool` - Worker pool used for the per-plane copies
    /// * `progress` - Receives checkpoints while the build runs
    ///
    /// # Errors
    ///
    /// Returns an input error if fewer than two slices survive validation and a
    /// resource error if the voxel buffer cannot be allocated
    pub fn load_from_slices(
        slices: &[Slice],
        max_volume_bytes: Option<usize>,
        pool: &ThreadPool,
        progress: &mut dyn BuildProgress,
    ) -> Result<Volume, BuildError> {
        let started = Instant::now();

        let consistent: Vec<(usize, &Slice)> = slices
            .iter()
            .enumerate()
            .filter(|(index, slice)| {
                let ok = slice.is_consistent();
                if !ok {
                    warn!(
                        index,
                        width = slice.width,
                        height = slice.height,
                        samples = slice.pixels.len(),
                        "Dropping slice whose buffer does not match its dimensions"
                    );
                }
                ok
            })
            .collect();

        if consistent.len() < 2 {
            return Err(BuildError::NotEnoughSlices {
                usable: consistent.len(),
            });
        }

        let (height, width) = Self::majority_dimensions(&consistent)
            .ok_or(BuildError::InconsistentDimensions {
                slices: consistent.len(),
            })?;

        let candidates: Vec<(usize, &Slice)> = consistent
            .into_iter()
            .filter(|(index, slice)| {
                let ok = slice.dim() == (height, width);
                if !ok {
                    warn!(
                        index,
                        width = slice.width,
                        height = slice.height,
                        expected_width = width,
                        expected_height = height,
                        "Dropping slice with mismatched dimensions"
                    );
                }
                ok
            })
            .collect();

        let stack = Self::order_slices(candidates);
        let depth = stack.planes.len();
        if depth < 2 {
            return Err(BuildError::NotEnoughSlices { usable: depth });
        }
        let excluded_slices = slices.len() - depth;

        let z_spacing = Self::stack_spacing(&stack.planes);
        let (x_spacing, y_spacing) = Self::pixel_spacing(&stack.planes);
        let spacing = (x_spacing, y_spacing, z_spacing);
        let fill_mask = Self::fill_mask(&stack.planes, z_spacing, height * width);

        debug!(
            width,
            height,
            depth,
            ?spacing,
            sorted_by = ?stack.sorted_by,
            duplicates = stack.duplicates,
            excluded_slices,
            "Validated slices"
        );
        progress.report(ProgressEvent {
            stage: BuildStage::Validated,
            completed: 0,
            total: depth,
        });

        let mut data = Self::allocate(width, height, depth, max_volume_bytes)?;
        progress.report(ProgressEvent {
            stage: BuildStage::Allocated,
            completed: 0,
            total: depth,
        });

        Self::copy_planes(&mut data, &stack.planes, pool, progress);

        let origin = stack.planes[0]
            .slice
            .geometry
            .position
            .unwrap_or([0.0; 3]);
        let orientation = stack
            .planes
            .iter()
            .find_map(|p| p.slice.geometry.orientation)
            .unwrap_or(IDENTITY_ORIENTATION);
        let transform = PatientTransform::new(
            origin,
            &orientation,
            stack.normal,
            [x_spacing, y_spacing, z_spacing],
        );

        let volume = Volume::new(
            data,
            spacing,
            fill_mask,
            transform,
            stack.sorted_by,
            excluded_slices,
        );
        progress.report(ProgressEvent {
            stage: BuildStage::Finished,
            completed: depth,
            total: depth,
        });
        info!(
            width,
            height,
            depth,
            fill_ratio = volume.fill_mask().fill_ratio(),
            bytes = volume.size_in_bytes(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built volume"
        );
        Ok(volume)
    }

    /// Most common `(height, width)` among the slices, ties broken by first
    /// appearance. `None` when no two slices agree.
    fn majority_dimensions(slices: &[(usize, &Slice)]) -> Option<(usize, usize)> {
        let mut counts: HashMap<(usize, usize), (usize, usize)> = HashMap::new();
        for (order, (_, slice)) in slices.iter().enumerate() {
            counts.entry(slice.dim()).or_insert((0, order)).0 += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
            .filter(|(_, (count, _))| *count >= 2)
            .map(|(dim, _)| dim)
    }

    fn order_slices(candidates: Vec<(usize, &Slice)>) -> Stack<'_> {
        let positions: Option<Vec<Vec3>> = candidates
            .iter()
            .map(|(_, slice)| slice.geometry.position)
            .collect();
        let normal = candidates
            .iter()
            .find_map(|(_, slice)| slice.geometry.orientation)
            .and_then(|orientation| geometry::stack_normal(&orientation));

        let Some(positions) = positions else {
            warn!(
                slices = candidates.len(),
                "Slice positions missing, falling back to ordinal order and unit spacing"
            );
            return Self::ordinal_stack(candidates, normal.unwrap_or([0.0, 0.0, 1.0]));
        };

        let normal = normal.unwrap_or_else(|| geometry::dominant_axis(&positions));
        match Self::positional_stack(&candidates, &positions, normal) {
            Some(stack) => stack,
            None => {
                warn!(
                    slices = candidates.len(),
                    ?normal,
                    "Slice positions do not separate along the stack normal, \
                     falling back to ordinal order and unit spacing"
                );
                Self::ordinal_stack(candidates, normal)
            }
        }
    }

    /// Order by projection onto `normal`, dropping duplicate positions.
    ///
    /// `None` when the projections are degenerate: fewer than two distinct
    /// planes, or at least half of the slices collapsing onto others.
    fn positional_stack<'a>(
        candidates: &[(usize, &'a Slice)],
        positions: &[Vec3],
        normal: Vec3,
    ) -> Option<Stack<'a>> {
        let mut keyed: Vec<(f64, usize, &Slice)> = candidates
            .iter()
            .zip(positions)
            .map(|((index, slice), &position)| (geometry::dot(position, normal), *index, *slice))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut planes: Vec<Ordered> = Vec::with_capacity(keyed.len());
        let mut duplicates = 0;
        for (distance, index, slice) in keyed {
            if let Some(last) = planes.last().and_then(|p| p.distance) {
                if (distance - last).abs() < DUPLICATE_POSITION_EPSILON {
                    debug!(index, distance, "Dropping slice with duplicate position");
                    duplicates += 1;
                    continue;
                }
            }
            planes.push(Ordered {
                slice,
                distance: Some(distance),
            });
        }

        if planes.len() < 2 || duplicates * 2 >= candidates.len() {
            return None;
        }
        Some(Stack {
            planes,
            normal,
            sorted_by: SortBy::StackPosition,
            duplicates,
        })
    }

    /// Order by instance number when any slice has one, else keep input order.
    fn ordinal_stack(mut candidates: Vec<(usize, &Slice)>, normal: Vec3) -> Stack<'_> {
        let sorted_by = if candidates.iter().any(|(_, s)| s.instance_number.is_some()) {
            candidates.sort_by(|a, b| {
                let by_number = match (a.1.instance_number, b.1.instance_number) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                by_number.then(a.0.cmp(&b.0))
            });
            SortBy::InstanceNumber
        } else {
            SortBy::InputOrder
        };
        debug!(?sorted_by, "Ordered slices without positions");

        Stack {
            planes: candidates
                .into_iter()
                .map(|(_, slice)| Ordered {
                    slice,
                    distance: None,
                })
                .collect(),
            normal,
            sorted_by,
            duplicates: 0,
        }
    }

    fn consecutive_deltas(planes: &[Ordered]) -> Option<Vec<f64>> {
        planes
            .windows(2)
            .map(|pair| Some(pair[1].distance? - pair[0].distance?))
            .collect()
    }

    /// Median distance between consecutive planes, or 1.0 without positions.
    fn stack_spacing(planes: &[Ordered]) -> f64 {
        let Some(mut deltas) = Self::consecutive_deltas(planes) else {
            return 1.0;
        };
        if deltas.is_empty() {
            return 1.0;
        }
        deltas.sort_by(f64::total_cmp);
        let mid = deltas.len() / 2;
        let median = if deltas.len() % 2 == 0 {
            (deltas[mid - 1] + deltas[mid]) / 2.0
        } else {
            deltas[mid]
        };
        if median > 0.0 && median.is_finite() {
            median
        } else {
            1.0
        }
    }

    fn pixel_spacing(planes: &[Ordered]) -> (f64, f64) {
        planes
            .iter()
            .filter_map(|p| p.slice.geometry.pixel_spacing)
            .find(|[x, y]| *x > 0.0 && *y > 0.0 && x.is_finite() && y.is_finite())
            .map(|[x, y]| (x, y))
            .unwrap_or((1.0, 1.0))
    }

    /// A plane is real when it has a position and both neighbouring gaps are
    /// within tolerance of the stack spacing.
    fn fill_mask(planes: &[Ordered], spacing: f64, plane_voxels: usize) -> FillMask {
        let low = spacing * (1.0 - SPACING_TOLERANCE);
        let high = spacing * (1.0 + SPACING_TOLERANCE);
        let regular = |a: &Ordered, b: &Ordered| match (a.distance, b.distance) {
            (Some(a), Some(b)) => {
                let delta = b - a;
                delta >= low && delta <= high
            }
            _ => true,
        };

        let flags: Vec<bool> = (0..planes.len())
            .map(|i| {
                let plane = &planes[i];
                let has_position = plane.slice.geometry.position.is_some();
                let prev_ok = i == 0 || regular(&planes[i - 1], plane);
                let next_ok = i + 1 == planes.len() || regular(plane, &planes[i + 1]);
                has_position && prev_ok && next_ok
            })
            .collect();

        let gaps = flags.iter().filter(|&&real| !real).count();
        if gaps > 0 {
            warn!(
                gaps,
                planes = planes.len(),
                spacing,
                "Volume has irregular or unpositioned planes"
            );
        }
        FillMask::new(flags, plane_voxels)
    }

    fn allocate(
        width: usize,
        height: usize,
        depth: usize,
        max_volume_bytes: Option<usize>,
    ) -> Result<Array3<f32>, BuildError> {
        let too_large = BuildError::VolumeTooLarge {
            width,
            height,
            depth,
        };
        let Some(voxels) = width
            .checked_mul(height)
            .and_then(|plane| plane.checked_mul(depth))
        else {
            return Err(too_large);
        };
        let Some(bytes) = voxels.checked_mul(std::mem::size_of::<f32>()) else {
            return Err(too_large);
        };
        if max_volume_bytes.is_some_and(|limit| bytes > limit) {
            warn!(bytes, limit = ?max_volume_bytes, "Volume exceeds configured budget");
            return Err(too_large);
        }

        let mut buffer: Vec<f32> = Vec::new();
        buffer
            .try_reserve_exact(voxels)
            .map_err(|_| BuildError::Allocation { bytes })?;
        buffer.resize(voxels, 0.0);
        Array3::from_shape_vec((depth, height, width), buffer)
            .map_err(|_| BuildError::Allocation { bytes })
    }

    fn copy_planes(
        data: &mut Array3<f32>,
        planes: &[Ordered],
        pool: &ThreadPool,
        progress: &mut dyn BuildProgress,
    ) {
        let depth = planes.len();
        let mut start = 0;
        while start < depth {
            let end = (start + PROGRESS_CHUNK).min(depth);
            let mut chunk = data.slice_mut(s![start..end, .., ..]);
            pool.install(|| {
                chunk
                    .axis_iter_mut(Axis(0))
                    .into_par_iter()
                    .zip(planes[start..end].par_iter())
                    .for_each(|(mut plane, ordered)| {
                        let (slope, intercept) = ordered.slice.effective_rescale();
                        match plane.as_slice_mut() {
                            Some(out) => ordered.slice.pixels.rescale_into(slope, intercept, out),
                            None => {
                                let mut row_major = vec![0.0f32; plane.len()];
                                ordered
                                    .slice
                                    .pixels
                                    .rescale_into(slope, intercept, &mut row_major);
                                plane
                                    .iter_mut()
                                    .zip(row_major)
                                    .for_each(|(dst, v)| *dst = v);
                            }
                        }
                    });
            });
            progress.report(ProgressEvent {
                stage: BuildStage::Copying,
                completed: end,
                total: depth,
            });
            start = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::slice::PixelData;

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap()
    }

    fn slice_at(z: f64, value: u16) -> Slice {
        Slice::new(3, 2, PixelData::U16(vec![value; 6]))
            .with_position([0.0, 0.0, z])
            .with_orientation(IDENTITY_ORIENTATION)
    }

    fn load(slices: &[Slice]) -> Result<Volume, BuildError> {
        VolumeLoader::load_from_slices(slices, None, &pool(), &mut NoProgress)
    }

    #[test]
    fn orders_by_position_not_input_order() {
        let slices = vec![slice_at(20.0, 2), slice_at(0.0, 0), slice_at(10.0, 1)];
        let volume = load(&slices).unwrap();
        assert_eq!(volume.dim(), (3, 2, 3));
        assert_eq!(volume.data()[[0, 0, 0]], 0.0);
        assert_eq!(volume.data()[[1, 1, 2]], 1.0);
        assert_eq!(volume.data()[[2, 0, 1]], 2.0);
        assert_eq!(volume.spacing().2, 10.0);
        assert_eq!(volume.fill_mask().fill_ratio(), 1.0);
    }

    #[test]
    fn applies_rescale() {
        let slices = vec![
            slice_at(0.0, 10).with_rescale(2.0, -5.0),
            slice_at(1.0, 10).with_rescale(1.0, 100.0),
        ];
        let volume = load(&slices).unwrap();
        assert_eq!(volume.data()[[0, 0, 0]], 15.0);
        assert_eq!(volume.data()[[1, 0, 0]], 110.0);
        assert_eq!(volume.value_range(), (15.0, 110.0));
    }

    #[test]
    fn drops_duplicate_positions() {
        let slices = vec![slice_at(0.0, 0), slice_at(1.0, 1), slice_at(1.0, 9)];
        let volume = load(&slices).unwrap();
        assert_eq!(volume.dim().0, 2);
        assert_eq!(volume.data()[[1, 0, 0]], 1.0);
        assert_eq!(volume.info().excluded_slices, 1);
    }

    #[test]
    fn drops_minority_dimensions() {
        let mut slices: Vec<Slice> = (0..4).map(|i| slice_at(i as f64, i as u16)).collect();
        slices.push(
            Slice::new(4, 4, PixelData::U16(vec![0; 16])).with_position([0.0, 0.0, 4.0]),
        );
        let volume = load(&slices).unwrap();
        assert_eq!(volume.dim(), (4, 2, 3));
    }

    #[test]
    fn rejects_single_slice() {
        let err = load(&[slice_at(0.0, 0)]).unwrap_err();
        assert!(matches!(err, BuildError::NotEnoughSlices { usable: 1 }));
    }

    #[test]
    fn rejects_all_different_dimensions() {
        let slices = vec![
            Slice::new(2, 2, PixelData::U8(vec![0; 4])),
            Slice::new(3, 3, PixelData::U8(vec![0; 9])),
            Slice::new(4, 4, PixelData::U8(vec![0; 16])),
        ];
        let err = load(&slices).unwrap_err();
        assert!(matches!(err, BuildError::InconsistentDimensions { slices: 3 }));
    }

    #[test]
    fn median_spacing_ignores_one_gap() {
        let slices: Vec<Slice> = [0.0, 2.0, 4.0, 8.0, 10.0]
            .iter()
            .map(|&z| slice_at(z, 0))
            .collect();
        let volume = load(&slices).unwrap();
        assert_eq!(volume.spacing().2, 2.0);
        assert_eq!(volume.fill_mask().planes(), &[true, true, false, false, true]);
    }

    #[test]
    fn falls_back_to_instance_numbers() {
        let slices = vec![
            Slice::new(1, 1, PixelData::U8(vec![3])).with_instance_number(3),
            Slice::new(1, 1, PixelData::U8(vec![1])).with_instance_number(1),
            Slice::new(1, 1, PixelData::U8(vec![2])).with_instance_number(2),
        ];
        let volume = load(&slices).unwrap();
        let values: Vec<f32> = volume.data().iter().copied().collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(volume.info().sorted_by, SortBy::InstanceNumber);
        assert_eq!(volume.spacing(), (1.0, 1.0, 1.0));
        assert!(volume.fill_mask().fill_ratio() < 1.0);
    }

    #[test]
    fn one_missing_position_orders_whole_stack_by_number() {
        let slices = vec![
            slice_at(0.0, 0).with_instance_number(2),
            Slice::new(3, 2, PixelData::U16(vec![5; 6])).with_instance_number(1),
            slice_at(2.0, 1).with_instance_number(3),
        ];
        let volume = load(&slices).unwrap();
        assert_eq!(volume.info().sorted_by, SortBy::InstanceNumber);
        assert_eq!(volume.data()[[0, 0, 0]], 5.0);
        assert_eq!(volume.fill_mask().fill_ratio(), 0.0);
    }

    #[test]
    fn mostly_duplicate_positions_fall_back_to_input_order() {
        let slices = vec![
            slice_at(0.0, 7),
            slice_at(0.0, 8),
            slice_at(0.0, 9),
            slice_at(4.0, 10),
        ];
        let volume = load(&slices).unwrap();
        assert_eq!(volume.dim().0, 4);
        assert_eq!(volume.info().sorted_by, SortBy::InputOrder);
        let values: Vec<f32> = volume.data().index_axis(Axis(0), 0).iter().copied().collect();
        assert_eq!(values, vec![7.0; 6]);
    }

    #[test]
    fn infers_stack_axis_without_orientation() {
        let slices: Vec<Slice> = [5.0, -5.0, 0.0]
            .iter()
            .map(|&y| Slice::new(1, 1, PixelData::F32(vec![y as f32])).with_position([1.0, y, 7.0]))
            .collect();
        let volume = load(&slices).unwrap();
        let values: Vec<f32> = volume.data().iter().copied().collect();
        assert_eq!(values, vec![-5.0, 0.0, 5.0]);
        assert_eq!(volume.spacing().2, 5.0);
    }

    #[test]
    fn enforces_byte_budget() {
        let slices = vec![slice_at(0.0, 0), slice_at(1.0, 0)];
        let err = VolumeLoader::load_from_slices(&slices, Some(16), &pool(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, BuildError::VolumeTooLarge { .. }));
    }

    #[test]
    fn reports_checkpoints_in_order() {
        let slices: Vec<Slice> = (0..40).map(|i| slice_at(i as f64, 0)).collect();
        let mut stages = Vec::new();
        let mut sink = |event: ProgressEvent| stages.push((event.stage, event.completed));
        VolumeLoader::load_from_slices(&slices, None, &pool(), &mut sink).unwrap();
        assert_eq!(
            stages,
            vec![
                (BuildStage::Validated, 0),
                (BuildStage::Allocated, 0),
                (BuildStage::Copying, 16),
                (BuildStage::Copying, 32),
                (BuildStage::Copying, 40),
                (BuildStage::Finished, 40),
            ]
        );
    }
}
