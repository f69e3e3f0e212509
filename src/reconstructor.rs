use std::time::Duration;

use image::GrayImage;
use ndarray::{Array2, Axis};
use rayon::ThreadPool;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use web_time::Instant;

use crate::config::MAX_OUTPUT_PIXELS;
use crate::enums::{Interpolation, Orientation};
use crate::error::RequestError;
use crate::interpolator::Interpolator;
use crate::volume::Volume;

/// One reconstruction call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructionRequest {
    pub orientation: Orientation,
    /// Normalized depth along the orientation's axis, clamped to `[0, 1]`.
    pub position: f64,
    pub method: Interpolation,
    /// `(columns, rows)`; the volume's default for the orientation when unset.
    pub output_size: Option<(usize, usize)>,
}

impl ReconstructionRequest {
    pub fn new(orientation: Orientation, position: f64, method: Interpolation) -> Self {
        Self {
            orientation,
            position,
            method,
            output_size: None,
        }
    }

    pub fn with_output_size(mut self, columns: usize, rows: usize) -> Self {
        self.output_size = Some((columns, rows));
        self
    }

    /// Position after clamping, or an error when it is not a number.
    pub fn clamped_position(&self) -> Result<f64, RequestError> {
        if !self.position.is_finite() {
            return Err(RequestError::InvalidPosition(self.position));
        }
        Ok(self.position.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceStatistics {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub non_zero: usize,
}

impl SliceStatistics {
    fn compute(pixels: &Array2<f32>) -> Self {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut non_zero = 0;
        for &v in pixels.iter() {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
            if v != 0.0 {
                non_zero += 1;
            }
        }
        let count = pixels.len();
        if count == 0 {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                non_zero: 0,
            };
        }
        Self {
            min,
            max,
            mean: sum / count as f64,
            non_zero,
        }
    }
}

/// What a viewer needs to present a reconstructed slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayMetadata {
    /// `(column, row)` spacing in mm of the output pixels.
    pub pixel_spacing: (f64, f64),
    pub window_center: f32,
    pub window_width: f32,
    pub statistics: SliceStatistics,
}

/// A synthesized 2D cross-section.
#[derive(Debug, Clone)]
pub struct ReconstructedSlice {
    /// Physical values in `(rows, columns)` order.
    pub pixels: Array2<f32>,
    pub orientation: Orientation,
    /// Clamped position the slice was computed at.
    pub position: f64,
    pub method: Interpolation,
    /// Nearest native plane along the orientation's axis.
    pub slice_index: usize,
    /// Share of the sampled neighbourhood backed by real acquired data.
    pub quality_score: f64,
    pub metadata: DisplayMetadata,
    pub processing_time: Duration,
}

/// Equality ignores `processing_time`.
impl PartialEq for ReconstructedSlice {
    fn eq(&self, other: &Self) -> bool {
        self.pixels == other.pixels
            && self.orientation == other.orientation
            && self.position == other.position
            && self.method == other.method
            && self.slice_index == other.slice_index
            && self.quality_score == other.quality_score
            && self.metadata == other.metadata
    }
}

impl ReconstructedSlice {
    /// `(columns, rows)`.
    pub fn dimensions(&self) -> (usize, usize) {
        let (rows, columns) = self.pixels.dim();
        (columns, rows)
    }

    /// Raw native-endian bytes of the pixel buffer.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.pixels.as_slice().map(bytemuck::cast_slice)
    }

    #[inline]
    fn window_to_u8(value: f32, center: f32, width: f32) -> u8 {
        let lower = center - width / 2.0;
        (((value - lower) / width) * 255.0).clamp(0.0, 255.0) as u8
    }

    /// 8-bit grayscale rendition using the slice's display window.
    pub fn to_image(&self) -> Option<GrayImage> {
        let (columns, rows) = self.dimensions();
        let center = self.metadata.window_center;
        let width = self.metadata.window_width;
        let pixel_data: Vec<u8> = self
            .pixels
            .as_slice()?
            .par_iter()
            .map(|&v| Self::window_to_u8(v, center, width))
            .collect();
        GrayImage::from_raw(columns as u32, rows as u32, pixel_data)
    }
}

/// Display window applied to new slices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub center: f32,
    pub width: f32,
}

pub(crate) struct Reconstructor;

impl Reconstructor {
    /// Source coordinate of output pixel `i` when `output` pixels span an
    /// axis of `native` voxels. Pixel centres are aligned, and identical sizes
    /// map one to one.
    #[inline]
    fn source_coordinate(i: usize, output: usize, native: usize) -> f32 {
        let scale = native as f32 / output as f32;
        (i as f32 + 0.5) * scale - 0.5
    }

    pub(crate) fn generate(
        volume: &Volume,
        request: &ReconstructionRequest,
        window: Window,
        pool: &ThreadPool,
    ) -> Result<ReconstructedSlice, RequestError> {
        let started = Instant::now();
        let position = request.clamped_position()?;
        let orientation = request.orientation;
        let (columns, rows) = request
            .output_size
            .unwrap_or_else(|| volume.output_dimensions(orientation));
        let pixel_count = columns.checked_mul(rows).unwrap_or(usize::MAX);
        if pixel_count == 0 || pixel_count > MAX_OUTPUT_PIXELS {
            return Err(RequestError::InvalidOutputSize {
                width: columns,
                height: rows,
            });
        }

        let (depth, height, width) = volume.dim();
        let planes = volume.slice_count(orientation);
        let depth_coordinate = position * (planes - 1) as f64;
        let slice_index = depth_coordinate.round() as usize;
        let fixed = depth_coordinate as f32;

        // Native extent of the output's column and row axes.
        let (native_columns, native_rows) = match orientation {
            Orientation::Axial => (width, height),
            Orientation::Coronal => (width, depth),
            Orientation::Sagittal => (height, depth),
        };

        let data = volume.data();
        let mask = volume.fill_mask();
        let method = request.method;
        let mut pixels = Array2::<f32>::zeros((rows, columns));

        let (taps, real_taps) = pool.install(|| {
            pixels
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .map(|(r, mut row)| {
                    let v = Self::source_coordinate(r, rows, native_rows);
                    let mut taps = 0u64;
                    let mut real_taps = 0u64;
                    for (c, out) in row.iter_mut().enumerate() {
                        let u = Self::source_coordinate(c, columns, native_columns);
                        let (x, y, z) = match orientation {
                            Orientation::Axial => (u, v, fixed),
                            Orientation::Coronal => (u, fixed, v),
                            Orientation::Sagittal => (fixed, u, v),
                        };
                        let sample = Interpolator::sample(data, mask, method, x, y, z);
                        *out = sample.value;
                        taps += sample.taps as u64;
                        real_taps += sample.real_taps as u64;
                    }
                    (taps, real_taps)
                })
                .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1))
        });

        let quality_score = if taps == 0 {
            0.0
        } else {
            real_taps as f64 / taps as f64
        };
        let (column_spacing, row_spacing) = volume.plane_spacing(orientation);
        let metadata = DisplayMetadata {
            pixel_spacing: (
                column_spacing * native_columns as f64 / columns as f64,
                row_spacing * native_rows as f64 / rows as f64,
            ),
            window_center: window.center,
            window_width: window.width,
            statistics: SliceStatistics::compute(&pixels),
        };
        let processing_time = started.elapsed();

        debug!(
            %orientation,
            position,
            %method,
            slice_index,
            columns,
            rows,
            quality_score,
            elapsed_us = processing_time.as_micros() as u64,
            "Reconstructed slice"
        );

        Ok(ReconstructedSlice {
            pixels,
            orientation,
            position,
            method,
            slice_index,
            quality_score,
            metadata,
            processing_time,
        })
    }
}
