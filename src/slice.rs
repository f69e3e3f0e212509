//! Decoded slice records handed in by the image decoding layer.

use half::f16;

/// Row-major decoded samples of one slice.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    F16(Vec<f16>),
    F32(Vec<f32>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::U16(v) => v.len(),
            PixelData::I16(v) => v.len(),
            PixelData::F16(v) => v.len(),
            PixelData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of one stored sample in bytes.
    pub fn sample_size(&self) -> usize {
        match self {
            PixelData::U8(_) => 1,
            PixelData::U16(_) | PixelData::I16(_) | PixelData::F16(_) => 2,
            PixelData::F32(_) => 4,
        }
    }

    /// Write `value * slope + intercept` for every sample into `out`.
    ///
    /// `out` must have the same length as the sample buffer.
    pub(crate) fn rescale_into(&self, slope: f32, intercept: f32, out: &mut [f32]) {
        fn apply<T: Copy>(src: &[T], out: &mut [f32], f: impl Fn(T) -> f32) {
            for (dst, &v) in out.iter_mut().zip(src) {
                *dst = f(v);
            }
        }
        match self {
            PixelData::U8(v) => apply(v, out, |s| (s as f32).mul_add(slope, intercept)),
            PixelData::U16(v) => apply(v, out, |s| (s as f32).mul_add(slope, intercept)),
            PixelData::I16(v) => apply(v, out, |s| (s as f32).mul_add(slope, intercept)),
            PixelData::F16(v) => apply(v, out, |s| s.to_f32().mul_add(slope, intercept)),
            PixelData::F32(v) => apply(v, out, |s| s.mul_add(slope, intercept)),
        }
    }
}

/// Spatial metadata of a slice. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceGeometry {
    /// In-plane spacing in mm as `[x (between columns), y (between rows)]`.
    pub pixel_spacing: Option<[f64; 2]>,
    /// Patient-space position of the first transmitted pixel.
    pub position: Option<[f64; 3]>,
    /// Row direction cosines followed by column direction cosines.
    pub orientation: Option<[f64; 6]>,
}

/// One decoded cross-sectional image.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub width: usize,
    pub height: usize,
    pub pixels: PixelData,
    pub geometry: SliceGeometry,
    pub rescale_slope: f32,
    pub rescale_intercept: f32,
    /// Ordinal used when positions are unavailable.
    pub instance_number: Option<i32>,
}

impl Slice {
    pub fn new(width: usize, height: usize, pixels: PixelData) -> Self {
        Self {
            width,
            height,
            pixels,
            geometry: SliceGeometry::default(),
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            instance_number: None,
        }
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.geometry.position = Some(position);
        self
    }

    pub fn with_orientation(mut self, orientation: [f64; 6]) -> Self {
        self.geometry.orientation = Some(orientation);
        self
    }

    pub fn with_pixel_spacing(mut self, spacing: [f64; 2]) -> Self {
        self.geometry.pixel_spacing = Some(spacing);
        self
    }

    pub fn with_rescale(mut self, slope: f32, intercept: f32) -> Self {
        self.rescale_slope = slope;
        self.rescale_intercept = intercept;
        self
    }

    pub fn with_instance_number(mut self, number: i32) -> Self {
        self.instance_number = Some(number);
        self
    }

    /// Dimensions as `(height, width)`, matching ndarray's row-major order.
    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Whether the sample buffer matches the declared dimensions.
    pub fn is_consistent(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixels.len() == self.width * self.height
    }

    /// Slope and intercept with unusable values replaced by identity.
    pub(crate) fn effective_rescale(&self) -> (f32, f32) {
        let slope = if self.rescale_slope.is_finite() && self.rescale_slope != 0.0 {
            self.rescale_slope
        } else {
            1.0
        };
        let intercept = if self.rescale_intercept.is_finite() {
            self.rescale_intercept
        } else {
            0.0
        };
        (slope, intercept)
    }
}
