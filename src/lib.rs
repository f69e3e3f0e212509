//! # MPR-volume library
//!
//! This crate serves a multi-planar reconstruction (MPR) engine for stacks of
//! parallel cross-sectional images
//!
//! Decoding is left to the caller: the engine consumes already decoded
//! [`Slice`] records (pixel buffer, rescale parameters and whatever geometry
//! is known) and assembles them into one dense volume. The volume can be
//! sliced in the three different medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//!  Coronal and Sagittal slices are reformatted across the acquisition planes
//!  with one of three kernels (nearest, trilinear, cubic) and resampled to an
//!  isotropic grid to preserve aspect ratios. Slices are assumed to have the
//!  following attributes:
//!   - Axial acquisition (parallel planes along one stack axis)
//!   - One frame per slice
//!   - Images from the same series and acquisition
//!
//!  Irregular or missing slices do not fail a build. They lower the volume's
//!  fill ratio and the quality score of slices reconstructed near them.
//!
//! # Examples
//!
//! ## Building a volume and reconstructing a sagittal slice
//!
//! ```no_run
//! # use mpr_volume::{EngineConfig, Interpolation, MprEngine, Orientation, PixelData, Slice};
//! let slices: Vec<Slice> = (0..5)
//!     .map(|i| {
//!         Slice::new(256, 256, PixelData::U16(vec![i * 64; 256 * 256]))
//!             .with_position([0.0, 0.0, i as f64 * 10.0])
//!     })
//!     .collect();
//!
//! let mut engine = MprEngine::new(EngineConfig::default()).expect("valid config");
//! engine.build_volume(&slices).expect("should have built volume");
//! let slice = engine
//!     .generate_slice(Orientation::Sagittal, 0.5, Interpolation::Trilinear)
//!     .expect("should have returned slice at center of volume");
//! slice
//!     .to_image()
//!     .expect("contiguous slice")
//!     .save("result.png")
//!     .expect("should have written image");
//! ```

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod enums;
pub mod error;
pub mod geometry;
mod interpolator;
pub mod progress;
pub mod reconstructor;
pub mod slice;
pub mod volume;
pub mod volume_loader;

pub use cache::CacheStats;
pub use config::{EngineConfig, QualitySettings};
pub use diagnostics::Diagnostics;
pub use engine::MprEngine;
pub use enums::{Interpolation, Orientation, QualityPreset, SortBy};
pub use error::{BuildError, ConfigError, ErrorKind, MprError, RequestError};
pub use progress::{BuildProgress, BuildStage, ProgressEvent};
pub use reconstructor::{ReconstructedSlice, ReconstructionRequest};
pub use slice::{PixelData, Slice, SliceGeometry};
pub use volume::{Volume, VolumeInfo};
