use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::CacheStats;
use crate::config::GEOMETRY_TOLERANCE_MM;
use crate::enums::Orientation;
use crate::error::MprError;
use crate::reconstructor::ReconstructedSlice;
use crate::volume::{Volume, VolumeInfo};

/// Position used for the per-orientation smoke tests.
pub const SMOKE_TEST_POSITION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub fill_ratio: f64,
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub voxel_count: usize,
    pub size_in_bytes: usize,
}

impl VolumeStats {
    fn compute(volume: &Volume) -> Self {
        let data = volume.data();
        let voxel_count = data.len();
        let sum: f64 = data.iter().map(|&v| v as f64).sum();
        let (min, max) = volume.value_range();
        Self {
            fill_ratio: volume.fill_mask().fill_ratio(),
            min,
            max,
            mean: if voxel_count == 0 {
                0.0
            } else {
                sum / voxel_count as f64
            },
            voxel_count,
            size_in_bytes: volume.size_in_bytes(),
        }
    }
}

/// Voxel to patient to voxel round trip at the volume corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryCheck {
    pub valid: bool,
    pub max_error_mm: Option<f64>,
    pub reason: Option<String>,
}

impl GeometryCheck {
    fn compute(volume: &Volume) -> Self {
        let transform = volume.transform();
        if !transform.is_invertible() {
            return Self {
                valid: false,
                max_error_mm: None,
                reason: Some("Volume axes are degenerate".to_string()),
            };
        }

        let (depth, height, width) = volume.dim();
        let (sx, sy, sz) = volume.spacing();
        let corners = [
            [0.0, 0.0, 0.0],
            [(width - 1) as f64, 0.0, 0.0],
            [0.0, (height - 1) as f64, 0.0],
            [0.0, 0.0, (depth - 1) as f64],
        ];

        let mut max_error = 0.0f64;
        for corner in corners {
            let Some(back) = transform.patient_to_voxel(transform.voxel_to_patient(corner)) else {
                continue;
            };
            let dx = (back[0] - corner[0]) * sx;
            let dy = (back[1] - corner[1]) * sy;
            let dz = (back[2] - corner[2]) * sz;
            max_error = max_error.max((dx * dx + dy * dy + dz * dz).sqrt());
        }

        if max_error > GEOMETRY_TOLERANCE_MM {
            Self {
                valid: false,
                max_error_mm: Some(max_error),
                reason: Some(format!(
                    "Transform round trip error {max_error:.3}mm exceeds {GEOMETRY_TOLERANCE_MM}mm"
                )),
            }
        } else {
            Self {
                valid: true,
                max_error_mm: Some(max_error),
                reason: None,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceTest {
    pub success: bool,
    pub quality_score: Option<f64>,
    pub processing_time_ms: Option<f64>,
    pub error: Option<String>,
}

impl SliceTest {
    fn from_result(result: Result<ReconstructedSlice, MprError>) -> Self {
        match result {
            Ok(slice) => Self {
                success: true,
                quality_score: Some(slice.quality_score),
                processing_time_ms: Some(slice.processing_time.as_secs_f64() * 1000.0),
                error: None,
            },
            Err(e) => Self {
                success: false,
                quality_score: None,
                processing_time_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Health summary of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub has_volume: bool,
    pub volume: Option<VolumeInfo>,
    pub volume_stats: Option<VolumeStats>,
    pub geometry: Option<GeometryCheck>,
    /// Whether each orientation's middle native plane holds any non-zero voxel.
    pub integrity: BTreeMap<Orientation, bool>,
    pub slice_tests: BTreeMap<Orientation, SliceTest>,
    pub cache: CacheStats,
}

impl Diagnostics {
    pub(crate) fn collect(
        volume: Option<&Volume>,
        cache: CacheStats,
        generate: impl Fn(Orientation, f64) -> Result<ReconstructedSlice, MprError>,
    ) -> Self {
        let Some(volume) = volume else {
            return Self {
                has_volume: false,
                volume: None,
                volume_stats: None,
                geometry: None,
                integrity: BTreeMap::new(),
                slice_tests: BTreeMap::new(),
                cache,
            };
        };

        let integrity = Orientation::ALL
            .iter()
            .map(|&orientation| {
                let middle = volume.slice_count(orientation) / 2;
                let has_data = volume
                    .get_slice_from_axis(middle, orientation)
                    .is_some_and(|plane| plane.iter().any(|&v| v != 0.0));
                (orientation, has_data)
            })
            .collect();

        let slice_tests = Orientation::ALL
            .iter()
            .map(|&orientation| {
                (
                    orientation,
                    SliceTest::from_result(generate(orientation, SMOKE_TEST_POSITION)),
                )
            })
            .collect();

        let diagnostics = Self {
            has_volume: true,
            volume: Some(volume.info()),
            volume_stats: Some(VolumeStats::compute(volume)),
            geometry: Some(GeometryCheck::compute(volume)),
            integrity,
            slice_tests,
            cache,
        };
        info!(
            fill_ratio = diagnostics.fill_ratio(),
            healthy = diagnostics.is_healthy(),
            "Ran diagnostics"
        );
        diagnostics
    }

    pub fn fill_ratio(&self) -> Option<f64> {
        self.volume_stats.as_ref().map(|stats| stats.fill_ratio)
    }

    /// A volume is present and every smoke test succeeded.
    pub fn is_healthy(&self) -> bool {
        self.has_volume && self.slice_tests.values().all(|test| test.success)
    }
}
