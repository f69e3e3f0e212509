use serde::{Deserialize, Serialize};

use crate::enums::{Interpolation, QualityPreset};
use crate::error::ConfigError;

/// Default display window centre applied to reconstructed slices.
pub const DEFAULT_WINDOW_CENTER: f32 = 40.0;

/// Default display window width applied to reconstructed slices.
pub const DEFAULT_WINDOW_WIDTH: f32 = 400.0;

/// Position deltas within this factor of the median spacing count as regular.
pub const SPACING_TOLERANCE: f64 = 0.5;

/// Positions closer than this (in mm) along the stack normal are duplicates.
pub const DUPLICATE_POSITION_EPSILON: f64 = 1e-3;

/// Maximum voxel round-trip error (in mm) accepted by the geometry check.
pub const GEOMETRY_TOLERANCE_MM: f64 = 0.1;

/// Upper bound on the pixel count of one reconstructed slice.
pub const MAX_OUTPUT_PIXELS: usize = 1 << 26;

/// Settings selected by a [`QualityPreset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Kernel used when a caller does not name one.
    pub interpolation: Interpolation,
    /// Number of reconstructed slices kept in the cache.
    pub cache_capacity: usize,
    /// Worker threads used for plane copies and row resampling.
    pub threads: usize,
}

impl QualityPreset {
    pub fn settings(&self) -> QualitySettings {
        match self {
            QualityPreset::Low => QualitySettings {
                interpolation: Interpolation::Nearest,
                cache_capacity: 50,
                threads: 1,
            },
            QualityPreset::Medium => QualitySettings {
                interpolation: Interpolation::Trilinear,
                cache_capacity: 100,
                threads: 2,
            },
            QualityPreset::High => QualitySettings {
                interpolation: Interpolation::Cubic,
                cache_capacity: 200,
                threads: 4,
            },
        }
    }
}

/// Top-level configuration for an [`crate::engine::MprEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub quality: QualityPreset,
    /// Overrides the preset's cache capacity.
    pub cache_capacity: Option<usize>,
    /// Overrides the preset's thread hint.
    pub threads: Option<usize>,
    /// Refuse to allocate volumes larger than this many bytes.
    pub max_volume_bytes: Option<usize>,
    pub window_center: f32,
    pub window_width: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quality: QualityPreset::default(),
            cache_capacity: None,
            threads: None,
            max_volume_bytes: None,
            window_center: DEFAULT_WINDOW_CENTER,
            window_width: DEFAULT_WINDOW_WIDTH,
        }
    }
}

impl EngineConfig {
    pub fn with_quality(quality: QualityPreset) -> Self {
        Self {
            quality,
            ..Self::default()
        }
    }

    /// Resolve the preset and overrides into the effective settings.
    pub fn validate(&self) -> Result<QualitySettings, ConfigError> {
        let mut settings = self.quality.settings();
        if let Some(capacity) = self.cache_capacity {
            settings.cache_capacity = capacity;
        }
        if let Some(threads) = self.threads {
            settings.threads = threads;
        }

        if settings.cache_capacity == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        if settings.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if !(self.window_width > 0.0) {
            return Err(ConfigError::InvalidWindow(self.window_width));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_map_to_fixed_settings() {
        assert_eq!(
            QualityPreset::Low.settings(),
            QualitySettings {
                interpolation: Interpolation::Nearest,
                cache_capacity: 50,
                threads: 1
            }
        );
        assert_eq!(QualityPreset::Medium.settings().cache_capacity, 100);
        assert_eq!(
            QualityPreset::High.settings().interpolation,
            Interpolation::Cubic
        );
    }

    #[test]
    fn overrides_take_precedence() {
        let config = EngineConfig {
            quality: QualityPreset::High,
            cache_capacity: Some(8),
            threads: Some(1),
            ..EngineConfig::default()
        };
        let settings = config.validate().unwrap();
        assert_eq!(settings.cache_capacity, 8);
        assert_eq!(settings.threads, 1);
        assert_eq!(settings.interpolation, Interpolation::Cubic);
    }

    #[test]
    fn rejects_zero_capacity_and_threads() {
        let config = EngineConfig {
            cache_capacity: Some(0),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCacheCapacity)));

        let config = EngineConfig {
            threads: Some(0),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroThreads)));
    }

    #[test]
    fn deserializes_partial_config() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "quality": "low", "max_volume_bytes": 1024 }"#).unwrap();
        assert_eq!(config.quality, QualityPreset::Low);
        assert_eq!(config.max_volume_bytes, Some(1024));
        assert_eq!(config.window_width, DEFAULT_WINDOW_WIDTH);
    }
}
