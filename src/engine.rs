//! The engine owns one series' volume and slice cache.
//!
//! Create one [`MprEngine`] per open series. Building a new volume or calling
//! [`MprEngine::dispose`] drops the previous volume and every cached slice
//! before anything new is allocated, so at most one volume is resident per
//! engine.

use std::num::NonZeroUsize;
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStats, SliceCache};
use crate::config::{EngineConfig, QualitySettings};
use crate::diagnostics::Diagnostics;
use crate::enums::{Interpolation, Orientation};
use crate::error::{BuildError, ConfigError, MprError, RequestError};
use crate::progress::{BuildProgress, NoProgress};
use crate::reconstructor::{ReconstructedSlice, ReconstructionRequest, Reconstructor, Window};
use crate::slice::Slice;
use crate::volume::{Volume, VolumeInfo};
use crate::volume_loader::VolumeLoader;

pub struct MprEngine {
    config: EngineConfig,
    settings: QualitySettings,
    pool: ThreadPool,
    volume: Option<Volume>,
    cache: SliceCache,
}

impl MprEngine {
    /// Create an engine with validated settings and its own worker pool.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let settings = config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.threads)
            .thread_name(|i| format!("mpr-worker-{i}"))
            .build()?;
        let capacity =
            NonZeroUsize::new(settings.cache_capacity).ok_or(ConfigError::ZeroCacheCapacity)?;
        debug!(?config.quality, ?settings, "Created MPR engine");
        Ok(Self {
            config,
            settings,
            pool,
            volume: None,
            cache: SliceCache::new(capacity),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> QualitySettings {
        self.settings
    }

    /// Interpolation used when the caller does not pick one.
    pub fn default_method(&self) -> Interpolation {
        self.settings.interpolation
    }

    /// Build the volume for a new series, replacing any previous one.
    ///
    /// The previous volume and cache are released first, also when the
    /// build fails.
    pub fn build_volume(&mut self, slices: &[Slice]) -> Result<VolumeInfo, BuildError> {
        self.build_volume_with_progress(slices, &mut NoProgress)
    }

    pub fn build_volume_with_progress(
        &mut self,
        slices: &[Slice],
        progress: &mut dyn BuildProgress,
    ) -> Result<VolumeInfo, BuildError> {
        self.dispose();
        info!(slices = slices.len(), "Building volume");
        match VolumeLoader::load_from_slices(
            slices,
            self.config.max_volume_bytes,
            &self.pool,
            progress,
        ) {
            Ok(volume) => {
                let info = volume.info();
                self.volume = Some(volume);
                Ok(info)
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "Volume build failed");
                Err(e)
            }
        }
    }

    pub fn has_volume(&self) -> bool {
        self.volume.is_some()
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.volume.as_ref()
    }

    pub fn volume_info(&self) -> Option<VolumeInfo> {
        self.volume.as_ref().map(Volume::info)
    }

    /// Number of native slices along an orientation's axis, 0 without a volume.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        self.volume
            .as_ref()
            .map_or(0, |volume| volume.slice_count(orientation))
    }

    fn window(&self) -> Window {
        Window {
            center: self.config.window_center,
            width: self.config.window_width,
        }
    }

    /// Reconstruct a slice without touching the cache.
    pub fn reconstruct(
        &self,
        request: &ReconstructionRequest,
    ) -> Result<ReconstructedSlice, RequestError> {
        let volume = self.volume.as_ref().ok_or(RequestError::NoVolume)?;
        Reconstructor::generate(volume, request, self.window(), &self.pool)
    }

    pub fn generate_slice(
        &self,
        orientation: Orientation,
        position: f64,
        method: Interpolation,
    ) -> Result<ReconstructedSlice, MprError> {
        Ok(self.reconstruct(&ReconstructionRequest::new(orientation, position, method))?)
    }

    /// [`Self::generate_slice`] for callers holding orientation and method
    /// names, e.g. from a settings form.
    pub fn generate_slice_named(
        &self,
        orientation: &str,
        position: f64,
        method: &str,
    ) -> Result<ReconstructedSlice, MprError> {
        let orientation: Orientation = orientation.parse()?;
        let method: Interpolation = method.parse()?;
        self.generate_slice(orientation, position, method)
    }

    /// Cached reconstruction at the native slice nearest to `position`.
    pub fn get_or_compute(
        &mut self,
        orientation: Orientation,
        position: f64,
        method: Interpolation,
    ) -> Result<Arc<ReconstructedSlice>, MprError> {
        self.get_or_compute_request(&ReconstructionRequest::new(orientation, position, method))
    }

    pub fn get_or_compute_request(
        &mut self,
        request: &ReconstructionRequest,
    ) -> Result<Arc<ReconstructedSlice>, MprError> {
        let Some(volume) = self.volume.as_ref() else {
            return Err(RequestError::NoVolume.into());
        };
        let position = request.clamped_position()?;
        let (index, snapped) =
            SliceCache::quantize(position, volume.slice_count(request.orientation));
        let key = CacheKey {
            orientation: request.orientation,
            index,
            method: request.method,
            output_size: request.output_size,
        };
        let snapped_request = ReconstructionRequest {
            position: snapped,
            ..*request
        };
        let window = self.window();
        let pool = &self.pool;
        Ok(self.cache.get_or_compute(key, || {
            Reconstructor::generate(volume, &snapped_request, window, pool)
        })?)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cached_slices(&self) -> usize {
        self.cache.len()
    }

    pub fn run_diagnostics(&self) -> Diagnostics {
        let method = self.default_method();
        Diagnostics::collect(self.volume.as_ref(), self.cache.stats(), |orientation, position| {
            self.generate_slice(orientation, position, method)
        })
    }

    /// Release the volume and every cached slice. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(volume) = self.volume.take() {
            info!(
                bytes = volume.size_in_bytes(),
                cached = self.cache.len(),
                "Disposing volume"
            );
        }
        self.cache.clear();
    }
}

impl Drop for MprEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::QualityPreset;
    use crate::slice::PixelData;

    fn series(count: usize) -> Vec<Slice> {
        (0..count)
            .map(|i| {
                Slice::new(4, 4, PixelData::U16(vec![i as u16 * 10; 16]))
                    .with_position([0.0, 0.0, i as f64 * 2.0])
            })
            .collect()
    }

    #[test]
    fn quality_preset_drives_settings() {
        let engine = MprEngine::new(EngineConfig::with_quality(QualityPreset::Low)).unwrap();
        assert_eq!(engine.default_method(), Interpolation::Nearest);
        assert_eq!(engine.settings().cache_capacity, 50);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EngineConfig {
            threads: Some(0),
            ..EngineConfig::default()
        };
        assert!(matches!(MprEngine::new(config), Err(ConfigError::ZeroThreads)));
    }

    #[test]
    fn failed_build_leaves_no_volume() {
        let mut engine = MprEngine::new(EngineConfig::default()).unwrap();
        engine.build_volume(&series(3)).unwrap();
        assert!(engine.has_volume());

        assert!(engine.build_volume(&series(1)).is_err());
        assert!(!engine.has_volume());
        assert_eq!(engine.slice_count(Orientation::Axial), 0);
    }

    #[test]
    fn rebuild_clears_cache() {
        let mut engine = MprEngine::new(EngineConfig::default()).unwrap();
        engine.build_volume(&series(3)).unwrap();
        engine
            .get_or_compute(Orientation::Axial, 0.0, Interpolation::Nearest)
            .unwrap();
        assert_eq!(engine.cached_slices(), 1);

        engine.build_volume(&series(4)).unwrap();
        assert_eq!(engine.cached_slices(), 0);
        assert_eq!(engine.slice_count(Orientation::Axial), 4);
    }

    #[test]
    fn dispose_is_reentrant() {
        let mut engine = MprEngine::new(EngineConfig::default()).unwrap();
        engine.dispose();
        engine.build_volume(&series(2)).unwrap();
        engine.dispose();
        engine.dispose();
        assert!(engine.volume_info().is_none());
    }
}
