use thiserror::Error;

/// Coarse category of a failure, used by callers to pick a recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The series itself is unusable; pick a different one.
    Input,
    /// Not enough memory; retry with a downsampled series.
    Resource,
    /// The reconstruction call was malformed; nothing was changed.
    Request,
    /// The engine configuration is invalid.
    Config,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Not enough usable slices to build a volume (need 2, got {usable})")]
    NotEnoughSlices { usable: usize },

    #[error("No two slices share the same dimensions ({slices} slices inspected)")]
    InconsistentDimensions { slices: usize },

    #[error("Volume of {width}x{height}x{depth} voxels does not fit in memory")]
    VolumeTooLarge {
        width: usize,
        height: usize,
        depth: usize,
    },

    #[error("Could not allocate {bytes} bytes for the volume buffer")]
    Allocation { bytes: usize },
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::NotEnoughSlices { .. } | BuildError::InconsistentDimensions { .. } => {
                ErrorKind::Input
            }
            BuildError::VolumeTooLarge { .. } | BuildError::Allocation { .. } => {
                ErrorKind::Resource
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    #[error("No volume has been built")]
    NoVolume,

    #[error("Unknown orientation: {0}")]
    UnknownOrientation(String),

    #[error("Unknown interpolation method: {0}")]
    UnknownMethod(String),

    #[error("Position must be a finite number, got {0}")]
    InvalidPosition(f64),

    #[error("Output dimensions {width}x{height} are empty or too large")]
    InvalidOutputSize { width: usize, height: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown quality preset: {0}")]
    UnknownPreset(String),

    #[error("Cache capacity must be at least 1")]
    ZeroCacheCapacity,

    #[error("Thread count must be at least 1")]
    ZeroThreads,

    #[error("Window width must be positive, got {0}")]
    InvalidWindow(f32),

    #[error("Could not start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
pub enum MprError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MprError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MprError::Build(e) => e.kind(),
            MprError::Request(_) => ErrorKind::Request,
            MprError::Config(_) => ErrorKind::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_failing_concern() {
        assert_eq!(
            BuildError::NotEnoughSlices { usable: 1 }.kind(),
            ErrorKind::Input
        );
        assert_eq!(
            MprError::from(BuildError::Allocation { bytes: 64 }).kind(),
            ErrorKind::Resource
        );
        assert_eq!(MprError::from(RequestError::NoVolume).kind(), ErrorKind::Request);
        assert_eq!(
            MprError::from(ConfigError::ZeroThreads).kind(),
            ErrorKind::Config
        );
    }

    #[test]
    fn request_errors_name_the_bad_input() {
        let err = MprError::from(RequestError::UnknownOrientation("oblique".to_string()));
        assert!(err.to_string().contains("oblique"));
    }
}
