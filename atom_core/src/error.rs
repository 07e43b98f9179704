//! Error types for atom_core operations.
//!
//! A plain enum with no external dependencies so the crate stays no_std.

use core::fmt;

/// Errors produced by the pure math in this crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtomCoreError {
    /// A progressive schedule needs at least one stage.
    InvalidStageCount {
        /// The requested number of stages.
        num_stages: usize,
    },
    /// The per-stage growth factor must be strictly greater than one.
    InvalidScaleFactor {
        /// The requested scale factor.
        scale_factor: f32,
    },
    /// A grid resolution had a zero-sized axis.
    EmptyResolution,
    /// Spherical harmonics degree outside the supported range.
    UnsupportedShDegree {
        /// The requested degree.
        degree: u32,
        /// Highest supported degree.
        max: u32,
    },
    /// A value buffer did not match the size implied by its resolution.
    BufferSizeMismatch {
        /// Expected number of values.
        expected: usize,
        /// Number of values provided.
        got: usize,
    },
    /// Near plane must be positive-or-zero and strictly before the far plane.
    InvalidCameraBounds {
        /// Near plane distance.
        near: f32,
        /// Far plane distance.
        far: f32,
    },
}

impl fmt::Display for AtomCoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomCoreError::InvalidStageCount { num_stages } => {
                write!(f, "number of stages must be at least 1, got {}", num_stages)
            }
            AtomCoreError::InvalidScaleFactor { scale_factor } => {
                write!(f, "scale factor must be greater than 1, got {}", scale_factor)
            }
            AtomCoreError::EmptyResolution => write!(f, "grid resolution has a zero-sized axis"),
            AtomCoreError::UnsupportedShDegree { degree, max } => {
                write!(f, "spherical harmonics degree {} exceeds maximum {}", degree, max)
            }
            AtomCoreError::BufferSizeMismatch { expected, got } => {
                write!(f, "buffer size mismatch: expected {} values, got {}", expected, got)
            }
            AtomCoreError::InvalidCameraBounds { near, far } => {
                write!(f, "invalid camera bounds: near {} far {}", near, far)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AtomCoreError {}
