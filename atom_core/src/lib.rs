//! # atom_core
//!
//! Pure math behind progressive voxel-grid radiance training.
//!
//! Nothing here touches tensors or the filesystem; the `neural_atom` crate
//! builds the trainable representation and the training loop on top.
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables standard library support
//! - `alloc`: Enables heap allocation (Vec, etc.) without full std
//!
//! ## Modules
//!
//! - [`types`]: Core data types (Point3, GridResolution, LocalCoord)
//! - [`schedule`]: Per-stage grid resolutions and the global step counter
//! - [`camera`]: Pinhole intrinsics, poses, ray casting
//! - [`interpolation`]: Trilinear weights and grid corner lookup
//! - [`resample`]: Moving grid values between resolutions
//! - [`sh`]: Spherical-harmonics basis
//! - [`metrics`]: PSNR
//! - [`error`]: Error types
//!
//! ## Usage
//!
//! ```
//! use atom_core::prelude::*;
//!
//! let sizes = compute_grid_sizes(GridResolution::cube(128), 4, 2.0).unwrap();
//! assert_eq!(sizes[0], GridResolution::cube(16));
//! assert_eq!(global_step(2, 1, 2000), 2001);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(all(feature = "alloc", not(feature = "std")))]
extern crate alloc;

#[cfg(feature = "std")]
mod alloc_prelude {
    pub use std::vec::Vec;
}

#[cfg(all(feature = "alloc", not(feature = "std")))]
mod alloc_prelude {
    pub use alloc::vec::Vec;
}

pub mod camera;
pub mod error;
pub mod interpolation;
pub mod metrics;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod resample;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod schedule;
pub mod sh;
pub mod types;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::camera::{hemispherical_radius_estimate, CameraBounds, CameraIntrinsics, CameraPose};
    pub use crate::error::AtomCoreError;
    pub use crate::interpolation::{compute_trilinear_weights, grid_corners, world_to_grid, VoxelCorners};
    pub use crate::metrics::{mse_to_psnr, PSNR_CAP};
    pub use crate::sh::{diffuse_sh_basis, eval_sh_basis, num_sh_coeffs, MAX_SH_COEFFS, MAX_SH_DEGREE};
    pub use crate::types::{GridResolution, LocalCoord, Point3};

    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::camera::{cast_rays, Rays};
    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::resample::{resample_grid, ResampleMode};
    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::schedule::{compute_grid_sizes, global_step};
}

pub use camera::{hemispherical_radius_estimate, CameraBounds, CameraIntrinsics, CameraPose};
#[cfg(any(feature = "std", feature = "alloc"))]
pub use camera::{cast_rays, Rays};
pub use error::AtomCoreError;
pub use interpolation::{compute_trilinear_weights, grid_corners, world_to_grid, VoxelCorners};
pub use metrics::{mse_to_psnr, PSNR_CAP};
#[cfg(any(feature = "std", feature = "alloc"))]
pub use resample::{resample_grid, ResampleMode};
#[cfg(any(feature = "std", feature = "alloc"))]
pub use schedule::{compute_grid_sizes, global_step};
pub use sh::{diffuse_sh_basis, eval_sh_basis, num_sh_coeffs, MAX_SH_COEFFS, MAX_SH_DEGREE};
pub use types::{GridResolution, LocalCoord, Point3};
