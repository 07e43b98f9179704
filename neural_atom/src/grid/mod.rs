//! Trainable voxel grid.
//!
//! Provides `VoxelGrid<B>`, a dense density + SH-coefficient grid backed by
//! Burn tensors, and the batched trilinear lookup the renderer uses.

mod interpolation;
mod voxel_grid;

pub use interpolation::{interpolate, SampleCorners};
pub use voxel_grid::{GridSnapshot, VoxelGrid, DEFAULT_INIT_RANGE};
