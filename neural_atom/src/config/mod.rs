//! Configuration types for neural_atom.
//!
//! Burn-style configuration structs for the voxel grid, the renderer and the
//! training controller.

mod grid;
mod render;
mod training;

pub use grid::VoxelGridConfig;
pub use render::RenderConfig;
pub use training::TrainingConfig;
