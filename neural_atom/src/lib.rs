//! # neural_atom
//!
//! Progressive multi-resolution training of spherical-harmonics voxel grids
//! with Burn.
//!
//! A scene is a dense grid of densities and SH colour coefficients. Training
//! starts on a coarse grid and upsamples it between stages, rendering random
//! ray batches against posed images and stepping a per-stage Adam optimizer.
//!
//! ## Features
//!
//! - **Voxel grid**: `VoxelGrid<B>` with trilinear lookup and host resampling
//! - **Renderer**: ray marching with front-to-back compositing, specular or diffuse
//! - **Controller**: `TrainingController` runs the stage/iteration loop and its
//!   periodic side effects (summaries, LR decay, feedback, evaluation, snapshots)
//! - **Data**: in-memory and on-disk posed image sets with background prefetch
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use neural_atom::prelude::*;
//! use burn::backend::{Autodiff, NdArray};
//!
//! type MyBackend = Autodiff<NdArray>;
//!
//! let device = Default::default();
//! let model = ShVoxelGridModel::<MyBackend>::new(
//!     &VoxelGridConfig::new([128, 128, 128]),
//!     RenderConfig::default(),
//!     &device,
//! )?;
//! let train = Arc::new(ImageDirectoryDataset::open("data/lego/train")?);
//!
//! let outcome = TrainingController::new(model, train, TrainingConfig::default(), "runs/lego")
//!     .train()?;
//! println!("final snapshot: {:?}", outcome.report.final_checkpoint);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! atom_core (no_std math: schedule, cameras, interpolation, SH, PSNR)
//!     │
//!     ▼
//! neural_atom
//!     grid ──► render ──► model ──► training::TrainingController
//!                                        │
//!     data::ImageBatchLoader ────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - `ndarray` (default): CPU backend
//! - `wgpu`: GPU acceleration via WebGPU
//! - `examples`: builds the bundled examples

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod error;
pub mod grid;
pub mod model;
pub mod render;
pub mod training;

// Re-export key types for convenience
pub use config::{RenderConfig, TrainingConfig, VoxelGridConfig};
pub use error::{NeuralAtomError, Result};
pub use grid::{GridSnapshot, VoxelGrid};
pub use model::{RenderProcedure, ResizeMode, ShVoxelGridModel, VolumetricModel};
pub use training::{TrainOutcome, TrainingController, TrainingReport};

pub use atom_core::{CameraBounds, CameraIntrinsics, CameraPose, GridResolution, Point3};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{RenderConfig, TrainingConfig, VoxelGridConfig};
    pub use crate::data::{
        DatasetManifest, FrameEntry, Image, ImageBatchLoader, ImageDirectoryDataset, PosedImage,
        PosedImageSource, PosedImagesDataset,
    };
    pub use crate::error::{NeuralAtomError, Result};
    pub use crate::grid::{GridSnapshot, VoxelGrid};
    pub use crate::model::{RenderProcedure, ResizeMode, ShVoxelGridModel, VolumetricModel};
    pub use crate::render::{render_in_chunks, render_sh_voxel_grid, RenderOutput};
    pub use crate::training::{
        find_latest_checkpoint, load_checkpoint, save_checkpoint, AdamConfig, CheckpointMetadata,
        Dispatcher, JsonlMetricsSink, LossEvaluator, MemoryMetricsSink, MetricsSink,
        RaySampler, SideEffect, StageOptimizer, TrainOutcome, TrainingController,
        TrainingReport,
    };

    pub use atom_core::{
        compute_grid_sizes, CameraBounds, CameraIntrinsics, CameraPose, GridResolution, Point3,
    };
}
