//! The capability a representation must offer to be trained progressively.

use atom_core::{GridResolution, Rays};
use burn::prelude::*;

use crate::config::{RenderConfig, VoxelGridConfig};
use crate::error::{NeuralAtomError, Result};
use crate::grid::{GridSnapshot, VoxelGrid};
use crate::render::{render_in_chunks, render_sh_voxel_grid, RenderOutput};

/// How a representation is carried to a new resolution.
pub use atom_core::ResampleMode as ResizeMode;

/// The rendering procedure a representation is drawn with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderProcedure {
    /// Spherical-harmonics voxel grid, ray marched and alpha composited.
    ShVoxelGrid,
    /// Any other procedure, by name.
    Other(String),
}

/// A trainable volumetric representation.
pub trait VolumetricModel<B: Backend>: Sized {
    /// Current grid resolution.
    fn resolution(&self) -> GridResolution;

    /// A copy resampled to `resolution`. Same resolution is the identity.
    fn resize(&self, resolution: GridResolution, mode: ResizeMode) -> Result<Self>;

    /// Configured `(low, high)` range for [`Self::reinitialize`].
    fn init_range(&self) -> (f32, f32);

    /// Redraw every parameter uniformly from `[low, high]`.
    fn reinitialize(&mut self, low: f32, high: f32);

    /// Trainable tensors, in a stable order.
    fn parameters(&self) -> Vec<Tensor<B, 2>>;

    /// Replace the trainable tensors, in the order of [`Self::parameters`].
    fn set_parameters(&mut self, parameters: Vec<Tensor<B, 2>>) -> Result<()>;

    /// Differentiable render with the training sample count.
    fn render(&self, rays: &Rays, diffuse: bool) -> Result<RenderOutput<B>>;

    /// Detached, chunked render with the inference sample count.
    fn render_for_inference(&self, rays: &Rays, diffuse: bool, verbose: bool) -> Result<RenderOutput<B>>;

    /// The procedure this representation is drawn with.
    fn render_procedure(&self) -> RenderProcedure;

    /// Renderer parameters.
    fn render_config(&self) -> &RenderConfig;

    /// Device holding the parameters.
    fn device(&self) -> B::Device;

    /// Host copy for checkpoints.
    fn snapshot(&self) -> Result<GridSnapshot>;
}

/// A [`VoxelGrid`] drawn with the SH voxel-grid renderer.
#[derive(Debug, Clone)]
pub struct ShVoxelGridModel<B: Backend> {
    /// The trainable grid.
    pub grid: VoxelGrid<B>,
    render_config: RenderConfig,
}

impl<B: Backend> ShVoxelGridModel<B> {
    /// Create a freshly initialised model.
    pub fn new(grid: &VoxelGridConfig, render_config: RenderConfig, device: &B::Device) -> Result<Self> {
        render_config.validate().map_err(NeuralAtomError::config)?;
        Ok(Self {
            grid: VoxelGrid::new(grid, device)?,
            render_config,
        })
    }

    /// Wrap an existing grid.
    pub fn from_grid(grid: VoxelGrid<B>, render_config: RenderConfig) -> Self {
        Self { grid, render_config }
    }
}

impl<B: Backend> VolumetricModel<B> for ShVoxelGridModel<B> {
    fn resolution(&self) -> GridResolution {
        self.grid.resolution()
    }

    fn resize(&self, resolution: GridResolution, mode: ResizeMode) -> Result<Self> {
        Ok(Self {
            grid: self.grid.resize(resolution, mode)?,
            render_config: self.render_config.clone(),
        })
    }

    fn init_range(&self) -> (f32, f32) {
        self.grid.init_range()
    }

    fn reinitialize(&mut self, low: f32, high: f32) {
        self.grid.reinitialize(low, high);
    }

    fn parameters(&self) -> Vec<Tensor<B, 2>> {
        vec![self.grid.densities.clone(), self.grid.features.clone()]
    }

    fn set_parameters(&mut self, parameters: Vec<Tensor<B, 2>>) -> Result<()> {
        let [densities, features]: [Tensor<B, 2>; 2] =
            parameters
                .try_into()
                .map_err(|p: Vec<Tensor<B, 2>>| NeuralAtomError::ShapeMismatch {
                    expected: vec![2],
                    got: vec![p.len()],
                })?;
        self.grid.set_values(densities, features)
    }

    fn render(&self, rays: &Rays, diffuse: bool) -> Result<RenderOutput<B>> {
        render_sh_voxel_grid(
            &self.grid,
            rays,
            self.render_config.num_samples_per_ray,
            self.render_config.white_bkgd,
            diffuse,
        )
    }

    fn render_for_inference(&self, rays: &Rays, diffuse: bool, verbose: bool) -> Result<RenderOutput<B>> {
        render_in_chunks(&self.grid.detached(), rays, &self.render_config, diffuse, verbose)
    }

    fn render_procedure(&self) -> RenderProcedure {
        RenderProcedure::ShVoxelGrid
    }

    fn render_config(&self) -> &RenderConfig {
        &self.render_config
    }

    fn device(&self) -> B::Device {
        self.grid.device()
    }

    fn snapshot(&self) -> Result<GridSnapshot> {
        self.grid.snapshot()
    }
}
