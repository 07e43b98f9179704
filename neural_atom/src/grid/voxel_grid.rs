//! Dense spherical-harmonics voxel grid.

use std::fmt;

use atom_core::{num_sh_coeffs, resample_grid, GridResolution, ResampleMode};
use burn::prelude::*;
use burn::tensor::Distribution;

use crate::config::VoxelGridConfig;
use crate::error::{tensor_to_vec, NeuralAtomError, Result};

/// Dense grid of densities and SH colour coefficients backed by Burn tensors.
///
/// Values live on grid vertices in [`GridResolution::flat_index`] order:
/// - `densities`: `[num_voxels, 1]`, raw (pre-activation) density
/// - `features`: `[num_voxels, 3 * K]`, `K = (sh_degree + 1)^2` coefficients
///   per colour channel, channel-major (`r0..rK, g0..gK, b0..bK`)
///
/// Both tensors are marked as requiring gradients.
pub struct VoxelGrid<B: Backend> {
    /// Raw densities.
    pub densities: Tensor<B, 2>,
    /// SH coefficients.
    pub features: Tensor<B, 2>,
    resolution: GridResolution,
    extent: f32,
    sh_degree: u32,
    init_range: (f32, f32),
}

/// Initialisation range of grids restored from a snapshot.
pub const DEFAULT_INIT_RANGE: (f32, f32) = (-1.0, 1.0);

/// Host copy of a grid, used for checkpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    /// Vertices per axis.
    pub resolution: [usize; 3],
    /// Side length of the cube.
    pub extent: f32,
    /// SH degree of the features.
    pub sh_degree: u32,
    /// Flat densities.
    pub densities: Vec<f32>,
    /// Flat features, row-major `[num_voxels, feature_dim]`.
    pub features: Vec<f32>,
}

impl GridSnapshot {
    /// Width of one feature row.
    pub fn feature_dim(&self) -> Result<usize> {
        Ok(3 * num_sh_coeffs(self.sh_degree)?)
    }

    /// Number of grid vertices.
    pub fn num_voxels(&self) -> usize {
        GridResolution::from(self.resolution).num_voxels()
    }
}

impl<B: Backend> VoxelGrid<B> {
    /// Create a grid with values drawn uniformly from the configured range.
    pub fn new(config: &VoxelGridConfig, device: &B::Device) -> Result<Self> {
        config.validate().map_err(NeuralAtomError::config)?;
        let resolution = config.grid_resolution();
        let feature_dim = 3 * num_sh_coeffs(config.sh_degree)?;
        let n = resolution.num_voxels();
        let (low, high) = (config.init_low as f64, config.init_high as f64);

        Ok(Self {
            densities: Tensor::random([n, 1], Distribution::Uniform(low, high), device)
                .require_grad(),
            features: Tensor::random([n, feature_dim], Distribution::Uniform(low, high), device)
                .require_grad(),
            resolution,
            extent: config.extent,
            sh_degree: config.sh_degree,
            init_range: (config.init_low, config.init_high),
        })
    }

    /// Rebuild a grid from a host snapshot.
    pub fn from_snapshot(snapshot: &GridSnapshot, device: &B::Device) -> Result<Self> {
        let resolution = GridResolution::from(snapshot.resolution);
        if resolution.is_empty() {
            return Err(atom_core::AtomCoreError::EmptyResolution.into());
        }
        let n = resolution.num_voxels();
        let feature_dim = snapshot.feature_dim()?;

        if snapshot.densities.len() != n {
            return Err(NeuralAtomError::ShapeMismatch {
                expected: vec![n, 1],
                got: vec![snapshot.densities.len()],
            });
        }
        if snapshot.features.len() != n * feature_dim {
            return Err(NeuralAtomError::ShapeMismatch {
                expected: vec![n, feature_dim],
                got: vec![snapshot.features.len()],
            });
        }

        Ok(Self {
            densities: Tensor::<B, 2>::from_data(
                TensorData::new(snapshot.densities.clone(), [n, 1]),
                device,
            )
            .require_grad(),
            features: Tensor::<B, 2>::from_data(
                TensorData::new(snapshot.features.clone(), [n, feature_dim]),
                device,
            )
            .require_grad(),
            resolution,
            extent: snapshot.extent,
            sh_degree: snapshot.sh_degree,
            init_range: DEFAULT_INIT_RANGE,
        })
    }

    /// Vertices per axis.
    pub fn resolution(&self) -> GridResolution {
        self.resolution
    }

    /// Side length of the cube the grid spans.
    pub fn extent(&self) -> f32 {
        self.extent
    }

    /// SH degree of the colour features.
    pub fn sh_degree(&self) -> u32 {
        self.sh_degree
    }

    /// Number of grid vertices.
    pub fn num_voxels(&self) -> usize {
        self.resolution.num_voxels()
    }

    /// Width of one feature row.
    pub fn feature_dim(&self) -> usize {
        self.features.dims()[1]
    }

    /// Get the device of the grid tensors.
    pub fn device(&self) -> B::Device {
        self.densities.device()
    }

    /// Range the trainer redraws values from before the first stage.
    pub fn init_range(&self) -> (f32, f32) {
        self.init_range
    }

    /// Replace the initialisation range, e.g. after [`Self::from_snapshot`].
    pub fn with_init_range(mut self, low: f32, high: f32) -> Result<Self> {
        if low.is_nan() || high.is_nan() || low >= high {
            return Err(NeuralAtomError::config("init_low must be below init_high"));
        }
        self.init_range = (low, high);
        Ok(self)
    }

    /// Redraw every value uniformly from `[low, high]`, keeping the resolution.
    pub fn reinitialize(&mut self, low: f32, high: f32) {
        let device = self.device();
        let (low, high) = (low as f64, high as f64);
        let n = self.num_voxels();
        let feature_dim = self.feature_dim();
        self.densities =
            Tensor::random([n, 1], Distribution::Uniform(low, high), &device).require_grad();
        self.features =
            Tensor::random([n, feature_dim], Distribution::Uniform(low, high), &device)
                .require_grad();
    }

    /// Replace both tensors, checking their shapes.
    pub fn set_values(&mut self, densities: Tensor<B, 2>, features: Tensor<B, 2>) -> Result<()> {
        let expected_d = [self.num_voxels(), 1];
        if densities.dims() != expected_d {
            return Err(NeuralAtomError::ShapeMismatch {
                expected: expected_d.to_vec(),
                got: densities.dims().to_vec(),
            });
        }
        let expected_f = [self.num_voxels(), self.feature_dim()];
        if features.dims() != expected_f {
            return Err(NeuralAtomError::ShapeMismatch {
                expected: expected_f.to_vec(),
                got: features.dims().to_vec(),
            });
        }
        self.densities = densities.require_grad();
        self.features = features.require_grad();
        Ok(())
    }

    /// Resample into a new grid at `resolution`.
    ///
    /// Resizing to the current resolution returns an identical copy.
    pub fn resize(&self, resolution: GridResolution, mode: ResampleMode) -> Result<Self> {
        if resolution == self.resolution {
            return Ok(self.clone());
        }

        let device = self.device();
        let feature_dim = self.feature_dim();
        let densities = tensor_to_vec(self.densities.clone())?;
        let features = tensor_to_vec(self.features.clone())?;

        let densities = resample_grid(&densities, 1, self.resolution, resolution, mode)?;
        let features = resample_grid(&features, feature_dim, self.resolution, resolution, mode)?;
        let n = resolution.num_voxels();

        log::debug!("Resized grid {} -> {}", self.resolution, resolution);

        Ok(Self {
            densities: Tensor::<B, 2>::from_data(TensorData::new(densities, [n, 1]), &device)
                .require_grad(),
            features: Tensor::<B, 2>::from_data(
                TensorData::new(features, [n, feature_dim]),
                &device,
            )
            .require_grad(),
            resolution,
            extent: self.extent,
            sh_degree: self.sh_degree,
            init_range: self.init_range,
        })
    }

    /// Copy of the grid cut off from any autodiff graph.
    pub fn detached(&self) -> Self {
        Self {
            densities: self.densities.clone().detach(),
            features: self.features.clone().detach(),
            ..self.clone()
        }
    }

    /// Copy the grid back to the host.
    pub fn snapshot(&self) -> Result<GridSnapshot> {
        Ok(GridSnapshot {
            resolution: self.resolution.as_array(),
            extent: self.extent,
            sh_degree: self.sh_degree,
            densities: tensor_to_vec(self.densities.clone())?,
            features: tensor_to_vec(self.features.clone())?,
        })
    }
}

impl<B: Backend> Clone for VoxelGrid<B> {
    fn clone(&self) -> Self {
        Self {
            densities: self.densities.clone(),
            features: self.features.clone(),
            resolution: self.resolution,
            extent: self.extent,
            sh_degree: self.sh_degree,
            init_range: self.init_range,
        }
    }
}

impl<B: Backend> fmt::Debug for VoxelGrid<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoxelGrid")
            .field("resolution", &self.resolution)
            .field("densities", &self.densities.dims())
            .field("features", &self.features.dims())
            .field("extent", &self.extent)
            .field("sh_degree", &self.sh_degree)
            .field("init_range", &self.init_range)
            .finish()
    }
}
