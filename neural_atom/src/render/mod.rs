//! Volumetric rendering of spherical-harmonics voxel grids.
//!
//! Rays are marched with uniformly spaced samples between the near and far
//! bounds, the grid is trilinearly sampled at every point and the samples are
//! alpha-composited front to back.

use atom_core::{diffuse_sh_basis, eval_sh_basis, num_sh_coeffs, Rays};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};

use crate::config::RenderConfig;
use crate::error::{NeuralAtomError, Result};
use crate::grid::{interpolate, SampleCorners, VoxelGrid};

/// Rendered colours for a bundle of rays.
#[derive(Debug, Clone)]
pub struct RenderOutput<B: Backend> {
    /// RGB per ray, `[num_rays, 3]`.
    pub colour: Tensor<B, 2>,
    /// Accumulated opacity per ray, `[num_rays, 1]`.
    pub opacity: Tensor<B, 2>,
}

impl<B: Backend> RenderOutput<B> {
    /// Number of rendered rays.
    pub fn num_rays(&self) -> usize {
        self.colour.dims()[0]
    }

    /// Join chunk outputs in order.
    pub fn cat(parts: Vec<RenderOutput<B>>) -> Self {
        let (colours, opacities): (Vec<_>, Vec<_>) =
            parts.into_iter().map(|p| (p.colour, p.opacity)).unzip();
        Self {
            colour: Tensor::cat(colours, 0),
            opacity: Tensor::cat(opacities, 0),
        }
    }
}

/// Strictly upper-triangular ones: `m[j][i] = 1` when `j < i`.
///
/// `x.matmul(m)` is the exclusive cumulative sum of `x` along its rows.
fn exclusive_cumsum_matrix<B: Backend>(n: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut data = vec![0.0f32; n * n];
    for j in 0..n {
        for i in (j + 1)..n {
            data[j * n + i] = 1.0;
        }
    }
    Tensor::from_data(TensorData::new(data, [n, n]), device)
}

/// Render one bundle of rays in a single pass.
///
/// With `diffuse` set only the constant SH term contributes, giving a
/// view-independent colour.
pub fn render_sh_voxel_grid<B: Backend>(
    grid: &VoxelGrid<B>,
    rays: &Rays,
    num_samples: usize,
    white_bkgd: bool,
    diffuse: bool,
) -> Result<RenderOutput<B>> {
    if rays.is_empty() {
        return Err(NeuralAtomError::InvalidData("no rays to render".to_string()));
    }
    if num_samples == 0 {
        return Err(NeuralAtomError::config("num_samples must be positive"));
    }

    let device = grid.device();
    let n_rays = rays.len();
    let n_points = n_rays * num_samples;
    let k = num_sh_coeffs(grid.sh_degree())?;

    let near = rays.bounds.near;
    let dt = (rays.bounds.far - near) / num_samples as f32;

    let mut points = Vec::with_capacity(n_points);
    let mut basis = Vec::with_capacity(n_points * k);
    let diffuse_basis = diffuse_sh_basis(grid.sh_degree())?;
    for (origin, direction) in rays.origins.iter().zip(rays.directions.iter()) {
        let ray_basis = if diffuse {
            diffuse_basis
        } else {
            eval_sh_basis(grid.sh_degree(), *direction)?
        };
        for s in 0..num_samples {
            let t = near + dt * (s as f32 + 0.5);
            points.push(*origin + *direction * t);
            basis.extend_from_slice(&ray_basis[..k]);
        }
    }

    let corners = SampleCorners::from_points(&points, grid.extent(), grid.resolution());

    // [n_rays, num_samples]
    let sigma = relu(interpolate(grid.densities.clone(), &corners, &device))
        .reshape([n_rays, num_samples]);

    // [n_points, 3, K] . [n_points, 1, K] -> [n_rays, num_samples, 3]
    let features = interpolate(grid.features.clone(), &corners, &device).reshape([n_points, 3, k]);
    let basis = Tensor::<B, 3>::from_data(TensorData::new(basis, [n_points, 1, k]), &device);
    let rgb = sigmoid((features * basis).sum_dim(2)).reshape([n_rays, num_samples, 3]);

    let sigma_dt = sigma * dt;
    let alpha = sigma_dt.clone().neg().exp().neg().add_scalar(1.0);
    let transmittance = sigma_dt
        .matmul(exclusive_cumsum_matrix::<B>(num_samples, &device))
        .neg()
        .exp();
    let weights = transmittance * alpha;

    let colour = (weights.clone().reshape([n_rays, num_samples, 1]) * rgb)
        .sum_dim(1)
        .reshape([n_rays, 3]);
    let opacity = weights.sum_dim(1);

    let colour = if white_bkgd {
        colour + opacity.clone().neg().add_scalar(1.0)
    } else {
        colour
    };

    Ok(RenderOutput { colour, opacity })
}

/// Render a large bundle in chunks of `config.parallel_rays_chunk_size` rays
/// with the inference sample count.
pub fn render_in_chunks<B: Backend>(
    grid: &VoxelGrid<B>,
    rays: &Rays,
    config: &RenderConfig,
    diffuse: bool,
    verbose: bool,
) -> Result<RenderOutput<B>> {
    let chunk = config.parallel_rays_chunk_size.max(1);
    let num_chunks = rays.len().div_ceil(chunk);
    let mut parts = Vec::with_capacity(num_chunks);

    for (index, start) in (0..rays.len()).step_by(chunk).enumerate() {
        if verbose {
            log::debug!("Rendering chunk {}/{}", index + 1, num_chunks);
        }
        let part = rays.slice(start, start + chunk);
        parts.push(render_sh_voxel_grid(
            grid,
            &part,
            config.render_num_samples_per_ray,
            config.white_bkgd,
            diffuse,
        )?);
    }

    if parts.is_empty() {
        return Err(NeuralAtomError::InvalidData("no rays to render".to_string()));
    }
    Ok(RenderOutput::cat(parts))
}
