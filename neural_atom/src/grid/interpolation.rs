//! Batched trilinear lookup on burn tensors.
//!
//! Corner indices and weights are computed on the host with atom_core; the
//! gather and weighted sum run on the backend so gradients reach the grid.

use atom_core::{grid_corners, world_to_grid, GridResolution, Point3};
use burn::prelude::*;

/// Corner indices and weights for a batch of sample points, eight per sample.
#[derive(Debug, Clone, Default)]
pub struct SampleCorners {
    /// Flat voxel indices, `8 * num_samples` entries.
    pub indices: Vec<i64>,
    /// Trilinear weights aligned with `indices`.
    pub weights: Vec<f32>,
    /// Number of sample points.
    pub num_samples: usize,
}

impl SampleCorners {
    /// Locate the corners of every point in a grid spanning
    /// `[-extent / 2, extent / 2]^3`.
    ///
    /// Points outside the cube get zero weights, so they read back as zero.
    pub fn from_points(points: &[Point3], extent: f32, resolution: GridResolution) -> Self {
        let mut indices = Vec::with_capacity(points.len() * 8);
        let mut weights = Vec::with_capacity(points.len() * 8);

        for point in points {
            match world_to_grid(*point, extent, resolution) {
                Some(coord) => {
                    let corners = grid_corners(resolution, coord);
                    indices.extend(corners.indices.iter().map(|&i| i as i64));
                    weights.extend_from_slice(&corners.weights);
                }
                None => {
                    indices.extend_from_slice(&[0i64; 8]);
                    weights.extend_from_slice(&[0.0; 8]);
                }
            }
        }

        Self {
            indices,
            weights,
            num_samples: points.len(),
        }
    }
}

/// Interpolate the rows of `values` (`[num_voxels, C]`) at the sampled corners.
///
/// Returns `[num_samples, C]`.
pub fn interpolate<B: Backend>(
    values: Tensor<B, 2>,
    corners: &SampleCorners,
    device: &B::Device,
) -> Tensor<B, 2> {
    let channels = values.dims()[1];
    let n = corners.num_samples;

    let indices = Tensor::<B, 1, Int>::from_data(corners.indices.as_slice(), device);
    let weights = Tensor::<B, 3>::from_data(
        TensorData::new(corners.weights.clone(), [n, 8, 1]),
        device,
    );

    // [n * 8, C] -> [n, 8, C]
    let corner_values = values.select(0, indices).reshape([n, 8, channels]);

    (corner_values * weights).sum_dim(1).reshape([n, channels])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_interpolate_linear_ramp() {
        let device = Default::default();
        let res = GridResolution::new(3, 2, 2);

        // Value equals the x vertex index.
        let mut data = Vec::new();
        for _k in 0..2 {
            for _j in 0..2 {
                for i in 0..3 {
                    data.push(i as f32);
                }
            }
        }
        let values = Tensor::<TestBackend, 2>::from_data(TensorData::new(data, [12, 1]), &device);

        // Extent 2 maps x = -1..1 onto vertices 0..2.
        let points = [Point3::new(-1.0, 0.0, 0.0), Point3::new(0.5, -1.0, 1.0)];
        let corners = SampleCorners::from_points(&points, 2.0, res);
        let out: Vec<f32> = interpolate(values, &corners, &device).into_data().to_vec().unwrap();

        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_outside_points_read_zero() {
        let device = Default::default();
        let res = GridResolution::cube(2);
        let values = Tensor::<TestBackend, 2>::ones([8, 3], &device);

        let corners = SampleCorners::from_points(&[Point3::new(5.0, 0.0, 0.0)], 2.0, res);
        let out: Vec<f32> = interpolate(values, &corners, &device).into_data().to_vec().unwrap();
        assert_eq!(out, vec![0.0, 0.0, 0.0]);
    }
}
