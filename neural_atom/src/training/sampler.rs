//! Ray/pixel batch sampling.

use atom_core::{cast_rays, CameraBounds, CameraIntrinsics, Rays};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::PosedImage;
use crate::error::{NeuralAtomError, Result};

/// Rays and the pixel colours they should reproduce.
#[derive(Debug, Clone)]
pub struct RayPixelBatch {
    /// Sampled rays.
    pub rays: Rays,
    /// RGB per ray, flat `[num_rays * 3]`.
    pub pixels: Vec<f32>,
    /// Pool index of every sampled ray, `image * H * W + y * W + x`.
    pub indices: Vec<usize>,
}

impl RayPixelBatch {
    /// Number of sampled rays.
    pub fn len(&self) -> usize {
        self.rays.len()
    }

    /// True when nothing was sampled.
    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    /// Target colours as a `[num_rays, 3]` tensor.
    pub fn pixels_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(TensorData::new(self.pixels.clone(), [self.len(), 3]), device)
    }
}

/// Draws aligned random subsets of rays and pixels from image batches.
pub struct RaySampler {
    rng: StdRng,
}

impl RaySampler {
    /// Create a seeded sampler.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Cast every pixel's ray, then draw `batch_size` distinct rays uniformly
    /// without replacement together with their pixels.
    ///
    /// Fails when `batch_size` exceeds the number of pixels available.
    pub fn sample(
        &mut self,
        images: &[PosedImage],
        intrinsics: &CameraIntrinsics,
        bounds: CameraBounds,
        batch_size: usize,
    ) -> Result<RayPixelBatch> {
        if images.is_empty() {
            return Err(NeuralAtomError::InvalidData("empty image batch".to_string()));
        }

        let per_image = intrinsics.num_pixels();
        let mut all_rays = Vec::with_capacity(images.len());
        let mut all_pixels = Vec::with_capacity(images.len() * per_image * 3);
        for frame in images {
            if frame.image.width() != intrinsics.width || frame.image.height() != intrinsics.height {
                return Err(NeuralAtomError::ShapeMismatch {
                    expected: vec![intrinsics.height, intrinsics.width],
                    got: vec![frame.image.height(), frame.image.width()],
                });
            }
            all_rays.push(cast_rays(intrinsics, &frame.pose, bounds));
            all_pixels.extend_from_slice(frame.image.pixels());
        }
        let pool = Rays::collate(&all_rays, bounds);

        if batch_size > pool.len() {
            return Err(NeuralAtomError::config(format!(
                "ray batch size {} exceeds the {} rays available",
                batch_size,
                pool.len()
            )));
        }

        let indices = rand::seq::index::sample(&mut self.rng, pool.len(), batch_size).into_vec();
        let mut pixels = Vec::with_capacity(batch_size * 3);
        for &i in &indices {
            pixels.extend_from_slice(&all_pixels[i * 3..i * 3 + 3]);
        }

        Ok(RayPixelBatch {
            rays: pool.gather(&indices),
            pixels,
            indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Image;
    use atom_core::{CameraPose, Point3};
    use std::collections::HashSet;

    fn gradient_image(width: usize, height: usize, tag: f32) -> Image {
        let mut pixels = Vec::new();
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[x as f32 / 10.0, y as f32 / 10.0, tag]);
            }
        }
        Image::new(width, height, pixels).unwrap()
    }

    fn frames() -> Vec<PosedImage> {
        vec![
            PosedImage {
                image: gradient_image(4, 3, 0.0),
                pose: CameraPose::identity(),
            },
            PosedImage {
                image: gradient_image(4, 3, 1.0),
                pose: CameraPose::look_at(
                    Point3::new(3.0, 0.0, 0.0),
                    Point3::splat(0.0),
                    Point3::new(0.0, 1.0, 0.0),
                ),
            },
        ]
    }

    #[test]
    fn test_rays_and_pixels_aligned() {
        let intrinsics = CameraIntrinsics::new(3, 4, 2.0);
        let bounds = CameraBounds::new(0.5, 4.0).unwrap();
        let images = frames();
        let mut sampler = RaySampler::new(3);

        let batch = sampler.sample(&images, &intrinsics, bounds, 10).unwrap();
        assert_eq!(batch.len(), 10);
        assert_eq!(batch.pixels.len(), 30);

        let unique: HashSet<_> = batch.indices.iter().collect();
        assert_eq!(unique.len(), 10);

        for (n, &index) in batch.indices.iter().enumerate() {
            let image = index / 12;
            let (y, x) = ((index % 12) / 4, index % 4);
            let expected_pixel = images[image].image.pixel(x, y);
            assert_eq!(&batch.pixels[n * 3..n * 3 + 3], &expected_pixel[..]);

            let expected_dir = images[image].pose.pixel_direction(&intrinsics, x, y);
            assert_eq!(batch.rays.directions[n], expected_dir);
            assert_eq!(batch.rays.origins[n], images[image].pose.origin());
        }
    }

    #[test]
    fn test_full_pool_is_permutation() {
        let intrinsics = CameraIntrinsics::new(3, 4, 2.0);
        let bounds = CameraBounds::new(0.5, 4.0).unwrap();
        let mut sampler = RaySampler::new(0);
        let batch = sampler.sample(&frames(), &intrinsics, bounds, 24).unwrap();

        let mut indices = batch.indices.clone();
        indices.sort();
        assert_eq!(indices, (0..24).collect::<Vec<_>>());
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let intrinsics = CameraIntrinsics::new(3, 4, 2.0);
        let bounds = CameraBounds::new(0.5, 4.0).unwrap();
        let mut sampler = RaySampler::new(0);
        assert!(matches!(
            sampler.sample(&frames(), &intrinsics, bounds, 25),
            Err(NeuralAtomError::InvalidConfig { .. })
        ));
        assert!(sampler.sample(&[], &intrinsics, bounds, 1).is_err());
    }
}
