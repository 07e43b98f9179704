//! Held-out evaluation.

use atom_core::cast_rays;
use burn::prelude::*;

use crate::data::PosedImageSource;
use crate::error::{NeuralAtomError, Result};
use crate::model::VolumetricModel;

use super::loss::LossEvaluator;

/// Mean scores over a held-out set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldOutScores {
    /// Number of images scored.
    pub num_images: usize,
    /// Mean L1 loss of the specular renders.
    pub specular_loss: f32,
    /// Mean PSNR of the specular renders.
    pub specular_psnr: f32,
    /// Mean L1 loss of the diffuse renders, when scored.
    pub diffuse_loss: Option<f32>,
    /// Mean PSNR of the diffuse renders, when scored.
    pub diffuse_psnr: Option<f32>,
}

impl HeldOutScores {
    /// Named scalars with a `test_` prefix.
    pub fn scalars(&self) -> Vec<(&'static str, f32)> {
        let mut scalars = vec![
            ("test_specular_loss", self.specular_loss),
            ("test_specular_psnr", self.specular_psnr),
        ];
        if let (Some(loss), Some(psnr)) = (self.diffuse_loss, self.diffuse_psnr) {
            scalars.push(("test_diffuse_loss", loss));
            scalars.push(("test_diffuse_psnr", psnr));
        }
        scalars
    }
}

/// Render every image of `source` from its pose and average the losses.
pub fn evaluate_held_out<B: Backend, M: VolumetricModel<B>>(
    model: &M,
    source: &dyn PosedImageSource,
    evaluator: &LossEvaluator,
    diffuse: bool,
    verbose: bool,
) -> Result<HeldOutScores> {
    if source.is_empty() {
        return Err(NeuralAtomError::InvalidData("held-out set is empty".to_string()));
    }

    let intrinsics = source.intrinsics();
    let bounds = source.bounds();
    let device = model.device();

    let mut specular = (0.0f32, 0.0f32);
    let mut diffuse_sum = (0.0f32, 0.0f32);
    for index in 0..source.len() {
        let frame = source.get(index)?;
        let rays = cast_rays(&intrinsics, &frame.pose, bounds);
        let target = frame.image.to_tensor::<B>(&device);

        let rendered = model.render_for_inference(&rays, false, verbose)?;
        let diffuse_render = if diffuse {
            Some(model.render_for_inference(&rays, true, verbose)?.colour)
        } else {
            None
        };

        let report = evaluator.evaluate(rendered.colour, diffuse_render, target)?;
        specular.0 += report.specular_loss;
        specular.1 += report.specular_psnr;
        if let (Some(loss), Some(psnr)) = (report.diffuse_loss, report.diffuse_psnr) {
            diffuse_sum.0 += loss;
            diffuse_sum.1 += psnr;
        }
    }

    let n = source.len() as f32;
    let scores = HeldOutScores {
        num_images: source.len(),
        specular_loss: specular.0 / n,
        specular_psnr: specular.1 / n,
        diffuse_loss: diffuse.then(|| diffuse_sum.0 / n),
        diffuse_psnr: diffuse.then(|| diffuse_sum.1 / n),
    };

    log::info!(
        "Held-out evaluation on {} images: specular_loss {:.5} specular_psnr {:.3}",
        scores.num_images,
        scores.specular_loss,
        scores.specular_psnr
    );

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RenderConfig, VoxelGridConfig};
    use crate::data::{Image, PosedImage, PosedImagesDataset};
    use crate::model::ShVoxelGridModel;
    use atom_core::{CameraBounds, CameraIntrinsics, CameraPose, Point3};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn dataset(rgb: [f32; 3]) -> PosedImagesDataset {
        let pose = CameraPose::look_at(
            Point3::new(0.0, 0.0, 3.0),
            Point3::splat(0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let frames = (0..2)
            .map(|_| PosedImage {
                image: Image::filled(4, 4, rgb),
                pose,
            })
            .collect();
        PosedImagesDataset::new(
            CameraIntrinsics::new(4, 4, 4.0),
            CameraBounds::new(1.0, 5.0).unwrap(),
            frames,
        )
        .unwrap()
    }

    fn empty_model() -> ShVoxelGridModel<TestBackend> {
        let device = Default::default();
        let config = VoxelGridConfig::new([4, 4, 4]);
        let render = RenderConfig::default().with_render_num_samples_per_ray(8);
        let mut model = ShVoxelGridModel::new(&config, render, &device).unwrap();
        // Zero density everywhere: every ray renders the black background.
        let d = model.grid.densities.clone().zeros_like().sub_scalar(1.0);
        let f = model.grid.features.clone();
        model.grid.set_values(d, f).unwrap();
        model
    }

    #[test]
    fn test_black_target_on_empty_grid_is_perfect() {
        let scores =
            evaluate_held_out(&empty_model(), &dataset([0.0; 3]), &LossEvaluator::new(), true, false).unwrap();

        assert_eq!(scores.num_images, 2);
        assert!(scores.specular_loss.abs() < 1e-6);
        assert_eq!(scores.diffuse_loss.map(f32::abs).map(|l| l < 1e-6), Some(true));
        assert!(scores.specular_psnr > 60.0);
        assert_eq!(scores.scalars().len(), 4);
    }

    #[test]
    fn test_scores_without_diffuse() {
        let scores =
            evaluate_held_out(&empty_model(), &dataset([0.5; 3]), &LossEvaluator::new(), false, false).unwrap();

        assert!((scores.specular_loss - 0.5).abs() < 1e-5);
        assert_eq!(scores.diffuse_loss, None);
        let names: Vec<_> = scores.scalars().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["test_specular_loss", "test_specular_psnr"]);
    }
}
