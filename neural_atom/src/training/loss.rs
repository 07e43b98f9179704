//! Reconstruction losses and PSNR.

use atom_core::mse_to_psnr;
use burn::prelude::*;
use burn::tensor::ElementConversion;

use crate::error::{NeuralAtomError, Result};

/// Losses and metrics for one rendered batch.
#[derive(Debug, Clone)]
pub struct LossReport<B: Backend> {
    /// Differentiable total loss, a one-element tensor.
    pub total: Tensor<B, 1>,
    /// Mean absolute error of the specular render.
    pub specular_loss: f32,
    /// PSNR of the specular render.
    pub specular_psnr: f32,
    /// Mean absolute error of the diffuse render, when one was supplied.
    pub diffuse_loss: Option<f32>,
    /// PSNR of the diffuse render, when one was supplied.
    pub diffuse_psnr: Option<f32>,
    /// Host value of `total`.
    pub total_loss: f32,
}

impl<B: Backend> LossReport<B> {
    /// Whether every reported value is finite.
    pub fn is_finite(&self) -> bool {
        self.total_loss.is_finite()
            && self.specular_loss.is_finite()
            && self.diffuse_loss.map_or(true, f32::is_finite)
    }

    /// Named scalars, specular first, in a fixed order.
    pub fn scalars(&self) -> Vec<(&'static str, f32)> {
        let mut scalars = vec![
            ("specular_loss", self.specular_loss),
            ("specular_psnr", self.specular_psnr),
        ];
        if let (Some(loss), Some(psnr)) = (self.diffuse_loss, self.diffuse_psnr) {
            scalars.push(("diffuse_loss", loss));
            scalars.push(("diffuse_psnr", psnr));
        }
        scalars.push(("total_loss", self.total_loss));
        scalars
    }
}

/// L1 reconstruction loss with PSNR reporting.
#[derive(Debug, Clone, Copy)]
pub struct LossEvaluator {
    max_val: f32,
}

impl Default for LossEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

impl LossEvaluator {
    /// Evaluator for colours in `[0, 1]`.
    pub fn new() -> Self {
        Self { max_val: 1.0 }
    }

    fn check_shape<B: Backend>(render: &Tensor<B, 2>, target: &Tensor<B, 2>) -> Result<()> {
        if render.dims() != target.dims() {
            return Err(NeuralAtomError::ShapeMismatch {
                expected: target.dims().to_vec(),
                got: render.dims().to_vec(),
            });
        }
        Ok(())
    }

    /// L1 loss tensor and PSNR of one render.
    fn component<B: Backend>(&self, render: Tensor<B, 2>, target: Tensor<B, 2>) -> (Tensor<B, 1>, f32, f32) {
        let diff = render - target;
        let loss = diff.clone().abs().mean();
        let detached = diff.detach();
        let mse = scalar((detached.clone() * detached).mean());
        let loss_value = scalar(loss.clone());
        (loss, loss_value, mse_to_psnr(mse, self.max_val))
    }

    /// Score a specular render and an optional diffuse render against the
    /// same target.
    ///
    /// The total is the specular loss plus the diffuse loss when present;
    /// without a diffuse render it is the specular loss itself.
    pub fn evaluate<B: Backend>(
        &self,
        specular: Tensor<B, 2>,
        diffuse: Option<Tensor<B, 2>>,
        target: Tensor<B, 2>,
    ) -> Result<LossReport<B>> {
        Self::check_shape(&specular, &target)?;
        if let Some(diffuse) = &diffuse {
            Self::check_shape(diffuse, &target)?;
        }

        let (specular_t, specular_loss, specular_psnr) = self.component(specular, target.clone());

        match diffuse {
            Some(diffuse) => {
                let (diffuse_t, diffuse_loss, diffuse_psnr) = self.component(diffuse, target);
                let total = specular_t + diffuse_t;
                let total_loss = scalar(total.clone());
                Ok(LossReport {
                    total,
                    specular_loss,
                    specular_psnr,
                    diffuse_loss: Some(diffuse_loss),
                    diffuse_psnr: Some(diffuse_psnr),
                    total_loss,
                })
            }
            None => Ok(LossReport {
                total: specular_t,
                specular_loss,
                specular_psnr,
                diffuse_loss: None,
                diffuse_psnr: None,
                total_loss: specular_loss,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atom_core::PSNR_CAP;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tensor(values: Vec<f32>) -> Tensor<TestBackend, 2> {
        let n = values.len() / 3;
        Tensor::from_data(TensorData::new(values, [n, 3]), &Default::default())
    }

    #[test]
    fn test_specular_only() {
        let evaluator = LossEvaluator::new();
        let report = evaluator
            .evaluate(tensor(vec![0.5; 6]), None, tensor(vec![0.4; 6]))
            .unwrap();

        assert!((report.specular_loss - 0.1).abs() < 1e-6);
        assert!((report.specular_psnr - 20.0).abs() < 1e-3);
        assert!(report.diffuse_loss.is_none());
        assert!(report.diffuse_psnr.is_none());
        assert_eq!(report.total_loss.to_bits(), report.specular_loss.to_bits());

        let names: Vec<_> = report.scalars().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["specular_loss", "specular_psnr", "total_loss"]);
    }

    #[test]
    fn test_with_diffuse() {
        let evaluator = LossEvaluator::new();
        let report = evaluator
            .evaluate(tensor(vec![0.5; 3]), Some(tensor(vec![0.2; 3])), tensor(vec![0.4; 3]))
            .unwrap();

        assert!((report.diffuse_loss.unwrap() - 0.2).abs() < 1e-6);
        assert!((report.total_loss - 0.3).abs() < 1e-6);
        assert_eq!(report.scalars().len(), 5);
    }

    #[test]
    fn test_perfect_render_is_capped() {
        let evaluator = LossEvaluator::new();
        let report = evaluator
            .evaluate(tensor(vec![0.3; 3]), None, tensor(vec![0.3; 3]))
            .unwrap();
        assert_eq!(report.specular_loss, 0.0);
        assert_eq!(report.specular_psnr, PSNR_CAP);
    }

    #[test]
    fn test_shape_mismatch() {
        let evaluator = LossEvaluator::new();
        assert!(matches!(
            evaluator.evaluate(tensor(vec![0.0; 6]), None, tensor(vec![0.0; 3])),
            Err(NeuralAtomError::ShapeMismatch { .. })
        ));
    }
}
