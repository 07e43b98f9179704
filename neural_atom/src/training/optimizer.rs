//! Adam optimizer and the per-stage optimizer lifecycle.
//!
//! A fresh optimizer is built at the start of every stage, because the
//! parameter tensors change shape when the grid is resized. The previous
//! stage's moments are dropped with it.

use burn::config::Config;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::config::TrainingConfig;
use crate::error::{self, NeuralAtomError};
use crate::model::VolumetricModel;

/// Configuration for the Adam optimizer.
#[derive(Config, Debug)]
pub struct AdamConfig {
    /// Decay of the first-moment estimate.
    #[config(default = 0.9)]
    pub beta_1: f32,

    /// Decay of the second-moment estimate.
    #[config(default = 0.999)]
    pub beta_2: f32,

    /// Epsilon for numerical stability.
    #[config(default = 1e-8)]
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AdamConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.beta_1) || !(0.0..1.0).contains(&self.beta_2) {
            return Err("Adam betas must lie in [0, 1)".to_string());
        }
        if self.epsilon <= 0.0 {
            return Err("Adam epsilon must be positive".to_string());
        }
        Ok(())
    }
}

/// Adam state for a single parameter tensor.
pub struct AdamState<B: Backend> {
    /// Running mean of gradients.
    moment_1: Tensor<B, 2>,
    /// Running mean of squared gradients.
    moment_2: Tensor<B, 2>,
    /// Configuration.
    config: AdamConfig,
    /// Current step count.
    step: usize,
}

impl<B: Backend> AdamState<B> {
    /// Create zeroed moments shaped like `param`.
    pub fn new(param: &Tensor<B, 2>, config: AdamConfig) -> Self {
        Self {
            moment_1: param.zeros_like(),
            moment_2: param.zeros_like(),
            config,
            step: 0,
        }
    }

    /// Perform an optimization step with bias-corrected moments.
    ///
    /// Returns the updated parameter tensor.
    pub fn step(&mut self, param: Tensor<B, 2>, grad: Tensor<B, 2>, learning_rate: f64) -> Tensor<B, 2> {
        self.step += 1;

        let b1 = self.config.beta_1;
        let b2 = self.config.beta_2;

        self.moment_1 = self.moment_1.clone() * b1 + grad.clone() * (1.0 - b1);
        self.moment_2 = self.moment_2.clone() * b2 + grad.clone() * grad * (1.0 - b2);

        let correction_1 = 1.0 - b1.powi(self.step as i32);
        let correction_2 = 1.0 - b2.powi(self.step as i32);

        let m_hat = self.moment_1.clone() / correction_1;
        let v_hat = self.moment_2.clone() / correction_2;
        let update = m_hat / (v_hat.sqrt() + self.config.epsilon);

        param - update * learning_rate as f32
    }

    /// Get the current step count.
    pub fn current_step(&self) -> usize {
        self.step
    }
}

/// Optimizer bound to the parameters of one stage.
pub struct StageOptimizer<B: AutodiffBackend> {
    stage: usize,
    learning_rate: f64,
    config: AdamConfig,
    states: Vec<Option<AdamState<B::InnerBackend>>>,
}

impl<B: AutodiffBackend> StageOptimizer<B> {
    /// Build the optimizer and its decay schedule for a 1-based `stage`.
    ///
    /// The initial rate is `learning_rate * stagewise_lr_decay_gamma^(stage - 1)`.
    pub fn begin_stage(
        stage: usize,
        parameters: &[Tensor<B, 2>],
        config: &TrainingConfig,
    ) -> error::Result<(Self, ExponentialLr)> {
        if parameters.is_empty() {
            return Err(NeuralAtomError::EmptyParameterSet { stage });
        }

        let learning_rate = config.stage_learning_rate(stage);
        log::info!(
            "Stage {}: optimizing {} parameter tensors, learning rate {:.6}",
            stage,
            parameters.len(),
            learning_rate
        );

        let optimizer = Self {
            stage,
            learning_rate,
            config: config.optimizer.clone(),
            states: parameters.iter().map(|_| None).collect(),
        };
        Ok((optimizer, ExponentialLr::new(config.lr_decay_gamma_per_stage)))
    }

    /// The stage this optimizer belongs to.
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Current learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Apply one update to every model parameter that received a gradient.
    ///
    /// Returns the number of updated tensors.
    pub fn step<M: VolumetricModel<B>>(&mut self, model: &mut M, grads: &B::Gradients) -> error::Result<usize> {
        let parameters = model.parameters();
        if parameters.len() != self.states.len() {
            return Err(NeuralAtomError::ShapeMismatch {
                expected: vec![self.states.len()],
                got: vec![parameters.len()],
            });
        }

        let mut updated = 0;
        let mut next = Vec::with_capacity(parameters.len());
        for (param, state) in parameters.into_iter().zip(self.states.iter_mut()) {
            match param.grad(grads) {
                Some(grad) => {
                    let inner = param.inner();
                    let state = state.get_or_insert_with(|| AdamState::new(&inner, self.config.clone()));
                    next.push(Tensor::from_inner(state.step(inner, grad, self.learning_rate)));
                    updated += 1;
                }
                None => next.push(param),
            }
        }

        model.set_parameters(next)?;
        Ok(updated)
    }
}

/// Multiplies a stage optimizer's learning rate by a fixed factor per step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialLr {
    gamma: f64,
}

impl ExponentialLr {
    /// Create a schedule with decay factor `gamma`.
    pub fn new(gamma: f64) -> Self {
        Self { gamma }
    }

    /// Decay factor.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Decay the optimizer's rate once and return the new rate.
    pub fn step<B: AutodiffBackend>(&self, optimizer: &mut StageOptimizer<B>) -> f64 {
        optimizer.learning_rate *= self.gamma;
        log::info!(
            "Stage {}: learning rate decayed to {:.6e}",
            optimizer.stage,
            optimizer.learning_rate
        );
        optimizer.learning_rate
    }
}
