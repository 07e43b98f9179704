//! Training configuration.

use burn::config::Config;

use crate::training::AdamConfig;

/// Configuration for the progressive training controller.
///
/// Frequencies are in global steps except `lr_decay_steps_per_stage`, which
/// counts iterations within a stage. A frequency of 0 disables the periodic
/// trigger; the first and last iteration of each stage still fire.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Adam hyper-parameters.
    pub optimizer: AdamConfig,

    /// Images per loader batch.
    #[config(default = 8)]
    pub image_batch_cache_size: usize,

    /// Rays sampled per iteration.
    #[config(default = 32768)]
    pub ray_batch_size: usize,

    /// Number of progressive stages.
    #[config(default = 4)]
    pub num_stages: usize,

    /// Iterations in every stage.
    #[config(default = 2000)]
    pub num_iterations_per_stage: usize,

    /// Per-axis resolution growth between stages.
    #[config(default = 2.0)]
    pub scale_factor: f32,

    /// Learning rate at the start of stage 1.
    #[config(default = 0.03)]
    pub learning_rate: f64,

    /// Multiplier applied by each in-stage decay event.
    #[config(default = 0.1)]
    pub lr_decay_gamma_per_stage: f64,

    /// Stage iterations between in-stage decay events.
    #[config(default = 1000)]
    pub lr_decay_steps_per_stage: usize,

    /// Multiplier applied to the initial rate of each later stage.
    #[config(default = 0.9)]
    pub stagewise_lr_decay_gamma: f64,

    /// Checkpoint period.
    #[config(default = 1000)]
    pub save_freq: usize,

    /// Held-out evaluation period.
    #[config(default = 1000)]
    pub test_freq: usize,

    /// Feedback render period.
    #[config(default = 100)]
    pub feedback_freq: usize,

    /// Scalar summary period.
    #[config(default = 10)]
    pub summary_freq: usize,

    /// Also render and supervise a view-independent image.
    #[config(default = true)]
    pub apply_diffuse_render_regularization: bool,

    /// Prefetched batches held by the background loader.
    #[config(default = 4)]
    pub num_workers: usize,

    /// Log chunk progress of whole-image renders.
    #[config(default = true)]
    pub verbose_rendering: bool,

    /// Skip evaluation and the camera-ray diagnostic.
    #[config(default = false)]
    pub fast_debug_mode: bool,

    /// Skip the update of a step whose loss is not finite.
    #[config(default = false)]
    pub skip_non_finite_steps: bool,

    /// Seed for the backend and the samplers.
    #[config(default = 42)]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(AdamConfig::new())
    }
}

impl TrainingConfig {
    /// Total iterations across all stages.
    #[inline]
    pub fn total_iterations(&self) -> usize {
        self.num_stages * self.num_iterations_per_stage
    }

    /// Initial learning rate of a 1-based stage.
    #[inline]
    pub fn stage_learning_rate(&self, stage: usize) -> f64 {
        self.learning_rate * self.stagewise_lr_decay_gamma.powi(stage.saturating_sub(1) as i32)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_stages == 0 {
            return Err("num_stages must be at least 1".to_string());
        }
        if self.num_iterations_per_stage == 0 {
            return Err("num_iterations_per_stage must be positive".to_string());
        }
        if !(self.scale_factor > 1.0 && self.scale_factor.is_finite()) {
            return Err("scale_factor must be greater than 1".to_string());
        }
        if self.image_batch_cache_size == 0 {
            return Err("image_batch_cache_size must be positive".to_string());
        }
        if self.ray_batch_size == 0 {
            return Err("ray_batch_size must be positive".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err("learning_rate must be positive".to_string());
        }
        if self.lr_decay_gamma_per_stage <= 0.0 || self.stagewise_lr_decay_gamma <= 0.0 {
            return Err("decay factors must be positive".to_string());
        }
        self.optimizer.validate()
    }
}
