//! Progressive multi-resolution training controller.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use atom_core::{compute_grid_sizes, CameraBounds, CameraIntrinsics, CameraPose, GridResolution};

use crate::config::TrainingConfig;
use crate::data::{Image, ImageBatchLoader, PosedImageSource};
use crate::error::{NeuralAtomError, Result};
use crate::model::{RenderProcedure, ResizeMode, VolumetricModel};

use super::checkpoint::{
    checkpoint_file_name, checkpoint_tag, save_checkpoint, CameraInfo, CheckpointMetadata,
    FINAL_CHECKPOINT_NAME, FINAL_CHECKPOINT_TAG,
};
use super::dispatch::{Dispatcher, SideEffect, StepTick};
use super::evaluate::evaluate_held_out;
use super::feedback::{
    render_feedback, save_real_feedback_image, write_camera_rays_obj, FeedbackRecord,
    CAMERA_RAYS_NAME,
};
use super::loss::{LossEvaluator, LossReport};
use super::metrics::{JsonlMetricsSink, MetricsSink};
use super::optimizer::StageOptimizer;
use super::sampler::RaySampler;

/// Name of the default scalar log inside the summaries directory.
pub const SCALARS_FILE: &str = "scalars.jsonl";

/// Directories a run writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Run root.
    pub root: PathBuf,
    /// Model snapshots.
    pub saved_models: PathBuf,
    /// Scalar logs.
    pub summaries: PathBuf,
    /// Feedback images.
    pub rendered_output: PathBuf,
}

impl OutputLayout {
    /// Layout under `root`. Nothing is created until [`Self::create`].
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let logs = root.join("training_logs");
        Self {
            saved_models: root.join("saved_models"),
            summaries: logs.join("summaries"),
            rendered_output: logs.join("rendered_output"),
            root,
        }
    }

    /// Create every directory.
    pub fn create(&self) -> Result<()> {
        for dir in [&self.root, &self.saved_models, &self.summaries, &self.rendered_output] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Default scalar log.
    pub fn scalars_path(&self) -> PathBuf {
        self.summaries.join(SCALARS_FILE)
    }

    /// Camera-ray diagnostic.
    pub fn camera_rays_path(&self) -> PathBuf {
        self.root.join(CAMERA_RAYS_NAME)
    }
}

/// One side effect that ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEvent {
    /// Global step it ran after.
    pub global_step: usize,
    /// Stage it ran in.
    pub stage: usize,
    /// What ran.
    pub effect: SideEffect,
}

/// What happened during a run.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    /// Every side effect, in the order they ran.
    pub events: Vec<DispatchEvent>,
    /// Every feedback render.
    pub feedback: Vec<FeedbackRecord>,
    /// Periodic snapshots, in the order they were written.
    pub checkpoints: Vec<PathBuf>,
    /// Snapshot written at the end of the run.
    pub final_checkpoint: Option<PathBuf>,
    /// Grid resolution each stage trained at.
    pub stage_resolutions: Vec<GridResolution>,
    /// Optimizer steps skipped because the loss was not finite.
    pub skipped_steps: usize,
    /// `(global_step, total_loss)` of every applied step.
    pub loss_history: Vec<(usize, f32)>,
}

impl TrainingReport {
    /// Global steps at which `effect` ran.
    pub fn steps_of(&self, effect: SideEffect) -> Vec<usize> {
        self.events
            .iter()
            .filter(|e| e.effect == effect)
            .map(|e| e.global_step)
            .collect()
    }

    /// Number of times `effect` ran.
    pub fn count(&self, effect: SideEffect) -> usize {
        self.events.iter().filter(|e| e.effect == effect).count()
    }
}

/// The trained model and its run report.
#[derive(Debug)]
pub struct TrainOutcome<M> {
    /// Model at its final resolution.
    pub model: M,
    /// Run report.
    pub report: TrainingReport,
}

/// Console line for one step.
pub fn format_loss_line<B: Backend>(tick: &StepTick, losses: &LossReport<B>) -> String {
    let mut line = format!(
        "Stage: {} Global Iteration: {} Stage Iteration: {}",
        tick.stage, tick.global_step, tick.stage_iteration
    );
    for (name, value) in losses.scalars() {
        line.push_str(&format!(" {}: {:.5}", name, value));
    }
    line
}

/// Trains a [`VolumetricModel`] over progressively finer grids.
///
/// ```ignore
/// let outcome = TrainingController::<Autodiff<NdArray>, _>::new(model, train, config, "runs/lego")
///     .with_test_data(test)
///     .train()?;
/// ```
pub struct TrainingController<B: AutodiffBackend, M: VolumetricModel<B>> {
    model: M,
    train_data: Arc<dyn PosedImageSource>,
    test_data: Option<Arc<dyn PosedImageSource>>,
    config: TrainingConfig,
    output_dir: PathBuf,
    feedback_pose: Option<CameraPose>,
    metrics: Option<Box<dyn MetricsSink>>,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend, M: VolumetricModel<B>> TrainingController<B, M> {
    /// Create a controller. `model` fixes the final resolution.
    pub fn new(
        model: M,
        train_data: Arc<dyn PosedImageSource>,
        config: TrainingConfig,
        output_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            model,
            train_data,
            test_data: None,
            config,
            output_dir: output_dir.as_ref().to_path_buf(),
            feedback_pose: None,
            metrics: None,
            _backend: PhantomData,
        }
    }

    /// Score this held-out set every `test_freq` steps.
    pub fn with_test_data(mut self, test_data: Arc<dyn PosedImageSource>) -> Self {
        self.test_data = Some(test_data);
        self
    }

    /// Render this pose for every feedback image.
    pub fn with_feedback_pose(mut self, pose: CameraPose) -> Self {
        self.feedback_pose = Some(pose);
        self
    }

    /// Send scalars here instead of the default JSON-lines file.
    pub fn with_metrics_sink(mut self, sink: impl MetricsSink + 'static) -> Self {
        self.metrics = Some(Box::new(sink));
        self
    }

    /// Run every stage and write the final snapshot.
    pub fn train(self) -> Result<TrainOutcome<M>> {
        let Self {
            model,
            train_data,
            test_data,
            config,
            output_dir,
            feedback_pose,
            metrics,
            ..
        } = self;

        config.validate().map_err(NeuralAtomError::config)?;
        let procedure = model.render_procedure();
        if procedure != RenderProcedure::ShVoxelGrid {
            return Err(NeuralAtomError::PreconditionViolation {
                message: format!("expected the SH voxel-grid renderer, got {:?}", procedure),
            });
        }
        if train_data.is_empty() {
            return Err(NeuralAtomError::InvalidData("training set is empty".to_string()));
        }
        let test_data = test_data.filter(|data| !data.is_empty());

        B::seed(config.seed);
        let device = model.device();
        let num_stages = config.num_stages;
        let iterations = config.num_iterations_per_stage;
        let diffuse = config.apply_diffuse_render_regularization;
        let verbose = config.verbose_rendering;

        let schedule = compute_grid_sizes(model.resolution(), num_stages, config.scale_factor)?;
        log::info!(
            "Training {} stages of {} iterations over grids {:?}",
            num_stages,
            iterations,
            schedule.iter().map(|r| r.to_string()).collect::<Vec<_>>()
        );

        let mut model = model.resize(schedule[0], ResizeMode::Trilinear)?;
        let (init_low, init_high) = model.init_range();
        model.reinitialize(init_low, init_high);

        let intrinsics = train_data.intrinsics();
        let bounds = train_data.bounds();

        let layout = OutputLayout::new(&output_dir);
        layout.create()?;

        let feedback = FeedbackView::resolve(feedback_pose, &train_data, test_data.as_ref())?;
        if let Some(real) = &feedback.real {
            save_real_feedback_image(real, &layout.rendered_output)?;
        }

        if !config.fast_debug_mode {
            let poses = (0..train_data.len())
                .map(|i| train_data.pose(i))
                .collect::<Result<Vec<_>>>()?;
            write_camera_rays_obj(&layout.camera_rays_path(), &poses, &intrinsics, bounds)?;
        }
        let camera = CameraInfo::new(&intrinsics, &bounds);
        let radius = train_data.hemispherical_radius()?;

        let mut loader = ImageBatchLoader::new(
            Arc::clone(&train_data),
            config.image_batch_cache_size,
            config.num_workers,
            config.seed,
        )?;
        let mut metrics = match metrics {
            Some(sink) => sink,
            None => Box::new(JsonlMetricsSink::create(&layout.scalars_path())?),
        };

        let mut sampler = RaySampler::new(config.seed);
        let evaluator = LossEvaluator::new();
        let dispatcher = Dispatcher::from_config(&config, test_data.is_some());
        let dataset_pixels = (train_data.len() * intrinsics.num_pixels()) as f32;
        let mut report = TrainingReport::default();

        for stage in 1..=num_stages {
            report.stage_resolutions.push(model.resolution());
            log::info!("Stage {}/{}: grid resolution {}", stage, num_stages, model.resolution());

            let (mut optimizer, lr_schedule) =
                StageOptimizer::<B>::begin_stage(stage, &model.parameters(), &config)?;

            for stage_iteration in 1..=iterations {
                let tick = StepTick::new(stage, stage_iteration, iterations);

                let images = loader.next_batch()?;
                let batch = sampler.sample(&images, &intrinsics, bounds, config.ray_batch_size)?;
                let specular = model.render(&batch.rays, false)?;
                let diffuse_colour = if diffuse {
                    Some(model.render(&batch.rays, true)?.colour)
                } else {
                    None
                };
                let losses =
                    evaluator.evaluate(specular.colour, diffuse_colour, batch.pixels_tensor::<B>(&device))?;

                if config.skip_non_finite_steps && !losses.is_finite() {
                    log::warn!(
                        "Skipping step {}: non-finite loss {}",
                        tick.global_step,
                        losses.total_loss
                    );
                    report.skipped_steps += 1;
                } else {
                    let grads = losses.total.clone().backward();
                    optimizer.step(&mut model, &grads)?;
                    report.loss_history.push((tick.global_step, losses.total_loss));
                }

                for effect in dispatcher.due(&tick) {
                    let step = tick.global_step;
                    match effect {
                        SideEffect::Summary => {
                            for (name, value) in losses.scalars() {
                                metrics.add_scalar(name, value, step)?;
                            }
                            let num_epochs = (config.ray_batch_size * step) as f32 / dataset_pixels;
                            metrics.add_scalar("num_epochs", num_epochs, step)?;
                            metrics.add_scalar("learning_rate", optimizer.learning_rate() as f32, step)?;
                            log::info!("{}", format_loss_line(&tick, &losses));
                        }
                        SideEffect::LearningRateDecay => {
                            lr_schedule.step(&mut optimizer);
                        }
                        SideEffect::Feedback => {
                            let record = render_feedback(
                                &model,
                                &feedback.pose,
                                &feedback.intrinsics,
                                feedback.bounds,
                                step,
                                diffuse,
                                verbose,
                                &layout.rendered_output,
                            )?;
                            report.feedback.push(record);
                        }
                        SideEffect::Evaluation => {
                            if let Some(test) = &test_data {
                                let scores =
                                    evaluate_held_out(&model, test.as_ref(), &evaluator, diffuse, verbose)?;
                                for (name, value) in scores.scalars() {
                                    metrics.add_scalar(name, value, step)?;
                                }
                            }
                        }
                        SideEffect::Checkpoint => {
                            let path = layout.saved_models.join(checkpoint_file_name(stage, step));
                            let snapshot = model.snapshot()?;
                            let metadata = CheckpointMetadata::new(
                                checkpoint_tag(stage, step),
                                stage,
                                step,
                                &snapshot,
                                camera,
                                radius,
                            );
                            save_checkpoint(&path, &snapshot, &metadata)?;
                            report.checkpoints.push(path);
                        }
                    }
                    report.events.push(DispatchEvent {
                        global_step: step,
                        stage,
                        effect,
                    });
                }
            }

            if stage < num_stages {
                let next = schedule[stage];
                log::info!("Upsampling grid {} -> {}", model.resolution(), next);
                model = model.resize(next, ResizeMode::Trilinear)?;
            }
        }

        let final_path = layout.saved_models.join(FINAL_CHECKPOINT_NAME);
        let snapshot = model.snapshot()?;
        let metadata = CheckpointMetadata::new(
            FINAL_CHECKPOINT_TAG,
            num_stages,
            config.total_iterations(),
            &snapshot,
            camera,
            radius,
        );
        save_checkpoint(&final_path, &snapshot, &metadata)?;
        report.final_checkpoint = Some(final_path);
        metrics.flush()?;

        log::info!(
            "Training complete: {} steps, {} skipped",
            config.total_iterations(),
            report.skipped_steps
        );

        Ok(TrainOutcome { model, report })
    }
}

/// The fixed view rendered for feedback.
struct FeedbackView {
    pose: CameraPose,
    intrinsics: CameraIntrinsics,
    bounds: CameraBounds,
    /// Ground truth when the pose was taken from a dataset.
    real: Option<Image>,
}

impl FeedbackView {
    fn resolve(
        supplied: Option<CameraPose>,
        train_data: &Arc<dyn PosedImageSource>,
        test_data: Option<&Arc<dyn PosedImageSource>>,
    ) -> Result<Self> {
        match supplied {
            Some(pose) => Ok(Self {
                pose,
                intrinsics: train_data.intrinsics(),
                bounds: train_data.bounds(),
                real: None,
            }),
            None => {
                let source = test_data.unwrap_or(train_data);
                let frame = source.get(0)?;
                Ok(Self {
                    pose: frame.pose,
                    intrinsics: source.intrinsics(),
                    bounds: source.bounds(),
                    real: Some(frame.image),
                })
            }
        }
    }
}
