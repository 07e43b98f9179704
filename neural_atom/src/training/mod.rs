//! Progressive training of volumetric models.
//!
//! This module provides:
//! - `TrainingController`: the stage/iteration loop
//! - `RaySampler`: ray/pixel batches drawn from image batches
//! - `LossEvaluator`: L1 losses and PSNR
//! - `StageOptimizer`: per-stage Adam with stepped learning-rate decay
//! - `Dispatcher`: the table of periodic side effects
//! - Feedback renders, held-out evaluation, metrics sinks and checkpoints

mod checkpoint;
mod dispatch;
mod evaluate;
mod feedback;
mod loss;
mod metrics;
mod optimizer;
mod sampler;
mod trainer;

pub use checkpoint::{
    checkpoint_file_name, checkpoint_tag, find_latest_checkpoint, load_checkpoint,
    save_checkpoint, CameraInfo, CheckpointHeader, CheckpointMetadata, GridInfo,
    CHECKPOINT_MAGIC, CHECKPOINT_VERSION, FINAL_CHECKPOINT_NAME, FINAL_CHECKPOINT_TAG,
    HEADER_SIZE,
};
pub use dispatch::{Clock, Dispatcher, SideEffect, StepTick, Trigger};
pub use evaluate::{evaluate_held_out, HeldOutScores};
pub use feedback::{
    export_camera_rays, render_feedback, save_real_feedback_image, write_camera_rays_obj,
    FeedbackRecord, CAMERA_RAYS_NAME, REAL_FEEDBACK_NAME,
};
pub use loss::{LossEvaluator, LossReport};
pub use metrics::{JsonlMetricsSink, MemoryMetricsSink, MetricsSink, ScalarRecord};
pub use optimizer::{AdamConfig, AdamState, ExponentialLr, StageOptimizer};
pub use sampler::{RayPixelBatch, RaySampler};
pub use trainer::{
    format_loss_line, DispatchEvent, OutputLayout, TrainOutcome, TrainingController,
    TrainingReport, SCALARS_FILE,
};
