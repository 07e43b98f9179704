//! End-to-end training runs on tiny scenes.

use std::sync::{Arc, Mutex};

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use tempfile::TempDir;

use neural_atom::{
    config::{RenderConfig, TrainingConfig, VoxelGridConfig},
    data::{DatasetManifest, FrameEntry, Image, ImageDirectoryDataset, PosedImage, PosedImageSource, PosedImagesDataset},
    grid::GridSnapshot,
    model::{RenderProcedure, ResizeMode, ShVoxelGridModel, VolumetricModel},
    render::RenderOutput,
    training::{
        load_checkpoint, AdamConfig, JsonlMetricsSink, MemoryMetricsSink, OutputLayout, SideEffect,
        TrainingController,
    },
    CameraBounds, CameraIntrinsics, CameraPose, GridResolution, NeuralAtomError, Point3,
};

type TestBackend = Autodiff<NdArray>;

const SIZE: usize = 4;

fn orbit_pose(i: usize) -> CameraPose {
    let angle = i as f32 * 0.9;
    CameraPose::look_at(
        Point3::new(3.0 * angle.sin(), 0.8, 3.0 * angle.cos()),
        Point3::splat(0.0),
        Point3::new(0.0, 1.0, 0.0),
    )
}

fn frame(i: usize) -> PosedImage {
    let shade = 0.2 + 0.1 * i as f32;
    PosedImage {
        image: Image::filled(SIZE, SIZE, [shade, 0.5, 1.0 - shade]),
        pose: orbit_pose(i),
    }
}

fn dataset(n: usize) -> Arc<dyn PosedImageSource> {
    Arc::new(
        PosedImagesDataset::new(
            CameraIntrinsics::new(SIZE, SIZE, 4.0),
            CameraBounds::new(1.0, 5.0).unwrap(),
            (0..n).map(frame).collect(),
        )
        .unwrap(),
    )
}

fn model(resolution: usize) -> ShVoxelGridModel<TestBackend> {
    let device = Default::default();
    let render = RenderConfig::default()
        .with_num_samples_per_ray(4)
        .with_render_num_samples_per_ray(6)
        .with_parallel_rays_chunk_size(7);
    let grid = VoxelGridConfig::new([resolution; 3]).with_sh_degree(1);
    ShVoxelGridModel::new(&grid, render, &device).unwrap()
}

fn config() -> TrainingConfig {
    TrainingConfig::new(AdamConfig::new())
        .with_image_batch_cache_size(2)
        .with_ray_batch_size(16)
        .with_num_stages(1)
        .with_num_iterations_per_stage(5)
        .with_num_workers(0)
        .with_verbose_rendering(false)
}

#[test]
fn test_single_stage_cadences_and_snapshots() {
    let dir = TempDir::new().unwrap();
    let sink = MemoryMetricsSink::new();
    let config = config().with_save_freq(5).with_summary_freq(1);

    let outcome = TrainingController::<TestBackend, _>::new(model(4), dataset(3), config, dir.path())
        .with_metrics_sink(sink.clone())
        .train()
        .unwrap();
    let report = &outcome.report;

    assert_eq!(report.steps_of(SideEffect::Summary), vec![1, 2, 3, 4, 5]);
    assert_eq!(report.steps_of(SideEffect::Checkpoint), vec![1, 5]);
    assert_eq!(report.count(SideEffect::LearningRateDecay), 0);

    let layout = OutputLayout::new(dir.path());
    let mut files: Vec<_> = std::fs::read_dir(&layout.saved_models)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    assert_eq!(
        files,
        vec!["model_final.atom", "model_stage_1_iter_1.atom", "model_stage_1_iter_5.atom"]
    );

    // Fractional epochs: 16 rays per step over 3 images of 16 pixels.
    let epochs = sink.values("num_epochs");
    assert_eq!(epochs.len(), 5);
    assert!((epochs[2].1 - 1.0).abs() < 1e-6);
}

#[test]
fn test_without_diffuse_total_is_specular() {
    let dir = TempDir::new().unwrap();
    let sink = MemoryMetricsSink::new();
    let config = config()
        .with_apply_diffuse_render_regularization(false)
        .with_summary_freq(1);

    let outcome = TrainingController::<TestBackend, _>::new(model(4), dataset(3), config, dir.path())
        .with_metrics_sink(sink.clone())
        .train()
        .unwrap();

    assert!(sink.values("diffuse_loss").is_empty());
    assert!(sink.values("diffuse_psnr").is_empty());

    let specular = sink.values("specular_loss");
    let total = sink.values("total_loss");
    assert_eq!(specular.len(), 5);
    assert_eq!(specular, total);

    for record in &outcome.report.feedback {
        assert_eq!(record.files.len(), 1);
    }
}

#[test]
fn test_diffuse_scalars_present_when_enabled() {
    let dir = TempDir::new().unwrap();
    let sink = MemoryMetricsSink::new();

    TrainingController::<TestBackend, _>::new(model(4), dataset(3), config().with_summary_freq(1), dir.path())
        .with_metrics_sink(sink.clone())
        .train()
        .unwrap();

    let specular = sink.values("specular_loss");
    let diffuse = sink.values("diffuse_loss");
    let total = sink.values("total_loss");
    assert_eq!(diffuse.len(), 5);
    for ((s, d), t) in specular.iter().zip(&diffuse).zip(&total) {
        assert!((s.1 + d.1 - t.1).abs() < 1e-4);
    }
}

#[test]
fn test_fast_debug_skips_evaluation() {
    let dir = TempDir::new().unwrap();
    let config = config().with_test_freq(1).with_fast_debug_mode(true);

    let outcome = TrainingController::<TestBackend, _>::new(model(4), dataset(3), config, dir.path())
        .with_test_data(dataset(2))
        .train()
        .unwrap();

    assert_eq!(outcome.report.count(SideEffect::Evaluation), 0);
    assert!(!OutputLayout::new(dir.path()).camera_rays_path().exists());
}

#[test]
fn test_evaluation_runs_with_held_out_data() {
    let dir = TempDir::new().unwrap();
    let sink = MemoryMetricsSink::new();
    let config = config().with_test_freq(2);

    let outcome = TrainingController::<TestBackend, _>::new(model(4), dataset(3), config, dir.path())
        .with_test_data(dataset(2))
        .with_metrics_sink(sink.clone())
        .train()
        .unwrap();

    assert_eq!(outcome.report.steps_of(SideEffect::Evaluation), vec![2, 4, 5]);
    assert_eq!(sink.values("test_specular_psnr").len(), 3);
    assert_eq!(sink.values("test_diffuse_loss").len(), 3);
    assert!(OutputLayout::new(dir.path()).camera_rays_path().exists());
}

#[test]
fn test_supplied_feedback_pose_fixed_across_stages() {
    let dir = TempDir::new().unwrap();
    let pose = CameraPose::look_at(
        Point3::new(0.3, 2.0, 2.5),
        Point3::splat(0.0),
        Point3::new(0.0, 1.0, 0.0),
    );
    let config = config()
        .with_num_stages(3)
        .with_num_iterations_per_stage(2)
        .with_feedback_freq(100);

    let outcome = TrainingController::<TestBackend, _>::new(model(8), dataset(3), config, dir.path())
        .with_feedback_pose(pose)
        .train()
        .unwrap();
    let report = &outcome.report;

    assert_eq!(
        report.stage_resolutions,
        vec![GridResolution::cube(2), GridResolution::cube(4), GridResolution::cube(8)]
    );
    assert_eq!(outcome.model.resolution(), GridResolution::cube(8));

    assert_eq!(report.feedback.len(), 6);
    for record in &report.feedback {
        assert_eq!(record.pose, pose);
        for file in &record.files {
            assert!(file.exists());
        }
    }

    // Supplied pose: no ground-truth reference is written.
    let layout = OutputLayout::new(dir.path());
    assert!(!layout.rendered_output.join("1__real_log.png").exists());
    assert!(layout.rendered_output.join("6.png").exists());
    assert!(layout.rendered_output.join("6_diffuse.png").exists());
}

#[test]
fn test_lr_decay_per_stage_iteration() {
    let dir = TempDir::new().unwrap();
    let sink = MemoryMetricsSink::new();
    let config = config()
        .with_num_stages(2)
        .with_num_iterations_per_stage(4)
        .with_lr_decay_steps_per_stage(2)
        .with_lr_decay_gamma_per_stage(0.5)
        .with_stagewise_lr_decay_gamma(0.9)
        .with_learning_rate(0.1)
        .with_summary_freq(1);

    let outcome = TrainingController::<TestBackend, _>::new(model(4), dataset(3), config, dir.path())
        .with_metrics_sink(sink.clone())
        .train()
        .unwrap();

    assert_eq!(outcome.report.steps_of(SideEffect::LearningRateDecay), vec![2, 4, 6, 8]);

    // Summary runs before the decay on the same step.
    let rates: Vec<f32> = sink.values("learning_rate").into_iter().map(|(_, v)| v).collect();
    let expected = [0.1, 0.1, 0.05, 0.05, 0.09, 0.09, 0.045, 0.045];
    assert_eq!(rates.len(), expected.len());
    for (got, want) in rates.iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "{} vs {}", got, want);
    }
}

#[test]
fn test_final_checkpoint_restores_model() {
    let dir = TempDir::new().unwrap();
    let outcome = TrainingController::<TestBackend, _>::new(model(4), dataset(3), config(), dir.path())
        .train()
        .unwrap();

    let path = outcome.report.final_checkpoint.clone().unwrap();
    let (snapshot, metadata) = load_checkpoint(&path).unwrap();

    assert_eq!(snapshot, outcome.model.snapshot().unwrap());
    assert_eq!(metadata.tag, "model_final");
    assert_eq!(metadata.global_step, 5);
    assert_eq!(metadata.camera.height, SIZE);
    assert!((metadata.camera.far - 5.0).abs() < 1e-6);
    assert!(metadata.hemispherical_radius > 3.0);
    assert_eq!(metadata.hemispherical_radius, dataset(3).hemispherical_radius().unwrap());

    let records = JsonlMetricsSink::read_all(&OutputLayout::new(dir.path()).scalars_path()).unwrap();
    assert!(records.iter().any(|r| r.name == "total_loss" && r.step == 5));
}

#[test]
fn test_training_from_image_directory_with_prefetch() {
    let data_dir = TempDir::new().unwrap();
    let run_dir = TempDir::new().unwrap();

    let mut frames = Vec::new();
    for i in 0..4 {
        let posed = frame(i);
        let file = format!("r_{}.png", i);
        posed.image.save_png(&data_dir.path().join(&file)).unwrap();
        frames.push(FrameEntry {
            file,
            rotation: posed.pose.rotation,
            translation: posed.pose.translation,
        });
    }
    DatasetManifest {
        height: SIZE,
        width: SIZE,
        focal: 4.0,
        near: 1.0,
        far: 5.0,
        frames,
    }
    .save(data_dir.path())
    .unwrap();

    let source = Arc::new(ImageDirectoryDataset::open(data_dir.path()).unwrap());
    let outcome = TrainingController::<TestBackend, _>::new(
        model(4),
        source,
        config().with_num_workers(2),
        run_dir.path(),
    )
    .train()
    .unwrap();

    assert_eq!(outcome.report.loss_history.len(), 5);
    assert!(outcome.report.loss_history.iter().all(|(_, loss)| loss.is_finite()));
    assert!(OutputLayout::new(run_dir.path()).rendered_output.join("1__real_log.png").exists());
}

/// One call to [`VolumetricModel::resize`].
#[derive(Debug, Clone)]
struct ResizeCall {
    mode: ResizeMode,
    before: GridSnapshot,
    after: GridSnapshot,
}

/// Delegates to an SH grid, reporting a chosen procedure and logging resizes.
#[derive(Debug, Clone)]
struct WrappedModel {
    inner: ShVoxelGridModel<TestBackend>,
    procedure: RenderProcedure,
    resizes: Arc<Mutex<Vec<ResizeCall>>>,
}

impl WrappedModel {
    fn new(inner: ShVoxelGridModel<TestBackend>, procedure: RenderProcedure) -> Self {
        Self {
            inner,
            procedure,
            resizes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl VolumetricModel<TestBackend> for WrappedModel {
    fn resolution(&self) -> GridResolution {
        self.inner.resolution()
    }

    fn resize(&self, resolution: GridResolution, mode: ResizeMode) -> neural_atom::Result<Self> {
        let inner = self.inner.resize(resolution, mode)?;
        self.resizes.lock().unwrap().push(ResizeCall {
            mode,
            before: self.inner.snapshot()?,
            after: inner.snapshot()?,
        });
        Ok(Self {
            inner,
            procedure: self.procedure.clone(),
            resizes: Arc::clone(&self.resizes),
        })
    }

    fn init_range(&self) -> (f32, f32) {
        self.inner.init_range()
    }

    fn reinitialize(&mut self, low: f32, high: f32) {
        self.inner.reinitialize(low, high);
    }

    fn parameters(&self) -> Vec<Tensor<TestBackend, 2>> {
        self.inner.parameters()
    }

    fn set_parameters(&mut self, parameters: Vec<Tensor<TestBackend, 2>>) -> neural_atom::Result<()> {
        self.inner.set_parameters(parameters)
    }

    fn render(&self, rays: &atom_core::Rays, diffuse: bool) -> neural_atom::Result<RenderOutput<TestBackend>> {
        self.inner.render(rays, diffuse)
    }

    fn render_for_inference(
        &self,
        rays: &atom_core::Rays,
        diffuse: bool,
        verbose: bool,
    ) -> neural_atom::Result<RenderOutput<TestBackend>> {
        self.inner.render_for_inference(rays, diffuse, verbose)
    }

    fn render_procedure(&self) -> RenderProcedure {
        self.procedure.clone()
    }

    fn render_config(&self) -> &RenderConfig {
        self.inner.render_config()
    }

    fn device(&self) -> <TestBackend as Backend>::Device {
        self.inner.device()
    }

    fn snapshot(&self) -> neural_atom::Result<GridSnapshot> {
        self.inner.snapshot()
    }
}

fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

#[test]
fn test_foreign_renderer_is_rejected() {
    let dir = TempDir::new().unwrap();
    let result =
        TrainingController::<TestBackend, _>::new(
            WrappedModel::new(model(4), RenderProcedure::Other("point_splat".to_string())),
            dataset(3),
            config(),
            dir.path(),
        )
            .train();

    assert!(matches!(result, Err(NeuralAtomError::PreconditionViolation { .. })));
    assert!(!OutputLayout::new(dir.path()).saved_models.exists());
}

#[test]
fn test_initial_grid_uses_configured_range() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();
    let grid = VoxelGridConfig::new([4; 3]).with_init_low(0.0).with_init_high(0.001);
    let render = RenderConfig::default()
        .with_num_samples_per_ray(4)
        .with_render_num_samples_per_ray(6);
    let model = ShVoxelGridModel::<TestBackend>::new(&grid, render, &device).unwrap();
    let config = config()
        .with_num_iterations_per_stage(1)
        .with_learning_rate(1e-9);

    let outcome = TrainingController::<TestBackend, _>::new(model, dataset(3), config, dir.path())
        .train()
        .unwrap();
    let snapshot = outcome.model.snapshot().unwrap();

    let in_range = |v: &f32| (-1e-6..=0.001 + 1e-6).contains(v);
    assert!(snapshot.densities.iter().all(in_range));
    assert!(snapshot.features.iter().all(in_range));
}

#[test]
fn test_stage_transition_carries_learned_values() {
    let dir = TempDir::new().unwrap();
    let wrapped = WrappedModel::new(model(8), RenderProcedure::ShVoxelGrid);
    let resizes = Arc::clone(&wrapped.resizes);
    let config = config()
        .with_num_stages(2)
        .with_num_iterations_per_stage(2)
        .with_learning_rate(1e-9);

    let outcome = TrainingController::<TestBackend, _>::new(wrapped, dataset(3), config, dir.path())
        .train()
        .unwrap();
    let calls = resizes.lock().unwrap().clone();

    // Initial downscale to 4^3, then one upsample back to 8^3.
    assert_eq!(calls.len(), 2);
    let transition = &calls[1];
    assert_eq!(transition.mode, ResizeMode::Trilinear);
    assert_eq!(transition.before.resolution, [4; 3]);
    assert_eq!(transition.after.resolution, [8; 3]);

    // Two steps at a negligible rate leave the resampled values in place.
    let last = outcome.model.snapshot().unwrap();
    assert!(max_abs_diff(&last.densities, &transition.after.densities) < 1e-5);
    assert!(max_abs_diff(&last.features, &transition.after.features) < 1e-5);
}
