//! Example: Progressive training on a synthetic scene.
//!
//! This example walks through a complete run:
//! 1. Build a ground-truth grid holding a coloured sphere
//! 2. Render posed views of it on an orbit
//! 3. Train a fresh grid over three stages of growing resolution
//! 4. Reload the final snapshot
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info cargo run -p neural_atom --example train_synthetic --features examples
//! ```
//!
//! Output files are saved to `demos/output/`.

use std::sync::Arc;

use burn::backend::{Autodiff, NdArray};

use neural_atom::{
    config::{RenderConfig, TrainingConfig, VoxelGridConfig},
    data::{Image, PosedImage, PosedImagesDataset},
    grid::{GridSnapshot, VoxelGrid},
    model::ShVoxelGridModel,
    render::render_in_chunks,
    training::{load_checkpoint, AdamConfig, SideEffect, TrainingController},
    CameraBounds, CameraIntrinsics, CameraPose, GridResolution, Point3,
};

type MyBackend = Autodiff<NdArray>;

/// Output directory for generated files.
const OUTPUT_DIR: &str = "demos/output";

const IMAGE_SIZE: usize = 32;
const NUM_VIEWS: usize = 12;
const NUM_HELD_OUT: usize = 2;

/// Dense grid with an orange sphere of radius 0.5 in a unit cube.
fn sphere_snapshot(n: usize) -> GridSnapshot {
    let res = GridResolution::cube(n);
    let mut densities = Vec::with_capacity(res.num_voxels());
    let mut features = Vec::with_capacity(res.num_voxels() * 3);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let p = Point3::new(i as f32, j as f32, k as f32) / (n - 1) as f32 * 2.0 - Point3::splat(1.0);
                let inside = p.length() < 0.5;
                densities.push(if inside { 40.0 } else { -5.0 });
                features.extend_from_slice(&[6.0, 1.0, -6.0]);
            }
        }
    }
    GridSnapshot {
        resolution: res.as_array(),
        extent: 2.0,
        sh_degree: 0,
        densities,
        features,
    }
}

fn orbit(count: usize) -> Vec<CameraPose> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count as f32 * std::f32::consts::TAU;
            CameraPose::look_at(
                Point3::new(3.0 * angle.sin(), 1.0, 3.0 * angle.cos()),
                Point3::splat(0.0),
                Point3::new(0.0, 1.0, 0.0),
            )
        })
        .collect()
}

fn main() -> neural_atom::Result<()> {
    env_logger::init();

    let device = burn::backend::ndarray::NdArrayDevice::Cpu;
    let intrinsics = CameraIntrinsics::new(IMAGE_SIZE, IMAGE_SIZE, IMAGE_SIZE as f32 * 1.2);
    let bounds = CameraBounds::new(1.5, 4.5)?;

    println!("═══════════════════════════════════════════════════════════════");
    println!("          Progressive Voxel Grid Training");
    println!("═══════════════════════════════════════════════════════════════");
    println!();

    // =========================================================================
    // Step 1: Render the ground truth
    // =========================================================================
    println!("Step 1: Rendering {} views of the ground-truth sphere", NUM_VIEWS);

    let truth = VoxelGrid::<NdArray>::from_snapshot(&sphere_snapshot(24), &device)?;
    let truth_render = RenderConfig::default().with_render_num_samples_per_ray(96);
    let mut frames = Vec::with_capacity(NUM_VIEWS);
    for pose in orbit(NUM_VIEWS) {
        let rays = atom_core::cast_rays(&intrinsics, &pose, bounds);
        let output = render_in_chunks(&truth, &rays, &truth_render, false, false)?;
        frames.push(PosedImage {
            image: Image::from_tensor(output.colour, IMAGE_SIZE, IMAGE_SIZE)?,
            pose,
        });
    }
    let held_out = frames.split_off(NUM_VIEWS - NUM_HELD_OUT);
    let train = Arc::new(PosedImagesDataset::new(intrinsics, bounds, frames)?);
    let test = Arc::new(PosedImagesDataset::new(intrinsics, bounds, held_out)?);

    // =========================================================================
    // Step 2: Train
    // =========================================================================
    println!("Step 2: Training over 3 stages");

    let render = RenderConfig::default()
        .with_num_samples_per_ray(32)
        .with_render_num_samples_per_ray(64)
        .with_parallel_rays_chunk_size(1024);
    let model = ShVoxelGridModel::<MyBackend>::new(
        &VoxelGridConfig::new([16, 16, 16]).with_sh_degree(1),
        render,
        &device,
    )?;

    let config = TrainingConfig::new(AdamConfig::new())
        .with_image_batch_cache_size(4)
        .with_ray_batch_size(512)
        .with_num_stages(3)
        .with_num_iterations_per_stage(60)
        .with_learning_rate(0.05)
        .with_lr_decay_steps_per_stage(40)
        .with_lr_decay_gamma_per_stage(0.5)
        .with_save_freq(60)
        .with_test_freq(60)
        .with_feedback_freq(30)
        .with_summary_freq(10)
        .with_num_workers(0);

    let outcome = TrainingController::<MyBackend, _>::new(model, train, config, OUTPUT_DIR)
        .with_test_data(test)
        .train()?;
    let report = &outcome.report;

    let resolutions: Vec<String> = report.stage_resolutions.iter().map(|r| r.to_string()).collect();
    println!("  stage resolutions: {}", resolutions.join(" -> "));
    println!("  feedback renders:  {}", report.feedback.len());
    println!("  evaluations:       {}", report.count(SideEffect::Evaluation));
    println!("  snapshots:         {}", report.checkpoints.len());
    if let Some((step, loss)) = report.loss_history.last() {
        println!("  final loss:        {:.5} (step {})", loss, step);
    }

    // =========================================================================
    // Step 3: Reload
    // =========================================================================
    if let Some(path) = &report.final_checkpoint {
        let (snapshot, metadata) = load_checkpoint(path)?;
        let restored = VoxelGrid::<NdArray>::from_snapshot(&snapshot, &device)?;
        println!();
        println!(
            "Step 3: Reloaded {} at step {}: grid {}",
            metadata.tag,
            metadata.global_step,
            restored.resolution()
        );
    }

    println!();
    println!("Outputs written to {}/", OUTPUT_DIR);
    Ok(())
}
