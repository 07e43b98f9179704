//! Progressive resolution schedule.
//!
//! Training runs in `S` stages. The last stage uses the final grid resolution
//! and every earlier stage shrinks the next one by `scale_factor` per axis.

use crate::alloc_prelude::Vec;
use crate::error::AtomCoreError;
use crate::types::GridResolution;

/// Shrink one axis by `scale_factor`, rounding up so no axis reaches zero.
#[inline]
fn shrink_axis(n: usize, scale_factor: f32) -> usize {
    let shrunk = libm::ceil(n as f64 / scale_factor as f64) as usize;
    shrunk.max(1)
}

/// Compute the per-stage grid resolutions for a progressive schedule.
///
/// The returned vector has `num_stages` entries, ends with `final_resolution`,
/// and is non-decreasing along every axis. Entry `i` is entry `i + 1` divided
/// by `scale_factor` and rounded up.
///
/// # Errors
///
/// - [`AtomCoreError::InvalidStageCount`] when `num_stages == 0`
/// - [`AtomCoreError::InvalidScaleFactor`] when `scale_factor <= 1` or not finite
/// - [`AtomCoreError::EmptyResolution`] when `final_resolution` has a zero axis
pub fn compute_grid_sizes(
    final_resolution: GridResolution,
    num_stages: usize,
    scale_factor: f32,
) -> Result<Vec<GridResolution>, AtomCoreError> {
    if num_stages == 0 {
        return Err(AtomCoreError::InvalidStageCount { num_stages });
    }
    if !scale_factor.is_finite() || scale_factor <= 1.0 {
        return Err(AtomCoreError::InvalidScaleFactor { scale_factor });
    }
    if final_resolution.is_empty() {
        return Err(AtomCoreError::EmptyResolution);
    }

    let mut sizes = Vec::with_capacity(num_stages);
    sizes.push(final_resolution);
    let mut current = final_resolution;
    for _ in 1..num_stages {
        current = GridResolution::new(
            shrink_axis(current.x, scale_factor),
            shrink_axis(current.y, scale_factor),
            shrink_axis(current.z, scale_factor),
        );
        sizes.push(current);
    }
    sizes.reverse();

    Ok(sizes)
}

/// Global iteration counter for 1-based `stage` and `iteration`.
///
/// Increments by exactly one per iteration, including across stage
/// boundaries.
#[inline]
pub const fn global_step(stage: usize, iteration: usize, iterations_per_stage: usize) -> usize {
    (stage - 1) * iterations_per_stage + iteration
}
