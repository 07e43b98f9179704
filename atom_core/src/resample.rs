//! Resampling of dense vertex grids between resolutions.
//!
//! Values are stored channel-interleaved: voxel `v`, channel `c` lives at
//! `v * channels + c`, with voxels in [`GridResolution::flat_index`] order.

use crate::alloc_prelude::Vec;
use crate::error::AtomCoreError;
use crate::interpolation::grid_corners;
use crate::types::GridResolution;

/// How values are carried across a resolution change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResampleMode {
    /// Trilinear blend of the eight surrounding source vertices.
    #[default]
    Trilinear,
    /// Value of the closest source vertex.
    Nearest,
}

/// Position of destination vertex `i` in source vertex units.
#[inline]
fn source_coord(i: usize, from: usize, to: usize) -> f32 {
    if to <= 1 {
        // A single vertex samples the middle of the source axis.
        return from.saturating_sub(1) as f32 * 0.5;
    }
    let scale = from.saturating_sub(1) as f32 / (to - 1) as f32;
    i as f32 * scale
}

/// Resample `values` from `from` to `to`.
///
/// Resampling to the same resolution reproduces the input exactly.
pub fn resample_grid(
    values: &[f32],
    channels: usize,
    from: GridResolution,
    to: GridResolution,
    mode: ResampleMode,
) -> Result<Vec<f32>, AtomCoreError> {
    if from.is_empty() || to.is_empty() {
        return Err(AtomCoreError::EmptyResolution);
    }
    let expected = from.num_voxels() * channels;
    if values.len() != expected {
        return Err(AtomCoreError::BufferSizeMismatch {
            expected,
            got: values.len(),
        });
    }

    let mut out = Vec::with_capacity(to.num_voxels() * channels);
    for k in 0..to.z {
        let cz = source_coord(k, from.z, to.z);
        for j in 0..to.y {
            let cy = source_coord(j, from.y, to.y);
            for i in 0..to.x {
                let cx = source_coord(i, from.x, to.x);
                match mode {
                    ResampleMode::Trilinear => {
                        let corners = grid_corners(from, [cx, cy, cz]);
                        for c in 0..channels {
                            let mut acc = 0.0f32;
                            for (&index, &weight) in corners.indices.iter().zip(corners.weights.iter()) {
                                acc += weight * values[index * channels + c];
                            }
                            out.push(acc);
                        }
                    }
                    ResampleMode::Nearest => {
                        let nearest = from.flat_index(
                            nearest_vertex(cx, from.x),
                            nearest_vertex(cy, from.y),
                            nearest_vertex(cz, from.z),
                        );
                        out.extend_from_slice(&values[nearest * channels..(nearest + 1) * channels]);
                    }
                }
            }
        }
    }

    Ok(out)
}

#[inline]
fn nearest_vertex(coord: f32, n: usize) -> usize {
    (libm::roundf(coord).max(0.0) as usize).min(n - 1)
}
