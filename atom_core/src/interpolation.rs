//! Trilinear interpolation on dense vertex grids.
//!
//! Grid values live on vertices (align-corners convention): vertex `i` of an
//! axis with `n` vertices sits at normalised position `i / (n - 1)`.

use crate::types::{GridResolution, LocalCoord, Point3};

/// Compute trilinear interpolation weights for a local coordinate.
///
/// Corner `c` has offsets `(c & 1, (c >> 1) & 1, (c >> 2) & 1)`, so:
/// - weight[0] = (1-u)(1-v)(1-w)  at corner (0,0,0)
/// - weight[1] = u(1-v)(1-w)      at corner (1,0,0)
/// - weight[2] = (1-u)v(1-w)      at corner (0,1,0)
/// - weight[3] = uv(1-w)          at corner (1,1,0)
/// - weight[4] = (1-u)(1-v)w      at corner (0,0,1)
/// - weight[5] = u(1-v)w          at corner (1,0,1)
/// - weight[6] = (1-u)vw          at corner (0,1,1)
/// - weight[7] = uvw              at corner (1,1,1)
#[inline]
pub fn compute_trilinear_weights(local: LocalCoord) -> [f32; 8] {
    let u = local.u;
    let v = local.v;
    let w = local.w;

    let u0 = 1.0 - u;
    let v0 = 1.0 - v;
    let w0 = 1.0 - w;

    [
        u0 * v0 * w0,
        u * v0 * w0,
        u0 * v * w0,
        u * v * w0,
        u0 * v0 * w,
        u * v0 * w,
        u0 * v * w,
        u * v * w,
    ]
}

/// The eight voxels surrounding a sample and their trilinear weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelCorners {
    /// Flat voxel indices, in the corner order of [`compute_trilinear_weights`].
    pub indices: [usize; 8],
    /// Interpolation weights, summing to one.
    pub weights: [f32; 8],
}

/// Lower vertex, upper vertex and fractional offset of a continuous
/// coordinate on an axis with `n` vertices. Out-of-range values are clamped.
#[inline]
fn axis_bracket(coord: f32, n: usize) -> (usize, usize, f32) {
    if n <= 1 {
        return (0, 0, 0.0);
    }
    let max = (n - 1) as f32;
    let c = coord.clamp(0.0, max);
    let lower = (libm::floorf(c) as usize).min(n - 2);
    (lower, lower + 1, c - lower as f32)
}

/// Locate the corners of the cell containing continuous vertex coordinate
/// `coord` (in units of vertices, `0..=n-1` per axis).
pub fn grid_corners(resolution: GridResolution, coord: [f32; 3]) -> VoxelCorners {
    let (x0, x1, u) = axis_bracket(coord[0], resolution.x);
    let (y0, y1, v) = axis_bracket(coord[1], resolution.y);
    let (z0, z1, w) = axis_bracket(coord[2], resolution.z);

    let weights = compute_trilinear_weights(LocalCoord::new(u, v, w));
    let xs = [x0, x1];
    let ys = [y0, y1];
    let zs = [z0, z1];

    let mut indices = [0usize; 8];
    for (corner, index) in indices.iter_mut().enumerate() {
        *index = resolution.flat_index(xs[corner & 1], ys[(corner >> 1) & 1], zs[(corner >> 2) & 1]);
    }

    VoxelCorners { indices, weights }
}

/// Map a world-space point to continuous vertex coordinates of a grid that
/// spans the cube `[-extent / 2, extent / 2]^3`.
///
/// Returns `None` for points outside the cube.
pub fn world_to_grid(point: Point3, extent: f32, resolution: GridResolution) -> Option<[f32; 3]> {
    let half = extent * 0.5;
    let p = point.as_array();
    let dims = resolution.as_array();

    let mut coord = [0.0f32; 3];
    for axis in 0..3 {
        if !(-half..=half).contains(&p[axis]) {
            return None;
        }
        let normalised = (p[axis] + half) / extent;
        coord[axis] = normalised * dims[axis].saturating_sub(1) as f32;
    }
    Some(coord)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        for local in [
            LocalCoord::new(0.0, 0.0, 0.0),
            LocalCoord::new(1.0, 1.0, 1.0),
            LocalCoord::new(0.5, 0.5, 0.5),
            LocalCoord::new(0.1, 0.9, 0.3),
        ] {
            let weights = compute_trilinear_weights(local);
            let sum: f32 = weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            assert!(weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
        }
    }

    #[test]
    fn test_corners_on_vertex_are_exact() {
        let res = GridResolution::new(4, 4, 4);
        let corners = grid_corners(res, [1.0, 2.0, 3.0]);

        let total: f32 = corners
            .indices
            .iter()
            .zip(corners.weights.iter())
            .filter(|(&i, _)| i == res.flat_index(1, 2, 3))
            .map(|(_, &w)| w)
            .sum();
        assert_eq!(total, 1.0);
    }

    #[test]
    fn test_corners_clamp_to_last_vertex() {
        let res = GridResolution::new(3, 3, 3);
        let corners = grid_corners(res, [5.0, 2.0, 2.0]);
        let last = res.flat_index(2, 2, 2);

        let on_last: f32 = corners
            .indices
            .iter()
            .zip(corners.weights.iter())
            .filter(|(&i, _)| i == last)
            .map(|(_, &w)| w)
            .sum();
        assert!((on_last - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_world_to_grid() {
        let res = GridResolution::cube(5);
        assert_eq!(world_to_grid(Point3::new(-1.0, 0.0, 1.0), 2.0, res), Some([0.0, 2.0, 4.0]));
        assert_eq!(world_to_grid(Point3::new(1.5, 0.0, 0.0), 2.0, res), None);
    }

    #[test]
    fn test_single_vertex_axis() {
        let res = GridResolution::new(1, 1, 1);
        let corners = grid_corners(res, [0.3, 0.0, 0.0]);
        assert!(corners.indices.iter().all(|&i| i == 0));
    }
}
