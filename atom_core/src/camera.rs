//! Pinhole camera model and ray casting.
//!
//! Poses are camera-to-world transforms in the OpenGL convention: the camera
//! looks down its local -Z axis with +Y up.

use crate::error::AtomCoreError;
use crate::types::Point3;

#[cfg(any(feature = "std", feature = "alloc"))]
use crate::alloc_prelude::Vec;

/// Image size and focal length, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Image height.
    pub height: usize,
    /// Image width.
    pub width: usize,
    /// Focal length.
    pub focal: f32,
}

impl CameraIntrinsics {
    /// Create new intrinsics.
    #[inline]
    pub const fn new(height: usize, width: usize, focal: f32) -> Self {
        Self { height, width, focal }
    }

    /// Number of pixels in one image.
    #[inline]
    pub const fn num_pixels(&self) -> usize {
        self.height * self.width
    }
}

/// Near and far distances along every ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBounds {
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
}

impl CameraBounds {
    /// Create bounds, requiring `0 <= near < far`.
    pub fn new(near: f32, far: f32) -> Result<Self, AtomCoreError> {
        if !(near >= 0.0 && far > near && far.is_finite()) {
            return Err(AtomCoreError::InvalidCameraBounds { near, far });
        }
        Ok(Self { near, far })
    }
}

/// Camera-to-world rigid transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Row-major rotation; its columns are the camera axes in world space.
    pub rotation: [[f32; 3]; 3],
    /// Camera centre in world space.
    pub translation: [f32; 3],
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::identity()
    }
}

impl CameraPose {
    /// Camera at the origin looking down -Z.
    pub const fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0, 0.0, 0.0],
        }
    }

    /// Camera at `eye` looking at `target`.
    ///
    /// `up` must not be parallel to the viewing direction.
    pub fn look_at(eye: Point3, target: Point3, up: Point3) -> Self {
        let forward = (target - eye).normalize();
        let right = forward.cross(up).normalize();
        let true_up = right.cross(forward);
        let back = -forward;

        Self {
            rotation: [
                [right.x, true_up.x, back.x],
                [right.y, true_up.y, back.y],
                [right.z, true_up.z, back.z],
            ],
            translation: eye.as_array(),
        }
    }

    /// Camera centre.
    #[inline]
    pub fn origin(&self) -> Point3 {
        Point3::from(self.translation)
    }

    /// Rotate a camera-space direction into world space.
    #[inline]
    pub fn rotate(&self, d: Point3) -> Point3 {
        let r = &self.rotation;
        Point3::new(
            r[0][0] * d.x + r[0][1] * d.y + r[0][2] * d.z,
            r[1][0] * d.x + r[1][1] * d.y + r[1][2] * d.z,
            r[2][0] * d.x + r[2][1] * d.y + r[2][2] * d.z,
        )
    }

    /// World-space unit direction through the centre of pixel `(x, y)`.
    #[inline]
    pub fn pixel_direction(&self, intrinsics: &CameraIntrinsics, x: usize, y: usize) -> Point3 {
        let half_w = intrinsics.width as f32 * 0.5;
        let half_h = intrinsics.height as f32 * 0.5;
        let cam = Point3::new(
            (x as f32 + 0.5 - half_w) / intrinsics.focal,
            -(y as f32 + 0.5 - half_h) / intrinsics.focal,
            -1.0,
        );
        self.rotate(cam).normalize()
    }
}

/// A flat bundle of rays sharing one pair of bounds.
#[cfg(any(feature = "std", feature = "alloc"))]
#[derive(Debug, Clone, PartialEq)]
pub struct Rays {
    /// Ray origins.
    pub origins: Vec<Point3>,
    /// Unit ray directions.
    pub directions: Vec<Point3>,
    /// Integration interval.
    pub bounds: CameraBounds,
}

#[cfg(any(feature = "std", feature = "alloc"))]
impl Rays {
    /// Number of rays.
    #[inline]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// True when the bundle holds no rays.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Concatenate bundles in order.
    pub fn collate(parts: &[Rays], bounds: CameraBounds) -> Rays {
        let total = parts.iter().map(Rays::len).sum();
        let mut origins = Vec::with_capacity(total);
        let mut directions = Vec::with_capacity(total);
        for part in parts {
            origins.extend_from_slice(&part.origins);
            directions.extend_from_slice(&part.directions);
        }
        Rays { origins, directions, bounds }
    }

    /// Rays at `indices`, in that order. Indices must be in range.
    pub fn gather(&self, indices: &[usize]) -> Rays {
        Rays {
            origins: indices.iter().map(|&i| self.origins[i]).collect(),
            directions: indices.iter().map(|&i| self.directions[i]).collect(),
            bounds: self.bounds,
        }
    }

    /// Contiguous sub-bundle `start..end`, clamped to the bundle length.
    pub fn slice(&self, start: usize, end: usize) -> Rays {
        let end = end.min(self.len());
        let start = start.min(end);
        Rays {
            origins: self.origins[start..end].to_vec(),
            directions: self.directions[start..end].to_vec(),
            bounds: self.bounds,
        }
    }
}

/// Cast one ray through the centre of every pixel, row-major (`y` outer).
#[cfg(any(feature = "std", feature = "alloc"))]
pub fn cast_rays(intrinsics: &CameraIntrinsics, pose: &CameraPose, bounds: CameraBounds) -> Rays {
    let n = intrinsics.num_pixels();
    let origin = pose.origin();
    let mut directions = Vec::with_capacity(n);
    for y in 0..intrinsics.height {
        for x in 0..intrinsics.width {
            directions.push(pose.pixel_direction(intrinsics, x, y));
        }
    }
    Rays {
        origins: core::iter::repeat(origin).take(n).collect(),
        directions,
        bounds,
    }
}

/// Mean distance of the camera centres from the world origin.
///
/// Returns 0 for an empty pose set.
pub fn hemispherical_radius_estimate(poses: &[CameraPose]) -> f32 {
    if poses.is_empty() {
        return 0.0;
    }
    let total: f32 = poses.iter().map(|p| p.origin().length()).sum();
    total / poses.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Point3, b: Point3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_bounds_validation() {
        assert!(CameraBounds::new(0.0, 1.0).is_ok());
        assert_eq!(
            CameraBounds::new(2.0, 1.0),
            Err(AtomCoreError::InvalidCameraBounds { near: 2.0, far: 1.0 })
        );
        assert!(CameraBounds::new(-0.1, 1.0).is_err());
    }

    #[test]
    fn test_identity_centre_ray_points_down_minus_z() {
        let intrinsics = CameraIntrinsics::new(2, 2, 1.0);
        let pose = CameraPose::identity();
        // Pixel (1, 1) centre is at (+0.5, -0.5) from the image centre.
        let d = pose.pixel_direction(&intrinsics, 1, 1);
        assert!(d.z < 0.0);
        assert!(d.x > 0.0 && d.y < 0.0);
        assert!((d.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_look_at_faces_target() {
        let pose = CameraPose::look_at(
            Point3::new(0.0, 0.0, 4.0),
            Point3::splat(0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let forward = pose.rotate(Point3::new(0.0, 0.0, -1.0));
        assert!(approx(forward, Point3::new(0.0, 0.0, -1.0)));
        assert!(approx(pose.origin(), Point3::new(0.0, 0.0, 4.0)));
    }

    #[test]
    fn test_hemispherical_radius() {
        let a = CameraPose {
            translation: [3.0, 0.0, 4.0],
            ..CameraPose::identity()
        };
        let b = CameraPose {
            translation: [0.0, 3.0, 0.0],
            ..CameraPose::identity()
        };
        assert!((hemispherical_radius_estimate(&[a, b]) - 4.0).abs() < 1e-6);
        assert_eq!(hemispherical_radius_estimate(&[]), 0.0);
    }

    #[cfg(any(feature = "std", feature = "alloc"))]
    #[test]
    fn test_cast_rays_row_major() {
        let intrinsics = CameraIntrinsics::new(2, 3, 2.0);
        let pose = CameraPose::identity();
        let bounds = CameraBounds::new(0.5, 3.0).unwrap();
        let rays = cast_rays(&intrinsics, &pose, bounds);

        assert_eq!(rays.len(), 6);
        // Index y * width + x
        assert!(approx(rays.directions[4], pose.pixel_direction(&intrinsics, 1, 1)));

        let picked = rays.gather(&[5, 0]);
        assert_eq!(picked.directions[0], rays.directions[5]);
        assert_eq!(picked.directions[1], rays.directions[0]);

        let tail = rays.slice(4, 100);
        assert_eq!(tail.len(), 2);

        let both = Rays::collate(&[rays.clone(), tail], bounds);
        assert_eq!(both.len(), 8);
    }
}
