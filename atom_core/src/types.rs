//! Core types shared by the scheduler, the camera model and the grid math.

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};

/// A 3D point or direction with named fields.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl Point3 {
    /// Create a new Point3.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Create a Point3 with all components set to the same value.
    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Convert to an array.
    #[inline]
    pub const fn as_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Dot product.
    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product.
    #[inline]
    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// Length (magnitude) of the vector.
    #[inline]
    pub fn length(self) -> f32 {
        libm::sqrtf(self.dot(self))
    }

    /// Normalize to unit length. A zero vector stays zero.
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            Self::splat(0.0)
        } else {
            self / len
        }
    }
}

impl From<[f32; 3]> for Point3 {
    #[inline]
    fn from(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }
}

impl From<Point3> for [f32; 3] {
    #[inline]
    fn from(p: Point3) -> Self {
        p.as_array()
    }
}

impl Add for Point3 {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Point3 {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f32> for Point3 {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f32) -> Self {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Div<f32> for Point3 {
    type Output = Self;

    #[inline]
    fn div(self, scalar: f32) -> Self {
        Self::new(self.x / scalar, self.y / scalar, self.z / scalar)
    }
}

impl Neg for Point3 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Number of grid vertices along each axis of a dense voxel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridResolution {
    /// Vertices along X.
    pub x: usize,
    /// Vertices along Y.
    pub y: usize,
    /// Vertices along Z.
    pub z: usize,
}

impl GridResolution {
    /// Create a new resolution.
    #[inline]
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Same number of vertices on every axis.
    #[inline]
    pub const fn cube(n: usize) -> Self {
        Self { x: n, y: n, z: n }
    }

    /// Convert to an `[x, y, z]` array.
    #[inline]
    pub const fn as_array(&self) -> [usize; 3] {
        [self.x, self.y, self.z]
    }

    /// Total number of voxels.
    #[inline]
    pub const fn num_voxels(&self) -> usize {
        self.x * self.y * self.z
    }

    /// True if any axis is zero.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }

    /// Flat index of voxel `(i, j, k)`; x varies fastest.
    #[inline]
    pub const fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.y + j) * self.x + i
    }
}

impl From<[usize; 3]> for GridResolution {
    #[inline]
    fn from(arr: [usize; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }
}

impl From<GridResolution> for [usize; 3] {
    #[inline]
    fn from(r: GridResolution) -> Self {
        r.as_array()
    }
}

impl fmt::Display for GridResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// Fractional position inside a voxel cell, each component in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalCoord {
    /// Offset along X.
    pub u: f32,
    /// Offset along Y.
    pub v: f32,
    /// Offset along Z.
    pub w: f32,
}

impl LocalCoord {
    /// Create a new local coordinate.
    #[inline]
    pub const fn new(u: f32, v: f32, w: f32) -> Self {
        Self { u, v, w }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point3_arithmetic() {
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(4.0, 5.0, 6.0);

        assert_eq!(a + b, Point3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Point3::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Point3::new(2.0, 4.0, 6.0));
        assert_eq!(-a, Point3::new(-1.0, -2.0, -3.0));
    }

    #[test]
    fn test_point3_dot_cross() {
        let x = Point3::new(1.0, 0.0, 0.0);
        let y = Point3::new(0.0, 1.0, 0.0);

        assert_eq!(x.dot(y), 0.0);
        assert_eq!(x.cross(y), Point3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Point3::splat(0.0).normalize(), Point3::splat(0.0));
        let n = Point3::new(3.0, 0.0, 4.0).normalize();
        assert!((n.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resolution_flat_index() {
        let res = GridResolution::new(4, 3, 2);
        assert_eq!(res.num_voxels(), 24);
        assert_eq!(res.flat_index(0, 0, 0), 0);
        assert_eq!(res.flat_index(1, 0, 0), 1);
        assert_eq!(res.flat_index(0, 1, 0), 4);
        assert_eq!(res.flat_index(0, 0, 1), 12);
        assert_eq!(res.flat_index(3, 2, 1), 23);
    }

    #[test]
    fn test_resolution_empty() {
        assert!(GridResolution::new(0, 4, 4).is_empty());
        assert!(!GridResolution::cube(1).is_empty());
    }
}
