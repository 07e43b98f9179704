//! Real spherical-harmonics basis up to degree 2.

use crate::error::AtomCoreError;
use crate::types::Point3;

/// Highest supported SH degree.
pub const MAX_SH_DEGREE: u32 = 2;

/// Number of basis functions at [`MAX_SH_DEGREE`].
pub const MAX_SH_COEFFS: usize = 9;

const C0: f32 = 0.282_094_8;
const C1: f32 = 0.488_602_5;
const C2: [f32; 5] = [1.092_548_4, -1.092_548_4, 0.315_391_57, -1.092_548_4, 0.546_274_2];

/// Number of basis functions for `degree`, `(degree + 1)^2`.
pub fn num_sh_coeffs(degree: u32) -> Result<usize, AtomCoreError> {
    if degree > MAX_SH_DEGREE {
        return Err(AtomCoreError::UnsupportedShDegree {
            degree,
            max: MAX_SH_DEGREE,
        });
    }
    let d = degree as usize + 1;
    Ok(d * d)
}

/// Evaluate the basis for a unit direction.
///
/// Only the first `num_sh_coeffs(degree)` entries are set; the rest are zero.
pub fn eval_sh_basis(degree: u32, dir: Point3) -> Result<[f32; MAX_SH_COEFFS], AtomCoreError> {
    num_sh_coeffs(degree)?;

    let mut basis = [0.0f32; MAX_SH_COEFFS];
    basis[0] = C0;
    if degree >= 1 {
        basis[1] = -C1 * dir.y;
        basis[2] = C1 * dir.z;
        basis[3] = -C1 * dir.x;
    }
    if degree >= 2 {
        let (x, y, z) = (dir.x, dir.y, dir.z);
        basis[4] = C2[0] * x * y;
        basis[5] = C2[1] * y * z;
        basis[6] = C2[2] * (2.0 * z * z - x * x - y * y);
        basis[7] = C2[3] * x * z;
        basis[8] = C2[4] * (x * x - y * y);
    }
    Ok(basis)
}

/// View-independent basis: only the constant term is non-zero.
pub fn diffuse_sh_basis(degree: u32) -> Result<[f32; MAX_SH_COEFFS], AtomCoreError> {
    num_sh_coeffs(degree)?;
    let mut basis = [0.0f32; MAX_SH_COEFFS];
    basis[0] = C0;
    Ok(basis)
}
