//! Image quality metrics.

/// Upper bound on reported PSNR, in dB. Lower bound is its negation.
pub const PSNR_CAP: f32 = 100.0;

/// Peak signal-to-noise ratio from a mean squared error.
///
/// `10 * log10(max_val^2 / mse)`, clamped to `[-PSNR_CAP, PSNR_CAP]`. A zero
/// (or negative) error reports the cap, so the result is always finite.
/// A NaN error propagates as NaN.
pub fn mse_to_psnr(mse: f32, max_val: f32) -> f32 {
    if mse.is_nan() || max_val.is_nan() {
        return f32::NAN;
    }
    if mse <= 0.0 {
        return PSNR_CAP;
    }
    let peak = max_val * max_val;
    if peak <= 0.0 {
        return -PSNR_CAP;
    }
    let psnr = 10.0 * libm::log10f(peak / mse);
    if psnr.is_nan() {
        return -PSNR_CAP;
    }
    psnr.clamp(-PSNR_CAP, PSNR_CAP)
}
