//! Renderer configuration.

use burn::config::Config;

/// Sampling and chunking parameters for volumetric rendering.
#[derive(Config, Debug)]
pub struct RenderConfig {
    /// Samples per ray while training.
    #[config(default = 64)]
    pub num_samples_per_ray: usize,

    /// Samples per ray for feedback and evaluation renders.
    #[config(default = 128)]
    pub render_num_samples_per_ray: usize,

    /// Rays rendered together when rendering whole images.
    #[config(default = 4096)]
    pub parallel_rays_chunk_size: usize,

    /// Composite onto a white background instead of black.
    #[config(default = false)]
    pub white_bkgd: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_samples_per_ray == 0 || self.render_num_samples_per_ray == 0 {
            return Err("samples per ray must be positive".to_string());
        }
        if self.parallel_rays_chunk_size == 0 {
            return Err("parallel_rays_chunk_size must be positive".to_string());
        }
        Ok(())
    }
}
