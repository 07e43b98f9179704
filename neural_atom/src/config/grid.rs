//! Voxel grid configuration.

use atom_core::{num_sh_coeffs, GridResolution};
use burn::config::Config;

/// Configuration for the dense spherical-harmonics voxel grid.
#[derive(Config, Debug)]
pub struct VoxelGridConfig {
    /// Final number of vertices along x, y and z.
    pub resolution: [usize; 3],

    /// Side length of the cube the grid spans, centred at the origin.
    #[config(default = 2.0)]
    pub extent: f32,

    /// Spherical-harmonics degree of the colour features (0 to 2).
    #[config(default = 1)]
    pub sh_degree: u32,

    /// Lower bound of the uniform initialisation.
    #[config(default = "-1.0")]
    pub init_low: f32,

    /// Upper bound of the uniform initialisation.
    #[config(default = 1.0)]
    pub init_high: f32,
}

impl VoxelGridConfig {
    /// Final resolution as a [`GridResolution`].
    #[inline]
    pub fn grid_resolution(&self) -> GridResolution {
        GridResolution::from(self.resolution)
    }

    /// Width of one feature row: three colour channels per SH coefficient.
    pub fn feature_dim(&self) -> Result<usize, String> {
        num_sh_coeffs(self.sh_degree)
            .map(|k| 3 * k)
            .map_err(|e| e.to_string())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.grid_resolution().is_empty() {
            return Err("resolution must be positive on every axis".to_string());
        }
        if !(self.extent > 0.0 && self.extent.is_finite()) {
            return Err("extent must be positive".to_string());
        }
        self.feature_dim()?;
        if self.init_low >= self.init_high {
            return Err("init_low must be below init_high".to_string());
        }
        Ok(())
    }
}
