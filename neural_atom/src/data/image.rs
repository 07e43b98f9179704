//! RGB float images and PNG I/O.

use std::path::Path;

use burn::prelude::*;

use crate::error::{tensor_to_vec, NeuralAtomError, Result};

/// RGB image with `f32` channels in `[0, 1]`, stored row-major HWC.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
}

impl Image {
    /// Wrap a pixel buffer of `height * width * 3` values.
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self> {
        if pixels.len() != width * height * 3 {
            return Err(NeuralAtomError::ShapeMismatch {
                expected: vec![height, width, 3],
                got: vec![pixels.len()],
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Image filled with one colour.
    pub fn filled(width: usize, height: usize, rgb: [f32; 3]) -> Self {
        let pixels = rgb.iter().copied().cycle().take(width * height * 3).collect();
        Self { width, height, pixels }
    }

    /// Build from a rendered `[height * width, 3]` tensor.
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 2>, width: usize, height: usize) -> Result<Self> {
        let dims = tensor.dims();
        if dims != [width * height, 3] {
            return Err(NeuralAtomError::ShapeMismatch {
                expected: vec![width * height, 3],
                got: dims.to_vec(),
            });
        }
        Self::new(width, height, tensor_to_vec(tensor)?)
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Flat HWC pixel values.
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Colour of pixel `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> [f32; 3] {
        let i = (y * self.width + x) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    /// Pixels as a `[height * width, 3]` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.pixels.clone(), [self.width * self.height, 3]),
            device,
        )
    }

    /// Write as an 8-bit PNG, clamping to `[0, 1]`.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let bytes = self
            .pixels
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        let buffer = image::RgbImage::from_raw(self.width as u32, self.height as u32, bytes)
            .ok_or_else(|| NeuralAtomError::InvalidData("pixel buffer too small".to_string()))?;
        buffer.save(path)?;
        Ok(())
    }

    /// Read an image file, dropping any alpha channel.
    pub fn load(path: &Path) -> Result<Self> {
        let rgb = image::open(path)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        let pixels = rgb.into_raw().into_iter().map(|b| b as f32 / 255.0).collect();
        Self::new(width as usize, height as usize, pixels)
    }
}
