//! Posed image datasets.

use std::fs;
use std::path::{Path, PathBuf};

use atom_core::{hemispherical_radius_estimate, CameraBounds, CameraIntrinsics, CameraPose};
use serde::{Deserialize, Serialize};

use super::image::Image;
use crate::error::{NeuralAtomError, Result};

/// File name of the dataset manifest inside a dataset directory.
pub const MANIFEST_FILE: &str = "transforms.json";

/// An image together with the camera that took it.
#[derive(Debug, Clone, PartialEq)]
pub struct PosedImage {
    /// The image.
    pub image: Image,
    /// Camera-to-world pose.
    pub pose: CameraPose,
}

/// A source of posed images sharing one set of intrinsics and bounds.
pub trait PosedImageSource: Send + Sync {
    /// Number of images.
    fn len(&self) -> usize;

    /// True when there are no images.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image and pose at `index`.
    fn get(&self, index: usize) -> Result<PosedImage>;

    /// Pose at `index`, without loading the image.
    fn pose(&self, index: usize) -> Result<CameraPose>;

    /// Intrinsics shared by every image.
    fn intrinsics(&self) -> CameraIntrinsics;

    /// Near/far bounds shared by every image.
    fn bounds(&self) -> CameraBounds;

    /// Whether images are already held in memory.
    fn is_cached(&self) -> bool;

    /// Mean distance of the cameras from the origin.
    fn hemispherical_radius(&self) -> Result<f32> {
        let poses = (0..self.len()).map(|i| self.pose(i)).collect::<Result<Vec<_>>>()?;
        Ok(hemispherical_radius_estimate(&poses))
    }
}

fn index_error(index: usize, len: usize) -> NeuralAtomError {
    NeuralAtomError::InvalidData(format!("image index {} out of range for {} images", index, len))
}

fn check_size(image: &Image, intrinsics: &CameraIntrinsics) -> Result<()> {
    if image.width() != intrinsics.width || image.height() != intrinsics.height {
        return Err(NeuralAtomError::ShapeMismatch {
            expected: vec![intrinsics.height, intrinsics.width],
            got: vec![image.height(), image.width()],
        });
    }
    Ok(())
}

/// Dataset held entirely in memory.
#[derive(Debug, Clone)]
pub struct PosedImagesDataset {
    intrinsics: CameraIntrinsics,
    bounds: CameraBounds,
    frames: Vec<PosedImage>,
}

impl PosedImagesDataset {
    /// Create a dataset, checking every image against the intrinsics.
    pub fn new(intrinsics: CameraIntrinsics, bounds: CameraBounds, frames: Vec<PosedImage>) -> Result<Self> {
        for frame in &frames {
            check_size(&frame.image, &intrinsics)?;
        }
        Ok(Self {
            intrinsics,
            bounds,
            frames,
        })
    }

    /// All frames.
    pub fn frames(&self) -> &[PosedImage] {
        &self.frames
    }
}

impl PosedImageSource for PosedImagesDataset {
    fn len(&self) -> usize {
        self.frames.len()
    }

    fn get(&self, index: usize) -> Result<PosedImage> {
        self.frames
            .get(index)
            .cloned()
            .ok_or_else(|| index_error(index, self.frames.len()))
    }

    fn pose(&self, index: usize) -> Result<CameraPose> {
        self.frames
            .get(index)
            .map(|f| f.pose)
            .ok_or_else(|| index_error(index, self.frames.len()))
    }

    fn intrinsics(&self) -> CameraIntrinsics {
        self.intrinsics
    }

    fn bounds(&self) -> CameraBounds {
        self.bounds
    }

    fn is_cached(&self) -> bool {
        true
    }
}

/// One frame of a dataset manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEntry {
    /// Image path relative to the dataset directory.
    pub file: String,
    /// Camera-to-world rotation, row-major.
    pub rotation: [[f32; 3]; 3],
    /// Camera centre.
    pub translation: [f32; 3],
}

/// JSON manifest describing a dataset directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Image height.
    pub height: usize,
    /// Image width.
    pub width: usize,
    /// Focal length in pixels.
    pub focal: f32,
    /// Near bound.
    pub near: f32,
    /// Far bound.
    pub far: f32,
    /// Frames in order.
    pub frames: Vec<FrameEntry>,
}

impl DatasetManifest {
    /// Write the manifest into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read the manifest from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let text = fs::read_to_string(dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Dataset read from a directory of images plus a manifest, one image at a
/// time on request.
#[derive(Debug, Clone)]
pub struct ImageDirectoryDataset {
    root: PathBuf,
    intrinsics: CameraIntrinsics,
    bounds: CameraBounds,
    frames: Vec<FrameEntry>,
}

impl ImageDirectoryDataset {
    /// Open `dir/transforms.json`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let manifest = DatasetManifest::load(&root)?;
        log::info!(
            "Opened dataset {} with {} frames ({}x{})",
            root.display(),
            manifest.frames.len(),
            manifest.width,
            manifest.height
        );

        Ok(Self {
            root,
            intrinsics: CameraIntrinsics::new(manifest.height, manifest.width, manifest.focal),
            bounds: CameraBounds::new(manifest.near, manifest.far)?,
            frames: manifest.frames,
        })
    }

    /// Load every frame into memory.
    pub fn into_cached(self) -> Result<PosedImagesDataset> {
        let frames = (0..self.len()).map(|i| self.get(i)).collect::<Result<Vec<_>>>()?;
        PosedImagesDataset::new(self.intrinsics, self.bounds, frames)
    }
}

impl PosedImageSource for ImageDirectoryDataset {
    fn len(&self) -> usize {
        self.frames.len()
    }

    fn get(&self, index: usize) -> Result<PosedImage> {
        let entry = self
            .frames
            .get(index)
            .ok_or_else(|| index_error(index, self.frames.len()))?;
        let image = Image::load(&self.root.join(&entry.file))?;
        check_size(&image, &self.intrinsics)?;
        Ok(PosedImage {
            image,
            pose: self.pose(index)?,
        })
    }

    fn pose(&self, index: usize) -> Result<CameraPose> {
        self.frames
            .get(index)
            .map(|e| CameraPose {
                rotation: e.rotation,
                translation: e.translation,
            })
            .ok_or_else(|| index_error(index, self.frames.len()))
    }

    fn intrinsics(&self) -> CameraIntrinsics {
        self.intrinsics
    }

    fn bounds(&self) -> CameraBounds {
        self.bounds
    }

    fn is_cached(&self) -> bool {
        false
    }
}
