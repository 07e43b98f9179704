//! Model snapshots on disk.
//!
//! A snapshot is one file:
//! - a 32-byte [`CheckpointHeader`]
//! - JSON [`CheckpointMetadata`]
//! - densities, then features, as little-endian `f32`
//!
//! Writing goes through a temporary file and a rename, so a snapshot with an
//! existing name is replaced whole.

use std::fs;
use std::path::{Path, PathBuf};

use atom_core::{num_sh_coeffs, CameraBounds, CameraIntrinsics};
use serde::{Deserialize, Serialize};

use crate::error::{NeuralAtomError, Result};
use crate::grid::GridSnapshot;

/// Magic bytes of a snapshot file.
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"ATOM";

/// Current snapshot format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 32;

/// File name of the snapshot written when training finishes.
pub const FINAL_CHECKPOINT_NAME: &str = "model_final.atom";

/// Tag of the snapshot written when training finishes.
pub const FINAL_CHECKPOINT_TAG: &str = "model_final";

/// Tag of a periodic snapshot.
pub fn checkpoint_tag(stage: usize, global_step: usize) -> String {
    format!("model_stage_{}_iter_{}", stage, global_step)
}

/// File name of a periodic snapshot.
pub fn checkpoint_file_name(stage: usize, global_step: usize) -> String {
    format!("{}.atom", checkpoint_tag(stage, global_step))
}

/// Snapshot file header.
///
/// Layout (32 bytes total):
/// - Bytes 0-3: Magic "ATOM"
/// - Bytes 4-7: version (u32 LE)
/// - Bytes 8-11: metadata length in bytes (u32 LE)
/// - Bytes 12-19: number of grid vertices (u64 LE)
/// - Bytes 20-23: feature row width (u32 LE)
/// - Bytes 24-31: reserved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointHeader {
    /// Magic bytes "ATOM".
    pub magic: [u8; 4],
    /// Format version.
    pub version: u32,
    /// Length of the JSON metadata.
    pub metadata_len: u32,
    /// Number of grid vertices.
    pub num_voxels: u64,
    /// Feature row width.
    pub feature_dim: u32,
    /// Reserved bytes.
    pub reserved: [u8; 8],
}

impl CheckpointHeader {
    /// Create a header for the current version.
    pub fn new(metadata_len: u32, num_voxels: u64, feature_dim: u32) -> Self {
        Self {
            magic: CHECKPOINT_MAGIC,
            version: CHECKPOINT_VERSION,
            metadata_len,
            num_voxels,
            feature_dim,
            reserved: [0; 8],
        }
    }

    /// Validate the header magic bytes.
    pub fn is_valid(&self) -> bool {
        self.magic == CHECKPOINT_MAGIC
    }

    /// Serialize the header to a byte array.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.metadata_len.to_le_bytes());
        bytes[12..20].copy_from_slice(&self.num_voxels.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.feature_dim.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.reserved);
        bytes
    }

    /// Deserialize a header from a byte array.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut num_voxels = [0u8; 8];
        num_voxels.copy_from_slice(&bytes[12..20]);
        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&bytes[24..32]);

        Self {
            magic,
            version: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            metadata_len: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            num_voxels: u64::from_le_bytes(num_voxels),
            feature_dim: u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
            reserved,
        }
    }
}

/// Grid shape stored with a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridInfo {
    /// Vertices per axis.
    pub resolution: [usize; 3],
    /// Side length of the cube.
    pub extent: f32,
    /// SH degree.
    pub sh_degree: u32,
}

/// Camera model the grid was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Image height.
    pub height: usize,
    /// Image width.
    pub width: usize,
    /// Focal length.
    pub focal: f32,
    /// Near bound.
    pub near: f32,
    /// Far bound.
    pub far: f32,
}

impl CameraInfo {
    /// Combine intrinsics and bounds.
    pub fn new(intrinsics: &CameraIntrinsics, bounds: &CameraBounds) -> Self {
        Self {
            height: intrinsics.height,
            width: intrinsics.width,
            focal: intrinsics.focal,
            near: bounds.near,
            far: bounds.far,
        }
    }

    /// Split back into intrinsics and bounds.
    pub fn to_camera(&self) -> Result<(CameraIntrinsics, CameraBounds)> {
        Ok((
            CameraIntrinsics::new(self.height, self.width, self.focal),
            CameraBounds::new(self.near, self.far)?,
        ))
    }
}

/// Training progress and scene information stored with a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Snapshot name without extension.
    pub tag: String,
    /// 1-based stage the snapshot was taken in.
    pub stage: usize,
    /// Global step the snapshot was taken at.
    pub global_step: usize,
    /// Grid shape.
    pub grid: GridInfo,
    /// Camera model.
    pub camera: CameraInfo,
    /// Mean camera distance from the origin.
    pub hemispherical_radius: f32,
}

impl CheckpointMetadata {
    /// Metadata for `snapshot` at the given progress.
    pub fn new(
        tag: impl Into<String>,
        stage: usize,
        global_step: usize,
        snapshot: &GridSnapshot,
        camera: CameraInfo,
        hemispherical_radius: f32,
    ) -> Self {
        Self {
            tag: tag.into(),
            stage,
            global_step,
            grid: GridInfo {
                resolution: snapshot.resolution,
                extent: snapshot.extent,
                sh_degree: snapshot.sh_degree,
            },
            camera,
            hemispherical_radius,
        }
    }
}

fn push_f32s(bytes: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
}

fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn header_field<T: TryFrom<usize>>(value: usize, what: &str) -> Result<T> {
    T::try_from(value)
        .map_err(|_| NeuralAtomError::InvalidData(format!("{} {} does not fit the checkpoint header", what, value)))
}

/// Save a snapshot to `path`, creating parent directories.
pub fn save_checkpoint(path: &Path, snapshot: &GridSnapshot, metadata: &CheckpointMetadata) -> Result<()> {
    let feature_dim = snapshot.feature_dim()?;
    let num_voxels = snapshot.num_voxels();
    if snapshot.densities.len() != num_voxels || snapshot.features.len() != num_voxels * feature_dim {
        return Err(NeuralAtomError::ShapeMismatch {
            expected: vec![num_voxels, 1 + feature_dim],
            got: vec![snapshot.densities.len(), snapshot.features.len()],
        });
    }

    let metadata_json = serde_json::to_vec(metadata)?;
    let header = CheckpointHeader::new(
        header_field(metadata_json.len(), "metadata length")?,
        header_field(num_voxels, "voxel count")?,
        header_field(feature_dim, "feature width")?,
    );

    let mut bytes =
        Vec::with_capacity(HEADER_SIZE + metadata_json.len() + 4 * num_voxels * (1 + feature_dim));
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&metadata_json);
    push_f32s(&mut bytes, &snapshot.densities);
    push_f32s(&mut bytes, &snapshot.features);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension("atom.tmp");
    fs::write(&temp, &bytes)?;
    fs::rename(&temp, path)?;

    log::info!(
        "Saved checkpoint {} to {:?} (stage {}, step {}, grid {:?})",
        metadata.tag,
        path,
        metadata.stage,
        metadata.global_step,
        snapshot.resolution
    );

    Ok(())
}

/// Load a snapshot written by [`save_checkpoint`].
pub fn load_checkpoint(path: &Path) -> Result<(GridSnapshot, CheckpointMetadata)> {
    let bytes = fs::read(path)?;
    if bytes.len() < HEADER_SIZE {
        return Err(NeuralAtomError::InvalidData(format!(
            "checkpoint {:?} is shorter than its header",
            path
        )));
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&bytes[..HEADER_SIZE]);
    let header = CheckpointHeader::from_bytes(&header_bytes);
    if !header.is_valid() {
        return Err(NeuralAtomError::InvalidData("bad checkpoint magic".to_string()));
    }
    if header.version != CHECKPOINT_VERSION {
        return Err(NeuralAtomError::InvalidData(format!(
            "unsupported checkpoint version {}",
            header.version
        )));
    }

    let oversized = || NeuralAtomError::InvalidData(format!("checkpoint {:?} header sizes overflow", path));
    let metadata_end = HEADER_SIZE
        .checked_add(header.metadata_len as usize)
        .ok_or_else(oversized)?;
    let num_voxels = usize::try_from(header.num_voxels).map_err(|_| oversized())?;
    let feature_dim = header.feature_dim as usize;
    let densities_len = num_voxels.checked_mul(4).ok_or_else(oversized)?;
    let features_len = densities_len.checked_mul(feature_dim).ok_or_else(oversized)?;
    let densities_end = metadata_end.checked_add(densities_len).ok_or_else(oversized)?;
    let features_end = densities_end.checked_add(features_len).ok_or_else(oversized)?;
    if bytes.len() != features_end {
        return Err(NeuralAtomError::InvalidData(format!(
            "checkpoint size {} does not match header (expected {})",
            bytes.len(),
            features_end
        )));
    }

    let metadata: CheckpointMetadata = serde_json::from_slice(&bytes[HEADER_SIZE..metadata_end])?;
    let expected_voxels = metadata
        .grid
        .resolution
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n));
    if expected_voxels != Some(num_voxels) || 3 * num_sh_coeffs(metadata.grid.sh_degree)? != feature_dim {
        return Err(NeuralAtomError::InvalidData(
            "checkpoint metadata disagrees with header".to_string(),
        ));
    }

    let snapshot = GridSnapshot {
        resolution: metadata.grid.resolution,
        extent: metadata.grid.extent,
        sh_degree: metadata.grid.sh_degree,
        densities: read_f32s(&bytes[metadata_end..densities_end]),
        features: read_f32s(&bytes[densities_end..features_end]),
    };

    log::info!(
        "Loaded checkpoint from {:?} (stage {}, step {})",
        path,
        metadata.stage,
        metadata.global_step
    );

    Ok((snapshot, metadata))
}

/// The periodic snapshot with the highest global step in `dir`, if any.
pub fn find_latest_checkpoint(dir: &Path) -> Option<PathBuf> {
    let mut latest: Option<(usize, PathBuf)> = None;

    for entry in fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(step) = name
            .strip_prefix("model_stage_")
            .and_then(|rest| rest.strip_suffix(".atom"))
            .and_then(|rest| rest.split_once("_iter_"))
            .and_then(|(_, step)| step.parse::<usize>().ok())
        else {
            continue;
        };
        if latest.as_ref().map_or(true, |(best, _)| step > *best) {
            latest = Some((step, path));
        }
    }

    latest.map(|(_, path)| path)
}
