//! Visual feedback: renders of a fixed pose and the camera-ray diagnostic.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use atom_core::{cast_rays, CameraBounds, CameraIntrinsics, CameraPose};
use burn::prelude::*;

use crate::data::Image;
use crate::error::Result;
use crate::model::VolumetricModel;

/// File name of the real reference image.
pub const REAL_FEEDBACK_NAME: &str = "1__real_log.png";

/// File name of the camera-ray diagnostic.
pub const CAMERA_RAYS_NAME: &str = "camera_rays.obj";

/// Images written for one feedback step.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    /// Global step the render was taken at.
    pub global_step: usize,
    /// Pose that was rendered.
    pub pose: CameraPose,
    /// Written image files, specular first.
    pub files: Vec<PathBuf>,
}

/// Render `pose` with the inference settings and write `{step}.png`, plus
/// `{step}_diffuse.png` when `diffuse` is set.
#[allow(clippy::too_many_arguments)]
pub fn render_feedback<B: Backend, M: VolumetricModel<B>>(
    model: &M,
    pose: &CameraPose,
    intrinsics: &CameraIntrinsics,
    bounds: CameraBounds,
    global_step: usize,
    diffuse: bool,
    verbose: bool,
    dir: &Path,
) -> Result<FeedbackRecord> {
    let rays = cast_rays(intrinsics, pose, bounds);
    let mut files = Vec::with_capacity(2);

    let specular = model.render_for_inference(&rays, false, verbose)?;
    let path = dir.join(format!("{}.png", global_step));
    Image::from_tensor(specular.colour, intrinsics.width, intrinsics.height)?.save_png(&path)?;
    files.push(path);

    if diffuse {
        let rendered = model.render_for_inference(&rays, true, verbose)?;
        let path = dir.join(format!("{}_diffuse.png", global_step));
        Image::from_tensor(rendered.colour, intrinsics.width, intrinsics.height)?.save_png(&path)?;
        files.push(path);
    }

    log::debug!("Feedback for step {} written to {:?}", global_step, dir);

    Ok(FeedbackRecord {
        global_step,
        pose: *pose,
        files,
    })
}

/// Write the ground-truth image of the feedback view.
pub fn save_real_feedback_image(image: &Image, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(REAL_FEEDBACK_NAME);
    image.save_png(&path)?;
    Ok(path)
}

/// Write one line segment per camera, along its centre pixel from `near`
/// to `far`, as OBJ `v`/`l` records.
pub fn export_camera_rays<W: Write>(
    writer: &mut W,
    poses: &[CameraPose],
    intrinsics: &CameraIntrinsics,
    bounds: CameraBounds,
) -> Result<()> {
    writeln!(writer, "# Camera rays")?;
    writeln!(writer, "# {} cameras, near {}, far {}", poses.len(), bounds.near, bounds.far)?;
    writeln!(writer)?;

    let (cx, cy) = (intrinsics.width / 2, intrinsics.height / 2);
    for pose in poses {
        let origin = pose.origin();
        let direction = pose.pixel_direction(intrinsics, cx, cy);
        let start = origin + direction * bounds.near;
        let end = origin + direction * bounds.far;
        writeln!(writer, "v {} {} {}", start.x, start.y, start.z)?;
        writeln!(writer, "v {} {} {}", end.x, end.y, end.z)?;
    }

    writeln!(writer)?;
    for i in 0..poses.len() {
        writeln!(writer, "l {} {}", 2 * i + 1, 2 * i + 2)?;
    }

    Ok(())
}

/// [`export_camera_rays`] to a file.
pub fn write_camera_rays_obj(
    path: &Path,
    poses: &[CameraPose],
    intrinsics: &CameraIntrinsics,
    bounds: CameraBounds,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    export_camera_rays(&mut writer, poses, intrinsics, bounds)?;
    writer.flush()?;
    log::info!("Wrote {} camera rays to {:?}", poses.len(), path);
    Ok(())
}
