//! Posed images: storage, datasets and batch loading.

mod dataset;
mod image;
mod loader;

pub use dataset::{
    DatasetManifest, FrameEntry, ImageDirectoryDataset, PosedImage, PosedImageSource,
    PosedImagesDataset, MANIFEST_FILE,
};
pub use self::image::Image;
pub use loader::ImageBatchLoader;
