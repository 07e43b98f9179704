//! Endless, shuffled batches of posed images.
//!
//! Batches never straddle an epoch boundary: a trailing partial batch is
//! dropped and the order is reshuffled. Sources that read from disk are
//! prefetched on a background thread into a bounded queue.

use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::dataset::{PosedImage, PosedImageSource};
use crate::error::{NeuralAtomError, Result};

/// Walks the source in shuffled order, one batch at a time.
struct BatchCursor {
    source: Arc<dyn PosedImageSource>,
    batch_size: usize,
    order: Vec<usize>,
    position: usize,
    rng: StdRng,
}

impl BatchCursor {
    fn new(source: Arc<dyn PosedImageSource>, batch_size: usize, seed: u64) -> Self {
        let order = (0..source.len()).collect();
        let mut cursor = Self {
            source,
            batch_size,
            order,
            position: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        cursor.order.shuffle(&mut cursor.rng);
        cursor
    }

    fn next_batch(&mut self) -> Result<Vec<PosedImage>> {
        if self.position + self.batch_size > self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.position = 0;
        }
        let indices = &self.order[self.position..self.position + self.batch_size];
        self.position += self.batch_size;
        indices.iter().map(|&i| self.source.get(i)).collect()
    }
}

enum Mode {
    Inline(BatchCursor),
    Prefetch {
        receiver: Option<Receiver<Result<Vec<PosedImage>>>>,
        handle: Option<JoinHandle<()>>,
    },
}

/// Infinite image batch iterator.
pub struct ImageBatchLoader {
    mode: Mode,
    batch_size: usize,
}

impl ImageBatchLoader {
    /// Open a loader over `source`.
    ///
    /// `batch_size` is clamped to the number of images. When the source is
    /// not cached and `num_workers > 0`, up to `num_workers` batches are
    /// produced ahead of time on a background thread.
    pub fn new(source: Arc<dyn PosedImageSource>, batch_size: usize, num_workers: usize, seed: u64) -> Result<Self> {
        if source.is_empty() {
            return Err(NeuralAtomError::InvalidData("image source is empty".to_string()));
        }
        if batch_size == 0 {
            return Err(NeuralAtomError::config("image batch size must be positive"));
        }
        let batch_size = if batch_size > source.len() {
            log::warn!(
                "Image batch size {} exceeds dataset size {}; using {}",
                batch_size,
                source.len(),
                source.len()
            );
            source.len()
        } else {
            batch_size
        };

        let prefetch = !source.is_cached() && num_workers > 0;
        let mut cursor = BatchCursor::new(source, batch_size, seed);

        let mode = if prefetch {
            let (sender, receiver) = sync_channel(num_workers);
            let handle = std::thread::Builder::new()
                .name("image-batch-loader".to_string())
                .spawn(move || loop {
                    let batch = cursor.next_batch();
                    let failed = batch.is_err();
                    if sender.send(batch).is_err() || failed {
                        break;
                    }
                })?;
            Mode::Prefetch {
                receiver: Some(receiver),
                handle: Some(handle),
            }
        } else {
            Mode::Inline(cursor)
        };

        Ok(Self { mode, batch_size })
    }

    /// Images per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Whether batches come from a background thread.
    pub fn is_prefetching(&self) -> bool {
        matches!(self.mode, Mode::Prefetch { .. })
    }

    /// Next batch of images.
    pub fn next_batch(&mut self) -> Result<Vec<PosedImage>> {
        match &mut self.mode {
            Mode::Inline(cursor) => cursor.next_batch(),
            Mode::Prefetch { receiver, .. } => receiver
                .as_ref()
                .ok_or(NeuralAtomError::DataSourceClosed)?
                .recv()
                .map_err(|_| NeuralAtomError::DataSourceClosed)?,
        }
    }
}

impl Drop for ImageBatchLoader {
    fn drop(&mut self) {
        if let Mode::Prefetch { receiver, handle } = &mut self.mode {
            // Closing the queue unblocks the producer.
            drop(receiver.take());
            if let Some(handle) = handle.take() {
                join_producer(handle);
            }
        }
    }
}

/// Wait for the prefetch thread. Returns false if it panicked.
fn join_producer(handle: JoinHandle<()>) -> bool {
    let name = handle.thread().name().unwrap_or("prefetch").to_string();
    match handle.join() {
        Ok(()) => true,
        Err(_) => {
            log::warn!("Image loader thread {} panicked; its batches were lost", name);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Image, PosedImagesDataset};
    use atom_core::{CameraBounds, CameraIntrinsics, CameraPose};
    use std::collections::HashSet;

    /// Identifies a frame by the x translation of its pose.
    fn dataset(n: usize) -> PosedImagesDataset {
        let frames = (0..n)
            .map(|i| PosedImage {
                image: Image::filled(1, 1, [0.0; 3]),
                pose: CameraPose {
                    translation: [i as f32, 0.0, 0.0],
                    ..CameraPose::identity()
                },
            })
            .collect();
        PosedImagesDataset::new(
            CameraIntrinsics::new(1, 1, 1.0),
            CameraBounds::new(0.0, 1.0).unwrap(),
            frames,
        )
        .unwrap()
    }

    /// Same frames, but reporting as uncached so the loader prefetches.
    struct Uncached(PosedImagesDataset);

    impl PosedImageSource for Uncached {
        fn len(&self) -> usize {
            self.0.len()
        }
        fn get(&self, index: usize) -> Result<PosedImage> {
            self.0.get(index)
        }
        fn pose(&self, index: usize) -> Result<CameraPose> {
            self.0.pose(index)
        }
        fn intrinsics(&self) -> CameraIntrinsics {
            self.0.intrinsics()
        }
        fn bounds(&self) -> CameraBounds {
            self.0.bounds()
        }
        fn is_cached(&self) -> bool {
            false
        }
    }

    /// Uncached source whose reads panic.
    struct Exploding(PosedImagesDataset);

    impl PosedImageSource for Exploding {
        fn len(&self) -> usize {
            self.0.len()
        }
        fn get(&self, _index: usize) -> Result<PosedImage> {
            panic!("unreadable frame")
        }
        fn pose(&self, index: usize) -> Result<CameraPose> {
            self.0.pose(index)
        }
        fn intrinsics(&self) -> CameraIntrinsics {
            self.0.intrinsics()
        }
        fn bounds(&self) -> CameraBounds {
            self.0.bounds()
        }
        fn is_cached(&self) -> bool {
            false
        }
    }

    fn ids(batch: &[PosedImage]) -> Vec<usize> {
        batch.iter().map(|f| f.pose.translation[0] as usize).collect()
    }

    #[test]
    fn test_epoch_covers_each_image_once() {
        let mut loader = ImageBatchLoader::new(Arc::new(dataset(7)), 3, 0, 1).unwrap();
        assert!(!loader.is_prefetching());

        for _epoch in 0..3 {
            let mut seen = HashSet::new();
            for _ in 0..2 {
                let batch = loader.next_batch().unwrap();
                assert_eq!(batch.len(), 3);
                for id in ids(&batch) {
                    assert!(seen.insert(id), "image {} repeated within an epoch", id);
                }
            }
        }
    }

    #[test]
    fn test_batch_size_clamped() {
        let mut loader = ImageBatchLoader::new(Arc::new(dataset(2)), 8, 0, 1).unwrap();
        assert_eq!(loader.batch_size(), 2);
        let mut batch = ids(&loader.next_batch().unwrap());
        batch.sort();
        assert_eq!(batch, vec![0, 1]);
    }

    #[test]
    fn test_prefetch_matches_inline_order() {
        let mut inline = ImageBatchLoader::new(Arc::new(dataset(5)), 2, 0, 9).unwrap();
        let mut prefetch = ImageBatchLoader::new(Arc::new(Uncached(dataset(5))), 2, 3, 9).unwrap();
        assert!(prefetch.is_prefetching());

        for _ in 0..6 {
            assert_eq!(
                ids(&inline.next_batch().unwrap()),
                ids(&prefetch.next_batch().unwrap())
            );
        }
    }

    #[test]
    fn test_panicking_producer_closes_source() {
        let mut loader = ImageBatchLoader::new(Arc::new(Exploding(dataset(4))), 2, 2, 0).unwrap();
        assert!(matches!(loader.next_batch(), Err(NeuralAtomError::DataSourceClosed)));

        let Mode::Prefetch { handle, .. } = &mut loader.mode else {
            panic!("expected a prefetching loader");
        };
        assert!(!join_producer(handle.take().unwrap()));
    }

    #[test]
    fn test_producer_joins_cleanly() {
        let handle = std::thread::spawn(|| {});
        assert!(join_producer(handle));
    }

    #[test]
    fn test_empty_source_rejected() {
        assert!(ImageBatchLoader::new(Arc::new(dataset(0)), 1, 0, 0).is_err());
    }
}
