//! Dataset loading and batching
//!
//! MNIST comes as IDX files: a big-endian header (magic number, item count and,
//! for images, rows and columns) followed by one unsigned byte per pixel or
//! label. Images are flattened to `rows × cols` features scaled to `[0, 1]` and
//! labels are one-hot encoded.

use crate::error::{BenderError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Magic number of an IDX file holding unsigned-byte 3-D tensors (images).
pub const IDX_IMAGES_MAGIC: u32 = 0x0000_0803;
/// Magic number of an IDX file holding unsigned-byte vectors (labels).
pub const IDX_LABELS_MAGIC: u32 = 0x0000_0801;

pub const MNIST_CLASSES: usize = 10;

/// Which half of MNIST to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn file_names(self) -> (&'static str, &'static str) {
        match self {
            Split::Train => ("train-images.idx3-ubyte", "train-labels.idx1-ubyte"),
            Split::Test => ("t10k-images.idx3-ubyte", "t10k-labels.idx1-ubyte"),
        }
    }
}

fn read_be_u32(data: &[u8], offset: &mut usize) -> Option<u32> {
    let bytes = data.get(*offset..*offset + 4)?;
    *offset += 4;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn dataset_error(path: &Path, reason: impl Into<String>) -> BenderError {
    BenderError::Dataset {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Read up to `limit` images from an IDX image file.
///
/// Returns the pixels normalized to `[0, 1]`, row-major per image, together
/// with the number of features per image (`rows × cols`).
///
/// # Errors
///
/// `Io` if the file cannot be read, `Dataset` if the header is wrong or the
/// payload is shorter than the header promises.
pub fn read_idx_images(path: impl AsRef<Path>, limit: usize) -> Result<(Vec<f32>, usize)> {
    let path = path.as_ref();
    let data = fs::read(path)?;

    let mut offset = 0usize;
    let header = (|| {
        Some((
            read_be_u32(&data, &mut offset)?,
            read_be_u32(&data, &mut offset)? as usize,
            read_be_u32(&data, &mut offset)? as usize,
            read_be_u32(&data, &mut offset)? as usize,
        ))
    })();
    let (magic, total, rows, cols) =
        header.ok_or_else(|| dataset_error(path, "header is truncated"))?;
    if magic != IDX_IMAGES_MAGIC {
        return Err(dataset_error(
            path,
            format!("expected magic {:#010x}, found {:#010x}", IDX_IMAGES_MAGIC, magic),
        ));
    }

    let count = limit.min(total);
    let (image_size, end) = rows
        .checked_mul(cols)
        .and_then(|size| Some((size, size.checked_mul(count)?.checked_add(offset)?)))
        .ok_or_else(|| dataset_error(path, "header dimensions overflow"))?;
    if count < limit && limit != usize::MAX {
        warn!(path = %path.display(), requested = limit, available = total, "image file holds fewer samples than requested");
    }
    let pixels = data
        .get(offset..end)
        .ok_or_else(|| dataset_error(path, "image payload is truncated"))?;

    let images = pixels.iter().map(|&p| p as f32 / 255.0).collect();
    debug!(path = %path.display(), count, rows, cols, "loaded IDX images");
    Ok((images, image_size))
}

/// Read up to `limit` labels from an IDX label file.
///
/// # Errors
///
/// Same as [`read_idx_images`].
pub fn read_idx_labels(path: impl AsRef<Path>, limit: usize) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let data = fs::read(path)?;

    let mut offset = 0usize;
    let magic = read_be_u32(&data, &mut offset);
    let total = read_be_u32(&data, &mut offset);
    let (magic, total) = match (magic, total) {
        (Some(m), Some(t)) => (m, t as usize),
        _ => return Err(dataset_error(path, "header is truncated")),
    };
    if magic != IDX_LABELS_MAGIC {
        return Err(dataset_error(
            path,
            format!("expected magic {:#010x}, found {:#010x}", IDX_LABELS_MAGIC, magic),
        ));
    }

    let count = limit.min(total);
    let labels = data
        .get(offset..offset + count)
        .ok_or_else(|| dataset_error(path, "label payload is truncated"))?;
    debug!(path = %path.display(), count, "loaded IDX labels");
    Ok(labels.to_vec())
}

/// One-hot encode `labels` over `classes` categories.
///
/// # Errors
///
/// `Shape` if `classes` is zero or a label is not below `classes`.
pub fn one_hot(labels: &[u8], classes: usize) -> Result<Vec<f32>> {
    if classes == 0 {
        return Err(BenderError::Shape("num_classes must be greater than 0".into()));
    }
    let mut encoded = vec![0.0f32; labels.len() * classes];
    for (row, &label) in encoded.chunks_exact_mut(classes).zip(labels.iter()) {
        let label = label as usize;
        if label >= classes {
            return Err(BenderError::Shape(format!(
                "label {} is out of range for {} classes",
                label, classes
            )));
        }
        row[label] = 1.0;
    }
    Ok(encoded)
}

/// Index of the largest entry in each row of a `rows × classes` buffer.
///
/// Ties resolve to the first maximum.
pub fn onecold(values: &[f32], classes: usize) -> Vec<usize> {
    values
        .chunks_exact(classes)
        .map(|row| {
            let mut best = 0usize;
            for (i, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// Features, one-hot targets and raw labels for a set of samples.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Vec<f32>,
    targets: Vec<f32>,
    labels: Vec<u8>,
    feature_size: usize,
    num_classes: usize,
}

impl Dataset {
    /// # Errors
    ///
    /// `Shape` if `features` does not hold `labels.len()` rows of
    /// `feature_size`, `num_classes` is zero or a label is out of range.
    pub fn new(
        features: Vec<f32>,
        labels: Vec<u8>,
        feature_size: usize,
        num_classes: usize,
    ) -> Result<Self> {
        if num_classes == 0 {
            return Err(BenderError::Shape("num_classes must be greater than 0".into()));
        }
        if features.len() != labels.len() * feature_size {
            return Err(BenderError::Shape(format!(
                "{} features cannot be split into {} samples of {}",
                features.len(),
                labels.len(),
                feature_size
            )));
        }
        let targets = one_hot(&labels, num_classes)?;
        Ok(Self {
            features,
            targets,
            labels,
            feature_size,
            num_classes,
        })
    }

    /// Load a split of MNIST from `dir`, keeping at most `limit` samples.
    pub fn mnist(dir: impl AsRef<Path>, split: Split, limit: usize) -> Result<Self> {
        let dir = dir.as_ref();
        let (image_file, label_file) = split.file_names();
        let (features, feature_size) = read_idx_images(dir.join(image_file), limit)?;
        let labels = read_idx_labels(dir.join(label_file), limit)?;
        if features.len() / feature_size.max(1) != labels.len() {
            return Err(dataset_error(
                &dir.join(label_file),
                format!(
                    "{} labels for {} images",
                    labels.len(),
                    features.len() / feature_size.max(1)
                ),
            ));
        }
        Self::new(features, labels, feature_size, MNIST_CLASSES)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn feature_size(&self) -> usize {
        self.feature_size
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }
}

/// A gathered mini-batch.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Vec<f32>,
    pub targets: Vec<f32>,
    pub labels: Vec<u8>,
    pub size: usize,
}

/// Splits a dataset into mini-batches.
///
/// Without `partial`, a trailing batch smaller than `batch_size` is dropped.
#[derive(Debug, Clone, Copy)]
pub struct DataLoader {
    batch_size: usize,
    shuffle: bool,
    partial: bool,
}

impl DataLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            shuffle: false,
            partial: false,
        }
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches one pass over `len` samples yields.
    pub fn num_batches(&self, len: usize) -> usize {
        if self.partial {
            len.div_ceil(self.batch_size)
        } else {
            len / self.batch_size
        }
    }

    /// Iterate over the batches of `data`, reshuffling with `rng` if enabled.
    pub fn iter<'a, R: Rng + ?Sized>(&self, data: &'a Dataset, rng: &mut R) -> Batches<'a> {
        let mut order: Vec<usize> = (0..data.len()).collect();
        if self.shuffle {
            order.shuffle(rng);
        }
        Batches {
            data,
            order,
            cursor: 0,
            loader: *self,
        }
    }
}

/// Iterator returned by [`DataLoader::iter`].
pub struct Batches<'a> {
    data: &'a Dataset,
    order: Vec<usize>,
    cursor: usize,
    loader: DataLoader,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let remaining = self.order.len() - self.cursor;
        let size = remaining.min(self.loader.batch_size);
        if size == 0 || (size < self.loader.batch_size && !self.loader.partial) {
            return None;
        }

        let fs = self.data.feature_size;
        let nc = self.data.num_classes;
        let mut batch = Batch {
            inputs: Vec::with_capacity(size * fs),
            targets: Vec::with_capacity(size * nc),
            labels: Vec::with_capacity(size),
            size,
        };
        for &idx in &self.order[self.cursor..self.cursor + size] {
            batch
                .inputs
                .extend_from_slice(&self.data.features[idx * fs..(idx + 1) * fs]);
            batch
                .targets
                .extend_from_slice(&self.data.targets[idx * nc..(idx + 1) * nc]);
            batch.labels.push(self.data.labels[idx]);
        }
        self.cursor += size;
        Some(batch)
    }
}
