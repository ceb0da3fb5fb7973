//! CT image pair dataset with random patch extraction.

use std::path::{Path, PathBuf};

use image::GrayImage;
use rand::Rng;

use crate::error::{BrdnetError, Result};

/// One noisy/clean image pair named by an index file line.
#[derive(Debug, Clone)]
pub struct PairEntry {
    /// Path to the noisy (low-dose) image.
    pub noisy: PathBuf,
    /// Path to the ground-truth (full-dose) image.
    pub clean: PathBuf,
    /// Identifier, taken from the noisy file stem.
    pub id: String,
}

/// A drawn sample: `patch_n` aligned crops from one image pair.
///
/// Pixel values are row-major per patch, normalized to [0, 1].
#[derive(Debug, Clone)]
pub struct PatchSample {
    /// Noisy patches, `patch_n * patch_size * patch_size` values.
    pub noisy: Vec<f32>,
    /// Ground-truth patches, same layout as `noisy`.
    pub clean: Vec<f32>,
    /// Identifier of the source pair.
    pub id: String,
}

/// Dataset over an index file of noisy/clean image pairs.
///
/// Index format: one `noisy_path clean_path` pair per line, whitespace
/// separated. Relative paths resolve against the index file's directory.
/// Blank lines and lines starting with `#` are skipped.
#[derive(Debug)]
pub struct CtDataset {
    entries: Vec<PairEntry>,
    patch_n: usize,
    patch_size: usize,
}

impl CtDataset {
    /// Load a dataset from an index file.
    ///
    /// # Errors
    ///
    /// Returns a [`BrdnetError::Dataset`] if the index is missing or a line
    /// does not name exactly two paths.
    pub fn load<P: AsRef<Path>>(index: P, patch_n: usize, patch_size: usize) -> Result<Self> {
        let index = index.as_ref();
        if !index.exists() {
            return Err(BrdnetError::Dataset(format!(
                "index file not found: {}",
                index.display()
            )));
        }

        let base = index.parent().unwrap_or_else(|| Path::new("."));
        let content = std::fs::read_to_string(index)?;
        let mut entries = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let (noisy, clean) = match (parts.next(), parts.next(), parts.next()) {
                (Some(noisy), Some(clean), None) => (noisy, clean),
                _ => {
                    return Err(BrdnetError::Dataset(format!(
                        "line {} of {}: expected `noisy clean` pair",
                        line_no + 1,
                        index.display()
                    )))
                }
            };

            let noisy = resolve(base, noisy);
            let clean = resolve(base, clean);
            let id = noisy
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("pair-{}", line_no + 1));

            entries.push(PairEntry { noisy, clean, id });
        }

        Ok(Self {
            entries,
            patch_n,
            patch_size,
        })
    }

    /// Number of image pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the dataset has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patches drawn per pair.
    #[must_use]
    pub fn patch_n(&self) -> usize {
        self.patch_n
    }

    /// Side length of a square patch.
    #[must_use]
    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    /// The index entries, in file order.
    #[must_use]
    pub fn entries(&self) -> &[PairEntry] {
        &self.entries
    }

    /// Draw `patch_n` aligned random crops from the pair at `idx`.
    ///
    /// # Errors
    ///
    /// Fails when either image cannot be read, the pair's dimensions differ,
    /// or an image is smaller than the patch size.
    pub fn sample<R: Rng>(&self, idx: usize, rng: &mut R) -> Result<PatchSample> {
        let entry = self.entries.get(idx).ok_or_else(|| {
            BrdnetError::Dataset(format!("index {idx} out of range ({})", self.entries.len()))
        })?;

        let noisy = load_gray(&entry.noisy)?;
        let clean = load_gray(&entry.clean)?;
        if noisy.dimensions() != clean.dimensions() {
            return Err(BrdnetError::Dataset(format!(
                "pair {}: dimension mismatch {:?} vs {:?}",
                entry.id,
                noisy.dimensions(),
                clean.dimensions()
            )));
        }

        let (width, height) = noisy.dimensions();
        let ps = self.patch_size as u32;
        if width < ps || height < ps {
            return Err(BrdnetError::Dataset(format!(
                "pair {}: image {}x{} smaller than patch size {}",
                entry.id, width, height, ps
            )));
        }

        let patch_len = self.patch_size * self.patch_size;
        let mut noisy_buf = Vec::with_capacity(self.patch_n * patch_len);
        let mut clean_buf = Vec::with_capacity(self.patch_n * patch_len);

        for _ in 0..self.patch_n {
            let x0 = rng.gen_range(0..=width - ps);
            let y0 = rng.gen_range(0..=height - ps);
            copy_patch(&noisy, x0, y0, ps, &mut noisy_buf);
            copy_patch(&clean, x0, y0, ps, &mut clean_buf);
        }

        Ok(PatchSample {
            noisy: noisy_buf,
            clean: clean_buf,
            id: entry.id.clone(),
        })
    }
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn load_gray(path: &Path) -> Result<GrayImage> {
    let img = image::open(path).map_err(|e| {
        BrdnetError::Dataset(format!("failed to read image {}: {e}", path.display()))
    })?;
    Ok(img.to_luma8())
}

fn copy_patch(img: &GrayImage, x0: u32, y0: u32, ps: u32, out: &mut Vec<f32>) {
    for y in y0..y0 + ps {
        for x in x0..x0 + ps {
            out.push(f32::from(img.get_pixel(x, y).0[0]) / 255.0);
        }
    }
}
