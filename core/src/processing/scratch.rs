use std::path::{Path, PathBuf};

use log::info;
use tempfile::TempDir;

use crate::fits::image::SkyImage;
use crate::prelude::MosaicResult;

/// Run-scoped directory for intermediate products. The directory and
/// everything in it is removed when the space is dropped, unless it was
/// created with `keep` set.
pub struct ScratchSpace {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl ScratchSpace {
    pub fn create(parent: Option<&Path>, keep: bool) -> MosaicResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vmosaic-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Beam-unique location for an intermediate product.
    pub fn product_path(&self, beam: usize, product: &str) -> PathBuf {
        self.path.join(format!("beam{:02}_{}.fits", beam, product))
    }

    pub fn write(&self, beam: usize, product: &str, image: &SkyImage) -> MosaicResult<PathBuf> {
        let path = self.product_path(beam, product);
        image.write(&path)?;
        Ok(path)
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if !self.keep {
            return;
        }
        if let Some(dir) = self.dir.take() {
            let path = dir.keep();
            info!("Intermediate products kept in {}", path.display());
        }
    }
}
