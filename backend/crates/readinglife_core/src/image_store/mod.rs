//! Image store
//!
//! Uploaded cover images live as plain files in a single directory. Records refer to them
//! through an internal path of the form `/src/imgs/{file name}`; only the final component of that
//! path is ever used to locate the file, so a stored path cannot point outside the directory.
pub mod errors;
pub mod naming;

use crate::image_store::errors::ImageStoreError;
use crate::image_store::naming::unique_file_name;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Prefix of the `img_path` values written to the record store.
pub const IMAGE_PATH_PREFIX: &str = "/src/imgs";

/// A freshly written image.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Name of the file inside the image directory
    pub file_name: String,
    /// Internal path to persist in the record, `/src/imgs/{file_name}`
    pub img_path: String,
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Open the image directory, creating it and any missing parents.
    /// # Errors
    /// Fails if the directory cannot be created.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, ImageStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        log::info!("Serving images from {}", dir.display());
        Ok(Self { dir })
    }

    #[must_use]
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` under a new unique name derived from `original_name`.
    /// # Errors
    /// Fails if the file cannot be written.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per upload")]
    pub async fn store(
        &self,
        original_name: &str,
        data: &[u8],
    ) -> Result<StoredImage, ImageStoreError> {
        let file_name = unique_file_name(original_name);
        fs::write(self.dir.join(&file_name), data).await?;
        log::debug!("Stored image {file_name} ({} bytes)", data.len());

        Ok(StoredImage {
            img_path: format!("{IMAGE_PATH_PREFIX}/{file_name}"),
            file_name,
        })
    }

    /// Map an internal `img_path` to the file it names inside the image directory.
    /// # Errors
    /// Fails if the path does not end in a usable file name.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub fn resolve(&self, img_path: &str) -> Result<PathBuf, ImageStoreError> {
        let file_name = img_path
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .ok_or_else(|| ImageStoreError::InvalidPath(img_path.to_owned()))?;

        Ok(self.dir.join(file_name))
    }

    /// Remove the file behind `img_path`.
    /// # Errors
    /// Fails if the path is invalid, the file is missing or cannot be removed.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub async fn delete(&self, img_path: &str) -> Result<(), ImageStoreError> {
        let path = self.resolve(img_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                log::debug!("Deleted image {}", path.display());
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                Err(ImageStoreError::NotFound(img_path.to_owned()))
            }
            Err(error) => Err(ImageStoreError::Io(error)),
        }
    }
}
