//! Image storage.
//!
//! Uploaded images land in one server-controlled directory keyed by the
//! client-supplied name. Names are validated against the identifier
//! alphabet before they ever touch a path, so a key cannot escape the
//! store root.

use crate::error::{CatalogError, CatalogResult};
use std::path::{Path, PathBuf};

/// Flat on-disk image store.
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Create the store, making the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> CatalogResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Persist image bytes under `name`.
    pub async fn save(&self, name: &str, bytes: &[u8]) -> CatalogResult<()> {
        let path = self.image_path(name)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    /// Load the bytes stored under `name`.
    pub async fn load(&self, name: &str) -> CatalogResult<Vec<u8>> {
        let path = self.image_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CatalogError::ImageNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn image_path(&self, name: &str) -> CatalogResult<PathBuf> {
        corral_core::ident::validate_image_name(name)
            .map_err(|_| CatalogError::InvalidImageName(name.to_string()))?;
        Ok(self.root.join(name))
    }
}
