use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::geometry::ImageBounds;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("failed to read image dimensions from {path}: {source}")]
    Dimensions {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {path} has zero width or height")]
    EmptyImage { path: PathBuf },
}

pub type CanvasResult<T> = std::result::Result<T, CanvasError>;

/// Supplies the dimensions of the image being annotated.
pub trait ImageSource {
    fn dimensions(&self, path: &Path) -> CanvasResult<ImageBounds>;
}

/// Reads dimensions from the image file header without decoding pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileSource;

impl ImageSource for ImageFileSource {
    fn dimensions(&self, path: &Path) -> CanvasResult<ImageBounds> {
        let (width, height) =
            image::image_dimensions(path).map_err(|source| CanvasError::Dimensions {
                path: path.to_path_buf(),
                source,
            })?;
        if width == 0 || height == 0 {
            return Err(CanvasError::EmptyImage {
                path: path.to_path_buf(),
            });
        }
        tracing::debug!(path = %path.display(), width, height, "read image dimensions");
        Ok(ImageBounds::new(width, height))
    }
}

/// Reports the same dimensions for every path.
#[derive(Debug, Clone, Copy)]
pub struct FixedImageSource(pub ImageBounds);

impl ImageSource for FixedImageSource {
    fn dimensions(&self, _path: &Path) -> CanvasResult<ImageBounds> {
        Ok(self.0)
    }
}
