use crate::canvas::CanvasError;
use crate::editor::SessionError;
use crate::export::ExportError;
use crate::geometry::GeometryError;
use crate::region::RegionError;
use crate::storage::StorageError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}
