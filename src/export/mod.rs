//! Nested-array text export of the region store.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::region::{Category, Region, RegionStore};
use crate::storage::{write_atomic, StorageError};

pub const DEFAULT_EXPORT_PREFIX: &str = "std::vector<std::vector<std::vector<glm::vec2>>>=";
pub const PROJECT_EXPORT_FILE: &str = "exported_data.txt";
pub const PROJECT_RAW_EXPORT_FILE: &str = "exported_data_raw.txt";
const RAW_SUFFIX: &str = "_raw";
const EXPORT_EXTENSION: &str = "txt";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("there are no regions to export")]
    NoRegions,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exporter {
    prefix: String,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_EXPORT_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{blocked...},{waterway...}`; an empty category still yields `{}`.
    pub fn serialize_raw(&self, store: &RegionStore) -> String {
        Category::ALL
            .iter()
            .map(|category| {
                let regions = store
                    .regions(*category)
                    .iter()
                    .map(format_region)
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{{{regions}}}")
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn serialize_prefixed(&self, store: &RegionStore) -> String {
        format!("{}{}", self.prefix, self.serialize_raw(store))
    }

    /// Writes `<stem>.txt` and `<stem>_raw.txt`, forcing the `.txt` extension.
    pub fn write_files(&self, target: &Path, store: &RegionStore) -> ExportResult<Vec<PathBuf>> {
        let (prefixed_path, raw_path) = export_paths(target);
        self.write_pair(&prefixed_path, &raw_path, store)?;
        Ok(vec![prefixed_path, raw_path])
    }

    /// Writes `exported_data.txt` and `exported_data_raw.txt` into a project folder.
    pub fn write_project_files(
        &self,
        folder: &Path,
        store: &RegionStore,
    ) -> ExportResult<Vec<PathBuf>> {
        let prefixed_path = folder.join(PROJECT_EXPORT_FILE);
        let raw_path = folder.join(PROJECT_RAW_EXPORT_FILE);
        self.write_pair(&prefixed_path, &raw_path, store)?;
        Ok(vec![prefixed_path, raw_path])
    }

    fn write_pair(&self, prefixed: &Path, raw: &Path, store: &RegionStore) -> ExportResult<()> {
        let raw_text = self.serialize_raw(store);
        write_atomic(prefixed, format!("{}{raw_text}", self.prefix).as_bytes())?;
        write_atomic(raw, raw_text.as_bytes())?;
        tracing::info!(
            prefixed = %prefixed.display(),
            raw = %raw.display(),
            regions = store.len(),
            "exported regions"
        );
        Ok(())
    }
}

fn format_region(region: &Region) -> String {
    format!(
        "{{glm::vec2({:.1}, {:.1}),glm::vec2({:.1}, {:.1})}}",
        region.corner_a.x, region.corner_a.y, region.corner_b.x, region.corner_b.y
    )
}

/// Returns the prefixed and raw export paths for a requested target.
pub fn export_paths(target: &Path) -> (PathBuf, PathBuf) {
    let has_txt = target
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EXPORT_EXTENSION));
    let prefixed = if has_txt {
        target.to_path_buf()
    } else {
        let mut name = target.as_os_str().to_os_string();
        name.push(".");
        name.push(EXPORT_EXTENSION);
        PathBuf::from(name)
    };

    let stem = prefixed
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let raw = prefixed.with_file_name(format!("{stem}{RAW_SUFFIX}.{EXPORT_EXTENSION}"));
    (prefixed, raw)
}
