use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::geometry::WorldPoint;
use crate::region::{Category, Region, RegionStore, DEFAULT_MIN_REGION_SIZE};

pub const PROJECT_ROOT_DIR: &str = "area_marker";
pub const PROJECT_DATA_FILE: &str = "project_data.json";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("image path has no file name: {path}")]
    InvalidImagePath { path: PathBuf },
    #[error("failed to create project folder {path}: {source}")]
    CreateProject {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy image {from} to {to}: {source}")]
    CopyImage {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read project record {path}: {source}")]
    ReadRecord {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse project record {path}: {source}")]
    ParseRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize project record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("project folder {path} has no image")]
    MissingImage { path: PathBuf },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// On-disk shape of `project_data.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub image_path: String,
    pub areas: BTreeMap<Category, Vec<[[f64; 2]; 2]>>,
    pub timestamp: String,
}

impl ProjectRecord {
    pub fn from_store(image_path: &Path, store: &RegionStore) -> Self {
        let areas = Category::ALL
            .iter()
            .map(|category| {
                let entries = store
                    .regions(*category)
                    .iter()
                    .map(|region| {
                        [
                            [region.corner_a.x, region.corner_a.y],
                            [region.corner_b.x, region.corner_b.y],
                        ]
                    })
                    .collect();
                (*category, entries)
            })
            .collect();
        Self {
            image_path: image_path.to_string_lossy().into_owned(),
            areas,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// A recoverable problem found while reading a project record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadWarning {
    #[error("skipped {category} entry {index}: {reason}")]
    MalformedProjectEntry {
        category: String,
        index: usize,
        reason: String,
    },
    #[error("skipped unknown category {0}")]
    UnknownCategory(String),
    #[error("category {0} is not a list")]
    CategoryNotList(String),
    #[error("areas is not an object")]
    AreasNotObject,
}

#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub folder: PathBuf,
    pub image_path: PathBuf,
    pub store: RegionStore,
    pub record_found: bool,
    pub warnings: Vec<LoadWarning>,
}

pub trait ProjectStorage {
    fn create_project(&self, image_path: &Path) -> StorageResult<PathBuf>;
    fn save(&self, folder: &Path, image_path: &Path, store: &RegionStore)
        -> StorageResult<PathBuf>;
    fn load(&self, folder: &Path) -> StorageResult<LoadedProject>;
}

#[derive(Debug, Clone)]
pub struct ProjectService {
    min_region_size: u32,
}

impl Default for ProjectService {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectService {
    pub const fn new() -> Self {
        Self {
            min_region_size: DEFAULT_MIN_REGION_SIZE,
        }
    }

    pub const fn with_min_region_size(min_region_size: u32) -> Self {
        Self { min_region_size }
    }

    pub fn record_path(folder: &Path) -> PathBuf {
        folder.join(PROJECT_DATA_FILE)
    }

    /// Creates `area_marker/<image stem>` next to the image's parent directory,
    /// suffixing `_1`, `_2`, ... when the name is taken, and copies the image in.
    pub fn create_project(&self, image_path: &Path) -> StorageResult<PathBuf> {
        let invalid = || StorageError::InvalidImagePath {
            path: image_path.to_path_buf(),
        };
        let file_name = image_path.file_name().ok_or_else(invalid)?;
        let stem = image_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(invalid)?;

        let root = project_base_dir(image_path).join(PROJECT_ROOT_DIR);
        fs::create_dir_all(&root).map_err(|source| StorageError::CreateProject {
            path: root.clone(),
            source,
        })?;

        let folder = next_free_folder(&root, stem);
        fs::create_dir(&folder).map_err(|source| StorageError::CreateProject {
            path: folder.clone(),
            source,
        })?;

        let destination = folder.join(file_name);
        fs::copy(image_path, &destination).map_err(|source| StorageError::CopyImage {
            from: image_path.to_path_buf(),
            to: destination.clone(),
            source,
        })?;

        tracing::info!(folder = %folder.display(), "created project folder");
        Ok(folder)
    }

    pub fn save(
        &self,
        folder: &Path,
        image_path: &Path,
        store: &RegionStore,
    ) -> StorageResult<PathBuf> {
        let record = ProjectRecord::from_store(image_path, store);
        let serialized = serde_json::to_string_pretty(&record)?;
        let path = Self::record_path(folder);
        write_atomic(&path, serialized.as_bytes())?;
        tracing::debug!(path = %path.display(), regions = store.len(), "saved project record");
        Ok(path)
    }

    pub fn load(&self, folder: &Path) -> StorageResult<LoadedProject> {
        let record_path = Self::record_path(folder);
        let record = if record_path.exists() {
            let contents =
                fs::read_to_string(&record_path).map_err(|source| StorageError::ReadRecord {
                    path: record_path.clone(),
                    source,
                })?;
            let value: Value =
                serde_json::from_str(&contents).map_err(|source| StorageError::ParseRecord {
                    path: record_path.clone(),
                    source,
                })?;
            Some(value)
        } else {
            tracing::info!(path = %record_path.display(), "no project record; loading image only");
            None
        };

        let recorded_image = record
            .as_ref()
            .and_then(|value| value.get("image_path"))
            .and_then(Value::as_str)
            .map(PathBuf::from);
        let image_path = find_folder_image(folder)?
            .or_else(|| recorded_image.filter(|path| path.is_file()))
            .ok_or_else(|| StorageError::MissingImage {
                path: folder.to_path_buf(),
            })?;

        let mut store = RegionStore::with_min_size(self.min_region_size);
        let mut warnings = Vec::new();
        if let Some(areas) = record.as_ref().and_then(|value| value.get("areas")) {
            read_areas(areas, &mut store, &mut warnings);
        }
        for warning in &warnings {
            tracing::warn!(folder = %folder.display(), %warning, "project record problem");
        }

        Ok(LoadedProject {
            folder: folder.to_path_buf(),
            image_path,
            store,
            record_found: record.is_some(),
            warnings,
        })
    }
}

impl ProjectStorage for ProjectService {
    fn create_project(&self, image_path: &Path) -> StorageResult<PathBuf> {
        self.create_project(image_path)
    }

    fn save(
        &self,
        folder: &Path,
        image_path: &Path,
        store: &RegionStore,
    ) -> StorageResult<PathBuf> {
        self.save(folder, image_path, store)
    }

    fn load(&self, folder: &Path) -> StorageResult<LoadedProject> {
        self.load(folder)
    }
}

/// Writes through a sibling temp file and renames it over `path`, so a failed
/// write never leaves a truncated file behind.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    let write_error = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    file.write_all(contents).map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;
    file.persist(path).map_err(|err| write_error(err.error))?;
    Ok(())
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn find_folder_image(folder: &Path) -> StorageResult<Option<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images.into_iter().next())
}

fn project_base_dir(image_path: &Path) -> PathBuf {
    let parent = image_path.parent();
    parent
        .and_then(Path::parent)
        .or(parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn next_free_folder(root: &Path, stem: &str) -> PathBuf {
    let mut candidate = root.join(stem);
    let mut counter = 1u32;
    while candidate.exists() {
        candidate = root.join(format!("{stem}_{counter}"));
        counter += 1;
    }
    candidate
}

fn read_areas(areas: &Value, store: &mut RegionStore, warnings: &mut Vec<LoadWarning>) {
    let Some(areas) = areas.as_object() else {
        warnings.push(LoadWarning::AreasNotObject);
        return;
    };

    // Known categories are read in declaration order so the rebuilt insertion
    // order is stable regardless of key order in the file.
    let mut by_category: Vec<(Category, &str, &Value)> = Vec::new();
    for (key, entries) in areas {
        match Category::from_key(key) {
            Some(category) => by_category.push((category, key.as_str(), entries)),
            None => warnings.push(LoadWarning::UnknownCategory(key.clone())),
        }
    }
    by_category.sort_by_key(|(category, _, _)| *category);

    for (category, key, entries) in by_category {
        let Some(entries) = entries.as_array() else {
            warnings.push(LoadWarning::CategoryNotList(key.to_string()));
            continue;
        };
        for (index, entry) in entries.iter().enumerate() {
            match parse_entry(entry) {
                Ok((corner_a, corner_b)) => {
                    store.push_world(Region::new(category, corner_a, corner_b));
                }
                Err(reason) => warnings.push(LoadWarning::MalformedProjectEntry {
                    category: key.to_string(),
                    index,
                    reason,
                }),
            }
        }
    }
}

fn parse_entry(entry: &Value) -> Result<(WorldPoint, WorldPoint), String> {
    let points = entry
        .as_array()
        .ok_or_else(|| "entry is not a list".to_string())?;
    if points.len() != 2 {
        return Err(format!("expected 2 points, found {}", points.len()));
    }
    Ok((parse_point(&points[0])?, parse_point(&points[1])?))
}

fn parse_point(point: &Value) -> Result<WorldPoint, String> {
    let coords = point
        .as_array()
        .filter(|coords| coords.len() == 2)
        .ok_or_else(|| format!("point {point} is not a two-element list"))?;
    match (coords[0].as_f64(), coords[1].as_f64()) {
        (Some(x), Some(y)) => Ok(WorldPoint::new(x, y)),
        _ => Err(format!("point {point} has non-numeric coordinates")),
    }
}
