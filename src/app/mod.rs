//! Editor façade: forwards input to the [`EditSession`] and turns committed
//! mutations into a saved project record plus one activity-log line.

use std::fs;
use std::path::{Path, PathBuf};

use crate::canvas::{ImageFileSource, ImageSource};
use crate::config::AppConfig;
use crate::editor::{EditMode, EditSession, SessionOutcome};
use crate::error::AppResult;
use crate::export::{export_paths, ExportError, Exporter};
use crate::geometry::ScreenPoint;
use crate::history::HistoryStack;
use crate::logging::{ActivityLog, MarkdownActivityLog};
use crate::region::{Category, RegionStore};
use crate::storage::{LoadWarning, ProjectService, ProjectStorage};

/// Result of binding an image, either fresh or from a project folder.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedProject {
    pub image_path: PathBuf,
    /// `None` when the project folder could not be created.
    pub folder: Option<PathBuf>,
    pub record_found: bool,
    pub regions: usize,
    pub warnings: Vec<LoadWarning>,
    /// Set when the initial project record could not be written.
    pub save_error: Option<String>,
}

pub struct AnnotationApp<S = ProjectService, L = MarkdownActivityLog, I = ImageFileSource> {
    storage: S,
    activity: L,
    images: I,
    config: AppConfig,
    exporter: Exporter,
    session: EditSession,
    image_path: Option<PathBuf>,
    folder: Option<PathBuf>,
}

impl AnnotationApp {
    /// File-backed storage, `log.md` activity log and header-only image reads.
    pub fn from_config(config: AppConfig) -> Self {
        let storage = ProjectService::with_min_region_size(config.min_region_size);
        let activity = MarkdownActivityLog::new(config.activity_log_path.clone());
        Self::new(storage, activity, ImageFileSource, config)
    }
}

impl<S: ProjectStorage, L: ActivityLog, I: ImageSource> AnnotationApp<S, L, I> {
    pub fn new(storage: S, activity: L, images: I, config: AppConfig) -> Self {
        let mut session = EditSession::with_store(
            RegionStore::with_min_size(config.min_region_size),
            HistoryStack::with_capacity_limit(config.history_limit),
        );
        session.set_category(config.default_category);
        Self {
            storage,
            activity,
            images,
            exporter: Exporter::with_prefix(config.export_prefix.clone()),
            config,
            session,
            image_path: None,
            folder: None,
        }
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn activity(&self) -> &L {
        &self.activity
    }

    pub fn image_path(&self) -> Option<&Path> {
        self.image_path.as_deref()
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    /// Binds a new image with no regions. A project folder is created next to
    /// it; if that fails the session still edits in memory, unsaved.
    pub fn open_image(&mut self, path: &Path) -> AppResult<OpenedProject> {
        let bounds = self.images.dimensions(path)?;
        let folder = match self.storage.create_project(path) {
            Ok(folder) => Some(folder),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "editing without a project folder");
                self.activity
                    .append_log(&format!("failed to create project folder: {err}"));
                None
            }
        };

        self.session.bind_image(
            bounds,
            RegionStore::with_min_size(self.config.min_region_size),
        );
        self.image_path = Some(path.to_path_buf());
        self.folder = folder.clone();
        self.activity
            .append_log(&format!("loaded image {}", display_name(path)));
        let save_error = match self.save() {
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to write initial project record");
                self.activity
                    .append_log(&format!("failed to save project: {err}"));
                Some(err.to_string())
            }
        };

        Ok(OpenedProject {
            image_path: path.to_path_buf(),
            folder,
            record_found: false,
            regions: 0,
            warnings: Vec::new(),
            save_error,
        })
    }

    pub fn open_project(&mut self, folder: &Path) -> AppResult<OpenedProject> {
        let loaded = self.storage.load(folder)?;
        let bounds = self.images.dimensions(&loaded.image_path)?;
        for warning in &loaded.warnings {
            self.activity
                .append_log(&format!("skipped project data: {warning}"));
        }

        let mut store = loaded.store;
        store.set_min_size(self.config.min_region_size);
        let regions = store.len();
        self.session.bind_image(bounds, store);
        self.image_path = Some(loaded.image_path.clone());
        self.folder = Some(loaded.folder.clone());
        self.activity
            .append_log(&format!("opened project {}", display_name(folder)));
        tracing::info!(folder = %folder.display(), regions, "opened project");

        Ok(OpenedProject {
            image_path: loaded.image_path,
            folder: Some(loaded.folder),
            record_found: loaded.record_found,
            regions,
            warnings: loaded.warnings,
            save_error: None,
        })
    }

    pub fn press(&mut self, point: ScreenPoint) -> AppResult<SessionOutcome> {
        let outcome = self.session.press(point)?;
        self.apply(outcome)
    }

    pub fn motion(&mut self, point: ScreenPoint) -> AppResult<SessionOutcome> {
        Ok(self.session.motion(point)?)
    }

    pub fn release(&mut self, point: ScreenPoint) -> AppResult<SessionOutcome> {
        let outcome = self.session.release(point)?;
        self.apply(outcome)
    }

    pub fn set_mode(&mut self, mode: EditMode) -> AppResult<()> {
        Ok(self.session.set_mode(mode)?)
    }

    pub fn toggle_mode(&mut self) -> AppResult<EditMode> {
        Ok(self.session.toggle_mode()?)
    }

    pub fn set_category(&mut self, category: Category) {
        self.session.set_category(category);
    }

    pub fn remove_last(&mut self) -> AppResult<SessionOutcome> {
        let outcome = self.session.remove_last()?;
        self.apply(outcome)
    }

    pub fn clear(&mut self) -> AppResult<SessionOutcome> {
        let outcome = self.session.clear()?;
        self.apply(outcome)
    }

    /// Undoes in memory, then saves so the record on disk matches.
    pub fn undo(&mut self) -> AppResult<()> {
        let regions = self.session.undo()?.len();
        tracing::debug!(regions, "undo");
        self.activity.append_log("undid the last change");
        self.save()?;
        Ok(())
    }

    /// Writes the project record when a project folder is bound.
    pub fn save(&self) -> AppResult<Option<PathBuf>> {
        let (Some(folder), Some(image_path)) = (&self.folder, &self.image_path) else {
            return Ok(None);
        };
        let path = self.storage.save(folder, image_path, self.session.store())?;
        Ok(Some(path))
    }

    /// Writes `<stem>.txt` and `<stem>_raw.txt`. When the target lies outside
    /// the bound project folder, a copy of both also goes into the folder.
    pub fn export(&self, target: &Path) -> AppResult<Vec<PathBuf>> {
        let store = self.session.store();
        if store.is_empty() {
            return Err(ExportError::NoRegions.into());
        }
        self.save()?;

        let mut written = self.exporter.write_files(target, store)?;
        if let Some(folder) = &self.folder {
            let (prefixed, _) = export_paths(target);
            if !is_within(&prefixed, folder) {
                written.extend(self.exporter.write_project_files(folder, store)?);
            }
        }
        self.activity
            .append_log(&format!("exported regions to {}", target.display()));
        Ok(written)
    }

    /// Raw export text, the payload a clipboard copy would carry.
    pub fn raw_export(&self) -> AppResult<String> {
        let store = self.session.store();
        if store.is_empty() {
            return Err(ExportError::NoRegions.into());
        }
        Ok(self.exporter.serialize_raw(store))
    }

    /// Cursor readout in world coordinates, one decimal place.
    pub fn pointer_world(&self, point: ScreenPoint) -> AppResult<String> {
        let world = self.session.transform().to_world(point)?;
        Ok(format!("({:.1}, {:.1})", world.x, world.y))
    }

    fn apply(&mut self, outcome: SessionOutcome) -> AppResult<SessionOutcome> {
        if let Some(mutation) = outcome.committed() {
            self.activity.append_log(&mutation.describe());
            self.save()?;
        }
        Ok(outcome)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_within(path: &Path, folder: &Path) -> bool {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    match (fs::canonicalize(parent), fs::canonicalize(folder)) {
        (Ok(parent), Ok(folder)) => parent.starts_with(folder),
        _ => parent.starts_with(folder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::canvas::FixedImageSource;
    use crate::editor::{Mutation, SessionError};
    use crate::error::AppError;
    use crate::geometry::ImageBounds;
    use crate::storage::{LoadedProject, StorageError, StorageResult, PROJECT_DATA_FILE};

    #[derive(Default)]
    struct RecordingLog(RefCell<Vec<String>>);

    impl RecordingLog {
        fn lines(&self) -> Vec<String> {
            self.0.borrow().clone()
        }
    }

    impl ActivityLog for RecordingLog {
        fn append_log(&self, message: &str) {
            self.0.borrow_mut().push(message.to_string());
        }
    }

    type TestApp = AnnotationApp<ProjectService, RecordingLog, FixedImageSource>;

    fn test_app() -> TestApp {
        AnnotationApp::new(
            ProjectService::new(),
            RecordingLog::default(),
            FixedImageSource(ImageBounds::new(100, 80)),
            AppConfig::default(),
        )
    }

    fn write_image(root: &Path) -> PathBuf {
        let image = root.join("maps").join("level1.png");
        fs::create_dir_all(image.parent().unwrap()).unwrap();
        fs::write(&image, b"png").unwrap();
        image
    }

    fn draw(app: &mut TestApp, a: (i32, i32), b: (i32, i32)) -> SessionOutcome {
        app.press(ScreenPoint::new(a.0, a.1)).unwrap();
        app.press(ScreenPoint::new(b.0, b.1)).unwrap()
    }

    #[test]
    fn open_image_creates_project_and_writes_empty_record() {
        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        let mut app = test_app();

        let opened = app.open_image(&image).expect("image should open");
        let folder = opened.folder.expect("project folder should exist");
        assert_eq!(folder, root.path().join("area_marker").join("level1"));
        assert!(folder.join(PROJECT_DATA_FILE).is_file());
        assert!(app.session().transform().is_bound());
        assert_eq!(app.activity().lines(), ["loaded image level1.png"]);
    }

    #[test]
    fn committed_rectangle_is_saved_and_logged() {
        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        let mut app = test_app();
        let folder = app.open_image(&image).unwrap().folder.unwrap();

        let outcome = draw(&mut app, (10, 10), (40, 30));
        assert!(matches!(outcome, SessionOutcome::Committed(Mutation::Added(_))));
        assert_eq!(
            app.activity().lines().last().map(String::as_str),
            Some("added a blocked region: (-40.0, 30.0) - (-10.0, 10.0)")
        );

        let mut reopened = test_app();
        let project = reopened.open_project(&folder).unwrap();
        assert!(project.record_found);
        assert_eq!(project.regions, 1);
        assert_eq!(reopened.session().store(), app.session().store());
    }

    #[test]
    fn degenerate_rectangle_is_reported_without_logging() {
        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        let mut app = test_app();
        app.open_image(&image).unwrap();

        app.press(ScreenPoint::new(10, 10)).unwrap();
        let err = app.press(ScreenPoint::new(13, 14)).unwrap_err();
        assert!(matches!(err, AppError::Session(SessionError::Region(_))));
        assert_eq!(app.activity().lines().len(), 1);
        assert!(app.session().store().is_empty());
    }

    #[test]
    fn undo_saves_restored_store() {
        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        let mut app = test_app();
        let folder = app.open_image(&image).unwrap().folder.unwrap();
        draw(&mut app, (10, 10), (40, 30));

        app.undo().expect("undo should succeed");
        assert!(app.session().store().is_empty());
        let loaded = ProjectService::new().load(&folder).unwrap();
        assert!(loaded.store.is_empty());
        assert_eq!(
            app.activity().lines().last().map(String::as_str),
            Some("undid the last change")
        );
    }

    #[test]
    fn export_refuses_an_empty_store() {
        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        let mut app = test_app();
        app.open_image(&image).unwrap();

        let err = app.export(&root.path().join("out")).unwrap_err();
        assert!(matches!(err, AppError::Export(ExportError::NoRegions)));
        assert!(matches!(
            app.raw_export().unwrap_err(),
            AppError::Export(ExportError::NoRegions)
        ));
    }

    #[test]
    fn export_outside_project_also_writes_project_copies() {
        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        let mut app = test_app();
        let folder = app.open_image(&image).unwrap().folder.unwrap();
        draw(&mut app, (10, 10), (40, 30));

        let written = app.export(&root.path().join("regions")).unwrap();
        assert_eq!(written.len(), 4);
        assert!(root.path().join("regions.txt").is_file());
        assert!(root.path().join("regions_raw.txt").is_file());
        assert!(folder.join("exported_data.txt").is_file());
        assert!(folder.join("exported_data_raw.txt").is_file());

        let raw = fs::read_to_string(root.path().join("regions_raw.txt")).unwrap();
        assert_eq!(raw, app.raw_export().unwrap());
    }

    #[test]
    fn export_inside_project_writes_only_the_requested_pair() {
        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        let mut app = test_app();
        let folder = app.open_image(&image).unwrap().folder.unwrap();
        draw(&mut app, (10, 10), (40, 30));

        let written = app.export(&folder.join("level.txt")).unwrap();
        assert_eq!(written, vec![folder.join("level.txt"), folder.join("level_raw.txt")]);
        assert!(!folder.join("exported_data.txt").exists());
    }

    struct FailingStorage;

    impl ProjectStorage for FailingStorage {
        fn create_project(&self, image_path: &Path) -> StorageResult<PathBuf> {
            Err(StorageError::InvalidImagePath {
                path: image_path.to_path_buf(),
            })
        }

        fn save(&self, _: &Path, _: &Path, _: &RegionStore) -> StorageResult<PathBuf> {
            panic!("save must not run without a project folder");
        }

        fn load(&self, folder: &Path) -> StorageResult<LoadedProject> {
            Err(StorageError::MissingImage {
                path: folder.to_path_buf(),
            })
        }
    }

    #[test]
    fn project_creation_failure_keeps_editing_in_memory() {
        let mut app = AnnotationApp::new(
            FailingStorage,
            RecordingLog::default(),
            FixedImageSource(ImageBounds::new(100, 80)),
            AppConfig::default(),
        );

        let opened = app.open_image(Path::new("level1.png")).unwrap();
        assert_eq!(opened.folder, None);
        app.press(ScreenPoint::new(10, 10)).unwrap();
        app.press(ScreenPoint::new(40, 30)).unwrap();
        assert_eq!(app.session().store().len(), 1);
        assert_eq!(app.save().unwrap(), None);
        assert!(app.activity().lines()[0].starts_with("failed to create project folder"));
    }

    #[test]
    fn pointer_readout_uses_world_coordinates() {
        let mut app = test_app();
        assert!(app.pointer_world(ScreenPoint::new(0, 0)).is_err());

        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        app.open_image(&image).unwrap();
        assert_eq!(
            app.pointer_world(ScreenPoint::new(60, 30)).unwrap(),
            "(10.0, 10.0)"
        );
        assert_eq!(
            app.pointer_world(ScreenPoint::new(0, 80)).unwrap(),
            "(-50.0, -40.0)"
        );
    }

    #[test]
    fn config_sets_initial_category_and_threshold() {
        let config = AppConfig {
            default_category: Category::Waterway,
            min_region_size: 20,
            ..AppConfig::default()
        };
        let mut app = AnnotationApp::new(
            ProjectService::with_min_region_size(20),
            RecordingLog::default(),
            FixedImageSource(ImageBounds::new(100, 80)),
            config,
        );
        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        app.open_image(&image).unwrap();

        app.press(ScreenPoint::new(10, 10)).unwrap();
        assert!(app.press(ScreenPoint::new(25, 40)).is_err());
        app.press(ScreenPoint::new(10, 10)).unwrap();
        let outcome = app.press(ScreenPoint::new(40, 40)).unwrap();
        let Some(Mutation::Added(region)) = outcome.committed() else {
            panic!("expected an added region");
        };
        assert_eq!(region.category, Category::Waterway);
    }

    #[test]
    fn opened_project_uses_configured_threshold_not_the_storage_default() {
        let config = AppConfig {
            min_region_size: 20,
            ..AppConfig::default()
        };
        let mut app = AnnotationApp::new(
            ProjectService::new(),
            RecordingLog::default(),
            FixedImageSource(ImageBounds::new(100, 80)),
            config,
        );
        let root = tempfile::tempdir().unwrap();
        let image = write_image(root.path());
        let folder = app.open_image(&image).unwrap().folder.unwrap();

        app.press(ScreenPoint::new(10, 10)).unwrap();
        assert!(app.press(ScreenPoint::new(20, 20)).is_err());

        app.open_project(&folder).unwrap();
        assert_eq!(app.session().store().min_size(), 20);
        app.press(ScreenPoint::new(10, 10)).unwrap();
        assert!(app.press(ScreenPoint::new(20, 20)).is_err());
        assert!(app.session().store().is_empty());
    }

    struct UnwritableStorage {
        folder: PathBuf,
    }

    impl ProjectStorage for UnwritableStorage {
        fn create_project(&self, _: &Path) -> StorageResult<PathBuf> {
            Ok(self.folder.clone())
        }

        fn save(&self, folder: &Path, _: &Path, _: &RegionStore) -> StorageResult<PathBuf> {
            Err(StorageError::Write {
                path: folder.join(PROJECT_DATA_FILE),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }

        fn load(&self, folder: &Path) -> StorageResult<LoadedProject> {
            Err(StorageError::MissingImage {
                path: folder.to_path_buf(),
            })
        }
    }

    #[test]
    fn initial_save_failure_is_reported_with_the_created_folder() {
        let mut app = AnnotationApp::new(
            UnwritableStorage {
                folder: PathBuf::from("area_marker/level1"),
            },
            RecordingLog::default(),
            FixedImageSource(ImageBounds::new(100, 80)),
            AppConfig::default(),
        );

        let opened = app
            .open_image(Path::new("maps/level1.png"))
            .expect("save failure should not fail the open");
        assert_eq!(opened.folder, Some(PathBuf::from("area_marker/level1")));
        assert!(opened
            .save_error
            .as_deref()
            .is_some_and(|err| err.contains("read-only")));
        assert_eq!(app.folder(), Some(Path::new("area_marker/level1")));
        assert!(app.session().transform().is_bound());
        assert!(app
            .activity()
            .lines()
            .last()
            .is_some_and(|line| line.starts_with("failed to save project")));
    }
}
