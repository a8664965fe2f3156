pub mod app;
pub mod canvas;
pub mod config;
pub mod editor;
pub mod error;
pub mod export;
pub mod geometry;
pub mod history;
pub mod logging;
pub mod region;
pub mod storage;

pub use app::{AnnotationApp, OpenedProject};
pub use error::{AppError, AppResult};

/// Entrypoint used by the CLI and other front ends: installs diagnostics,
/// reads `config.json` and builds the file-backed editor.
pub fn start() -> AnnotationApp {
    logging::init();
    let config = config::load_app_config();
    tracing::info!(?config, "starting areamark");
    AnnotationApp::from_config(config)
}
