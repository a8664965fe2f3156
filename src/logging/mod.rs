//! Diagnostic tracing setup and the human-readable activity log.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing_subscriber::EnvFilter;

use crate::storage::StorageError;

const DEFAULT_FILTER: &str = "info,areamark=debug";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";
const ENTRY_INDENT: &str = "    ";

/// Installs the stderr tracing subscriber. Safe to call more than once.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init();
}

/// Receives one line per user-visible action. Implementations are
/// best-effort and never fail the caller.
pub trait ActivityLog {
    fn append_log(&self, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullActivityLog;

impl ActivityLog for NullActivityLog {
    fn append_log(&self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn append_log(&self, message: &str) {
        tracing::info!(target: "areamark::activity", "{message}");
    }
}

/// Markdown log grouped under `# YYYY-MM-DD` and `## HH:MM` headings.
/// Lines that cannot be written are forwarded to [`TracingActivityLog`].
#[derive(Debug, Clone)]
pub struct MarkdownActivityLog {
    path: PathBuf,
}

impl MarkdownActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_at(&self, message: &str, at: NaiveDateTime) -> Result<(), StorageError> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(StorageError::Io(err)),
        };
        let date = at.format(DATE_FORMAT).to_string();
        let time = at.format(TIME_FORMAT).to_string();
        let updated = insert_log_entry(&existing, &date, &time, message);
        crate::storage::write_atomic(&self.path, updated.as_bytes())
    }
}

impl ActivityLog for MarkdownActivityLog {
    fn append_log(&self, message: &str) {
        let now = chrono::Local::now().naive_local();
        if let Err(err) = self.append_at(message, now) {
            tracing::warn!(path = %self.path.display(), %err, "failed to update activity log");
            TracingActivityLog.append_log(message);
        }
    }
}

impl<T: ActivityLog + ?Sized> ActivityLog for &T {
    fn append_log(&self, message: &str) {
        (**self).append_log(message);
    }
}

/// Places `message` under today's date section and the current minute's
/// heading, creating whichever of the two is missing.
pub fn insert_log_entry(content: &str, date: &str, time: &str, message: &str) -> String {
    let date_heading = format!("# {date}");
    let time_heading = format!("## {time}");
    let entry = format!("{ENTRY_INDENT}{message}");

    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let Some(date_index) = lines.iter().position(|line| line.trim() == date_heading) else {
        let mut updated = content.to_string();
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&format!("\n{date_heading}\n{time_heading}\n{entry}\n"));
        return updated;
    };

    let section_end = lines[date_index + 1..]
        .iter()
        .position(|line| line.starts_with("# "))
        .map_or(lines.len(), |offset| date_index + 1 + offset);

    let time_index = lines[date_index + 1..section_end]
        .iter()
        .position(|line| line.trim() == time_heading)
        .map(|offset| date_index + 1 + offset);

    match time_index {
        Some(time_index) => {
            let block_end = lines[time_index + 1..section_end]
                .iter()
                .position(|line| line.starts_with("## "))
                .map_or(section_end, |offset| time_index + 1 + offset);
            let insert_at = trim_trailing_blank(&lines, time_index + 1, block_end);
            lines.insert(insert_at, entry);
        }
        None => {
            let insert_at = trim_trailing_blank(&lines, date_index + 1, section_end);
            lines.insert(insert_at, entry);
            lines.insert(insert_at, time_heading);
        }
    }

    let mut updated = lines.join("\n");
    updated.push('\n');
    updated
}

/// Index just past the last non-blank line in `lines[start..end]`.
fn trim_trailing_blank(lines: &[String], start: usize, end: usize) -> usize {
    let mut index = end;
    while index > start && lines[index - 1].trim().is_empty() {
        index -= 1;
    }
    index
}
