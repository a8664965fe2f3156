//! Draw/move editing state machine over the region store.

mod session;

use thiserror::Error;

use crate::geometry::{GeometryError, ScreenPoint};
use crate::history::HistoryError;
use crate::region::{Category, Region, RegionError};

pub use session::EditSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Draw,
    Move,
}

impl EditMode {
    pub const fn toggled(self) -> Self {
        match self {
            Self::Draw => Self::Move,
            Self::Move => Self::Draw,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draw => "draw",
            Self::Move => "move",
        }
    }
}

/// Flattened view of the session state, for status lines and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingFirstPoint,
    AwaitingSecondPoint,
    Idle,
    Dragging,
}

impl SessionPhase {
    pub const fn mode(self) -> EditMode {
        match self {
            Self::AwaitingFirstPoint | Self::AwaitingSecondPoint => EditMode::Draw,
            Self::Idle | Self::Dragging => EditMode::Move,
        }
    }

    pub const fn hint(self) -> &'static str {
        match self {
            Self::AwaitingFirstPoint => "click a point to start a rectangle",
            Self::AwaitingSecondPoint => "click a second point to finish the rectangle",
            Self::Idle => "click a rectangle to move it",
            Self::Dragging => "moving rectangle",
        }
    }
}

/// A committed change to the region store. Each one is a single undo step.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Added(Region),
    RemovedLast(Region),
    Cleared { removed: usize },
    Moved {
        category: Category,
        index: usize,
        region: Region,
    },
}

impl Mutation {
    /// One human-readable activity-log line.
    pub fn describe(&self) -> String {
        match self {
            Self::Added(region) => format!(
                "added a {} region: ({:.1}, {:.1}) - ({:.1}, {:.1})",
                region.category,
                region.corner_a.x,
                region.corner_a.y,
                region.corner_b.x,
                region.corner_b.y
            ),
            Self::RemovedLast(region) => format!("removed a {} region", region.category),
            Self::Cleared { removed } => format!("cleared all regions ({removed})"),
            Self::Moved { category, .. } => format!("moved a {category} region"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Unchanged,
    FirstPointRecorded(ScreenPoint),
    PreviewUpdated,
    DragStarted { category: Category, index: usize },
    DragMoved,
    Committed(Mutation),
}

impl SessionOutcome {
    pub fn committed(&self) -> Option<&Mutation> {
        match self {
            Self::Committed(mutation) => Some(mutation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("a drag is in progress")]
    DragInProgress,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error(transparent)]
    History(#[from] HistoryError),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
