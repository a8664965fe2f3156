use super::{EditMode, Mutation, SessionError, SessionOutcome, SessionPhase, SessionResult};
use crate::geometry::{CoordinateTransform, GeometryError, ImageBounds, ScreenPoint, ScreenRect};
use crate::history::HistoryStack;
use crate::region::{Category, RegionError, RegionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawState {
    AwaitingFirstPoint,
    AwaitingSecondPoint {
        first: ScreenPoint,
        cursor: ScreenPoint,
    },
}

#[derive(Debug, Clone)]
struct DragState {
    category: Category,
    index: usize,
    anchor: ScreenPoint,
    before: RegionStore,
}

#[derive(Debug, Clone)]
enum MoveState {
    Idle,
    Dragging(DragState),
}

#[derive(Debug, Clone)]
enum ModeState {
    Draw(DrawState),
    Move(MoveState),
}

impl ModeState {
    const fn initial(mode: EditMode) -> Self {
        match mode {
            EditMode::Draw => Self::Draw(DrawState::AwaitingFirstPoint),
            EditMode::Move => Self::Move(MoveState::Idle),
        }
    }
}

/// Owns the live region store and its undo history and turns pointer
/// events into store mutations.
///
/// Persistence and activity logging are not performed here; callers react to
/// [`SessionOutcome::Committed`].
#[derive(Debug, Clone)]
pub struct EditSession {
    transform: CoordinateTransform,
    store: RegionStore,
    history: HistoryStack,
    state: ModeState,
    category: Category,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self::with_store(RegionStore::new(), HistoryStack::new())
    }

    pub fn with_store(store: RegionStore, history: HistoryStack) -> Self {
        Self {
            transform: CoordinateTransform::unbound(),
            store,
            history,
            state: ModeState::initial(EditMode::Draw),
            category: Category::default(),
        }
    }

    /// Binds a new image and replaces the store. History and any in-flight
    /// interaction are discarded.
    pub fn bind_image(&mut self, bounds: ImageBounds, store: RegionStore) {
        tracing::debug!(
            width = bounds.width,
            height = bounds.height,
            regions = store.len(),
            "bind image to edit session"
        );
        self.transform = CoordinateTransform::for_image(bounds);
        self.store = store;
        self.history.clear();
        self.state = ModeState::initial(self.mode());
    }

    pub fn store(&self) -> &RegionStore {
        &self.store
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn set_category(&mut self, category: Category) {
        self.category = category;
    }

    pub fn mode(&self) -> EditMode {
        match self.state {
            ModeState::Draw(_) => EditMode::Draw,
            ModeState::Move(_) => EditMode::Move,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.state {
            ModeState::Draw(DrawState::AwaitingFirstPoint) => SessionPhase::AwaitingFirstPoint,
            ModeState::Draw(DrawState::AwaitingSecondPoint { .. }) => {
                SessionPhase::AwaitingSecondPoint
            }
            ModeState::Move(MoveState::Idle) => SessionPhase::Idle,
            ModeState::Move(MoveState::Dragging(_)) => SessionPhase::Dragging,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, ModeState::Move(MoveState::Dragging(_)))
    }

    /// The region currently being dragged, if any.
    pub fn selection(&self) -> Option<(Category, usize)> {
        match &self.state {
            ModeState::Move(MoveState::Dragging(drag)) => Some((drag.category, drag.index)),
            _ => None,
        }
    }

    /// Transient rectangle between the first point and the cursor while drawing.
    pub fn preview(&self) -> Option<ScreenRect> {
        match self.state {
            ModeState::Draw(DrawState::AwaitingSecondPoint { first, cursor }) => {
                Some(ScreenRect::from_corners(first, cursor))
            }
            _ => None,
        }
    }

    pub fn set_mode(&mut self, mode: EditMode) -> SessionResult<()> {
        self.ensure_not_dragging()?;
        tracing::debug!(from = ?self.mode(), to = ?mode, "switch edit mode");
        self.state = ModeState::initial(mode);
        Ok(())
    }

    pub fn toggle_mode(&mut self) -> SessionResult<EditMode> {
        let next = self.mode().toggled();
        self.set_mode(next)?;
        Ok(next)
    }

    pub fn press(&mut self, point: ScreenPoint) -> SessionResult<SessionOutcome> {
        self.ensure_image()?;
        match &self.state {
            ModeState::Draw(DrawState::AwaitingFirstPoint) => {
                self.state = ModeState::Draw(DrawState::AwaitingSecondPoint {
                    first: point,
                    cursor: point,
                });
                Ok(SessionOutcome::FirstPointRecorded(point))
            }
            ModeState::Draw(DrawState::AwaitingSecondPoint { first, .. }) => {
                let first = *first;
                self.state = ModeState::Draw(DrawState::AwaitingFirstPoint);
                self.complete_rectangle(first, point)
            }
            ModeState::Move(MoveState::Idle) => {
                let Some((category, index)) = self.store.find_at(point, &self.transform)? else {
                    return Ok(SessionOutcome::Unchanged);
                };
                tracing::debug!(%category, index, "start dragging region");
                self.state = ModeState::Move(MoveState::Dragging(DragState {
                    category,
                    index,
                    anchor: point,
                    before: self.store.clone(),
                }));
                Ok(SessionOutcome::DragStarted { category, index })
            }
            ModeState::Move(MoveState::Dragging(_)) => Ok(SessionOutcome::Unchanged),
        }
    }

    pub fn motion(&mut self, point: ScreenPoint) -> SessionResult<SessionOutcome> {
        self.ensure_image()?;
        match &mut self.state {
            ModeState::Draw(DrawState::AwaitingSecondPoint { cursor, .. }) => {
                *cursor = point;
                Ok(SessionOutcome::PreviewUpdated)
            }
            ModeState::Move(MoveState::Dragging(drag)) => {
                let delta = drag.anchor.delta_to(point);
                if delta == (0, 0) {
                    return Ok(SessionOutcome::Unchanged);
                }
                self.store
                    .move_region(drag.index, drag.category, delta, &self.transform)?;
                drag.anchor = point;
                Ok(SessionOutcome::DragMoved)
            }
            _ => Ok(SessionOutcome::Unchanged),
        }
    }

    /// Ends a drag. The whole drag becomes one undo step; a drag that did not
    /// change anything leaves the history untouched.
    pub fn release(&mut self, point: ScreenPoint) -> SessionResult<SessionOutcome> {
        if self.is_dragging() {
            self.motion(point)?;
        }
        let state = std::mem::replace(&mut self.state, ModeState::Move(MoveState::Idle));
        let drag = match state {
            ModeState::Move(MoveState::Dragging(drag)) => drag,
            other => {
                self.state = other;
                return Ok(SessionOutcome::Unchanged);
            }
        };

        if drag.before == self.store {
            return Ok(SessionOutcome::Unchanged);
        }
        let region = *self
            .store
            .get(drag.category, drag.index)
            .ok_or(RegionError::RegionNotFound {
                category: drag.category,
                index: drag.index,
            })?;
        self.history.push(drag.before);
        Ok(SessionOutcome::Committed(Mutation::Moved {
            category: drag.category,
            index: drag.index,
            region,
        }))
    }

    pub fn remove_last(&mut self) -> SessionResult<SessionOutcome> {
        self.ensure_not_dragging()?;
        let before = self.store.clone();
        let removed = self.store.remove_last()?;
        self.history.push(before);
        Ok(SessionOutcome::Committed(Mutation::RemovedLast(removed)))
    }

    pub fn clear(&mut self) -> SessionResult<SessionOutcome> {
        self.ensure_not_dragging()?;
        if self.store.is_empty() {
            return Ok(SessionOutcome::Unchanged);
        }
        let removed = self.store.len();
        let before = self.store.clone();
        self.store.clear();
        self.history.push(before);
        Ok(SessionOutcome::Committed(Mutation::Cleared { removed }))
    }

    /// Restores the store to the state before the last committed mutation.
    pub fn undo(&mut self) -> SessionResult<&RegionStore> {
        self.ensure_not_dragging()?;
        self.store = self.history.undo()?;
        Ok(&self.store)
    }

    fn complete_rectangle(
        &mut self,
        first: ScreenPoint,
        second: ScreenPoint,
    ) -> SessionResult<SessionOutcome> {
        let before = self.store.clone();
        let region = self
            .store
            .add(self.category, first, second, &self.transform)
            .inspect_err(|err| tracing::debug!(?err, "discard rectangle"))?;
        self.history.push(before);
        Ok(SessionOutcome::Committed(Mutation::Added(region)))
    }

    fn ensure_image(&self) -> SessionResult<()> {
        if self.transform.is_bound() {
            Ok(())
        } else {
            Err(SessionError::Geometry(GeometryError::NoImageLoaded))
        }
    }

    fn ensure_not_dragging(&self) -> SessionResult<()> {
        if self.is_dragging() {
            tracing::warn!("operation rejected while dragging");
            return Err(SessionError::DragInProgress);
        }
        Ok(())
    }
}

impl std::fmt::Display for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} mode, {} category, {} regions",
            self.mode().label(),
            self.category,
            self.store.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::WorldPoint;
    use crate::history::HistoryError;

    fn bound_session() -> EditSession {
        let mut session = EditSession::new();
        session.bind_image(ImageBounds::new(200, 100), RegionStore::new());
        session
    }

    fn draw(session: &mut EditSession, a: (i32, i32), b: (i32, i32)) -> SessionOutcome {
        session
            .press(ScreenPoint::new(a.0, a.1))
            .expect("first point should be accepted");
        session
            .press(ScreenPoint::new(b.0, b.1))
            .expect("second point should be accepted")
    }

    #[test]
    fn draw_mode_records_first_point_then_commits_region() {
        let mut session = bound_session();
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstPoint);

        let outcome = session.press(ScreenPoint::new(90, 45)).unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::FirstPointRecorded(ScreenPoint::new(90, 45))
        );
        assert_eq!(session.phase(), SessionPhase::AwaitingSecondPoint);

        let outcome = session.press(ScreenPoint::new(110, 55)).unwrap();
        let mutation = outcome.committed().expect("rectangle should commit");
        assert!(matches!(mutation, Mutation::Added(_)));
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstPoint);
        assert_eq!(session.store().count(Category::Blocked), 1);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn motion_while_awaiting_second_point_only_updates_preview() {
        let mut session = bound_session();
        session.press(ScreenPoint::new(10, 10)).unwrap();
        let outcome = session.motion(ScreenPoint::new(40, 30)).unwrap();

        assert_eq!(outcome, SessionOutcome::PreviewUpdated);
        assert_eq!(
            session.preview(),
            Some(ScreenRect::from_corners(
                ScreenPoint::new(10, 10),
                ScreenPoint::new(40, 30)
            ))
        );
        assert!(session.store().is_empty());
        assert!(session.history().is_empty());
    }

    #[test]
    fn degenerate_rectangle_is_discarded_without_history_entry() {
        let mut session = bound_session();
        session.press(ScreenPoint::new(0, 0)).unwrap();
        let err = session
            .press(ScreenPoint::new(3, 4))
            .expect_err("tiny rectangle should be rejected");

        assert!(matches!(
            err,
            SessionError::Region(RegionError::DegenerateRegion { .. })
        ));
        assert!(session.store().is_empty());
        assert!(session.history().is_empty());
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstPoint);
    }

    #[test]
    fn new_rectangles_use_selected_category() {
        let mut session = bound_session();
        session.set_category(Category::Waterway);
        draw(&mut session, (0, 0), (20, 20));
        assert_eq!(session.store().count(Category::Waterway), 1);
        assert_eq!(session.store().count(Category::Blocked), 0);
    }

    #[test]
    fn pointer_events_without_image_report_no_image_loaded() {
        let mut session = EditSession::new();
        let err = session.press(ScreenPoint::new(1, 1)).unwrap_err();
        assert_eq!(err, SessionError::Geometry(GeometryError::NoImageLoaded));
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstPoint);
    }

    #[test]
    fn move_press_outside_regions_keeps_idle() {
        let mut session = bound_session();
        draw(&mut session, (10, 10), (30, 30));
        session.set_mode(EditMode::Move).unwrap();

        let outcome = session.press(ScreenPoint::new(150, 80)).unwrap();
        assert_eq!(outcome, SessionOutcome::Unchanged);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn drag_is_one_undo_step_and_undo_restores_pre_drag_position() {
        let mut session = bound_session();
        draw(&mut session, (90, 45), (110, 55));
        let before_drag = session.store().clone();
        let history_before = session.history().len();

        session.set_mode(EditMode::Move).unwrap();
        let started = session.press(ScreenPoint::new(100, 50)).unwrap();
        assert_eq!(
            started,
            SessionOutcome::DragStarted {
                category: Category::Blocked,
                index: 0
            }
        );
        session.motion(ScreenPoint::new(105, 50)).unwrap();
        session.motion(ScreenPoint::new(110, 60)).unwrap();
        session.motion(ScreenPoint::new(120, 70)).unwrap();
        let outcome = session.release(ScreenPoint::new(120, 70)).unwrap();

        let Some(Mutation::Moved { region, .. }) = outcome.committed() else {
            panic!("drag should commit a move, got {outcome:?}");
        };
        assert_eq!(region.corner_a, WorldPoint::new(10.0, -15.0));
        assert_eq!(region.corner_b, WorldPoint::new(30.0, -25.0));
        assert_eq!(session.history().len(), history_before + 1);
        assert_eq!(session.phase(), SessionPhase::Idle);

        session.undo().unwrap();
        assert_eq!(session.store(), &before_drag);
    }

    #[test]
    fn release_without_motion_does_not_record_history() {
        let mut session = bound_session();
        draw(&mut session, (10, 10), (30, 30));
        session.set_mode(EditMode::Move).unwrap();
        session.press(ScreenPoint::new(20, 20)).unwrap();

        let outcome = session.release(ScreenPoint::new(20, 20)).unwrap();
        assert_eq!(outcome, SessionOutcome::Unchanged);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn mode_toggle_is_rejected_mid_drag_and_resets_draw_state() {
        let mut session = bound_session();
        draw(&mut session, (10, 10), (30, 30));
        session.press(ScreenPoint::new(50, 50)).unwrap();
        assert_eq!(session.phase(), SessionPhase::AwaitingSecondPoint);

        assert_eq!(session.toggle_mode().unwrap(), EditMode::Move);
        session.press(ScreenPoint::new(20, 20)).unwrap();
        assert_eq!(session.toggle_mode(), Err(SessionError::DragInProgress));
        assert_eq!(session.remove_last(), Err(SessionError::DragInProgress));
        assert_eq!(session.selection(), Some((Category::Blocked, 0)));

        session.release(ScreenPoint::new(20, 20)).unwrap();
        assert_eq!(session.toggle_mode().unwrap(), EditMode::Draw);
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstPoint);
        assert_eq!(session.preview(), None);
    }

    #[test]
    fn remove_last_and_clear_are_undoable() {
        let mut session = bound_session();
        draw(&mut session, (10, 10), (30, 30));
        session.set_category(Category::Waterway);
        draw(&mut session, (40, 40), (60, 60));
        let full = session.store().clone();

        let outcome = session.remove_last().unwrap();
        assert!(matches!(
            outcome.committed(),
            Some(Mutation::RemovedLast(region)) if region.category == Category::Waterway
        ));
        session.undo().unwrap();
        assert_eq!(session.store(), &full);

        let outcome = session.clear().unwrap();
        assert_eq!(
            outcome.committed(),
            Some(&Mutation::Cleared { removed: 2 })
        );
        assert!(session.store().is_empty());
        session.undo().unwrap();
        assert_eq!(session.store(), &full);
    }

    #[test]
    fn remove_last_on_empty_store_reports_empty_store() {
        let mut session = bound_session();
        assert_eq!(
            session.remove_last(),
            Err(SessionError::Region(RegionError::EmptyStore))
        );
        assert_eq!(session.clear().unwrap(), SessionOutcome::Unchanged);
        assert!(session.history().is_empty());
    }

    #[test]
    fn undo_walks_back_through_every_mutation() {
        let mut session = bound_session();
        let empty = session.store().clone();
        draw(&mut session, (10, 10), (30, 30));
        let one = session.store().clone();
        draw(&mut session, (40, 40), (60, 60));

        session.undo().unwrap();
        assert_eq!(session.store(), &one);
        session.undo().unwrap();
        assert_eq!(session.store(), &empty);
        assert_eq!(
            session.undo().unwrap_err(),
            SessionError::History(HistoryError::NothingToUndo)
        );
    }

    #[test]
    fn bind_image_resets_history_and_interaction() {
        let mut session = bound_session();
        draw(&mut session, (10, 10), (30, 30));
        session.press(ScreenPoint::new(50, 50)).unwrap();

        session.bind_image(ImageBounds::new(64, 64), RegionStore::new());
        assert!(session.history().is_empty());
        assert!(session.store().is_empty());
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstPoint);
    }

    #[test]
    fn status_line_and_hint_follow_the_session() {
        let mut session = bound_session();
        draw(&mut session, (10, 10), (30, 30));
        session.set_category(Category::Waterway);
        assert_eq!(session.to_string(), "draw mode, waterway category, 1 regions");
        assert_eq!(
            session.phase().hint(),
            "click a point to start a rectangle"
        );

        session.toggle_mode().unwrap();
        session.press(ScreenPoint::new(20, 20)).unwrap();
        assert_eq!(session.phase().hint(), "moving rectangle");
        assert!(session.to_string().starts_with("move mode"));
    }
}
