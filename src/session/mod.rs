//! The viewer session: one context object owning all client state.
//!
//! A [`Session`] is built once at startup from the [`PersistedState`] and
//! driven by the host through three kinds of input: user operations (view
//! changes, pointer gestures, key presses), [`Session::tick`] with the
//! current time, and [`Session::handle_response`] with server answers. The
//! requests it wants sent are collected with [`Session::drain_requests`].

mod requests;


use web_time::Instant;

use crate::bookmarks::BookmarkList;
use crate::change_queue::{ChangeBatch, ChangeQueue, FollowUp};
use crate::color_utils::{Color, intensity_color, intensity_fraction};
use crate::config::{PersistedState, ViewerSettings};
use crate::constants::INTENSITY_MIN;
use crate::editor::{
    EditContext, EditMode, EditOutcome, Editor, Guard, MarkerColor, Picker,
};
use crate::error::{RemoteError, SegmentError};
use crate::keybindings::{Action, KeyBindings};
use crate::points::{Point, PointStore, Visibility};
use crate::registry::TraceRegistry;
use crate::remote::{CommStatus, OutgoingRequest, Request, RequestId, Response};
use crate::view_range::{DataRange, ViewFraction, ViewModel, ViewRange, ZoomDirection};

use requests::{Pending, RequestScheduler};

pub struct Session {
    // === Persisted ===
    settings: ViewerSettings,
    keybindings: KeyBindings,
    bookmarks: BookmarkList,

    // === Data ===
    view: ViewModel,
    points: PointStore,
    registry: TraceRegistry,

    // === Editing ===
    editor: Editor,
    queue: ChangeQueue,
    /// Marking noise is only allowed once the current window's points are
    /// fully loaded.
    noise_enabled: bool,
    /// Last pointer position over the plot, for keyboard zoom and the guard
    last_pointer: Option<ViewFraction>,

    // === Server ===
    requests: RequestScheduler,
    status: CommStatus,
    last_jump: Option<(f64, Option<f64>)>,
    report: Option<String>,
}

impl Session {
    pub fn new(state: PersistedState, now: Instant) -> Self {
        let PersistedState {
            settings,
            keybindings,
            bookmarks,
            ..
        } = state;

        let mut editor = Editor::new();
        editor.set_brush_size(settings.brush_size);

        Self {
            registry: TraceRegistry::new(settings.multi_user),
            settings,
            keybindings,
            bookmarks,
            view: ViewModel::new(DataRange::default()),
            points: PointStore::new(),
            editor,
            queue: ChangeQueue::new(now),
            noise_enabled: false,
            last_pointer: None,
            requests: RequestScheduler::new(),
            status: CommStatus::Idle,
            last_jump: None,
            report: None,
        }
    }

    /// Snapshot of what should be saved between sessions.
    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            settings: self.settings.clone(),
            keybindings: self.keybindings.clone(),
            bookmarks: self.bookmarks.clone(),
            ..PersistedState::new()
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ViewerSettings {
        &mut self.settings
    }

    pub fn keybindings_mut(&mut self) -> &mut KeyBindings {
        &mut self.keybindings
    }

    pub fn bookmarks(&self) -> &BookmarkList {
        &self.bookmarks
    }

    pub fn bookmarks_mut(&mut self) -> &mut BookmarkList {
        &mut self.bookmarks
    }

    pub fn view_range(&self) -> ViewRange {
        *self.view.view()
    }

    pub fn data_range(&self) -> &DataRange {
        self.view.domain()
    }

    pub fn visibility(&self) -> &Visibility {
        self.view.visibility()
    }

    pub fn points(&self) -> &PointStore {
        &self.points
    }

    pub fn registry(&self) -> &TraceRegistry {
        &self.registry
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn change_queue(&self) -> &ChangeQueue {
        &self.queue
    }

    pub fn comm_status(&self) -> &CommStatus {
        &self.status
    }

    /// Change batches sent and not yet answered.
    pub fn pending_updates(&self) -> usize {
        self.queue.pending_updates()
    }

    pub fn noise_enabled(&self) -> bool {
        self.noise_enabled
    }

    /// Target of the last jump, for drawing a marker.
    pub fn last_jump(&self) -> Option<(f64, Option<f64>)> {
        self.last_jump
    }

    /// Take the last compiled bookmark report.
    pub fn take_report(&mut self) -> Option<String> {
        self.report.take()
    }

    /// Points to draw for the current window.
    pub fn rendered_points(&self) -> Vec<Point> {
        self.points
            .rendered(self.view.view(), self.settings.detail_points)
    }

    /// Draw colour and opacity of a point.
    pub fn point_color(&self, point: &Point) -> (Color, f64) {
        let style = self
            .editor
            .marker_style(point, &self.registry, self.bookmarks.current_pair());
        let color = match style.color {
            MarkerColor::Fixed(color) => color,
            MarkerColor::Intensity => {
                let intmax = self.view.intensity().map_or(0.0, |range| range.max);
                intensity_color(
                    intensity_fraction(point.intensity, intmax, self.settings.use_log_height),
                    self.settings.colorblind,
                )
            }
        };
        (color, style.opacity)
    }

    /// The loaded point nearest the pointer, for tooltips.
    pub fn hover(&self, at: ViewFraction) -> Option<&Point> {
        if !self.settings.show_tooltips {
            return None;
        }
        let (mz, rt) = self.view.view().point_at(at);
        self.points.closest_to(mz, rt)
    }

    /// Whether the brush should warn that it only sees a sample of the
    /// points in view.
    pub fn brush_warning(&self) -> bool {
        self.editor.brush_warning(self.visibility().overflowed)
    }

    pub fn group_status_text(&self) -> String {
        self.editor.group_status_text(
            self.view.view(),
            &self.points,
            &self.registry,
            self.settings.detail_points,
        )
    }

    // ========================================================================
    // Timers and server traffic
    // ========================================================================

    /// Requests waiting to be sent, oldest first.
    pub fn drain_requests(&mut self) -> Vec<OutgoingRequest> {
        self.requests.drain()
    }

    /// Ask whether a file is loaded; retried every second until the server
    /// answers.
    pub fn open_file_wait(&mut self) {
        self.requests.cancel_file_poll();
        self.requests.issue(Request::FileStatus);
        self.status = CommStatus::WaitingForFile;
    }

    /// Advance timers: the point refresh debounce, the file poll and the
    /// change queue flush.
    pub fn tick(&mut self, now: Instant) {
        if self.requests.file_poll_due(now) {
            self.requests.issue(Request::FileStatus);
        }
        if self.requests.point_refresh_due(now) {
            self.request_points_now();
        }
        self.pump_queue(now);
    }

    /// Feed back the answer to request `id`.
    pub fn handle_response(
        &mut self,
        id: RequestId,
        result: Result<Response, RemoteError>,
        now: Instant,
    ) {
        let Some(pending) = self.requests.take(id) else {
            log::warn!("Answer for unknown request {id}");
            return;
        };

        match (pending, result) {
            (Pending::FileStatus, Ok(Response::FileStatus(range))) => {
                self.file_loaded(range, now);
            }
            (Pending::FileStatus, Err(RemoteError::NoFileLoaded)) => {
                log::info!("Server has no file loaded");
                self.status = CommStatus::NoFileLoaded;
            }
            (Pending::FileStatus, Err(e)) => {
                log::warn!("File status request failed: {e}");
                self.status = CommStatus::Server(e.to_string());
                self.requests.schedule_file_poll(now);
            }

            (Pending::Points, Ok(Response::Points(points))) => self.points_loaded(id, points),
            (Pending::Points, Err(RemoteError::NoFileLoaded)) => {
                self.status = CommStatus::NoFileLoaded;
            }
            (Pending::Points, Err(e)) => {
                log::warn!("Point request failed: {e}");
                self.status = CommStatus::NoPointsReceived;
            }

            (Pending::TraceMap, Ok(Response::TraceMap(map))) => self.registry.reconcile(map),
            (Pending::NextIds, Ok(Response::NextIds(ids))) => {
                self.registry
                    .reconcile_ids(ids.next_trace, ids.next_envelope);
            }
            (Pending::TraceMap | Pending::NextIds, Err(e)) => {
                log::warn!("Segmentation sync failed: {e}");
            }

            (Pending::SaveChanges(batch), result) => {
                let success = match result {
                    Ok(_) => {
                        self.status = CommStatus::Ready;
                        true
                    }
                    Err(RemoteError::NoFileLoaded) => {
                        self.status = CommStatus::NoDataToSave;
                        false
                    }
                    Err(e) => {
                        log::warn!("Saving batch {batch} failed: {e}");
                        self.status = CommStatus::SaveFailed;
                        false
                    }
                };
                let follow_ups = self.queue.complete(batch, success, now);
                for follow_up in follow_ups {
                    self.follow_up(follow_up, now);
                }
            }

            (Pending::HighestUntraced, Ok(Response::HighestUntraced(point))) => {
                self.status = CommStatus::Ready;
                match point {
                    Some(p) => self.jump_to(p.mz, Some(p.rt), now),
                    None => {
                        log::info!("No untraced points left");
                        self.request_points(now);
                    }
                }
            }
            (Pending::HighestUntraced, Err(e)) => {
                log::warn!("Next point request failed: {e}");
                self.status = CommStatus::NextPointFailed;
            }

            (Pending::EnvelopeInfo, Ok(Response::EnvelopeInfo(report))) => {
                self.report = Some(self.bookmarks.report(&report));
                self.status = CommStatus::Ready;
            }
            (Pending::EnvelopeInfo, Err(e)) => {
                log::warn!("Bookmark report failed: {e}");
                self.status = CommStatus::ReportFailed;
            }

            (pending, Ok(response)) => {
                log::warn!("Mismatched answer to {pending:?}: {response:?}");
            }
        }
    }

    fn file_loaded(&mut self, range: DataRange, now: Instant) {
        self.status = CommStatus::DataModelCompleted;
        self.points.load(Vec::new());
        self.editor.reset_gesture();
        self.noise_enabled = false;
        self.view
            .reset_domain(range.padded(), &mut self.points, self.settings.detail_points);
        self.request_points(now);
    }

    fn points_loaded(&mut self, id: RequestId, points: Vec<Point>) {
        let latest = self.requests.is_latest_points(id);
        if !latest {
            log::debug!("Applying stale point answer {id}");
        }
        self.points.load(points);
        self.view
            .refresh_visibility(&mut self.points, self.settings.detail_points);
        // Noise marking covers the current window, so only its own answer
        // may enable it.
        if latest {
            self.noise_enabled = !self.view.visibility().overflowed;
            self.status = CommStatus::Ready;
        }
    }

    fn follow_up(&mut self, follow_up: FollowUp, now: Instant) {
        match follow_up {
            FollowUp::RefreshPoints => self.request_points(now),
            FollowUp::JumpNext => self.jump_next(now),
        }
    }

    /// Schedule a point refresh for the current window (debounced).
    pub fn request_points(&mut self, now: Instant) {
        self.requests.schedule_point_refresh(now);
    }

    fn request_points_now(&mut self) {
        self.requests.issue(Request::Points {
            range: *self.view.view(),
            max_count: self.settings.detail_points,
            min_intensity: INTENSITY_MIN,
        });
        self.requests.issue(Request::TraceMap);
        self.requests.issue(Request::NextIds);
        self.status = CommStatus::RequestingPoints;
    }

    fn pump_queue(&mut self, now: Instant) {
        if let Some(batch) = self.queue.poll(now) {
            self.send_batch(batch, now);
        }
    }

    fn send_batch(&mut self, batch: ChangeBatch, now: Instant) {
        match batch.to_json() {
            Ok(body) => {
                self.requests.issue(Request::SaveChanges {
                    batch: batch.id,
                    body,
                });
                self.status = CommStatus::Saving;
            }
            Err(e) => {
                log::error!("Could not encode batch {}: {e}", batch.id);
                for follow_up in self.queue.complete(batch.id, false, now) {
                    self.follow_up(follow_up, now);
                }
            }
        }
    }

    // ========================================================================
    // View
    // ========================================================================

    fn apply_view(&mut self, candidate: ViewRange, now: Instant) {
        self.view
            .set_view(candidate, &mut self.points, self.settings.detail_points);
        self.noise_enabled = false;
        self.request_points(now);
    }

    pub fn set_range_by_bounds(&mut self, bounds: ViewRange, now: Instant) {
        self.apply_view(bounds, now);
    }

    pub fn set_range_by_delta(
        &mut self,
        mzmin: f64,
        mzrange: f64,
        rtmin: f64,
        rtrange: f64,
        now: Instant,
    ) {
        self.apply_view(ViewRange::from_delta(mzmin, mzrange, rtmin, rtrange), now);
    }

    /// Pan by fractions of the current span.
    pub fn pan(&mut self, dx: f64, dz: f64, now: Instant) {
        let candidate = self.view.view().pan(dx, dz, &self.view.domain().bounds());
        self.apply_view(candidate, now);
    }

    pub fn zoom_at(&mut self, focus: ViewFraction, direction: ZoomDirection, now: Instant) {
        let candidate = self
            .view
            .view()
            .zoom_at(focus, direction, &self.view.domain().bounds());
        self.apply_view(candidate, now);
    }

    /// Zoom to the rectangle dragged between two positions.
    pub fn drag_zoom(&mut self, start: ViewFraction, end: ViewFraction, now: Instant) {
        let candidate = self
            .view
            .view()
            .rect_between(start.clamped(), end.clamped());
        self.view.remember_zoom_origin();
        self.apply_view(candidate, now);
    }

    /// Return to the window before the last rectangle zoom.
    pub fn zoom_back(&mut self, now: Instant) {
        if let Some(previous) = self.view.last_zoom_from() {
            self.apply_view(previous, now);
        }
    }

    pub fn view_all(&mut self, now: Instant) {
        let domain = self.view.domain().bounds();
        self.apply_view(domain, now);
    }

    pub fn jump_to(&mut self, mz: f64, rt: Option<f64>, now: Instant) {
        log::debug!("Jumping to mz {mz}, rt {rt:?}");
        let candidate = self
            .view
            .view()
            .jump_window(mz, rt, &self.view.domain().bounds());
        self.last_jump = Some((mz, rt));
        self.apply_view(candidate, now);
    }

    pub fn toggle_colorblind(&mut self) {
        self.settings.colorblind = !self.settings.colorblind;
    }

    // ========================================================================
    // Editing
    // ========================================================================

    fn edit_parts(&mut self) -> (&mut Editor, EditContext<'_>) {
        let ctx = EditContext {
            view: self.view.view(),
            points: &mut self.points,
            registry: &mut self.registry,
            queue: &mut self.queue,
            limit: self.settings.detail_points,
        };
        (&mut self.editor, ctx)
    }

    pub fn set_edit_mode(&mut self, mode: EditMode) {
        self.editor.set_edit_mode(mode);
    }

    pub fn new_group(&mut self) {
        self.editor.new_group(&self.registry);
    }

    pub fn select_group(&mut self) {
        self.editor.select_group();
    }

    pub fn set_brush_size(&mut self, size: f64) {
        self.settings.brush_size = size;
        self.editor.set_brush_size(size);
    }

    pub fn set_trace_width(&mut self, width: f64) {
        self.settings.trace_width = width;
        self.editor.set_guard_width(width);
    }

    /// Track the pointer; `None` when it leaves the plot.
    pub fn set_pointer(&mut self, at: Option<ViewFraction>) {
        self.last_pointer = at;
    }

    /// Centre the guard on the pointer's mz.
    pub fn set_guard_at_pointer(&mut self) {
        let Some(at) = self.last_pointer else {
            return;
        };
        let (mz, _) = self.view.view().point_at(at.clamped());
        self.editor.set_guard(Some(Guard {
            mz,
            width: self.settings.trace_width,
        }));
    }

    pub fn clear_guard(&mut self) {
        self.editor.set_guard(None);
    }

    pub fn pointer_down(&mut self, at: ViewFraction, picker: &dyn Picker) {
        self.last_pointer = Some(at);
        let (editor, ctx) = self.edit_parts();
        editor.pointer_down(at, picker, &ctx);
    }

    pub fn pointer_move(&mut self, at: ViewFraction, picker: &dyn Picker) {
        self.last_pointer = Some(at);
        let (editor, ctx) = self.edit_parts();
        editor.pointer_move(at, picker, &ctx);
    }

    /// Finish a gesture; `remove` takes the selection out of the group.
    pub fn pointer_up(&mut self, remove: bool, now: Instant) -> Result<EditOutcome, SegmentError> {
        let (editor, mut ctx) = self.edit_parts();
        let outcome = editor.pointer_up(remove, &mut ctx)?;
        match outcome {
            EditOutcome::Committed => {
                self.view
                    .refresh_visibility(&mut self.points, self.settings.detail_points);
                self.pump_queue(now);
            }
            EditOutcome::Paired(envelope) => {
                if self.bookmarks.set_pair(Some(envelope)) && self.editor.mode() == EditMode::Pair {
                    self.editor.set_edit_mode(self.editor.last_mode());
                }
            }
            EditOutcome::Nothing => {}
        }
        Ok(outcome)
    }

    /// Unpair the current bookmark, or start choosing an envelope for it.
    pub fn toggle_pair(&mut self) {
        if self.bookmarks.current().is_none() {
            log::debug!("No current bookmark to pair");
            return;
        }
        if self.bookmarks.current_pair().is_some() {
            self.bookmarks.set_pair(None);
        } else {
            self.editor.set_edit_mode(EditMode::Pair);
        }
    }

    /// Mark every point in the window as noise. Returns false when not
    /// allowed: points still loading or more in view than can be shown.
    pub fn mark_noise(&mut self, now: Instant) -> bool {
        if !self.noise_enabled {
            log::debug!("Noise marking unavailable for this window");
            return false;
        }
        self.queue.set_noise(self.view.view());
        self.noise_enabled = false;
        self.pump_queue(now);
        true
    }

    pub fn undo(&mut self, now: Instant) {
        self.queue.undo();
        self.pump_queue(now);
    }

    pub fn redo(&mut self, now: Instant) {
        self.queue.redo();
        self.pump_queue(now);
    }

    // ========================================================================
    // Bookmarks and jumps
    // ========================================================================

    /// Go to the next untraced point, or the next bookmark when jumping to
    /// untraced points is off.
    pub fn jump_next(&mut self, now: Instant) {
        if self.settings.jump_to_untraced {
            self.requests.issue(Request::HighestUntraced);
            self.status = CommStatus::FindingNextPoint;
        } else if let Some((mz, rt)) = self.bookmarks.next().map(|b| (b.mz, b.rt)) {
            self.jump_to(mz, rt, now);
        }
    }

    /// Go to the previous bookmark. Does nothing while jumping to untraced
    /// points.
    pub fn jump_previous(&mut self, now: Instant) {
        if self.settings.jump_to_untraced {
            return;
        }
        if let Some((mz, rt)) = self.bookmarks.previous().map(|b| (b.mz, b.rt)) {
            self.jump_to(mz, rt, now);
        }
    }

    /// Make bookmark `index` current and jump to it.
    pub fn goto_bookmark(&mut self, index: usize, now: Instant) -> bool {
        if self.bookmarks.set_current(index).is_err() {
            return false;
        }
        if let Some((mz, rt)) = self.bookmarks.current().map(|b| (b.mz, b.rt)) {
            self.jump_to(mz, rt, now);
        }
        true
    }

    /// Ask the server for the paired envelopes; the result is collected
    /// with [`Session::take_report`].
    pub fn request_report(&mut self) {
        self.requests.issue(Request::EnvelopeInfo {
            envelopes: self.bookmarks.paired_envelopes(),
        });
        self.status = CommStatus::CompilingReport;
    }

    // ========================================================================
    // Keyboard
    // ========================================================================

    /// Run the action bound to a key. Returns whether the key was bound.
    pub fn handle_key(&mut self, key: &str, ctrl: bool, now: Instant) -> bool {
        match self.keybindings.action_for(key, ctrl) {
            Some(action) => {
                self.perform(action, now);
                true
            }
            None => false,
        }
    }

    fn zoom_focus(&self) -> ViewFraction {
        self.last_pointer.unwrap_or_else(ViewFraction::center)
    }

    pub fn perform(&mut self, action: Action, now: Instant) {
        log::debug!("⌨️ {action:?}");
        match action {
            Action::Pan { dx, dz } => self.pan(dx, dz, now),
            Action::ZoomIn => self.zoom_at(self.zoom_focus(), ZoomDirection::In, now),
            Action::ZoomOut => self.zoom_at(self.zoom_focus(), ZoomDirection::Out, now),
            Action::ZoomBack => self.zoom_back(now),
            Action::ViewAll => self.view_all(now),
            Action::Refresh => self.request_points(now),
            Action::EditMode(mode) => self.set_edit_mode(mode),
            Action::Pair => self.toggle_pair(),
            Action::MarkNoise => {
                self.mark_noise(now);
            }
            Action::NewGroup => self.new_group(),
            Action::SelectGroup => self.select_group(),
            Action::Undo => self.undo(now),
            Action::Redo => self.redo(now),
            Action::Jump => self.jump_next(now),
            Action::SetGuard => self.set_guard_at_pointer(),
            Action::ClearGuard => self.clear_guard(),
            Action::ToggleColorblind => self.toggle_colorblind(),
        }
    }
}
