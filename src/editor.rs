//! Segmentation editing state machine.
//!
//! A gesture has two phases. With no current group, a press *chooses* one:
//! the most common group under the brush becomes current. With a current
//! group, press-drag-release *modifies* it: everything brushed (or boxed, in
//! rectangle mode) is moved into the group, or out of it when the remove
//! modifier is held at release.

use crate::change_queue::ChangeQueue;
use crate::color_utils::{Color, GroupKind, color_for};
use crate::constants::DEFAULT_BRUSH_SIZE;
use crate::error::SegmentError;
use crate::points::{Point, PointId, PointStore};
use crate::registry::{EnvelopeId, NOISE_TRACE, TraceId, TraceRegistry, UNASSIGNED};
use crate::view_range::{ViewFraction, ViewRange};

/// Colour of points being brushed.
pub const SELECTION_COLOR: Color = Color::new(0xff, 0x00, 0x00);

/// Colour of the envelope paired with the current bookmark.
pub const CURRENT_BOOKMARK_COLOR: Color = Color::new(0x66, 0x66, 0xff);

/// Opacity of unassigned points in trace mode.
pub const TRACE_UNTRACED_OPACITY: f64 = 0.5;

/// Editing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    /// View only
    #[default]
    None,
    /// Edit point → trace membership
    Trace,
    /// Edit trace → envelope membership
    Envelope,
    /// Pick an envelope for the current bookmark
    Pair,
}

impl EditMode {
    /// The group kind the mode edits, if any.
    pub fn group_kind(self) -> Option<GroupKind> {
        match self {
            EditMode::Trace => Some(GroupKind::Trace),
            EditMode::Envelope | EditMode::Pair => Some(GroupKind::Envelope),
            EditMode::None => None,
        }
    }
}

/// An mz band that trace edits may not leave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Guard {
    pub mz: f64,
    pub width: f64,
}

impl Guard {
    fn low(&self) -> f64 {
        self.mz - self.width / 2.0
    }

    fn high(&self) -> f64 {
        self.mz + self.width / 2.0
    }

    /// Strictly inside the band.
    pub fn contains(&self, mz: f64) -> bool {
        mz > self.low() && mz < self.high()
    }

    /// Clamp the mz edges of `range` into the band.
    pub fn constrain(&self, mut range: ViewRange) -> ViewRange {
        range.mzmin = range.mzmin.max(self.low());
        range.mzmax = range.mzmax.min(self.high());
        range
    }
}

/// Finds the rendered points under the pointer.
pub trait Picker {
    /// Ids of `candidates` whose markers lie within `precision` of the pointer.
    fn pick(
        &self,
        pointer: ViewFraction,
        precision: f64,
        view: &ViewRange,
        candidates: &[Point],
    ) -> Vec<PointId>;
}

/// Picker for a top-down view of the plot plane.
///
/// The plane spans [`TopDownPicker::GRID_RANGE`] world units on each axis,
/// and the brush precision is measured in those units.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopDownPicker;

impl TopDownPicker {
    pub const GRID_RANGE: f64 = 20.0;
}

impl Picker for TopDownPicker {
    fn pick(
        &self,
        pointer: ViewFraction,
        precision: f64,
        view: &ViewRange,
        candidates: &[Point],
    ) -> Vec<PointId> {
        candidates
            .iter()
            .filter(|p| {
                let at = view.fraction_of(p.mz, p.rt);
                let dx = (at.mz - pointer.mz) * Self::GRID_RANGE;
                let dz = (at.rt - pointer.rt) * Self::GRID_RANGE;
                dx.hypot(dz) <= precision
            })
            .map(|p| p.id)
            .collect()
    }
}

/// The state an edit reads and writes.
pub struct EditContext<'a> {
    pub view: &'a ViewRange,
    pub points: &'a mut PointStore,
    pub registry: &'a mut TraceRegistry,
    pub queue: &'a mut ChangeQueue,
    /// Render cap; only the first `limit` in-view points can be picked.
    pub limit: usize,
}

/// Result of releasing the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Nothing changed
    Nothing,
    /// Group membership changed and was queued
    Committed,
    /// Pair mode chose this envelope for the current bookmark
    Paired(EnvelopeId),
}

/// How a point should be drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerColor {
    /// Use the intensity gradient
    Intensity,
    Fixed(Color),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub color: MarkerColor,
    pub opacity: f64,
}

impl MarkerStyle {
    fn fixed(color: Color, opacity: f64) -> Self {
        Self {
            color: MarkerColor::Fixed(color),
            opacity,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RectDrag {
    start: ViewFraction,
    end: ViewFraction,
}

/// The segmentation editor.
#[derive(Debug, Clone)]
pub struct Editor {
    mode: EditMode,
    last_mode: EditMode,
    current_group: Option<i64>,
    /// True between press and release of a modifying gesture
    modifying: bool,
    selected_points: Vec<PointId>,
    selected_traces: Vec<TraceId>,
    rect: Option<RectDrag>,
    guard: Option<Guard>,
    precision: f64,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    pub fn new() -> Self {
        let mut editor = Self {
            mode: EditMode::None,
            last_mode: EditMode::None,
            current_group: None,
            modifying: false,
            selected_points: Vec::new(),
            selected_traces: Vec::new(),
            rect: None,
            guard: None,
            precision: 0.0,
        };
        editor.set_brush_size(DEFAULT_BRUSH_SIZE);
        editor
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// The mode active before the last switch.
    pub fn last_mode(&self) -> EditMode {
        self.last_mode
    }

    pub fn current_group(&self) -> Option<i64> {
        self.current_group
    }

    pub fn guard(&self) -> Option<Guard> {
        self.guard
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    pub fn selected_points(&self) -> &[PointId] {
        &self.selected_points
    }

    pub fn selected_traces(&self) -> &[TraceId] {
        &self.selected_traces
    }

    /// Whether a press would start a rectangle instead of brushing.
    pub fn is_rectangle_select(&self) -> bool {
        self.mode == EditMode::Trace && self.current_group.is_some() && self.guard.is_some()
    }

    /// The live selection rectangle in (mz, rt), clamped to the guard.
    pub fn selection_rect(&self, view: &ViewRange) -> Option<ViewRange> {
        let rect = self.rect?;
        let range = view.rect_between(rect.start, rect.end);
        Some(match self.guard {
            Some(guard) => guard.constrain(range),
            None => range,
        })
    }

    /// Switch editing mode.
    ///
    /// Picking the active mode again turns editing off. Entering a mode goes
    /// straight to choosing a group unless it resumes the mode just left.
    pub fn set_edit_mode(&mut self, mode: EditMode) {
        self.clear_selection();
        self.modifying = false;
        self.rect = None;

        if self.mode == mode {
            self.last_mode = self.mode;
            self.mode = EditMode::None;
        } else {
            let old = self.mode;
            self.mode = mode;
            if mode != EditMode::None
                && (old != EditMode::None || mode != self.last_mode || mode == EditMode::Pair)
            {
                self.select_group();
            }
            self.last_mode = old;
        }
        log::debug!("✏️ Edit mode: {:?} (last {:?})", self.mode, self.last_mode);
    }

    /// Map a brush size to the picking precision.
    pub fn set_brush_size(&mut self, size: f64) {
        self.precision = 0.02 + size.powi(2) / 7200.0;
    }

    pub fn set_guard(&mut self, guard: Option<Guard>) {
        self.guard = guard;
    }

    /// Change the guard width, keeping its centre. No-op without a guard.
    pub fn set_guard_width(&mut self, width: f64) {
        if let Some(guard) = self.guard.as_mut() {
            guard.width = width;
        }
    }

    /// True when there is no guard or `mz` is strictly inside it.
    pub fn within_guard(&self, mz: f64) -> bool {
        self.guard.is_none_or(|g| g.contains(mz))
    }

    /// Go back to choosing a group.
    pub fn select_group(&mut self) {
        self.clear_selection();
        self.current_group = None;
    }

    /// Make the next unused id of the current mode's kind the current group.
    pub fn new_group(&mut self, registry: &TraceRegistry) {
        self.clear_selection();
        match self.mode {
            EditMode::Trace => self.current_group = Some(registry.next_trace()),
            EditMode::Envelope => self.current_group = Some(registry.next_envelope()),
            EditMode::None | EditMode::Pair => {}
        }
    }

    /// Drop any gesture in progress, e.g. after the point set was replaced.
    pub fn reset_gesture(&mut self) {
        self.clear_selection();
        self.modifying = false;
        self.rect = None;
    }

    fn clear_selection(&mut self) {
        self.selected_points.clear();
        self.selected_traces.clear();
    }

    fn intersect(&self, at: ViewFraction, picker: &dyn Picker, ctx: &EditContext<'_>) -> Vec<Point> {
        let mut candidates = ctx.points.rendered(ctx.view, ctx.limit);
        if self.mode == EditMode::Trace {
            candidates.retain(|p| self.within_guard(p.mz));
        }
        let hits = picker.pick(at, self.precision, ctx.view, &candidates);
        candidates.retain(|p| hits.contains(&p.id));
        candidates
    }

    fn add_selections(&mut self, hits: &[Point]) {
        for p in hits {
            match self.mode {
                EditMode::Trace => {
                    if !self.selected_points.contains(&p.id) {
                        self.selected_points.push(p.id);
                    }
                }
                EditMode::Envelope | EditMode::Pair => {
                    if !self.selected_traces.contains(&p.trace) {
                        self.selected_traces.push(p.trace);
                    }
                }
                EditMode::None => {}
            }
        }
    }

    /// Most common real group among `hits`; the first to reach the top
    /// count wins ties.
    fn most_frequent(&self, hits: &[Point], registry: &TraceRegistry) -> Option<i64> {
        let mut counts: Vec<(i64, usize)> = Vec::new();
        let mut best: Option<(i64, usize)> = None;
        for p in hits {
            let id = match self.mode {
                EditMode::Trace => p.trace,
                _ => registry.envelope_of(p.trace),
            };
            if id == UNASSIGNED || id == NOISE_TRACE {
                continue;
            }
            let count = match counts.iter_mut().find(|(g, _)| *g == id) {
                Some((_, c)) => {
                    *c += 1;
                    *c
                }
                None => {
                    counts.push((id, 1));
                    1
                }
            };
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((id, count));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Press. Chooses a group, or starts brushing/boxing into the current one.
    pub fn pointer_down(&mut self, at: ViewFraction, picker: &dyn Picker, ctx: &EditContext<'_>) {
        if self.mode == EditMode::None {
            return;
        }
        self.clear_selection();
        let hits = self.intersect(at, picker, ctx);
        self.add_selections(&hits);

        self.modifying = self.current_group.is_some();
        if self.modifying {
            if self.is_rectangle_select() {
                self.rect = Some(RectDrag { start: at, end: at });
            }
        } else {
            self.current_group = self.most_frequent(&hits, &*ctx.registry);
            if let Some(group) = self.current_group {
                log::debug!("Chose {:?} group #{}", self.mode, group);
            }
        }
    }

    /// Drag. Only has an effect while modifying.
    pub fn pointer_move(&mut self, at: ViewFraction, picker: &dyn Picker, ctx: &EditContext<'_>) {
        if self.mode == EditMode::None || !self.modifying {
            return;
        }
        if let Some(rect) = self.rect.as_mut() {
            rect.end = at;
            if let Some(range) = self.selection_rect(ctx.view) {
                self.selected_points = ctx.points.inside(&range);
            }
        } else {
            let hits = self.intersect(at, picker, ctx);
            self.add_selections(&hits);
        }
    }

    /// Release. Commits a modifying gesture; `remove` flips it to removal.
    pub fn pointer_up(
        &mut self,
        remove: bool,
        ctx: &mut EditContext<'_>,
    ) -> Result<EditOutcome, SegmentError> {
        if self.mode == EditMode::None {
            return Ok(EditOutcome::Nothing);
        }
        let result = match self.current_group {
            Some(current) if self.modifying => self.commit(current, remove, ctx),
            Some(envelope) if self.mode == EditMode::Pair => Ok(EditOutcome::Paired(envelope)),
            _ => Ok(EditOutcome::Nothing),
        };
        self.reset_gesture();
        result
    }

    fn commit(
        &self,
        current: i64,
        remove: bool,
        ctx: &mut EditContext<'_>,
    ) -> Result<EditOutcome, SegmentError> {
        let (dest, src) = if remove {
            (UNASSIGNED, current)
        } else {
            (current, UNASSIGNED)
        };

        match self.mode {
            EditMode::Trace => {
                let changing: Vec<PointId> = ctx
                    .points
                    .iter()
                    .filter(|p| self.selected_points.contains(&p.id))
                    .filter(|p| p.trace == src || (src == UNASSIGNED && p.trace == NOISE_TRACE))
                    .map(|p| p.id)
                    .collect();

                if let Some(range) = self.selection_rect(ctx.view) {
                    ctx.registry
                        .assign_trace(Some(dest), ctx.points.points_mut(&changing))?;
                    ctx.queue.rectangle(current, &range, !remove);
                    Ok(EditOutcome::Committed)
                } else if !changing.is_empty() {
                    ctx.registry
                        .assign_trace(Some(dest), ctx.points.points_mut(&changing))?;
                    ctx.queue.set_trace(changing, dest);
                    Ok(EditOutcome::Committed)
                } else {
                    Ok(EditOutcome::Nothing)
                }
            }
            EditMode::Envelope => {
                let changing: Vec<TraceId> = self
                    .selected_traces
                    .iter()
                    .copied()
                    .filter(|&t| t != UNASSIGNED && t != NOISE_TRACE)
                    .filter(|&t| ctx.registry.envelope_of(t) == src)
                    .collect();
                if changing.is_empty() {
                    return Ok(EditOutcome::Nothing);
                }
                ctx.registry.assign_envelope(Some(dest), &changing)?;
                ctx.queue.set_envelope(changing, dest);
                Ok(EditOutcome::Committed)
            }
            EditMode::Pair | EditMode::None => Ok(EditOutcome::Nothing),
        }
    }

    /// Status line describing the current group.
    pub fn group_status_text(
        &self,
        view: &ViewRange,
        points: &PointStore,
        registry: &TraceRegistry,
        limit: usize,
    ) -> String {
        let Some(current) = self.current_group.filter(|_| self.mode != EditMode::None) else {
            return "No trace or envelope selected.".to_string();
        };
        match self.mode {
            EditMode::Trace => {
                let count = points
                    .rendered(view, limit)
                    .iter()
                    .filter(|p| p.trace == current)
                    .count();
                format!("Trace #{current}, {count} points rendered.")
            }
            EditMode::Envelope => format!(
                "Envelope #{current}, made up of {} traces.",
                registry.traces_in_envelope(current)
            ),
            EditMode::Pair => "Select an envelope to pair with this bookmark.".to_string(),
            EditMode::None => "No trace or envelope selected.".to_string(),
        }
    }

    /// How to draw `point` in the current mode.
    pub fn marker_style(
        &self,
        point: &Point,
        registry: &TraceRegistry,
        bookmark_pair: Option<EnvelopeId>,
    ) -> MarkerStyle {
        match self.mode {
            EditMode::None => MarkerStyle {
                color: MarkerColor::Intensity,
                opacity: 1.0,
            },
            EditMode::Trace => {
                if self.selected_points.contains(&point.id) {
                    MarkerStyle::fixed(SELECTION_COLOR, 1.0)
                } else if point.trace == UNASSIGNED {
                    MarkerStyle {
                        color: MarkerColor::Intensity,
                        opacity: TRACE_UNTRACED_OPACITY,
                    }
                } else {
                    MarkerStyle::fixed(color_for(point.trace, GroupKind::Trace), 1.0)
                }
            }
            EditMode::Envelope | EditMode::Pair => {
                let trace = point.trace;
                let envelope = registry.envelope_of(trace);
                if self.modifying && trace != UNASSIGNED && self.selected_traces.contains(&trace) {
                    MarkerStyle::fixed(SELECTION_COLOR, 1.0)
                } else if envelope == UNASSIGNED {
                    let opacity = if trace == UNASSIGNED { 0.2 } else { 0.5 };
                    MarkerStyle::fixed(color_for(trace, GroupKind::Trace), opacity)
                } else if Some(envelope) == bookmark_pair {
                    MarkerStyle::fixed(CURRENT_BOOKMARK_COLOR, 1.0)
                } else {
                    MarkerStyle::fixed(color_for(envelope, GroupKind::Envelope), 1.0)
                }
            }
        }
    }

    /// The brush should warn when trace editing can only see a sample of
    /// the points in view.
    pub fn brush_warning(&self, overflowed: bool) -> bool {
        self.mode == EditMode::Trace && overflowed
    }
}
