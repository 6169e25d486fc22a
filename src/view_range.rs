//! View range mathematics.
//!
//! The viewer always shows a rectangular window of the (mz, rt) plane. Every
//! pan, zoom or jump builds a candidate window and runs it through
//! [`ViewRange::constrain`], so the window never leaves the data domain and
//! never shrinks below [`MIN_SPAN`] on either axis.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DOMAIN_PADDING, JUMP_MZ_SPAN, JUMP_RT_SPAN, MIN_SPAN, VISIBILITY_EPSILON, ZOOM_IN_RATIO,
    ZOOM_OUT_RATIO,
};
use crate::points::{IntensityRange, PointStore, Visibility};

/// A rectangle in (mz, rt) space.
///
/// Used for the visible window, the data domain bounds and the boxes sent
/// with rectangle edits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRange {
    pub mzmin: f64,
    pub mzmax: f64,
    pub rtmin: f64,
    pub rtmax: f64,
}

/// A position inside the current window, as a fraction of each axis.
///
/// `(0, 0)` is the (mzmin, rtmin) corner. Pointer positions reported by the
/// renderer may land slightly outside 0..1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewFraction {
    pub mz: f64,
    pub rt: f64,
}

impl ViewFraction {
    pub fn new(mz: f64, rt: f64) -> Self {
        Self { mz, rt }
    }

    /// The centre of the window.
    pub fn center() -> Self {
        Self::new(0.5, 0.5)
    }

    /// Clamp both components into 0..1.
    pub fn clamped(self) -> Self {
        Self::new(self.mz.clamp(0.0, 1.0), self.rt.clamp(0.0, 1.0))
    }
}

/// Direction of one zoom step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    /// Window shrinks
    In,
    /// Window grows
    Out,
}

impl ZoomDirection {
    /// Interpret a wheel delta: negative scrolls zoom in.
    pub fn from_sign(direction: f64) -> Self {
        if direction < 0.0 {
            ZoomDirection::In
        } else {
            ZoomDirection::Out
        }
    }

    fn ratio(self) -> f64 {
        match self {
            ZoomDirection::In => ZOOM_IN_RATIO,
            ZoomDirection::Out => ZOOM_OUT_RATIO,
        }
    }
}

impl ViewRange {
    pub fn new(mzmin: f64, mzmax: f64, rtmin: f64, rtmax: f64) -> Self {
        Self {
            mzmin,
            mzmax,
            rtmin,
            rtmax,
        }
    }

    /// Build from a minimum and a span on each axis.
    pub fn from_delta(mzmin: f64, mzrange: f64, rtmin: f64, rtrange: f64) -> Self {
        Self::new(mzmin, mzmin + mzrange, rtmin, rtmin + rtrange)
    }

    /// Build from two opposite corners given in any order.
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self::new(a.0.min(b.0), a.0.max(b.0), a.1.min(b.1), a.1.max(b.1))
    }

    pub fn mzrange(&self) -> f64 {
        self.mzmax - self.mzmin
    }

    pub fn rtrange(&self) -> f64 {
        self.rtmax - self.rtmin
    }

    /// Centre of the window as (mz, rt).
    pub fn midpoint(&self) -> (f64, f64) {
        (
            (self.mzmin + self.mzmax) / 2.0,
            (self.rtmin + self.rtmax) / 2.0,
        )
    }

    /// Inclusive containment with [`VISIBILITY_EPSILON`] slack on every edge.
    pub fn contains(&self, mz: f64, rt: f64) -> bool {
        mz >= self.mzmin - VISIBILITY_EPSILON
            && mz <= self.mzmax + VISIBILITY_EPSILON
            && rt >= self.rtmin - VISIBILITY_EPSILON
            && rt <= self.rtmax + VISIBILITY_EPSILON
    }

    /// Strict containment, used for rectangle selection.
    pub fn strictly_contains(&self, mz: f64, rt: f64) -> bool {
        mz > self.mzmin && mz < self.mzmax && rt > self.rtmin && rt < self.rtmax
    }

    /// Whether `other` lies entirely inside this range.
    pub fn encloses(&self, other: &ViewRange) -> bool {
        other.mzmin >= self.mzmin
            && other.mzmax <= self.mzmax
            && other.rtmin >= self.rtmin
            && other.rtmax <= self.rtmax
    }

    /// `[mzmin, mzmax, rtmin, rtmax]`, the order rectangle edits use.
    pub fn to_array(&self) -> [f64; 4] {
        [self.mzmin, self.mzmax, self.rtmin, self.rtmax]
    }

    /// Absolute (mz, rt) of a fractional position in this window.
    pub fn point_at(&self, at: ViewFraction) -> (f64, f64) {
        (
            self.mzmin + at.mz * self.mzrange(),
            self.rtmin + at.rt * self.rtrange(),
        )
    }

    /// Fractional position of an absolute (mz, rt) in this window.
    pub fn fraction_of(&self, mz: f64, rt: f64) -> ViewFraction {
        ViewFraction::new(
            (mz - self.mzmin) / self.mzrange(),
            (rt - self.rtmin) / self.rtrange(),
        )
    }

    /// The (mz, rt) rectangle spanned by two fractional positions.
    pub fn rect_between(&self, a: ViewFraction, b: ViewFraction) -> ViewRange {
        ViewRange::from_corners(self.point_at(a), self.point_at(b))
    }

    /// Clamp a candidate window into `domain`.
    ///
    /// Each span is clamped to `[MIN_SPAN, domain span]`, the window is
    /// re-centred on the candidate's midpoint and then shifted so it lies
    /// fully inside the domain.
    pub fn constrain(&self, domain: &ViewRange) -> ViewRange {
        let mzrange = self.mzrange().max(MIN_SPAN).min(domain.mzrange());
        let rtrange = self.rtrange().max(MIN_SPAN).min(domain.rtrange());
        let (mzmid, rtmid) = self.midpoint();

        let mzmin = (mzmid - mzrange / 2.0)
            .max(domain.mzmin)
            .min(domain.mzmax - mzrange);
        let rtmin = (rtmid - rtrange / 2.0)
            .max(domain.rtmin)
            .min(domain.rtmax - rtrange);

        ViewRange::from_delta(mzmin, mzrange, rtmin, rtrange)
    }

    /// Zoom one step around a focus point.
    ///
    /// The absolute (mz, rt) under `focus` stays at the same fractional
    /// position in the new window. The focus is clamped to 0..1 first since
    /// pointer positions can fall just outside the plane.
    pub fn zoom_at(
        &self,
        focus: ViewFraction,
        direction: ZoomDirection,
        domain: &ViewRange,
    ) -> ViewRange {
        let focus = focus.clamped();
        let ratio = direction.ratio();
        let mzrange = self.mzrange() * ratio;
        let rtrange = self.rtrange() * ratio;
        let (mz, rt) = self.point_at(focus);

        ViewRange::from_delta(
            mz - focus.mz * mzrange,
            mzrange,
            rt - focus.rt * rtrange,
            rtrange,
        )
        .constrain(domain)
    }

    /// Translate by a fraction of the window's own span on each axis.
    pub fn pan(&self, dx: f64, dz: f64, domain: &ViewRange) -> ViewRange {
        ViewRange::from_delta(
            self.mzmin + dx * self.mzrange(),
            self.mzrange(),
            self.rtmin + dz * self.rtrange(),
            self.rtrange(),
        )
        .constrain(domain)
    }

    /// A window centred on a target, for bookmark and untraced-point jumps.
    ///
    /// Spans shrink to at most [`JUMP_MZ_SPAN`] x [`JUMP_RT_SPAN`]. With no rt
    /// the full rt extent of the domain is used.
    pub fn jump_window(&self, mz: f64, rt: Option<f64>, domain: &ViewRange) -> ViewRange {
        let mzrange = self.mzrange().min(JUMP_MZ_SPAN);
        let (rtmin, rtrange) = match rt {
            Some(rt) => {
                let rtrange = self.rtrange().min(JUMP_RT_SPAN);
                (rt - rtrange / 2.0, rtrange)
            }
            None => (domain.rtmin, domain.rtrange()),
        };
        ViewRange::from_delta(mz - mzrange / 2.0, mzrange, rtmin, rtrange).constrain(domain)
    }
}

/// Full extent of the loaded dataset, as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataRange {
    pub mzmin: f64,
    pub mzmax: f64,
    pub rtmin: f64,
    pub rtmax: f64,
    pub intmin: f64,
    pub intmax: f64,
    /// Fraction of server-side summarisation completed, if known.
    #[serde(default)]
    pub progress: Option<f64>,
}

impl DataRange {
    /// The (mz, rt) rectangle of the domain.
    pub fn bounds(&self) -> ViewRange {
        ViewRange::new(self.mzmin, self.mzmax, self.rtmin, self.rtmax)
    }

    /// Widen both axes by [`DOMAIN_PADDING`] on each side.
    ///
    /// Keeps single-scan or single-mz files from producing a zero-width domain.
    pub fn padded(mut self) -> Self {
        self.mzmin -= DOMAIN_PADDING;
        self.mzmax += DOMAIN_PADDING;
        self.rtmin -= DOMAIN_PADDING;
        self.rtmax += DOMAIN_PADDING;
        self
    }
}

impl Default for DataRange {
    fn default() -> Self {
        Self {
            mzmin: 0.0,
            mzmax: 1.0,
            rtmin: 0.0,
            rtmax: 1.0,
            intmin: 0.0,
            intmax: 1000.0,
            progress: None,
        }
    }
}

/// The authoritative view state: domain, current window and the intensity
/// bounds of what is visible in it.
#[derive(Debug, Clone)]
pub struct ViewModel {
    domain: DataRange,
    view: ViewRange,
    visibility: Visibility,
    /// Window before the last rectangle zoom, for "zoom back".
    last_zoom_from: Option<ViewRange>,
}

impl ViewModel {
    /// Start showing the whole of `domain`.
    pub fn new(domain: DataRange) -> Self {
        Self {
            domain,
            view: domain.bounds(),
            visibility: Visibility::default(),
            last_zoom_from: None,
        }
    }

    pub fn domain(&self) -> &DataRange {
        &self.domain
    }

    pub fn view(&self) -> &ViewRange {
        &self.view
    }

    /// Visible point count, overflow flag and intensity bounds for the window.
    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    /// Intensity bounds of the visible points, if any are visible.
    pub fn intensity(&self) -> Option<IntensityRange> {
        self.visibility.intensity
    }

    pub fn last_zoom_from(&self) -> Option<ViewRange> {
        self.last_zoom_from
    }

    /// Replace the domain (new file) and reset the window to cover all of it.
    pub fn reset_domain(&mut self, domain: DataRange, points: &mut PointStore, limit: usize) {
        log::info!(
            "Data domain: mz {:.4}..{:.4}, rt {:.4}..{:.4}",
            domain.mzmin,
            domain.mzmax,
            domain.rtmin,
            domain.rtmax
        );
        self.domain = domain;
        self.last_zoom_from = None;
        self.set_view(domain.bounds(), points, limit);
    }

    /// The single entry point for changing the window.
    ///
    /// Constrains the candidate and re-derives visibility over `points`.
    pub fn set_view(
        &mut self,
        candidate: ViewRange,
        points: &mut PointStore,
        limit: usize,
    ) -> ViewRange {
        self.view = candidate.constrain(&self.domain.bounds());
        log::debug!(
            "View range: mz {:.4}..{:.4}, rt {:.4}..{:.4}",
            self.view.mzmin,
            self.view.mzmax,
            self.view.rtmin,
            self.view.rtmax
        );
        self.refresh_visibility(points, limit);
        self.view
    }

    /// Re-derive visibility after the point set changed.
    pub fn refresh_visibility(&mut self, points: &mut PointStore, limit: usize) {
        points.visible_subset(&self.view, limit);
        self.visibility = points.visibility();
    }

    /// Remember the current window before a rectangle zoom.
    pub fn remember_zoom_origin(&mut self) {
        self.last_zoom_from = Some(self.view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    fn ranges_eq(a: &ViewRange, b: &ViewRange) -> bool {
        approx_eq(a.mzmin, b.mzmin)
            && approx_eq(a.mzmax, b.mzmax)
            && approx_eq(a.rtmin, b.rtmin)
            && approx_eq(a.rtmax, b.rtmax)
    }

    fn domain() -> ViewRange {
        ViewRange::new(100.0, 200.0, 0.0, 60.0)
    }

    #[test]
    fn test_constrain_keeps_inside_domain() {
        let d = domain();
        let candidates = [
            ViewRange::new(50.0, 80.0, -10.0, 5.0),
            ViewRange::new(190.0, 260.0, 55.0, 90.0),
            ViewRange::new(0.0, 1000.0, -100.0, 100.0),
            ViewRange::new(150.0, 150.0, 30.0, 30.0),
            ViewRange::new(120.0, 119.0, 10.0, 9.0),
        ];
        for c in candidates {
            let r = c.constrain(&d);
            assert!(d.encloses(&r), "{r:?} escapes {d:?}");
            assert!(r.mzrange() >= MIN_SPAN - EPSILON && r.mzrange() <= d.mzrange() + EPSILON);
            assert!(r.rtrange() >= MIN_SPAN - EPSILON && r.rtrange() <= d.rtrange() + EPSILON);
        }
    }

    #[test]
    fn test_constrain_recentres_on_midpoint() {
        let r = ViewRange::new(150.0, 150.0, 30.0, 30.0).constrain(&domain());
        assert!(approx_eq(r.mzrange(), MIN_SPAN));
        let (mz, rt) = r.midpoint();
        assert!(approx_eq(mz, 150.0));
        assert!(approx_eq(rt, 30.0));
    }

    #[test]
    fn test_constrain_inside_is_identity() {
        let r = ViewRange::new(120.0, 140.0, 10.0, 20.0);
        assert!(ranges_eq(&r.constrain(&domain()), &r));
    }

    #[test]
    fn test_zoom_in_then_out_restores_range() {
        let start = ViewRange::new(120.0, 160.0, 10.0, 40.0);
        let focus = ViewFraction::new(0.3, 0.7);
        let zoomed = start.zoom_at(focus, ZoomDirection::In, &domain());
        assert!(zoomed.mzrange() < start.mzrange());
        let back = zoomed.zoom_at(focus, ZoomDirection::Out, &domain());
        assert!(ranges_eq(&back, &start), "{back:?} != {start:?}");
    }

    #[test]
    fn test_zoom_keeps_focus_stationary() {
        let start = ViewRange::new(120.0, 160.0, 10.0, 40.0);
        let focus = ViewFraction::new(0.25, 0.6);
        let before = start.point_at(focus);
        let zoomed = start.zoom_at(focus, ZoomDirection::In, &domain());
        let after = zoomed.point_at(focus);
        assert!(approx_eq(before.0, after.0));
        assert!(approx_eq(before.1, after.1));
    }

    #[test]
    fn test_zoom_clamps_focus() {
        let start = ViewRange::new(120.0, 160.0, 10.0, 40.0);
        let outside = start.zoom_at(ViewFraction::new(1.4, -0.2), ZoomDirection::In, &domain());
        let edge = start.zoom_at(ViewFraction::new(1.0, 0.0), ZoomDirection::In, &domain());
        assert!(ranges_eq(&outside, &edge));
    }

    #[test]
    fn test_zoom_direction_from_sign() {
        assert_eq!(ZoomDirection::from_sign(-3.0), ZoomDirection::In);
        assert_eq!(ZoomDirection::from_sign(1.0), ZoomDirection::Out);
    }

    #[test]
    fn test_pan_moves_by_fraction() {
        let start = ViewRange::new(120.0, 140.0, 10.0, 20.0);
        let panned = start.pan(0.1, -0.5, &domain());
        assert!(approx_eq(panned.mzmin, 122.0));
        assert!(approx_eq(panned.rtmin, 5.0));
        assert!(approx_eq(panned.mzrange(), 20.0));
    }

    #[test]
    fn test_pan_stops_at_domain_edge() {
        let start = ViewRange::new(180.0, 200.0, 0.0, 60.0);
        let panned = start.pan(0.5, 0.0, &domain());
        assert!(ranges_eq(&panned, &start));
    }

    #[test]
    fn test_rect_between_swaps_backwards_drag() {
        let view = domain();
        let r = view.rect_between(ViewFraction::new(0.8, 0.5), ViewFraction::new(0.2, 0.1));
        assert!(approx_eq(r.mzmin, 120.0));
        assert!(approx_eq(r.mzmax, 180.0));
        assert!(approx_eq(r.rtmin, 6.0));
        assert!(approx_eq(r.rtmax, 30.0));
    }

    #[test]
    fn test_jump_window_centres_target() {
        let view = domain();
        let r = view.jump_window(150.0, Some(30.0), &view);
        assert!(approx_eq(r.mzrange(), JUMP_MZ_SPAN));
        assert!(approx_eq(r.rtrange(), JUMP_RT_SPAN));
        let (mz, rt) = r.midpoint();
        assert!(approx_eq(mz, 150.0));
        assert!(approx_eq(rt, 30.0));
    }

    #[test]
    fn test_jump_window_without_rt_uses_full_rt() {
        let view = domain();
        let r = view.jump_window(150.0, None, &view);
        assert!(approx_eq(r.rtmin, 0.0));
        assert!(approx_eq(r.rtmax, 60.0));
    }

    #[test]
    fn test_contains_has_tolerance() {
        let r = ViewRange::new(100.0, 150.0, 0.0, 30.0);
        assert!(r.contains(150.00005, 30.0));
        assert!(!r.contains(150.01, 30.0));
        assert!(!r.strictly_contains(150.0, 10.0));
    }

    #[test]
    fn test_padded_domain() {
        let d = DataRange {
            mzmin: 500.0,
            mzmax: 500.0,
            rtmin: 12.0,
            rtmax: 12.0,
            ..DataRange::default()
        }
        .padded();
        assert!(approx_eq(d.bounds().mzrange(), 0.2));
        assert!(approx_eq(d.bounds().rtrange(), 0.2));
    }

    #[test]
    fn test_view_model_set_view_constrains() {
        let domain = DataRange {
            mzmin: 100.0,
            mzmax: 200.0,
            rtmin: 0.0,
            rtmax: 60.0,
            ..DataRange::default()
        };
        let mut model = ViewModel::new(domain);
        let mut points = PointStore::new();
        let r = model.set_view(ViewRange::new(0.0, 10.0, 0.0, 10.0), &mut points, 10);
        assert!(domain.bounds().encloses(&r));
        assert_eq!(model.view(), &r);
        assert!(model.intensity().is_none());
    }
}
