//! Loaded points and their visibility in the current window.

use serde::{Deserialize, Serialize};

use crate::constants::HOVER_RADIUS;
use crate::registry::{NOISE_TRACE, TraceId, UNASSIGNED};
use crate::view_range::ViewRange;

/// Server-assigned point identifier.
pub type PointId = i64;

/// One centroided sample.
///
/// On the wire a point is the array `[id, trace, mz, rt, intensity]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PointRow", into = "PointRow")]
pub struct Point {
    pub id: PointId,
    /// 0 is unassigned, -1 is noise, positive ids are traces.
    pub trace: TraceId,
    pub mz: f64,
    pub rt: f64,
    pub intensity: f64,
}

#[derive(Serialize, Deserialize)]
struct PointRow(PointId, TraceId, f64, f64, f64);

impl From<PointRow> for Point {
    fn from(PointRow(id, trace, mz, rt, intensity): PointRow) -> Self {
        Self {
            id,
            trace,
            mz,
            rt,
            intensity,
        }
    }
}

impl From<Point> for PointRow {
    fn from(p: Point) -> Self {
        PointRow(p.id, p.trace, p.mz, p.rt, p.intensity)
    }
}

impl Point {
    pub fn new(id: PointId, trace: TraceId, mz: f64, rt: f64, intensity: f64) -> Self {
        Self {
            id,
            trace,
            mz,
            rt,
            intensity,
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.trace == UNASSIGNED
    }

    pub fn is_noise(&self) -> bool {
        self.trace == NOISE_TRACE
    }
}

/// Intensity bounds over a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityRange {
    pub min: f64,
    pub max: f64,
}

impl IntensityRange {
    fn include(range: Option<Self>, intensity: f64) -> Option<Self> {
        Some(match range {
            Some(r) => Self {
                min: r.min.min(intensity),
                max: r.max.max(intensity),
            },
            None => Self {
                min: intensity,
                max: intensity,
            },
        })
    }
}

/// Summary of what the current window shows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Visibility {
    /// In-window points, capped at the plot limit.
    pub count: usize,
    /// The cap was reached, so the server may hold more points than shown.
    pub overflowed: bool,
    /// `None` when nothing is visible.
    pub intensity: Option<IntensityRange>,
}

/// The in-window points returned by [`PointStore::visible_subset`].
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleSubset {
    pub points: Vec<Point>,
    pub overflowed: bool,
}

/// The currently loaded points.
#[derive(Debug, Clone, Default)]
pub struct PointStore {
    points: Vec<Point>,
    visibility: Visibility,
}

impl PointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole point set.
    pub fn load(&mut self, points: Vec<Point>) {
        log::debug!("Loaded {} points", points.len());
        self.points = points;
        self.visibility = Visibility::default();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    pub fn get(&self, id: PointId) -> Option<&Point> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Visibility as of the last [`Self::visible_subset`] call.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// The points a renderer draws for `view`: in-window points, in load
    /// order, capped at `limit`.
    pub fn rendered(&self, view: &ViewRange, limit: usize) -> Vec<Point> {
        self.points
            .iter()
            .filter(|p| view.contains(p.mz, p.rt))
            .take(limit)
            .copied()
            .collect()
    }

    /// Points inside `view`, capped at `limit`, and record the visibility.
    ///
    /// Reaching the cap counts as overflow: the server truncates its answer
    /// at the same limit, so a full answer may be hiding more points.
    pub fn visible_subset(&mut self, view: &ViewRange, limit: usize) -> VisibleSubset {
        let in_window = self
            .points
            .iter()
            .filter(|p| view.contains(p.mz, p.rt))
            .count();
        let points = self.rendered(view, limit);
        let intensity = points
            .iter()
            .fold(None, |acc, p| IntensityRange::include(acc, p.intensity));
        let overflowed = in_window >= limit;

        self.visibility = Visibility {
            count: points.len(),
            overflowed,
            intensity,
        };
        if overflowed {
            log::debug!("Point limit {limit} reached ({in_window} in window)");
        }
        VisibleSubset { points, overflowed }
    }

    /// Loaded points strictly inside `rect`.
    pub fn inside(&self, rect: &ViewRange) -> Vec<PointId> {
        self.points
            .iter()
            .filter(|p| rect.strictly_contains(p.mz, p.rt))
            .map(|p| p.id)
            .collect()
    }

    /// Mutable access to the listed points. Unknown ids are skipped.
    pub fn points_mut<'a>(&'a mut self, ids: &'a [PointId]) -> impl Iterator<Item = &'a mut Point> {
        self.points.iter_mut().filter(move |p| ids.contains(&p.id))
    }

    /// Number of loaded points in `trace`.
    pub fn count_in_trace(&self, trace: TraceId) -> usize {
        self.points.iter().filter(|p| p.trace == trace).count()
    }

    /// Traces of the listed points, without duplicates, in first-seen order.
    pub fn traces_of(&self, ids: &[PointId]) -> Vec<TraceId> {
        let mut traces = Vec::new();
        for p in self.points.iter().filter(|p| ids.contains(&p.id)) {
            if !traces.contains(&p.trace) {
                traces.push(p.trace);
            }
        }
        traces
    }

    /// The loaded point nearest to (mz, rt), for hover readouts.
    ///
    /// Only points within [`HOVER_RADIUS`] on both axes are considered;
    /// among those the smallest Euclidean distance wins.
    pub fn closest_to(&self, mz: f64, rt: f64) -> Option<&Point> {
        self.points
            .iter()
            .filter(|p| (p.mz - mz).abs() <= HOVER_RADIUS && (p.rt - rt).abs() <= HOVER_RADIUS)
            .map(|p| (p, (p.mz - mz).powi(2) + (p.rt - rt).powi(2)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(p, _)| p)
    }
}
