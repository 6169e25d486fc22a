//! Global constants for the msviz core

use std::time::Duration;

/// Smallest mz or rt span a view range may shrink to.
/// Must stay positive; scale computations divide by the span.
pub const MIN_SPAN: f64 = 0.05;

/// View span multiplier for one zoom-in step.
pub const ZOOM_IN_RATIO: f64 = 0.9;

/// View span multiplier for one zoom-out step.
/// Exact inverse of [`ZOOM_IN_RATIO`] so a step in followed by a step out
/// around the same focus lands back on the starting window.
pub const ZOOM_OUT_RATIO: f64 = 1.0 / ZOOM_IN_RATIO;

/// Fraction of the view span panned by one arrow-key press.
pub const KEY_PAN_FRACTION: f64 = 0.1;

/// Tolerance for deciding whether a point lies inside a view range.
pub const VISIBILITY_EPSILON: f64 = 1e-4;

/// Padding added on each side of both domain axes reported by the server.
pub const DOMAIN_PADDING: f64 = 0.1;

/// Maximum number of points requested and plotted for one view.
pub const POINTS_PLOTTED_LIMIT: usize = 6000;

/// Minimum intensity requested from the server.
pub const INTENSITY_MIN: f64 = 0.0;

/// Largest mz span kept when jumping to a bookmark or untraced point.
pub const JUMP_MZ_SPAN: f64 = 10.0;

/// Largest rt span kept when jumping to a bookmark or untraced point.
pub const JUMP_RT_SPAN: f64 = 30.0;

/// Hover lookup only considers points this close on both axes.
pub const HOVER_RADIUS: f64 = 0.5;

/// Default brush size for the segmentation editor.
pub const DEFAULT_BRUSH_SIZE: f64 = 40.0;

/// Default width of the mz guard band.
pub const DEFAULT_TRACE_WIDTH: f64 = 0.1;

/// Delay between periodic change-queue flushes.
pub const STANDARD_INTERVAL: Duration = Duration::from_millis(3000);

/// Delay before the next periodic flush after a failed batch.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(5000);

/// Delay between file-status polls while waiting for the server.
pub const FILE_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// A point request is held back this long in case a newer one replaces it.
pub const REQUEST_DELAY: Duration = Duration::from_millis(100);
