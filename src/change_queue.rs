//! Outbound edit batching.
//!
//! Every local edit becomes a [`Change`]. Changes collect in the queue and
//! leave as one batch per flush. A flush is requested by every enqueue and
//! also fires on a periodic deadline. Delivery is at-most-once: a batch that
//! fails is logged and dropped, and the next periodic flush is pushed out to
//! the retry interval.

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::constants::{RETRY_INTERVAL, STANDARD_INTERVAL};
use crate::points::PointId;
use crate::registry::{EnvelopeId, NOISE_TRACE, TraceId};
use crate::view_range::ViewRange;

/// One edit as sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Change {
    /// Put points into a trace (0 removes them from their trace)
    SetTrace { trace: TraceId, points: Vec<PointId> },
    /// Put traces into an envelope (0 removes them from their envelope)
    SetEnvelope {
        envelope: EnvelopeId,
        traces: Vec<TraceId>,
    },
    /// Add or remove every point inside a box, resolved server-side
    Rectangle {
        /// `[mzmin, mzmax, rtmin, rtmax]`
        bounds: [f64; 4],
        #[serde(rename = "id")]
        group: TraceId,
        #[serde(rename = "isAdd")]
        is_add: bool,
    },
    Undo,
    Redo,
}

impl Change {
    pub fn rectangle(group: TraceId, bounds: &ViewRange, is_add: bool) -> Self {
        Change::Rectangle {
            bounds: bounds.to_array(),
            group,
            is_add,
        }
    }

    /// Short label for logs.
    pub fn description(&self) -> String {
        match self {
            Change::SetTrace { trace, points } => {
                format!("Set {} points to trace #{}", points.len(), trace)
            }
            Change::SetEnvelope { envelope, traces } => {
                format!("Set {} traces to envelope #{}", traces.len(), envelope)
            }
            Change::Rectangle {
                group, is_add: true, ..
            } => format!("Add rectangle to #{group}"),
            Change::Rectangle {
                group,
                is_add: false,
                ..
            } => format!("Remove rectangle from #{group}"),
            Change::Undo => "Undo".to_string(),
            Change::Redo => "Redo".to_string(),
        }
    }
}

/// What the session must do once a batch has been answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Server state changed wholesale (undo/redo); reload points and ids.
    RefreshPoints,
    /// Noise was marked; move on to the next untraced point.
    JumpNext,
}

pub type BatchId = u64;

/// Changes drained by one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub id: BatchId,
    pub changes: Vec<Change>,
}

impl ChangeBatch {
    /// JSON request body: an array of change objects.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.changes)
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    id: BatchId,
    follow_ups: Vec<FollowUp>,
}

/// Pending local edits waiting to be sent.
#[derive(Debug, Clone)]
pub struct ChangeQueue {
    pending: Vec<Change>,
    pending_follow_ups: Vec<FollowUp>,
    in_flight: Vec<InFlight>,
    next_batch_id: BatchId,
    flush_requested: bool,
    /// When the periodic flush next fires
    next_flush: Instant,
}

impl ChangeQueue {
    /// Start the periodic flush loop at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            pending: Vec::new(),
            pending_follow_ups: Vec::new(),
            in_flight: Vec::new(),
            next_batch_id: 1,
            flush_requested: false,
            next_flush: now + STANDARD_INTERVAL,
        }
    }

    /// Append a change and request a flush.
    pub fn enqueue(&mut self, change: Change) {
        log::debug!("📝 Queued: {}", change.description());
        self.pending.push(change);
        self.flush_requested = true;
    }

    /// Append a change whose batch must trigger `follow_up` when answered.
    pub fn enqueue_with(&mut self, change: Change, follow_up: FollowUp) {
        self.pending_follow_ups.push(follow_up);
        self.enqueue(change);
    }

    pub fn set_trace(&mut self, points: Vec<PointId>, trace: TraceId) {
        self.enqueue(Change::SetTrace { trace, points });
    }

    pub fn set_envelope(&mut self, traces: Vec<TraceId>, envelope: EnvelopeId) {
        self.enqueue(Change::SetEnvelope { envelope, traces });
    }

    pub fn rectangle(&mut self, group: TraceId, bounds: &ViewRange, is_add: bool) {
        self.enqueue(Change::rectangle(group, bounds, is_add));
    }

    /// Mark everything inside `bounds` as noise.
    pub fn set_noise(&mut self, bounds: &ViewRange) {
        self.enqueue_with(Change::rectangle(NOISE_TRACE, bounds, true), FollowUp::JumpNext);
    }

    pub fn undo(&mut self) {
        self.enqueue_with(Change::Undo, FollowUp::RefreshPoints);
    }

    pub fn redo(&mut self) {
        self.enqueue_with(Change::Redo, FollowUp::RefreshPoints);
    }

    /// Changes not yet sent.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Batches sent and not yet answered.
    pub fn pending_updates(&self) -> usize {
        self.in_flight.len()
    }

    pub fn next_flush_at(&self) -> Instant {
        self.next_flush
    }

    /// Drain every pending change into one batch.
    ///
    /// Returns `None` when nothing is pending.
    pub fn flush(&mut self) -> Option<ChangeBatch> {
        self.flush_requested = false;
        if !self.has_changes() {
            return None;
        }
        let id = self.next_batch_id;
        self.next_batch_id += 1;
        let changes = std::mem::take(&mut self.pending);
        self.in_flight.push(InFlight {
            id,
            follow_ups: std::mem::take(&mut self.pending_follow_ups),
        });
        log::debug!("📤 Sending batch {} with {} changes", id, changes.len());
        Some(ChangeBatch { id, changes })
    }

    /// Flush if one was requested or the periodic deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<ChangeBatch> {
        let due = now >= self.next_flush;
        if !(self.flush_requested || due) {
            return None;
        }
        let batch = self.flush();
        if due {
            // Rescheduled again when the batch is answered.
            self.next_flush = now
                + if batch.is_some() {
                    RETRY_INTERVAL
                } else {
                    STANDARD_INTERVAL
                };
        }
        batch
    }

    /// Record the server's answer to a batch and return its follow-ups.
    ///
    /// A failed batch is not re-queued.
    pub fn complete(&mut self, batch: BatchId, success: bool, now: Instant) -> Vec<FollowUp> {
        let Some(pos) = self.in_flight.iter().position(|b| b.id == batch) else {
            log::warn!("Answer for unknown change batch {batch}");
            return Vec::new();
        };
        let done = self.in_flight.remove(pos);
        if success {
            log::debug!("✅ Batch {batch} saved");
            self.next_flush = now + STANDARD_INTERVAL;
        } else {
            log::warn!("Batch {batch} failed to save; its changes are dropped");
            self.next_flush = now + RETRY_INTERVAL;
        }
        done.follow_ups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_change_json_shapes() {
        let set = Change::SetTrace {
            trace: 4,
            points: vec![1, 2],
        };
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            r#"{"type":"set-trace","trace":4,"points":[1,2]}"#
        );
        let env = Change::SetEnvelope {
            envelope: 2,
            traces: vec![7],
        };
        assert_eq!(
            serde_json::to_string(&env).unwrap(),
            r#"{"type":"set-envelope","envelope":2,"traces":[7]}"#
        );
        let rect = Change::rectangle(-1, &ViewRange::new(1.0, 2.0, 3.0, 4.0), true);
        assert_eq!(
            serde_json::to_string(&rect).unwrap(),
            r#"{"type":"rectangle","bounds":[1.0,2.0,3.0,4.0],"id":-1,"isAdd":true}"#
        );
        assert_eq!(serde_json::to_string(&Change::Undo).unwrap(), r#"{"type":"undo"}"#);
    }

    #[test]
    fn test_flush_sends_everything_once() {
        let now = Instant::now();
        let mut queue = ChangeQueue::new(now);
        for i in 0..5 {
            queue.set_trace(vec![i], 1);
        }
        assert_eq!(queue.pending_len(), 5);
        assert!(queue.has_changes());
        let batch = queue.flush().unwrap();
        assert_eq!(batch.changes.len(), 5);
        assert_eq!(queue.pending_len(), 0);
        assert!(!queue.has_changes());
        assert_eq!(queue.pending_updates(), 1);
        assert!(queue.flush().is_none());
    }

    #[test]
    fn test_enqueue_requests_flush() {
        let now = Instant::now();
        let mut queue = ChangeQueue::new(now);
        assert!(queue.poll(now).is_none());
        queue.set_envelope(vec![3], 2);
        let batch = queue.poll(now).unwrap();
        assert_eq!(batch.changes.len(), 1);
        assert!(queue.poll(now).is_none());
    }

    #[test]
    fn test_enqueue_during_flight_goes_to_next_batch() {
        let now = Instant::now();
        let mut queue = ChangeQueue::new(now);
        queue.set_trace(vec![1], 1);
        let first = queue.flush().unwrap();
        queue.set_trace(vec![2], 1);
        let second = queue.flush().unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.changes.len(), 1);
        assert_eq!(queue.pending_updates(), 2);
    }

    #[test]
    fn test_failed_batch_dropped_and_retry_scheduled() {
        let now = Instant::now();
        let mut queue = ChangeQueue::new(now);
        queue.set_trace(vec![1], 1);
        let batch = queue.flush().unwrap();
        let later = now + Duration::from_millis(200);
        queue.complete(batch.id, false, later);
        assert_eq!(queue.pending_len(), 0);
        assert_eq!(queue.pending_updates(), 0);
        assert_eq!(queue.next_flush_at(), later + RETRY_INTERVAL);
    }

    #[test]
    fn test_success_schedules_standard_interval() {
        let now = Instant::now();
        let mut queue = ChangeQueue::new(now);
        queue.set_trace(vec![1], 1);
        let batch = queue.flush().unwrap();
        queue.complete(batch.id, true, now);
        assert_eq!(queue.next_flush_at(), now + STANDARD_INTERVAL);
    }

    #[test]
    fn test_periodic_loop_reschedules_when_empty() {
        let now = Instant::now();
        let mut queue = ChangeQueue::new(now);
        let due = now + STANDARD_INTERVAL;
        assert!(queue.poll(due).is_none());
        assert_eq!(queue.next_flush_at(), due + STANDARD_INTERVAL);
    }

    #[test]
    fn test_undo_follow_up_returned_on_completion() {
        let now = Instant::now();
        let mut queue = ChangeQueue::new(now);
        queue.undo();
        let batch = queue.flush().unwrap();
        assert_eq!(batch.changes, vec![Change::Undo]);
        assert_eq!(queue.complete(batch.id, false, now), vec![FollowUp::RefreshPoints]);
        assert!(queue.complete(batch.id, true, now).is_empty());
    }

    #[test]
    fn test_set_noise_uses_noise_rectangle() {
        let now = Instant::now();
        let mut queue = ChangeQueue::new(now);
        queue.set_noise(&ViewRange::new(10.0, 20.0, 1.0, 2.0));
        let batch = queue.flush().unwrap();
        assert_eq!(
            batch.changes,
            vec![Change::Rectangle {
                bounds: [10.0, 20.0, 1.0, 2.0],
                group: -1,
                is_add: true
            }]
        );
        assert_eq!(queue.complete(batch.id, true, now), vec![FollowUp::JumpNext]);
    }
}
