//! Outgoing request bookkeeping and the debounce/poll timers.

use std::collections::HashMap;

use web_time::Instant;

use crate::change_queue::BatchId;
use crate::constants::{FILE_POLL_INTERVAL, REQUEST_DELAY};
use crate::remote::{OutgoingRequest, Request, RequestId};

/// What an in-flight request was for, kept until its answer arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    FileStatus,
    Points,
    TraceMap,
    NextIds,
    SaveChanges(BatchId),
    HighestUntraced,
    EnvelopeInfo,
}

impl Pending {
    fn of(request: &Request) -> Self {
        match request {
            Request::FileStatus => Pending::FileStatus,
            Request::Points { .. } => Pending::Points,
            Request::TraceMap => Pending::TraceMap,
            Request::NextIds => Pending::NextIds,
            Request::SaveChanges { batch, .. } => Pending::SaveChanges(*batch),
            Request::HighestUntraced => Pending::HighestUntraced,
            Request::EnvelopeInfo { .. } => Pending::EnvelopeInfo,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RequestScheduler {
    next_id: RequestId,
    outbox: Vec<OutgoingRequest>,
    in_flight: HashMap<RequestId, Pending>,
    /// Newest point request; older answers are stale
    latest_points: Option<RequestId>,
    point_refresh_at: Option<Instant>,
    file_poll_at: Option<Instant>,
}

impl RequestScheduler {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            outbox: Vec::new(),
            in_flight: HashMap::new(),
            latest_points: None,
            point_refresh_at: None,
            file_poll_at: None,
        }
    }

    /// Queue `request` for the glue to send.
    pub fn issue(&mut self, request: Request) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        let pending = Pending::of(&request);
        if pending == Pending::Points {
            self.latest_points = Some(id);
        }
        log::debug!("📡 Request {id}: {}", request.name());
        self.in_flight.insert(id, pending);
        self.outbox.push(OutgoingRequest { id, request });
        id
    }

    /// Forget an answered request, returning what it was for.
    pub fn take(&mut self, id: RequestId) -> Option<Pending> {
        self.in_flight.remove(&id)
    }

    pub fn drain(&mut self) -> Vec<OutgoingRequest> {
        std::mem::take(&mut self.outbox)
    }

    pub fn is_latest_points(&self, id: RequestId) -> bool {
        self.latest_points == Some(id)
    }

    /// (Re)start the refresh debounce; only the last call within the
    /// delay produces a request.
    pub fn schedule_point_refresh(&mut self, now: Instant) {
        self.point_refresh_at = Some(now + REQUEST_DELAY);
    }

    /// True once when the debounce has elapsed.
    pub fn point_refresh_due(&mut self, now: Instant) -> bool {
        match self.point_refresh_at {
            Some(at) if now >= at => {
                self.point_refresh_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn schedule_file_poll(&mut self, now: Instant) {
        self.file_poll_at = Some(now + FILE_POLL_INTERVAL);
    }

    pub fn cancel_file_poll(&mut self) {
        self.file_poll_at = None;
    }

    pub fn file_poll_due(&mut self, now: Instant) -> bool {
        match self.file_poll_at {
            Some(at) if now >= at => {
                self.file_poll_at = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ids_increase_and_take_once() {
        let mut requests = RequestScheduler::new();
        let a = requests.issue(Request::TraceMap);
        let b = requests.issue(Request::SaveChanges {
            batch: 3,
            body: "[]".to_string(),
        });
        assert!(b > a);
        assert_eq!(requests.drain().len(), 2);
        assert!(requests.drain().is_empty());
        assert_eq!(requests.take(b), Some(Pending::SaveChanges(3)));
        assert_eq!(requests.take(b), None);
        assert_eq!(requests.take(a), Some(Pending::TraceMap));
    }

    #[test]
    fn test_latest_points_tracking() {
        let mut requests = RequestScheduler::new();
        let range = crate::view_range::ViewRange::new(0.0, 1.0, 0.0, 1.0);
        let points = |requests: &mut RequestScheduler| {
            requests.issue(Request::Points {
                range,
                max_count: 10,
                min_intensity: 0.0,
            })
        };
        let first = points(&mut requests);
        let second = points(&mut requests);
        assert!(!requests.is_latest_points(first));
        assert!(requests.is_latest_points(second));
    }

    #[test]
    fn test_debounce_restarts() {
        let start = Instant::now();
        let mut requests = RequestScheduler::new();
        requests.schedule_point_refresh(start);
        requests.schedule_point_refresh(start + Duration::from_millis(60));
        assert!(!requests.point_refresh_due(start + Duration::from_millis(120)));
        assert!(requests.point_refresh_due(start + Duration::from_millis(160)));
        assert!(!requests.point_refresh_due(start + Duration::from_millis(200)));
    }

    #[test]
    fn test_file_poll_cancel() {
        let start = Instant::now();
        let mut requests = RequestScheduler::new();
        requests.schedule_file_poll(start);
        assert!(!requests.file_poll_due(start + Duration::from_millis(999)));
        requests.cancel_file_poll();
        assert!(!requests.file_poll_due(start + Duration::from_secs(5)));
    }
}
