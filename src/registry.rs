//! Trace and envelope bookkeeping.
//!
//! Points are grouped into traces, traces into envelopes. The registry holds
//! the trace → envelope map and mints fresh ids. In a multi-user session
//! each client only mints ids in its own residue class so two annotators
//! never hand out the same id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::color_utils::GroupKind;
use crate::error::SegmentError;
use crate::points::Point;

pub type TraceId = i64;
pub type EnvelopeId = i64;

/// Trace and envelope id meaning "not in any group".
pub const UNASSIGNED: i64 = 0;

/// Trace id reserved for noise.
pub const NOISE_TRACE: TraceId = -1;

/// Which id partition this client mints from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiUser {
    /// Number of annotators sharing the file
    pub user_count: i64,
    /// This client's slot, `0..user_count`
    pub user_num: i64,
}

impl MultiUser {
    /// Returns `None` unless `0 <= user_num < user_count`.
    pub fn new(user_count: i64, user_num: i64) -> Option<Self> {
        (user_count > 0 && (0..user_count).contains(&user_num)).then_some(Self {
            user_count,
            user_num,
        })
    }

    /// Smallest id `>= id` that belongs to this client.
    fn align(&self, id: i64) -> i64 {
        id + (self.user_num - id).rem_euclid(self.user_count)
    }
}

/// Trace → envelope map plus the next-id counters.
#[derive(Debug, Clone)]
pub struct TraceRegistry {
    trace_map: HashMap<TraceId, EnvelopeId>,
    next_trace: TraceId,
    next_envelope: EnvelopeId,
    multi_user: Option<MultiUser>,
}

impl Default for TraceRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TraceRegistry {
    pub fn new(multi_user: Option<MultiUser>) -> Self {
        let mut registry = Self {
            trace_map: HashMap::new(),
            next_trace: 1,
            next_envelope: 1,
            multi_user,
        };
        registry.align_counters();
        registry
    }

    pub fn next_trace(&self) -> TraceId {
        self.next_trace
    }

    pub fn next_envelope(&self) -> EnvelopeId {
        self.next_envelope
    }

    pub fn next_id(&self, kind: GroupKind) -> i64 {
        match kind {
            GroupKind::Trace => self.next_trace,
            GroupKind::Envelope => self.next_envelope,
        }
    }

    pub fn multi_user(&self) -> Option<MultiUser> {
        self.multi_user
    }

    fn stride(&self) -> i64 {
        self.multi_user.map_or(1, |m| m.user_count)
    }

    /// Resolve a requested id, minting a fresh one for `None` or for the
    /// next id itself. Returns the id and whether it was minted.
    fn resolve(requested: Option<i64>, next: i64, kind: GroupKind) -> Result<(i64, bool), SegmentError> {
        match requested {
            None => Ok((next, true)),
            Some(id) if id < 0 => Err(SegmentError::InvalidId { kind, id }),
            Some(id) => Ok((id, id == next)),
        }
    }

    /// Put `points` into a trace and return its id.
    ///
    /// `None` mints a new trace. A trace not yet in the map is created in
    /// envelope 0.
    pub fn assign_trace<'a>(
        &mut self,
        trace: Option<TraceId>,
        points: impl IntoIterator<Item = &'a mut Point>,
    ) -> Result<TraceId, SegmentError> {
        let (id, minted) = Self::resolve(trace, self.next_trace, GroupKind::Trace)?;
        if minted {
            self.next_trace += self.stride();
            log::debug!("🆕 Minted trace #{id}");
        }
        if id != UNASSIGNED {
            self.trace_map.entry(id).or_insert(UNASSIGNED);
        }
        for p in points {
            p.trace = id;
        }
        Ok(id)
    }

    /// Put `traces` into an envelope and return its id.
    ///
    /// The reserved traces may only ever be "assigned" to envelope 0, which
    /// leaves them out of the map.
    pub fn assign_envelope(
        &mut self,
        envelope: Option<EnvelopeId>,
        traces: &[TraceId],
    ) -> Result<EnvelopeId, SegmentError> {
        let (id, minted) = Self::resolve(envelope, self.next_envelope, GroupKind::Envelope)?;
        for &trace in traces {
            if trace < NOISE_TRACE {
                return Err(SegmentError::InvalidId {
                    kind: GroupKind::Trace,
                    id: trace,
                });
            }
            if (trace == UNASSIGNED || trace == NOISE_TRACE) && id != UNASSIGNED {
                return Err(SegmentError::InvalidAssignment {
                    trace,
                    envelope: id,
                });
            }
        }

        if minted {
            self.next_envelope += self.stride();
            log::debug!("🆕 Minted envelope #{id}");
        }
        for &trace in traces.iter().filter(|&&t| t > UNASSIGNED) {
            self.trace_map.insert(trace, id);
        }
        Ok(id)
    }

    /// Move traces back to envelope 0.
    pub fn unenvelope(&mut self, traces: &[TraceId]) -> Result<(), SegmentError> {
        self.assign_envelope(Some(UNASSIGNED), traces).map(|_| ())
    }

    /// Envelope of `trace`, 0 when it has none.
    pub fn envelope_of(&self, trace: TraceId) -> EnvelopeId {
        self.trace_map.get(&trace).copied().unwrap_or(UNASSIGNED)
    }

    /// Number of traces in `envelope`.
    pub fn traces_in_envelope(&self, envelope: EnvelopeId) -> usize {
        self.trace_map.values().filter(|&&e| e == envelope).count()
    }

    /// Replace the map with the server's copy.
    ///
    /// Reserved trace ids in the snapshot are dropped. Counters are then
    /// moved forward into this client's id partition.
    pub fn reconcile(&mut self, trace_map: HashMap<TraceId, EnvelopeId>) {
        let before = trace_map.len();
        self.trace_map = trace_map;
        self.trace_map.retain(|&t, _| t > UNASSIGNED);
        if self.trace_map.len() != before {
            log::debug!("Dropped {} reserved entries from trace map", before - self.trace_map.len());
        }
        self.align_counters();
        log::debug!("Trace map reconciled: {} traces", self.trace_map.len());
    }

    /// Take the server's next-id counters, moved into this client's id
    /// partition.
    pub fn reconcile_ids(&mut self, next_trace: TraceId, next_envelope: EnvelopeId) {
        self.next_trace = next_trace;
        self.next_envelope = next_envelope;
        self.align_counters();
    }

    fn align_counters(&mut self) {
        if let Some(m) = self.multi_user {
            self.next_trace = m.align(self.next_trace);
            self.next_envelope = m.align(self.next_envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<Point> {
        vec![
            Point::new(1, 0, 100.0, 1.0, 10.0),
            Point::new(2, 0, 100.5, 1.5, 20.0),
        ]
    }

    #[test]
    fn test_assign_trace_mints_and_creates_mapping() {
        let mut registry = TraceRegistry::default();
        let mut pts = points();
        let id = registry.assign_trace(None, pts.iter_mut()).unwrap();
        assert_eq!(id, 1);
        assert_eq!(registry.next_trace(), 2);
        assert!(pts.iter().all(|p| p.trace == 1));
        assert_eq!(registry.envelope_of(1), UNASSIGNED);
        assert_eq!(registry.traces_in_envelope(UNASSIGNED), 1);
    }

    #[test]
    fn test_assign_trace_to_next_id_mints() {
        let mut registry = TraceRegistry::default();
        let id = registry.assign_trace(Some(1), std::iter::empty()).unwrap();
        assert_eq!(id, 1);
        assert_eq!(registry.next_trace(), 2);
        registry.assign_trace(Some(1), std::iter::empty()).unwrap();
        assert_eq!(registry.next_trace(), 2);
    }

    #[test]
    fn test_negative_trace_rejected() {
        let mut registry = TraceRegistry::default();
        let mut pts = points();
        let err = registry.assign_trace(Some(-1), pts.iter_mut()).unwrap_err();
        assert_eq!(
            err,
            SegmentError::InvalidId {
                kind: GroupKind::Trace,
                id: -1
            }
        );
        assert!(pts.iter().all(|p| p.trace == 0));
    }

    #[test]
    fn test_unassigned_trace_into_envelope_rejected() {
        let mut registry = TraceRegistry::default();
        let err = registry.assign_envelope(None, &[3, 0]).unwrap_err();
        assert_eq!(err, SegmentError::InvalidAssignment { trace: 0, envelope: 1 });
        assert_eq!(registry.next_envelope(), 1);
        assert_eq!(registry.envelope_of(3), UNASSIGNED);
    }

    #[test]
    fn test_assign_envelope_and_unenvelope() {
        let mut registry = TraceRegistry::default();
        let env = registry.assign_envelope(None, &[3, 4]).unwrap();
        assert_eq!(env, 1);
        assert_eq!(registry.envelope_of(4), 1);
        assert_eq!(registry.traces_in_envelope(1), 2);
        registry.unenvelope(&[4, 0]).unwrap();
        assert_eq!(registry.envelope_of(4), UNASSIGNED);
        assert_eq!(registry.envelope_of(0), UNASSIGNED);
    }

    #[test]
    fn test_negative_envelope_rejected() {
        let mut registry = TraceRegistry::default();
        assert!(matches!(
            registry.assign_envelope(Some(-2), &[1]),
            Err(SegmentError::InvalidId {
                kind: GroupKind::Envelope,
                id: -2
            })
        ));
    }

    #[test]
    fn test_reconcile_aligns_to_user_partition() {
        let multi = MultiUser::new(3, 1).unwrap();
        let mut registry = TraceRegistry::new(Some(multi));
        registry.reconcile_ids(5, 9);
        registry.reconcile(HashMap::from([(0, 0), (2, 1), (-1, 0)]));
        assert_eq!(registry.next_trace() % 3, 1);
        assert_eq!(registry.next_envelope() % 3, 1);
        assert_eq!(registry.next_trace(), 7);
        assert_eq!(registry.next_envelope(), 10);
        assert_eq!(registry.envelope_of(2), 1);
        assert_eq!(registry.traces_in_envelope(UNASSIGNED), 0);
    }

    #[test]
    fn test_multi_user_mints_with_stride() {
        let multi = MultiUser::new(3, 2).unwrap();
        let mut registry = TraceRegistry::new(Some(multi));
        let first = registry.assign_trace(None, std::iter::empty()).unwrap();
        let second = registry.assign_trace(None, std::iter::empty()).unwrap();
        assert_eq!(first, 2);
        assert_eq!(second, 5);
        assert_eq!(registry.next_trace() % 3, 2);
    }

    #[test]
    fn test_multi_user_rejects_bad_slot() {
        assert!(MultiUser::new(3, 3).is_none());
        assert!(MultiUser::new(0, 0).is_none());
        assert!(MultiUser::new(2, -1).is_none());
    }
}
