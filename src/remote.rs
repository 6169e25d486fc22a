//! Requests to and answers from the data server.
//!
//! The core never performs I/O. It emits [`OutgoingRequest`]s and is fed
//! back [`Response`]s (or [`RemoteError`]s) tagged with the same
//! [`RequestId`]. The glue that owns the HTTP client turns a raw answer into
//! a [`Response`] with [`Request::decode_response`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::change_queue::BatchId;
use crate::error::RemoteError;
use crate::points::Point;
use crate::registry::{EnvelopeId, TraceId};
use crate::view_range::{DataRange, ViewRange};

/// Correlates a request with its answer.
pub type RequestId = u64;

/// Something the core wants from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Is a file loaded, and what is its extent?
    FileStatus,
    /// Points inside a window, at most `max_count`, at least `min_intensity`
    Points {
        range: ViewRange,
        max_count: usize,
        min_intensity: f64,
    },
    /// The full trace → envelope map
    TraceMap,
    /// The server's next trace and envelope ids
    NextIds,
    /// A batch of edits as a JSON array
    SaveChanges { batch: BatchId, body: String },
    /// The most intense point not yet in any trace
    HighestUntraced,
    /// Summary of the listed envelopes
    EnvelopeInfo { envelopes: Vec<EnvelopeId> },
}

/// A request with its correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingRequest {
    pub id: RequestId,
    pub request: Request,
}

/// Next-id counters as sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextIds {
    pub next_trace: TraceId,
    pub next_envelope: EnvelopeId,
}

/// One envelope of a bookmark report.
///
/// On the wire: `[mz, rt, intensity, [[trace_mz, trace_intensity], ...]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeInfo(pub f64, pub f64, pub f64, pub Vec<(f64, f64)>);

impl EnvelopeInfo {
    pub fn mz(&self) -> f64 {
        self.0
    }

    pub fn rt(&self) -> f64 {
        self.1
    }

    pub fn intensity(&self) -> f64 {
        self.2
    }

    /// `(mz, intensity)` per trace, in server order.
    pub fn traces(&self) -> &[(f64, f64)] {
        &self.3
    }
}

/// Envelope id → info; `None` when the server knows no such envelope.
pub type EnvelopeReport = HashMap<EnvelopeId, Option<EnvelopeInfo>>;

/// A decoded answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A file is loaded and summarised
    FileStatus(DataRange),
    Points(Vec<Point>),
    TraceMap(HashMap<TraceId, EnvelopeId>),
    NextIds(NextIds),
    /// The batch was stored
    Saved,
    /// `None` once every point is traced or noise
    HighestUntraced(Option<Point>),
    EnvelopeInfo(EnvelopeReport),
}

impl Request {
    /// Decode the server's answer to this request.
    ///
    /// `body` is `None` when the server answered "no content", which every
    /// endpoint uses to signal that no file is loaded.
    pub fn decode_response(&self, body: Option<&str>) -> Result<Response, RemoteError> {
        let Some(body) = body else {
            return Err(RemoteError::NoFileLoaded);
        };
        Ok(match self {
            Request::FileStatus => Response::FileStatus(serde_json::from_str(body)?),
            Request::Points { .. } => Response::Points(serde_json::from_str(body)?),
            Request::TraceMap => Response::TraceMap(serde_json::from_str(body)?),
            Request::NextIds => Response::NextIds(serde_json::from_str(body)?),
            Request::SaveChanges { .. } => Response::Saved,
            Request::HighestUntraced => Response::HighestUntraced(serde_json::from_str(body)?),
            Request::EnvelopeInfo { .. } => Response::EnvelopeInfo(serde_json::from_str(body)?),
        })
    }

    /// Short label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::FileStatus => "file status",
            Request::Points { .. } => "points",
            Request::TraceMap => "trace map",
            Request::NextIds => "next ids",
            Request::SaveChanges { .. } => "save changes",
            Request::HighestUntraced => "highest untraced",
            Request::EnvelopeInfo { .. } => "envelope info",
        }
    }
}

/// The one-line connection status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommStatus {
    #[default]
    Idle,
    WaitingForFile,
    DataModelCompleted,
    NoFileLoaded,
    RequestingPoints,
    Ready,
    NoPointsReceived,
    Saving,
    NoDataToSave,
    SaveFailed,
    FindingNextPoint,
    NextPointFailed,
    CompilingReport,
    ReportFailed,
    /// Error text passed through from the server
    Server(String),
}

impl fmt::Display for CommStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommStatus::Idle => write!(f, ""),
            CommStatus::WaitingForFile => write!(f, "Waiting for file..."),
            CommStatus::DataModelCompleted => write!(f, "Data model completed"),
            CommStatus::NoFileLoaded => write!(f, "No file loaded"),
            CommStatus::RequestingPoints => write!(f, "Requesting points..."),
            CommStatus::Ready => write!(f, "Ready"),
            CommStatus::NoPointsReceived => write!(f, "No points received"),
            CommStatus::Saving => write!(f, "Saving segmentation..."),
            CommStatus::NoDataToSave => write!(f, "No data to save points to."),
            CommStatus::SaveFailed => write!(f, "Failed to save points."),
            CommStatus::FindingNextPoint => write!(f, "Finding next point..."),
            CommStatus::NextPointFailed => write!(f, "Could not get next point."),
            CommStatus::CompilingReport => write!(f, "Compiling bookmark report..."),
            CommStatus::ReportFailed => write!(f, "Bookmark report failed."),
            CommStatus::Server(message) => write!(f, "{message}"),
        }
    }
}
