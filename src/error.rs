//! Error types for segmentation edits and remote calls.

use thiserror::Error;

use crate::color_utils::GroupKind;

/// Errors raised when an edit would break the trace/envelope model.
///
/// These signal a caller bug (the UI asked for something impossible) and
/// abort the operation without touching any state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// A group id was negative.
    #[error("{kind} id must be a non-negative integer, got {id}")]
    InvalidId {
        /// Which kind of group the id was meant for
        kind: GroupKind,
        /// The rejected id
        id: i64,
    },

    /// A reserved trace (unassigned 0 or noise -1) was placed into a real envelope.
    #[error("cannot assign reserved trace {trace} to envelope {envelope}")]
    InvalidAssignment {
        /// The reserved trace id
        trace: i64,
        /// The non-zero envelope the caller asked for
        envelope: i64,
    },
}

/// Errors reported by the remote authority or the transport in front of it.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The request failed or timed out. Never fatal.
    #[error("request failed: {0}")]
    Transient(String),

    /// The server answered but has no file loaded.
    #[error("no file loaded")]
    NoFileLoaded,

    /// The payload could not be decoded.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RemoteError {
    /// Create a transient failure with a message.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_id_message_names_kind() {
        let err = SegmentError::InvalidId {
            kind: GroupKind::Envelope,
            id: -3,
        };
        assert_eq!(
            err.to_string(),
            "envelope id must be a non-negative integer, got -3"
        );
    }

    #[test]
    fn test_decode_error_converts() {
        let parse: Result<Vec<i64>, _> = serde_json::from_str("not json");
        let err: RemoteError = parse.unwrap_err().into();
        assert!(matches!(err, RemoteError::Decode(_)));
    }
}
