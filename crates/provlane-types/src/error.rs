use thiserror::Error;

/// Non-fatal failures of the provenance pipeline.
///
/// Every variant is local to one event or one client: the offending record
/// is dropped or the offending client is disconnected, and ingestion
/// continues for everything else.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    /// Unparsable record or missing required fields
    #[error("Malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// Event addressed to a session that is not currently open
    #[error("Unknown session reference: {session_id}")]
    UnknownSessionReference { session_id: String },

    /// A dashboard client's outbound queue overflowed
    #[error("Client {client_id} overloaded: outbound queue of {capacity} frames is full")]
    ClientOverloaded { client_id: String, capacity: usize },

    /// A late subscriber's replay window exceeded the retained backlog
    #[error("Backlog truncated: {dropped} earlier events were evicted")]
    BacklogTruncated { dropped: u64 },
}

impl EventError {
    /// Create a new malformed event error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// Create a new unknown session error
    pub fn unknown_session(session_id: impl Into<String>) -> Self {
        Self::UnknownSessionReference {
            session_id: session_id.into(),
        }
    }
}

/// Result type for event model operations
pub type EventResult<T> = Result<T, EventError>;
