//! Typed error categories at the two seams the spec calls out by name (§4.1, §4.2).
//! Everywhere else in this crate uses `anyhow::Result`, matching the teacher's
//! anyhow-first style; these two enums exist only because calling code needs to
//! `match` on category rather than inspect a message string.

use std::fmt;

/// Error categories surfaced by the graph store client (C1).
#[derive(Debug)]
pub enum GraphError {
    /// Deadlock, lease lost, connection reset mid-transaction.
    Transient(String),
    /// Unique-constraint violation.
    Integrity(String),
    /// A `MATCH`-only query found no matching node.
    NotFound(String),
    Other(anyhow::Error),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Transient(msg) => write!(f, "transient graph error: {msg}"),
            GraphError::Integrity(msg) => write!(f, "integrity violation: {msg}"),
            GraphError::NotFound(msg) => write!(f, "not found: {msg}"),
            GraphError::Other(e) => write!(f, "graph error: {e}"),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<anyhow::Error> for GraphError {
    fn from(e: anyhow::Error) -> Self {
        GraphError::Other(e)
    }
}

impl GraphError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GraphError::Transient(_))
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, GraphError::Integrity(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound(_))
    }

    /// Classifies a raw Bolt failure message into one of the three categories. Neo4j's
    /// driver does not expose typed error codes through `neo4rs`, so this is the one
    /// place in C1 that has to pattern-match on text, exactly as the original source's
    /// `neo4j_manager.py` does against the `Neo.ClientError.*` / `Neo.TransientError.*`
    /// status-code prefixes.
    pub fn classify(raw: impl std::fmt::Display) -> GraphError {
        let msg = raw.to_string();
        if msg.contains("ConstraintValidationFailed") || msg.contains("already exists") {
            GraphError::Integrity(msg)
        } else if msg.contains("TransientError")
            || msg.contains("DeadlockDetected")
            || msg.contains("LeaderChange")
            || msg.contains("connection")
        {
            GraphError::Transient(msg)
        } else if msg.contains("no matching") || msg.contains("not found") {
            GraphError::NotFound(msg)
        } else {
            GraphError::Other(anyhow::anyhow!(msg))
        }
    }
}

/// Error categories surfaced by the stream client (C2).
#[derive(Debug)]
pub enum StreamError {
    Connection(String),
    /// `ensureConsumerGroup` must tolerate this without surfacing an error (BUSYGROUP).
    GroupExists,
    Other(anyhow::Error),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Connection(msg) => write!(f, "stream connection error: {msg}"),
            StreamError::GroupExists => write!(f, "consumer group already exists"),
            StreamError::Other(e) => write!(f, "stream error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<anyhow::Error> for StreamError {
    fn from(e: anyhow::Error) -> Self {
        StreamError::Other(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_integrity_before_transient() {
        let e = GraphError::classify("Neo.ClientError.Schema.ConstraintValidationFailed");
        assert!(e.is_integrity());
    }

    #[test]
    fn classifies_transient_deadlocks() {
        let e = GraphError::classify("Neo.TransientError.Transaction.DeadlockDetected");
        assert!(e.is_transient());
    }

    #[test]
    fn classifies_not_found() {
        let e = GraphError::classify("no matching node for key");
        assert!(e.is_not_found());
    }
}
