//! Observable engine events
//!
//! Every log line emitted by the engine carries one of these names in its
//! `event` field so that logs can be filtered without parsing messages.

use std::fmt;

/// Observable events in the query engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Node constructed and caches cleared
    NodeStartup,
    /// Configuration loaded and validated
    ConfigLoaded,

    // Propagation
    /// New query accepted at this node
    QueryReceived,
    /// Query id minted at the originating node
    QueryOriginated,
    /// Query reached via a shorter path than before
    ShorterPathFound,
    /// Query already seen at an equal or shorter hop count
    LoopRejected,
    /// Maximum depth reached, peers pruned
    DepthLimitReached,
    /// Query forwarded to a peer
    QueryForwarded,
    /// Forwarding node or path denied by policy
    AccessDenied,
    /// Unrecognised table argument
    UnknownTableArgument,

    // Schema
    /// Local definition installed
    SchemaDefined,
    /// Propagated and local definitions disagree on a column type
    SchemaTypeMismatch,
    /// Node acts as gateway for a logical table
    GatewayRole,
    /// Local definition changed under a live cursor
    SchemaDrift,

    // Pushdown
    /// Node-level constants disqualify local execution
    NodeQualifiersFailed,
    /// Source or source instance removed by leaf constants
    SourcePruned,
    /// A source failed while opening or fetching
    SourceFailed,

    // Cache
    /// Cache table created
    CacheTableCreated,
    /// Rows served from a fresh cache table
    CacheHit,
    /// Cache table stale or empty
    CacheMiss,
    /// Stale rows deleted and expiry reset
    CacheReset,
    /// Cache table marked never-fresh
    CacheInvalidated,
    /// Sweep removed an expired table
    CacheSweep,
    /// Cache operation failed; caching disabled for the invocation
    CacheDisabled,

    // Cursor
    /// Cursor opened
    CursorOpened,
    /// Buffered rows spilled to a cache table
    CursorSpilled,
    /// Cursor scan restarted
    CursorRescan,
    /// Cursor cancelled by timeout or request
    CursorCancelled,
    /// Cursor closed
    CursorClosed,

    // Explain
    /// DOT graph written
    ExplainWritten,

    /// Resource exhaustion, node must shut down
    ResourceExhausted,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::NodeStartup => "NODE_STARTUP",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::QueryReceived => "QUERY_RECEIVED",
            Event::QueryOriginated => "QUERY_ORIGINATED",
            Event::ShorterPathFound => "SHORTER_PATH_FOUND",
            Event::LoopRejected => "LOOP_REJECTED",
            Event::DepthLimitReached => "DEPTH_LIMIT_REACHED",
            Event::QueryForwarded => "QUERY_FORWARDED",
            Event::AccessDenied => "ACCESS_DENIED",
            Event::UnknownTableArgument => "UNKNOWN_TABLE_ARGUMENT",

            Event::SchemaDefined => "SCHEMA_DEFINED",
            Event::SchemaTypeMismatch => "SCHEMA_TYPE_MISMATCH",
            Event::GatewayRole => "GATEWAY_ROLE",
            Event::SchemaDrift => "SCHEMA_DRIFT",

            Event::NodeQualifiersFailed => "NODE_QUALIFIERS_FAILED",
            Event::SourcePruned => "SOURCE_PRUNED",
            Event::SourceFailed => "SOURCE_FAILED",

            Event::CacheTableCreated => "CACHE_TABLE_CREATED",
            Event::CacheHit => "CACHE_HIT",
            Event::CacheMiss => "CACHE_MISS",
            Event::CacheReset => "CACHE_RESET",
            Event::CacheInvalidated => "CACHE_INVALIDATED",
            Event::CacheSweep => "CACHE_SWEEP",
            Event::CacheDisabled => "CACHE_DISABLED",

            Event::CursorOpened => "CURSOR_OPENED",
            Event::CursorSpilled => "CURSOR_SPILLED",
            Event::CursorRescan => "CURSOR_RESCAN",
            Event::CursorCancelled => "CURSOR_CANCELLED",
            Event::CursorClosed => "CURSOR_CLOSED",

            Event::ExplainWritten => "EXPLAIN_WRITTEN",

            Event::ResourceExhausted => "RESOURCE_EXHAUSTED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ResourceExhausted)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_upper_snake() {
        let events = [
            Event::NodeStartup,
            Event::QueryReceived,
            Event::LoopRejected,
            Event::ShorterPathFound,
            Event::SchemaTypeMismatch,
            Event::CacheSweep,
            Event::CursorSpilled,
            Event::ExplainWritten,
            Event::ResourceExhausted,
        ];
        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::ResourceExhausted.is_fatal());
        assert!(!Event::LoopRejected.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::LoopRejected), "LOOP_REJECTED");
    }
}
