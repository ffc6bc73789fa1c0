//! Cursor lifecycle states

use crate::schema::Row;

/// Lifecycle of a query cursor.
///
/// ```text
/// NotStarted -> Scanning -> ScanComplete -> Rescanning -> ScanComplete ...
///                    \             \              \
///                     +-------------+--------------+--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    NotStarted,
    /// First pass over the live result
    Scanning,
    ScanComplete,
    /// Replaying the buffer or a re-executed result
    Rescanning,
    Closed,
}

impl CursorState {
    /// Name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorState::NotStarted => "not_started",
            CursorState::Scanning => "scanning",
            CursorState::ScanComplete => "scan_complete",
            CursorState::Rescanning => "rescanning",
            CursorState::Closed => "closed",
        }
    }

    /// Whether rows may still be fetched
    pub fn is_active(&self) -> bool {
        matches!(self, CursorState::Scanning | CursorState::Rescanning)
    }
}

/// Outcome of one fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    GotRow(Row),
    ScanComplete,
}

impl FetchResult {
    /// The row, or None at the end of the scan
    pub fn into_row(self) -> Option<Row> {
        match self {
            FetchResult::GotRow(row) => Some(row),
            FetchResult::ScanComplete => None,
        }
    }
}
