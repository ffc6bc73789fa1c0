//! Query cursor subsystem
//!
//! Explicit fetch state machine over the rows of one invocation, with
//! buffering and spill for join re-scans and cooperative cancellation.
//!
//! # Invariants
//!
//! - Re-scanning a buffered cursor returns the same rows without touching
//!   the mesh again
//! - A cancelled cursor consumes no more rows
//! - `close()` is idempotent and drops the cursor's own cache table

mod buffer;
mod query_cursor;
mod registry;
mod state;

pub use buffer::{RowBuffer, SpillTarget};
pub use query_cursor::{QueryCursor, Reexecute, Reopened};
pub use registry::{CursorHandle, CursorRegistry, TimeoutSweeper};
pub use state::{CursorState, FetchResult};
