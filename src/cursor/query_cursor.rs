//! Query cursor
//!
//! Streams the merged rows of one invocation. A cursor flagged as the inner
//! side of a join at the originating node buffers its first pass so that
//! later passes replay the buffer instead of flooding the mesh again.
//! Without a buffer, a re-scan re-executes the invocation.

use std::sync::Arc;
use tracing::{debug, info};

use super::buffer::RowBuffer;
use super::registry::CursorHandle;
use super::state::{CursorState, FetchResult};
use crate::engine::{EngineError, EngineResult};
use crate::observability::{Event, MetricsRegistry};
use crate::qualifier::{Qualifiers, RowFilter};
use crate::schema::{ColumnMapping, LogicalSchema, Row};
use crate::source::RowStream;

/// Result of re-running an invocation
pub struct Reopened {
    pub schema: Arc<LogicalSchema>,
    pub rows: RowStream,
}

/// Re-runs the invocation behind a cursor
pub trait Reexecute: Send {
    fn reexecute(&self) -> EngineResult<Reopened>;
}

/// Cursor over the merged result of one query at one node
pub struct QueryCursor {
    query_id: String,
    schema: Arc<LogicalSchema>,
    state: CursorState,
    rows: Option<RowStream>,
    replay: Option<std::vec::IntoIter<Row>>,
    filter: Qualifiers,
    /// Set when a re-execution exposed a different layout
    drift: Option<ColumnMapping>,
    position: u64,
    iteration_count: u32,
    buffer: Option<RowBuffer>,
    buffering_enabled: bool,
    reexecutor: Option<Box<dyn Reexecute>>,
    handle: Option<CursorHandle>,
    cancel_observed: bool,
    estimated_rows: u64,
    setup_cost: f64,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl QueryCursor {
    /// Cursor reading `rows` laid out as `schema`
    pub fn new(query_id: impl Into<String>, schema: Arc<LogicalSchema>, rows: RowStream) -> Self {
        Self {
            query_id: query_id.into(),
            schema,
            state: CursorState::NotStarted,
            rows: Some(rows),
            replay: None,
            filter: Qualifiers::none(),
            drift: None,
            position: 0,
            iteration_count: 0,
            buffer: None,
            buffering_enabled: false,
            reexecutor: None,
            handle: None,
            cancel_observed: false,
            estimated_rows: 0,
            setup_cost: 0.0,
            metrics: None,
        }
    }

    /// A cursor over no rows
    pub fn empty(query_id: impl Into<String>, schema: Arc<LogicalSchema>) -> Self {
        Self::new(query_id, schema, Box::new(std::iter::empty()))
    }

    /// Predicate applied to every row before it is returned
    pub fn with_filter(mut self, filter: Qualifiers) -> Self {
        self.filter = filter;
        self
    }

    /// Record the first pass into `buffer` for replay
    pub fn with_buffer(mut self, buffer: RowBuffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Report re-scan support without holding a buffer
    pub fn with_buffering_enabled(mut self, enabled: bool) -> Self {
        self.buffering_enabled = enabled;
        self
    }

    /// Source of a fresh result when there is no buffer to replay
    pub fn with_reexecutor(mut self, reexecutor: Box<dyn Reexecute>) -> Self {
        self.reexecutor = Some(reexecutor);
        self
    }

    /// Tie the cursor to a registry entry for cancellation and timeouts
    pub fn with_registration(mut self, handle: CursorHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Cost estimates reported through the scan protocol
    pub fn with_estimates(mut self, rows: u64, setup_cost: f64) -> Self {
        self.estimated_rows = rows;
        self.setup_cost = setup_cost;
        self
    }

    /// Count cancellations in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Id of the query this cursor serves
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Exposed layout; fixed for the cursor's life
    pub fn schema(&self) -> &Arc<LogicalSchema> {
        &self.schema
    }

    /// Current scan state
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Rows returned in the current pass
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Completed re-scans
    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    /// Whether rows are being kept for re-scans
    pub fn is_buffering(&self) -> bool {
        self.buffer.is_some()
    }

    /// Whether the buffer has spilled to a cache table
    pub fn is_spilled(&self) -> bool {
        self.buffer.as_ref().map_or(false, RowBuffer::is_spilled)
    }

    /// Whether the scan was cancelled or timed out
    pub fn is_cancelled(&self) -> bool {
        self.handle.as_ref().map_or(false, CursorHandle::is_cancelled)
    }

    /// Expected number of rows
    pub fn estimated_row_count(&self) -> u64 {
        self.estimated_rows
    }

    /// Expected cost of opening the scan
    pub fn estimated_setup_cost(&self) -> f64 {
        self.setup_cost
    }

    /// Whether a re-scan replays buffered rows instead of re-executing
    pub fn supports_rescan(&self) -> bool {
        self.buffering_enabled
    }

    /// Next row of the current pass.
    ///
    /// After a completed pass, a buffering cursor starts a replay; any other
    /// cursor keeps answering `ScanComplete`.
    pub fn fetch_next(&mut self) -> EngineResult<FetchResult> {
        match self.state {
            CursorState::Closed => return Err(EngineError::cursor_closed(&self.query_id)),
            _ if self.is_cancelled() => {
                self.observe_cancel();
                return Ok(FetchResult::ScanComplete);
            }
            CursorState::NotStarted => {
                self.state = CursorState::Scanning;
                debug!(
                    target: "cursor",
                    event = Event::CursorOpened.as_str(),
                    query_id = %self.query_id,
                    buffering = self.buffer.is_some(),
                    "cursor scan started"
                );
            }
            CursorState::ScanComplete => {
                if self.buffer.is_none() {
                    return Ok(FetchResult::ScanComplete);
                }
                self.rescan()?;
            }
            CursorState::Scanning | CursorState::Rescanning => {}
        }

        match self.next_row() {
            Some(row) => {
                self.position += 1;
                Ok(FetchResult::GotRow(row))
            }
            None => {
                self.complete_pass();
                Ok(FetchResult::ScanComplete)
            }
        }
    }

    /// Every remaining row of the current pass
    pub fn collect_rows(&mut self) -> EngineResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let FetchResult::GotRow(row) = self.fetch_next()? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn next_row(&mut self) -> Option<Row> {
        if let Some(replay) = self.replay.as_mut() {
            return replay.next();
        }
        let first_pass = self.state == CursorState::Scanning;
        loop {
            let raw = self.rows.as_mut()?.next()?;
            let row = match &self.drift {
                Some(mapping) => mapping.apply(&raw),
                None => raw,
            };
            if !RowFilter::matches(&row, &self.filter) {
                continue;
            }
            if first_pass {
                if let Some(buffer) = self.buffer.as_mut() {
                    buffer.push(row.clone());
                }
            }
            return Some(row);
        }
    }

    fn complete_pass(&mut self) {
        self.rows = None;
        self.replay = None;
        if self.state == CursorState::Scanning {
            if let Some(buffer) = self.buffer.as_mut() {
                buffer.finish();
            }
        }
        self.state = CursorState::ScanComplete;
        debug!(
            target: "cursor",
            query_id = %self.query_id,
            rows = self.position,
            iteration = self.iteration_count,
            "scan complete"
        );
    }

    fn observe_cancel(&mut self) {
        self.rows = None;
        self.replay = None;
        if !self.cancel_observed {
            self.cancel_observed = true;
            if let Some(metrics) = &self.metrics {
                metrics.increment_cursors_cancelled();
            }
            info!(
                target: "cursor",
                event = Event::CursorCancelled.as_str(),
                query_id = %self.query_id,
                position = self.position,
                "cursor cancelled"
            );
        }
        self.state = CursorState::ScanComplete;
    }

    /// Restart the result from its first row.
    ///
    /// A buffering cursor drains whatever is left of its first pass into the
    /// buffer, then replays it. When the buffer can no longer be trusted the
    /// cursor stops buffering and re-executes instead.
    pub fn rescan(&mut self) -> EngineResult<()> {
        match self.state {
            CursorState::Closed => return Err(EngineError::cursor_closed(&self.query_id)),
            CursorState::NotStarted => return Ok(()),
            _ => {}
        }

        if self.state == CursorState::Scanning && self.buffer.is_some() {
            while self.next_row().is_some() {}
            self.complete_pass();
        }

        self.iteration_count += 1;
        self.position = 0;
        self.rows = None;
        self.replay = None;

        if let Some(buffer) = self.buffer.as_mut() {
            match buffer.replay() {
                Some(rows) => {
                    info!(
                        target: "cursor",
                        event = Event::CursorRescan.as_str(),
                        query_id = %self.query_id,
                        rows = rows.len(),
                        spilled = buffer.is_spilled(),
                        "replaying buffered rows"
                    );
                    self.replay = Some(rows.into_iter());
                    self.state = CursorState::Rescanning;
                    return Ok(());
                }
                None => {
                    info!(
                        target: "cursor",
                        event = Event::CursorRescan.as_str(),
                        query_id = %self.query_id,
                        "buffer unavailable, re-executing"
                    );
                    buffer.release();
                    self.buffer = None;
                }
            }
        }

        let reexecutor = self
            .reexecutor
            .as_ref()
            .ok_or_else(|| EngineError::rescan_unsupported(&self.query_id))?;
        let reopened = reexecutor.reexecute()?;
        self.drift = if reopened.schema.column_names() == self.schema.column_names() {
            None
        } else {
            info!(
                target: "cursor",
                event = Event::SchemaDrift.as_str(),
                query_id = %self.query_id,
                "exposed layout changed, mapping rows to the original layout"
            );
            Some(ColumnMapping::derive(&self.schema, &reopened.schema))
        };
        self.rows = Some(reopened.rows);
        self.state = CursorState::Rescanning;
        info!(
            target: "cursor",
            event = Event::CursorRescan.as_str(),
            query_id = %self.query_id,
            iteration = self.iteration_count,
            "invocation re-executed"
        );
        Ok(())
    }

    /// Release rows, the spill table and the registration. Idempotent.
    pub fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        self.rows = None;
        self.replay = None;
        if let Some(mut buffer) = self.buffer.take() {
            buffer.release();
        }
        self.handle = None;
        self.state = CursorState::Closed;
        debug!(
            target: "cursor",
            event = Event::CursorClosed.as_str(),
            query_id = %self.query_id,
            iterations = self.iteration_count,
            "cursor closed"
        );
    }
}

impl Drop for QueryCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for QueryCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCursor")
            .field("query_id", &self.query_id)
            .field("state", &self.state)
            .field("position", &self.position)
            .field("iteration_count", &self.iteration_count)
            .field("buffering", &self.buffer.is_some())
            .finish()
    }
}
