//! Per-node query engine
//!
//! Execution flow for one invocation (strict order):
//! 1. Check the access policy (forwarded queries only)
//! 2. Reconcile the exposed schema; a conflict makes this node a gateway
//! 3. Resolve the visit with the propagation tracker
//! 4. Node-level test, leaf-level test and pushdown, local scans
//! 5. Forward to eligible peers and merge their rows
//! 6. Wrap the merged rows in a cursor
//!
//! The whole tree below this node is opened synchronously on the caller's
//! thread; rows are then pulled through the cursor.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::errors::{EngineError, EngineErrorCode, EngineResult};
use super::explain::{write_dot, ExplainRow, ORIGIN_LABEL};
use super::policy::{AccessPolicy, AllowAll};
use super::request::{PreparedQuery, QueryRequest};
use super::transport::{ForwardedQuery, PeerResult, PeerTransport};
use crate::cache::{open_cache, Clock, DurableCache, SweepReport, SystemClock};
use crate::config::{NodeConfig, SourceConfig};
use crate::cursor::{
    CursorHandle, CursorRegistry, FetchResult, QueryCursor, Reexecute, Reopened, RowBuffer, SpillTarget,
    TimeoutSweeper,
};
use crate::observability::{Event, MetricsRegistry};
use crate::propagation::{PropagationDecision, PropagationTracker, QueryContext, TableArguments};
use crate::qualifier::{factor_out_columns, map_columns, Qualifiers, RowFilter, UNMAPPED_COLUMN};
use crate::schema::{
    parse_definition, ColumnMapping, LogicalSchema, NodeRole, Row, SchemaOptions,
    SchemaReconciler, GDBX_COUNT, GDBX_DEPTH, GDBX_FROM_NODE, GDBX_PRECEDENCE, GDBX_TO_NODE,
};
use crate::source::{
    select_peers, CachingSource, LocalScan, MemoryTable, RowSource, RowStream, SourceDescriptor,
    SourceInstance, SourceSelector,
};

const LOCAL_SOURCE_COST: f64 = 1.0;
const PEER_COST: f64 = 10.0;

/// One invocation as seen by this node
struct Invocation {
    table: String,
    ctx: QueryContext,
    /// Sender's data definition; absent at the origin
    propagated: Option<String>,
    /// Layout the qualifier and projection ids index; this node's own
    /// exposed layout when absent
    columns: Option<Vec<String>>,
    qualifiers: Qualifiers,
    projection: Option<Vec<usize>>,
}

impl Invocation {
    fn origin(request: &QueryRequest, columns: Option<Vec<String>>) -> Self {
        let arguments = TableArguments::parse(&request.arguments);
        let mut ctx = QueryContext::origin(arguments);
        ctx.credentials = request.credentials.clone();
        Self {
            table: request.table.clone(),
            ctx,
            propagated: None,
            columns,
            qualifiers: request.qualifiers.clone(),
            projection: request.projection.clone(),
        }
    }
}

/// Merged rows of an invocation, before a cursor is put around them
struct Opened {
    query_id: String,
    schema: Arc<LogicalSchema>,
    rows: RowStream,
    filter: Qualifiers,
    estimated_rows: u64,
    setup_cost: f64,
}

/// A mesh node: logical tables, local sources and links to peers
pub struct Node {
    node_id: String,
    config: NodeConfig,
    reconciler: SchemaReconciler,
    tracker: PropagationTracker,
    cache: Arc<DurableCache>,
    cursors: Arc<CursorRegistry>,
    metrics: Arc<MetricsRegistry>,
    clock: Arc<dyn Clock>,
    sources: RwLock<HashMap<String, Vec<Arc<dyn RowSource>>>>,
    transport: RwLock<Option<Arc<dyn PeerTransport>>>,
    policy: RwLock<Arc<dyn AccessPolicy>>,
}

impl Node {
    /// Build a node on the system clock
    pub fn new(config: NodeConfig) -> EngineResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a node from its configuration; every cache table left over
    /// from an earlier run is dropped
    pub fn with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> EngineResult<Self> {
        config.validate()?;

        let reconciler = SchemaReconciler::new();
        for (table, definition) in &config.logical_tables {
            reconciler.define(table, definition)?;
        }
        let cache = Arc::new(open_cache(&config.cache, Arc::clone(&clock))?);

        let node = Self {
            node_id: config.node_id.clone(),
            tracker: PropagationTracker::new(config.node_id.clone(), &config.propagation),
            reconciler,
            cache,
            cursors: Arc::new(CursorRegistry::new()),
            metrics: Arc::new(MetricsRegistry::new()),
            clock,
            sources: RwLock::new(HashMap::new()),
            transport: RwLock::new(None),
            policy: RwLock::new(Arc::new(AllowAll)),
            config,
        };

        for source in &node.config.sources {
            let built = node.build_source(source)?;
            node.add_source(&source.table, built);
        }

        info!(
            target: "engine",
            event = Event::NodeStartup.as_str(),
            node = %node.node_id,
            tables = node.config.logical_tables.len(),
            sources = node.config.sources.len(),
            peers = node.config.peers.len(),
            "node started"
        );
        Ok(node)
    }

    fn build_source(&self, source: &SourceConfig) -> EngineResult<Arc<dyn RowSource>> {
        let schema = parse_definition(&source.id, &source.definition)?;
        let table = if source.instances.is_empty() {
            MemoryTable::new(SourceDescriptor::leaf(&source.id), schema, source.rows.clone())
        } else {
            let instances = source
                .instances
                .iter()
                .map(|i| {
                    let instance = i
                        .constants
                        .iter()
                        .fold(SourceInstance::new(&i.id), |inst, (column, value)| {
                            inst.with_constant(column, value.clone())
                        });
                    (instance, i.rows.clone())
                })
                .collect();
            MemoryTable::pluralized(&source.id, schema, instances)
        };

        let table: Arc<dyn RowSource> = Arc::new(table.with_renames(&source.column_mapping));
        if source.cached && self.config.cache.enabled {
            return Ok(Arc::new(CachingSource::new(
                table,
                Arc::clone(&self.cache),
                Arc::clone(&self.metrics),
                self.config.cache.expiry_ms(),
                source.cache_extension.as_deref(),
            )));
        }
        Ok(table)
    }

    /// Id of this node
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Configuration the node was built from
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Counters for this node
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Durable cache shared by caching adapters and spilled buffers
    pub fn cache(&self) -> &Arc<DurableCache> {
        &self.cache
    }

    /// Live cursors of this node
    pub fn cursors(&self) -> &Arc<CursorRegistry> {
        &self.cursors
    }

    /// Per-query propagation state
    pub fn tracker(&self) -> &PropagationTracker {
        &self.tracker
    }

    /// Route forwarded queries through `transport`
    pub fn set_transport(&self, transport: Arc<dyn PeerTransport>) {
        *self.transport.write() = Some(transport);
    }

    /// Replace the access policy for forwarded queries
    pub fn set_policy(&self, policy: Arc<dyn AccessPolicy>) {
        *self.policy.write() = policy;
    }

    /// Attach another local source to a logical table
    pub fn add_source(&self, table: &str, source: Arc<dyn RowSource>) {
        self.sources
            .write()
            .entry(table.to_uppercase())
            .or_default()
            .push(source);
    }

    /// Define or redefine a logical table; returns the new definition version
    pub fn define_table(&self, table: &str, definition: &str) -> EngineResult<u64> {
        Ok(self.reconciler.define(table, definition)?)
    }

    /// Layout a local query with these arguments would expose
    pub fn exposed_schema(&self, table: &str, arguments: &str) -> EngineResult<Arc<LogicalSchema>> {
        let args = TableArguments::parse(arguments);
        let options = SchemaOptions::new(args.with_provenance, args.explain);
        Ok(self.reconciler.resolve(table, None, options)?.schema)
    }

    /// Query to be configured through the scan protocol before it is opened
    pub fn prepare(self: &Arc<Self>, request: QueryRequest) -> PreparedQuery {
        PreparedQuery::new(Arc::clone(self), request)
    }

    /// Issue a query at this node and open a cursor over the merged result
    pub fn execute(self: &Arc<Self>, request: QueryRequest) -> EngineResult<QueryCursor> {
        self.ensure_cursor_capacity()?;
        let arguments = TableArguments::parse(&request.arguments);
        let opened = self.open(Invocation::origin(&request, None))?;
        let Opened {
            query_id,
            schema,
            mut rows,
            filter,
            estimated_rows,
            setup_cost,
        } = opened;

        if let Some(path) = &arguments.explain_file {
            let materialized: Vec<Row> = rows.filter(|r| RowFilter::matches(r, &filter)).collect();
            write_dot(path, &materialized, &schema)?;
            rows = Box::new(materialized.into_iter());
        }

        let cursor_config = &self.config.cursor;
        let mut cursor = QueryCursor::new(&query_id, Arc::clone(&schema), rows)
            .with_filter(filter)
            .with_buffering_enabled(cursor_config.buffering_enabled)
            .with_registration(self.register_cursor(&query_id))
            .with_estimates(estimated_rows, setup_cost)
            .with_metrics(Arc::clone(&self.metrics))
            .with_reexecutor(Box::new(NodeReexecutor {
                node: Arc::clone(self),
                request: request.clone(),
                columns: schema.column_names(),
            }));

        if request.join_inner && cursor_config.buffering_enabled {
            let target = SpillTarget {
                cache: Arc::clone(&self.cache),
                threshold: cursor_config.spill_threshold_rows,
                expiry_ms: cursor_config.spill_expiry_ms(),
            };
            let buffer = RowBuffer::new(&query_id, schema.exposed_count(), Some(target))
                .with_metrics(Arc::clone(&self.metrics));
            cursor = cursor.with_buffer(buffer);
        }
        Ok(cursor)
    }

    /// Handle a query forwarded by a peer
    pub fn receive(self: &Arc<Self>, query: ForwardedQuery) -> EngineResult<PeerResult> {
        self.ensure_cursor_capacity()?;
        let arguments = TableArguments::parse(&query.arguments);
        let mut ctx = QueryContext::forwarded(
            &query.query_id,
            query.hop_count,
            &query.forwarding_node,
            arguments,
        );
        ctx.credentials = query.credentials.clone();

        let projection = query.projection.as_ref().map(|names| {
            names
                .iter()
                .filter_map(|n| {
                    query
                        .column_names
                        .iter()
                        .position(|c| c.eq_ignore_ascii_case(n))
                })
                .collect()
        });

        let opened = self.open(Invocation {
            table: query.table,
            ctx,
            propagated: Some(query.definition),
            columns: Some(query.column_names),
            qualifiers: query.qualifiers,
            projection,
        })?;

        let column_names = opened.schema.column_names();
        let cursor = QueryCursor::new(&opened.query_id, opened.schema, opened.rows)
            .with_filter(opened.filter)
            .with_registration(self.register_cursor(&opened.query_id))
            .with_estimates(opened.estimated_rows, opened.setup_cost)
            .with_metrics(Arc::clone(&self.metrics));

        Ok(PeerResult {
            column_names,
            rows: Box::new(CursorRows {
                cursor,
                done: false,
            }),
        })
    }

    /// Cancel this node's live cursors for a query
    pub fn cancel_query(&self, query_id: &str) -> usize {
        self.cursors.cancel_query(query_id)
    }

    /// Empty expired cache tables nobody is using
    pub fn sweep_cache(&self) -> EngineResult<SweepReport> {
        Ok(self.cache.sweep()?)
    }

    /// Cancel timed-out cursors every `interval` on a background thread
    pub fn spawn_timeout_sweeper(&self, interval: Duration) -> TimeoutSweeper {
        self.cursors
            .spawn_timeout_sweeper(Arc::clone(&self.clock), interval)
    }

    /// Refuse a new query while the live cursor limit is reached
    fn ensure_cursor_capacity(&self) -> EngineResult<()> {
        let Some(limit) = self.config.cursor.max_live_cursors else {
            return Ok(());
        };
        let live = self.cursors.live_count();
        if live < limit {
            return Ok(());
        }
        error!(
            target: "engine",
            event = Event::ResourceExhausted.as_str(),
            node = %self.node_id,
            live,
            limit,
            "live cursor limit reached"
        );
        Err(EngineError::resource_exhausted(format!(
            "node {} has {} live cursors (limit {})",
            self.node_id, live, limit
        )))
    }

    fn register_cursor(&self, query_id: &str) -> CursorHandle {
        self.cursors.register(query_id, self.deadline())
    }

    fn deadline(&self) -> Option<i64> {
        self.config
            .cursor
            .query_timeout_ms
            .map(|t| self.clock.now_ms().saturating_add(i64::try_from(t).unwrap_or(i64::MAX)))
    }

    fn sources_for(&self, table: &str) -> Vec<Arc<dyn RowSource>> {
        self.sources
            .read()
            .get(&table.to_uppercase())
            .cloned()
            .unwrap_or_default()
    }

    fn open(&self, mut inv: Invocation) -> EngineResult<Opened> {
        self.metrics.increment_queries_received();
        let args = inv.ctx.arguments.clone();

        // Step 1: access policy
        if let Some(from) = &inv.ctx.forwarding_node {
            info!(
                target: "engine",
                event = Event::QueryReceived.as_str(),
                node = %self.node_id,
                query_id = %inv.ctx.query_id,
                from = %from,
                hop = inv.ctx.hop_count,
                table = %inv.table,
                "query received"
            );
            let policy = Arc::clone(&*self.policy.read());
            if !policy.allow_forwarding_node(from) || !policy.allow_query_path(&inv.ctx.visited_path) {
                warn!(
                    target: "engine",
                    event = Event::AccessDenied.as_str(),
                    node = %self.node_id,
                    from = %from,
                    "query refused by access policy"
                );
                return Err(EngineError::access_restricted(format!(
                    "node {} refuses queries forwarded by {} along path [{}]",
                    self.node_id,
                    from,
                    inv.ctx.visited_path.join(" ")
                )));
            }
        }

        // Step 2: schema
        let options = SchemaOptions::new(args.with_provenance, args.explain);
        let reconciled = self
            .reconciler
            .resolve(&inv.table, inv.propagated.as_deref(), options)?;
        let schema = reconciled.schema;
        let (qualifiers, projection) = match &inv.columns {
            Some(sender) => {
                let mapping = ColumnMapping::by_name(sender, &schema.column_names());
                let projection = inv
                    .projection
                    .as_ref()
                    .map(|p| p.iter().filter_map(|c| mapping.get(*c)).collect::<Vec<_>>());
                (map_columns(&inv.qualifiers, &mapping), projection)
            }
            None => {
                check_request_columns(&inv.qualifiers, inv.projection.as_deref(), &schema)?;
                (inv.qualifiers.clone(), inv.projection.clone())
            }
        };
        let unmapped = qualifiers.iter().filter(|q| q.column == UNMAPPED_COLUMN).count();
        if unmapped > 0 {
            debug!(
                target: "engine",
                node = %self.node_id,
                table = %inv.table,
                unmapped,
                "qualifiers on columns unknown here are tested as NULL"
            );
        }

        // Step 3: propagation decision
        let max_depth = inv.ctx.max_depth(self.config.max_depth());
        let decision = self.tracker.resolve(&mut inv.ctx, max_depth);
        let query_id = decision.query_id.clone();

        if decision.is_rejected() {
            self.metrics.increment_loops_rejected();
            let rows: Vec<Row> = if args.explain {
                vec![self.explain_row(&inv.ctx, &decision, 0).to_row(&schema)]
            } else {
                Vec::new()
            };
            return Ok(Opened {
                query_id,
                schema,
                rows: Box::new(rows.into_iter()),
                filter: Qualifiers::none(),
                estimated_rows: 0,
                setup_cost: 0.0,
            });
        }

        // Row counts are not known until every node has run
        let (forwarded_qualifiers, filter) = if args.explain {
            let count: Vec<usize> = schema.column_index(GDBX_COUNT).into_iter().collect();
            let (without_count, _) = factor_out_columns(&qualifiers, &count);
            (without_count, explain_filter(&qualifiers, &schema))
        } else {
            (qualifiers.clone(), qualifiers)
        };

        let mut streams: Vec<RowStream> = Vec::new();
        let mut estimated_rows = 0u64;
        let mut setup_cost = 0.0;
        let mut local_count = 0u64;

        // Step 4: local sources
        if decision.execute_local && reconciled.role == NodeRole::Participant {
            for scan in self.local_scans(&inv, &decision, &schema, &forwarded_qualifiers, projection.as_deref()) {
                estimated_rows += scan.estimated_rows();
                setup_cost += LOCAL_SOURCE_COST;
                let opened = scan.source.open(&scan.request);
                match opened {
                    Ok(rows) if args.explain => local_count += rows.count() as u64,
                    Ok(rows) => {
                        let schema = Arc::clone(&schema);
                        let node_id = self.node_id.clone();
                        streams.push(Box::new(
                            rows.map(move |r| scan.to_logical(&r, &schema, &node_id)),
                        ));
                    }
                    Err(e) => warn!(
                        target: "engine",
                        event = Event::SourceFailed.as_str(),
                        node = %self.node_id,
                        leaf = %scan.leaf,
                        error = %e,
                        "local source failed, skipped"
                    ),
                }
            }
        }

        // Step 5: peers
        if decision.propagate {
            let transport = self.transport.read().clone();
            if let Some(transport) = transport {
                let peers = select_peers(
                    &self.tracker,
                    &query_id,
                    &self.config.peers,
                    inv.ctx.forwarding_node.as_deref(),
                );
                let forwarded_arguments = args.to_forwarded(&self.node_id);
                let projection_names: Option<Vec<String>> = projection.as_ref().map(|p| {
                    p.iter()
                        .filter_map(|c| schema.column(*c).map(|d| d.name.clone()))
                        .collect()
                });

                for peer in peers {
                    let query = ForwardedQuery {
                        table: inv.table.clone(),
                        query_id: query_id.clone(),
                        hop_count: decision.hop_count + 1,
                        forwarding_node: self.node_id.clone(),
                        definition: schema.definition(),
                        column_names: schema.column_names(),
                        qualifiers: forwarded_qualifiers.clone(),
                        projection: projection_names.clone(),
                        arguments: forwarded_arguments.clone(),
                        credentials: inv.ctx.credentials.clone(),
                    };
                    match transport.forward(&peer.id, query) {
                        Ok(result) => {
                            self.metrics.increment_queries_forwarded();
                            setup_cost += PEER_COST;
                            debug!(
                                target: "engine",
                                event = Event::QueryForwarded.as_str(),
                                node = %self.node_id,
                                peer = %peer.id,
                                query_id = %query_id,
                                "query forwarded"
                            );
                            let mapping = ColumnMapping::by_name(&schema.column_names(), &result.column_names);
                            streams.push(Box::new(result.rows.map(move |r| mapping.apply(&r))));
                        }
                        Err(e) if e.code() == EngineErrorCode::AccessRestricted => return Err(e),
                        Err(e) => warn!(
                            target: "engine",
                            event = Event::SourceFailed.as_str(),
                            node = %self.node_id,
                            peer = %peer.id,
                            error = %e,
                            "peer failed, skipped"
                        ),
                    }
                }
            }
        }

        // Own explain row goes after everything collected downstream
        if args.explain {
            let own = self.explain_row(&inv.ctx, &decision, local_count).to_row(&schema);
            streams.push(Box::new(std::iter::once(own)));
        }

        Ok(Opened {
            query_id,
            schema,
            rows: Box::new(streams.into_iter().flatten()),
            filter,
            estimated_rows,
            setup_cost,
        })
    }

    fn local_scans(
        &self,
        inv: &Invocation,
        decision: &PropagationDecision,
        schema: &LogicalSchema,
        qualifiers: &Qualifiers,
        projection: Option<&[usize]>,
    ) -> Vec<LocalScan> {
        let explain = inv.ctx.arguments.explain;
        let selector = SourceSelector::new(&self.node_id, schema);

        let constants: Vec<(&str, Value)> = if explain {
            let row = self.explain_row(&inv.ctx, decision, 0);
            vec![
                (GDBX_FROM_NODE, Value::from(row.from)),
                (GDBX_TO_NODE, Value::from(row.to)),
                (GDBX_DEPTH, Value::from(row.depth)),
                (GDBX_PRECEDENCE, Value::from(row.precedence.as_char().to_string())),
            ]
        } else {
            Vec::new()
        };
        let Some(residual) = selector.test_node(qualifiers, &constants).remaining() else {
            return Vec::new();
        };

        let mut arguments = inv.ctx.arguments.clone();
        if explain {
            arguments.order_by.clear();
        }
        let selection = selector.select_local(&self.sources_for(&inv.table), &residual, projection, &arguments);
        self.metrics.add_sources_pruned(selection.pruned.len() as u64);
        self.metrics.increment_local_executions();
        selection.scans
    }

    fn explain_row(&self, ctx: &QueryContext, decision: &PropagationDecision, count: u64) -> ExplainRow {
        ExplainRow {
            from: ctx
                .forwarding_node
                .clone()
                .unwrap_or_else(|| ORIGIN_LABEL.to_string()),
            to: self.node_id.clone(),
            depth: decision.hop_count,
            precedence: decision.precedence,
            count,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("peers", &self.config.peers)
            .finish()
    }
}

/// Column ids of a locally issued request must index the exposed layout
fn check_request_columns(
    qualifiers: &Qualifiers,
    projection: Option<&[usize]>,
    schema: &LogicalSchema,
) -> EngineResult<()> {
    let width = schema.exposed_count();
    if let Some(q) = qualifiers.iter().find(|q| q.column >= width) {
        return Err(EngineError::invalid_predicate(format!(
            "qualifier on column {} but {} exposes {} columns",
            q.column,
            schema.table(),
            width
        )));
    }
    if let Some(c) = projection.and_then(|p| p.iter().find(|c| **c >= width)) {
        return Err(EngineError::invalid_predicate(format!(
            "projected column {} but {} exposes {} columns",
            c,
            schema.table(),
            width
        )));
    }
    Ok(())
}

/// Groups made only of explain-column leaves
fn explain_filter(qualifiers: &Qualifiers, schema: &LogicalSchema) -> Qualifiers {
    let Some(offset) = schema.explain_offset() else {
        return Qualifiers::none();
    };
    let range = offset..schema.exposed_count();
    Qualifiers::new(
        qualifiers
            .groups()
            .iter()
            .filter(|g| g.iter().all(|q| range.contains(&q.column)))
            .cloned()
            .collect(),
    )
}

/// Re-runs an origin query with a fresh query id
struct NodeReexecutor {
    node: Arc<Node>,
    request: QueryRequest,
    /// Layout the request's column ids were written against
    columns: Vec<String>,
}

impl Reexecute for NodeReexecutor {
    fn reexecute(&self) -> EngineResult<Reopened> {
        let opened = self
            .node
            .open(Invocation::origin(&self.request, Some(self.columns.clone())))?;
        Ok(Reopened {
            schema: opened.schema,
            rows: opened.rows,
        })
    }
}

/// Rows of a peer-side cursor; the cursor closes at the end of its scan
struct CursorRows {
    cursor: QueryCursor,
    done: bool,
}

impl Iterator for CursorRows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.done {
            return None;
        }
        match self.cursor.fetch_next() {
            Ok(FetchResult::GotRow(row)) => Some(row),
            Ok(FetchResult::ScanComplete) | Err(_) => {
                self.done = true;
                self.cursor.close();
                None
            }
        }
    }
}
