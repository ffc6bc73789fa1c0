//! Per-invocation query context

use super::args::TableArguments;

/// Identity and routing state of one query invocation on one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// Empty until the tracker mints one at the origin
    pub query_id: String,
    pub hop_count: u32,
    /// Absent at the origin
    pub forwarding_node: Option<String>,
    pub visited_path: Vec<String>,
    pub arguments: TableArguments,
    /// Opaque, carried end to end
    pub credentials: Option<String>,
}

impl QueryContext {
    /// Context for a query issued locally
    pub fn origin(arguments: TableArguments) -> Self {
        Self {
            visited_path: arguments.query_path.clone(),
            arguments,
            ..Self::default()
        }
    }

    /// Context for a query received from `forwarding_node`
    pub fn forwarded(
        query_id: impl Into<String>,
        hop_count: u32,
        forwarding_node: impl Into<String>,
        arguments: TableArguments,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            hop_count,
            forwarding_node: Some(forwarding_node.into()),
            visited_path: arguments.query_path.clone(),
            arguments,
            credentials: None,
        }
    }

    /// Attach caller credentials
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Whether the query was issued at this node
    pub fn is_origin(&self) -> bool {
        self.forwarding_node.is_none()
    }

    /// Effective depth limit: argument override, else the node setting.
    /// Negative values mean unlimited.
    pub fn max_depth(&self, configured: Option<u32>) -> Option<u32> {
        match self.arguments.max_depth {
            Some(depth) => u32::try_from(depth).ok(),
            None => configured,
        }
    }
}
