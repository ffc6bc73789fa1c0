//! Table arguments carried with a query
//!
//! Arguments are a comma separated list of `key=value` pairs and bare
//! tokens. Recognised entries:
//!
//! | Argument               | Meaning                                        |
//! |------------------------|------------------------------------------------|
//! | `maxDepth=<int>`       | overrides the node's max propagation           |
//! | `with_provenance`      | expose GDB_NODE / GDB_LEAF                     |
//! | `explain[ in <file>]`  | explain mode, DOT graph written at the origin  |
//! | `queryPath=<ids>`      | space separated node ids already traversed     |
//! | `maxSourceRows=<int>`  | cap on rows read from each local source        |
//! | `<KEY>_VTIARG=<value>` | passed verbatim to leaf adapters               |
//! | `order by <cols>`      | pushed to sources; must be the last entry      |
//!
//! Keys are case-insensitive. Anything else is logged and ignored. Commas
//! inside single or double quotes do not separate entries, so a quoted
//! explain file may contain them.

use std::path::PathBuf;
use tracing::warn;

use crate::observability::Event;

const ARG_MAX_DEPTH: &str = "maxdepth";
const ARG_WITH_PROVENANCE: &str = "with_provenance";
const ARG_EXPLAIN: &str = "explain";
const ARG_QUERY_PATH: &str = "querypath";
const ARG_MAX_SOURCE_ROWS: &str = "maxsourcerows";
const ARG_ORDER_BY: &str = "order by";
const CUSTOM_SUFFIX: &str = "_vtiarg";

/// Parsed table arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableArguments {
    pub max_depth: Option<i32>,
    pub with_provenance: bool,
    pub explain: bool,
    /// Only meaningful at the originating node; never forwarded
    pub explain_file: Option<PathBuf>,
    pub query_path: Vec<String>,
    pub max_source_rows: Option<u64>,
    /// Column names, in order
    pub order_by: Vec<String>,
    /// Custom keys for leaf adapters, original case preserved
    pub custom: Vec<(String, String)>,
}

impl TableArguments {
    /// Parse an argument string. Unknown or malformed entries are logged.
    pub fn parse(text: &str) -> Self {
        let mut args = TableArguments::default();
        let mut rest = text.trim();

        while !rest.is_empty() {
            if rest.to_ascii_lowercase().starts_with(ARG_ORDER_BY) {
                args.order_by = rest[ARG_ORDER_BY.len()..]
                    .split(',')
                    .map(|c| c.trim().to_uppercase())
                    .filter(|c| !c.is_empty())
                    .collect();
                break;
            }
            let (entry, tail) = split_entry(rest);
            args.apply(entry.trim());
            rest = tail.trim_start();
        }
        args
    }

    fn apply(&mut self, entry: &str) {
        if entry.is_empty() {
            return;
        }
        let lower = entry.to_ascii_lowercase();

        if lower == ARG_WITH_PROVENANCE {
            self.with_provenance = true;
            return;
        }
        if lower == ARG_EXPLAIN || lower.starts_with("explain ") {
            self.explain = true;
            self.with_provenance = true;
            let mut detail = entry[ARG_EXPLAIN.len()..].trim().splitn(2, char::is_whitespace);
            if detail.next().map_or(false, |w| w.eq_ignore_ascii_case("in")) {
                let file = unquote(detail.next().unwrap_or("").trim());
                if !file.is_empty() {
                    self.explain_file = Some(PathBuf::from(file));
                }
            }
            return;
        }

        let (key, value) = match entry.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => {
                warn!(
                    target: "propagation",
                    event = Event::UnknownTableArgument.as_str(),
                    argument = entry,
                    "unrecognised table argument ignored"
                );
                return;
            }
        };
        let key_lower = key.to_ascii_lowercase();

        match key_lower.as_str() {
            ARG_MAX_DEPTH => match value.parse::<i32>() {
                Ok(depth) => self.max_depth = Some(depth),
                Err(_) => self.warn_bad_value(key, value),
            },
            ARG_MAX_SOURCE_ROWS => match value.parse::<u64>() {
                Ok(rows) => self.max_source_rows = Some(rows),
                Err(_) => self.warn_bad_value(key, value),
            },
            ARG_QUERY_PATH => {
                self.query_path = value.split_whitespace().map(str::to_string).collect();
            }
            _ if key_lower.ends_with(CUSTOM_SUFFIX) => {
                self.custom.push((key.to_string(), value.to_string()));
            }
            _ => {
                warn!(
                    target: "propagation",
                    event = Event::UnknownTableArgument.as_str(),
                    argument = key,
                    "unrecognised table argument ignored"
                );
            }
        }
    }

    fn warn_bad_value(&self, key: &str, value: &str) {
        warn!(
            target: "propagation",
            event = Event::UnknownTableArgument.as_str(),
            argument = key,
            value,
            "malformed table argument value ignored"
        );
    }

    /// Look up a custom key, case-insensitively
    pub fn custom_value(&self, key: &str) -> Option<&str> {
        self.custom
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Render the arguments for the next hop.
    ///
    /// `relay` is appended to the query path. The explain file is dropped.
    pub fn to_forwarded(&self, relay: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(depth) = self.max_depth {
            parts.push(format!("maxDepth={}", depth));
        }
        if self.explain {
            parts.push(ARG_EXPLAIN.to_string());
        } else if self.with_provenance {
            parts.push(ARG_WITH_PROVENANCE.to_string());
        }
        let mut path = self.query_path.clone();
        if path.last().map(String::as_str) != Some(relay) {
            path.push(relay.to_string());
        }
        parts.push(format!("queryPath={}", path.join(" ")));
        if let Some(rows) = self.max_source_rows {
            parts.push(format!("maxSourceRows={}", rows));
        }
        for (k, v) in &self.custom {
            parts.push(format!("{}={}", k, v));
        }
        if !self.order_by.is_empty() && !self.explain {
            parts.push(format!("order by {}", self.order_by.join(", ")));
        }
        parts.join(",")
    }
}

/// First entry of `text` and the rest after its separating comma
fn split_entry(text: &str) -> (&str, &str) {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ',') => return (&text[..i], &text[i + 1..]),
            (None, _) => {}
        }
    }
    (text, "")
}

fn unquote(text: &str) -> &str {
    for q in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(q) && text.ends_with(q) {
            return &text[1..text.len() - 1];
        }
    }
    text
}
