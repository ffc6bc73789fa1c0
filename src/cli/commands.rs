//! CLI command implementations
//!
//! Every command loads the mesh file, assembles an in-process mesh and
//! issues one query at the chosen node.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::config::MeshConfig;
use crate::engine::{to_dot, ExplainRow, Node, QueryRequest};
use crate::mesh::Mesh;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_response, write_text};
use super::predicate::PredicateParser;

/// Dispatch a parsed command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Query {
            mesh,
            node,
            table,
            arguments,
            predicates,
        } => query(&mesh, &node, &table, &arguments, &predicates),
        Command::Explain {
            mesh,
            node,
            table,
            arguments,
            out,
        } => explain(&mesh, &node, &table, &arguments, out.as_deref()),
        Command::Validate { mesh } => validate(&mesh),
    }
}

fn load_mesh(path: &Path) -> CliResult<Mesh> {
    let config = MeshConfig::load(path)?;
    Ok(Mesh::from_config(&config)?)
}

fn find_node<'a>(mesh: &'a Mesh, node_id: &str) -> CliResult<&'a Arc<Node>> {
    mesh.node(node_id)
        .ok_or_else(|| CliError::unknown_node(node_id))
}

/// Run a query and print the merged rows
pub fn query(
    mesh_path: &Path,
    node_id: &str,
    table: &str,
    arguments: &str,
    predicates: &[String],
) -> CliResult<()> {
    let mesh = load_mesh(mesh_path)?;
    let node = find_node(&mesh, node_id)?;

    let schema = node.exposed_schema(table, arguments)?;
    let qualifiers = PredicateParser::new()?.parse_all(predicates, &schema)?;

    let request = QueryRequest::new(table)
        .with_arguments(arguments)
        .with_qualifiers(qualifiers);
    let mut cursor = node.execute(request)?;
    let rows = cursor.collect_rows()?;
    let row_count = rows.len();
    info!(
        target: "cli",
        query_id = cursor.query_id(),
        rows = row_count,
        "query complete"
    );

    write_response(json!({
        "query_id": cursor.query_id(),
        "columns": cursor.schema().column_names(),
        "rows": rows,
        "row_count": row_count,
    }))
}

/// Arguments for an explain run; the explain entry goes first so a
/// trailing `order by` stays last
fn explain_arguments(out: Option<&Path>, extra: &str) -> String {
    let explain = match out {
        Some(path) if path.to_string_lossy().contains(',') => {
            format!("explain in '{}'", path.display())
        }
        Some(path) => format!("explain in {}", path.display()),
        None => "explain".to_string(),
    };
    if extra.trim().is_empty() {
        explain
    } else {
        format!("{}, {}", explain, extra.trim())
    }
}

/// Run an explain query; print the DOT graph or report the written file
pub fn explain(
    mesh_path: &Path,
    node_id: &str,
    table: &str,
    arguments: &str,
    out: Option<&Path>,
) -> CliResult<()> {
    let mesh = load_mesh(mesh_path)?;
    let node = find_node(&mesh, node_id)?;

    let request = QueryRequest::new(table).with_arguments(explain_arguments(out, arguments));
    let mut cursor = node.execute(request)?;
    let rows = cursor.collect_rows()?;

    match out {
        Some(path) => write_response(json!({
            "query_id": cursor.query_id(),
            "dot_file": path.display().to_string(),
            "edges": rows.len(),
        })),
        None => {
            let schema = cursor.schema();
            let edges: Vec<ExplainRow> = rows
                .iter()
                .filter_map(|r| ExplainRow::from_row(r, schema))
                .collect();
            write_text(&to_dot(&edges, schema.table()))
        }
    }
}

fn node_summary(node: &Node) -> Value {
    let config = node.config();
    json!({
        "node_id": config.node_id,
        "peers": config.peers,
        "tables": config.logical_tables.keys().collect::<Vec<_>>(),
        "sources": config.sources.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        "max_propagation": config.max_propagation,
    })
}

/// Load a mesh file, build every node and print a summary
pub fn validate(mesh_path: &Path) -> CliResult<()> {
    let mesh = load_mesh(mesh_path)?;
    let nodes: Vec<Value> = mesh.nodes().map(|n| node_summary(n)).collect();
    write_response(json!({
        "valid": true,
        "nodes": nodes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_arguments_put_explain_first() {
        assert_eq!(explain_arguments(None, ""), "explain");
        assert_eq!(
            explain_arguments(Some(Path::new("/tmp/g.dot")), "maxDepth=1"),
            "explain in /tmp/g.dot, maxDepth=1"
        );
        let quoted = explain_arguments(Some(Path::new("/tmp/a,b.dot")), "");
        assert_eq!(quoted, "explain in '/tmp/a,b.dot'");
        assert_eq!(
            crate::propagation::TableArguments::parse(&quoted).explain_file,
            Some(std::path::PathBuf::from("/tmp/a,b.dot"))
        );
    }

    #[test]
    fn test_unknown_node_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.json");
        std::fs::write(
            &path,
            r#"{"nodes":[{"node_id":"A","logical_tables":{"LT0":"V INTEGER"}}]}"#,
        )
        .unwrap();

        let err = query(&path, "Z", "LT0", "", &[]).unwrap_err();
        assert_eq!(err.code_str(), "MESH_CLI_UNKNOWN_NODE");
    }

    #[test]
    fn test_validate_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code_str(), "MESH_CLI_CONFIG_ERROR");
    }
}
