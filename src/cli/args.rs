//! CLI argument definitions using clap
//!
//! Commands:
//! - meshquery query --mesh <file> --node <id> --table <t> [--args <a>] [--where <p>...]
//! - meshquery explain --mesh <file> --node <id> --table <t> [--out <dot file>]
//! - meshquery validate --mesh <file>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::LogFormat;

/// meshquery - federated queries over an in-process node mesh
#[derive(Parser, Debug)]
#[command(name = "meshquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a federated query and print the merged rows as JSON
    Query {
        /// Mesh configuration file
        #[arg(long, default_value = "./mesh.json")]
        mesh: PathBuf,

        /// Node the query is issued at
        #[arg(long)]
        node: String,

        /// Logical table
        #[arg(long)]
        table: String,

        /// Table arguments, e.g. "maxDepth=2, with_provenance"
        #[arg(long = "args", default_value = "")]
        arguments: String,

        /// Predicate `<column> <op> <value>`; repeated predicates are ANDed
        #[arg(long = "where")]
        predicates: Vec<String>,
    },

    /// Run an explain query and print or write the DOT graph
    Explain {
        /// Mesh configuration file
        #[arg(long, default_value = "./mesh.json")]
        mesh: PathBuf,

        /// Node the query is issued at
        #[arg(long)]
        node: String,

        /// Logical table
        #[arg(long)]
        table: String,

        /// Extra table arguments
        #[arg(long = "args", default_value = "")]
        arguments: String,

        /// Write the graph to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Load and validate a mesh configuration
    Validate {
        /// Mesh configuration file
        #[arg(long, default_value = "./mesh.json")]
        mesh: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::try_parse_from([
            "meshquery",
            "--log-format",
            "json",
            "query",
            "--mesh",
            "m.json",
            "--node",
            "A",
            "--table",
            "LT0",
            "--where",
            "AMOUNT > 1",
            "--where",
            "LOC = 'x'",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Command::Query {
                node, predicates, ..
            } => {
                assert_eq!(node, "A");
                assert_eq!(predicates.len(), 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_log_format_defaults_to_text() {
        let cli = Cli::try_parse_from(["meshquery", "validate"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Text);
    }
}
