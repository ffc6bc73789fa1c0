//! CLI module for meshquery
//!
//! Provides command-line interface for:
//! - query: Run a federated query from one node of a mesh file
//! - explain: Render the propagation graph of a query
//! - validate: Check a mesh file

mod args;
mod commands;
mod errors;
mod io;
mod predicate;

pub use args::{Cli, Command};
pub use commands::{explain, query, run_command, validate};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response, write_text};
pub use predicate::PredicateParser;

use crate::observability::init_logging;

/// Parse arguments, initialise logging and run the command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_format);
    run_command(cli.command)
}
