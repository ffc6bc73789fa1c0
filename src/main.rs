//! meshquery CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`; errors go to stderr
//! and exit non-zero.

use meshquery::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
