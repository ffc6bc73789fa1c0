//! In-process mesh
//!
//! Runs several nodes in one process and forwards queries between them by
//! direct calls. Used by the command line and by the integration tests.

mod in_process;

pub use in_process::Mesh;
