//! Data sources behind a logical table
//!
//! Local leaf adapters implement `RowSource`. Peers are described by a
//! `SourceDescriptor` of kind `Peer` and reached through the engine's
//! transport. `SourceSelector` decides which of them take part in an
//! invocation and what each is asked for.

mod caching;
mod errors;
mod memory;
mod selector;
mod types;

pub use caching::CachingSource;
pub use errors::{SourceError, SourceResult};
pub use memory::MemoryTable;
pub use selector::{leaf_label, select_peers, LocalScan, LocalSelection, SourceSelector};
pub use types::{
    RowSource, RowStream, ScanRequest, SourceDescriptor, SourceInstance, SourceKind,
};
