//! Observability subsystem
//!
//! Provides:
//! - Typed event names carried in the `event` field of every log line
//! - Subscriber installation for the `tracing` output
//! - Per-node counters
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. The library emits, the binary decides where output goes
//!
//! # Usage
//!
//! ```ignore
//! use meshquery::observability::{init_logging, Event, LogFormat};
//!
//! init_logging(LogFormat::Json);
//! tracing::info!(target: "engine", event = Event::QueryReceived.as_str(), "query received");
//! ```

mod events;
mod logging;
mod metrics;

pub use events::Event;
pub use logging::{init_logging, LogFormat, DEFAULT_FILTER};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
