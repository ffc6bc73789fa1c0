//! Live cursor registry
//!
//! Every open cursor registers a cancellation flag here. Cancellation is
//! cooperative: the registry only sets the flag, the cursor observes it on
//! its next fetch.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::Clock;
use crate::observability::Event;

#[derive(Debug)]
struct Registration {
    query_id: String,
    cancelled: Arc<AtomicBool>,
    deadline_ms: Option<i64>,
}

/// Registration held by a cursor; dropping it deregisters
#[derive(Debug)]
pub struct CursorHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
    registry: Weak<CursorRegistry>,
}

impl CursorHandle {
    /// Registry id of the cursor
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether a cancel or timeout has hit this cursor
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for CursorHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(self.id);
        }
    }
}

/// Live cursors of a node, by query id
#[derive(Debug, Default)]
pub struct CursorRegistry {
    entries: Mutex<HashMap<u64, Registration>>,
    next_id: AtomicU64,
}

impl CursorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new cursor; `deadline_ms` arms its timeout
    pub fn register(self: &Arc<Self>, query_id: &str, deadline_ms: Option<i64>) -> CursorHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        self.entries.lock().insert(
            id,
            Registration {
                query_id: query_id.to_string(),
                cancelled: Arc::clone(&cancelled),
                deadline_ms,
            },
        );
        CursorHandle {
            id,
            cancelled,
            registry: Arc::downgrade(self),
        }
    }

    fn deregister(&self, id: u64) {
        self.entries.lock().remove(&id);
    }

    /// Cancel every live cursor of a query; returns how many were flagged
    pub fn cancel_query(&self, query_id: &str) -> usize {
        let entries = self.entries.lock();
        let mut cancelled = 0;
        for registration in entries.values().filter(|r| r.query_id == query_id) {
            if !registration.cancelled.swap(true, Ordering::AcqRel) {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(
                target: "cursor",
                event = Event::CursorCancelled.as_str(),
                query_id = %query_id,
                cursors = cancelled,
                "query cancelled"
            );
        }
        cancelled
    }

    /// Cancel cursors whose deadline has passed
    pub fn check_timeouts(&self, now_ms: i64) -> usize {
        let entries = self.entries.lock();
        let mut expired = 0;
        for registration in entries.values() {
            let overdue = registration.deadline_ms.map_or(false, |d| now_ms >= d);
            if overdue && !registration.cancelled.swap(true, Ordering::AcqRel) {
                expired += 1;
                info!(
                    target: "cursor",
                    event = Event::CursorCancelled.as_str(),
                    query_id = %registration.query_id,
                    "query timed out"
                );
            }
        }
        expired
    }

    /// Number of cursors currently registered
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Run `check_timeouts` every `interval` until the returned handle drops
    pub fn spawn_timeout_sweeper(
        self: &Arc<Self>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> TimeoutSweeper {
        let stop = Arc::new(AtomicBool::new(false));
        let registry = Arc::downgrade(self);
        let flag = Arc::clone(&stop);

        let thread = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let expired = registry.check_timeouts(clock.now_ms());
                if expired > 0 {
                    debug!(target: "cursor", expired, "timeout sweep");
                }
                drop(registry);
                thread::park_timeout(interval);
            }
        });

        TimeoutSweeper {
            stop,
            thread: Some(thread),
        }
    }
}

/// Background timeout sweep; stops and joins on drop
#[derive(Debug)]
pub struct TimeoutSweeper {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for TimeoutSweeper {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}
