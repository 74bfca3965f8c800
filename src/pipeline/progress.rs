//! Progress reporting for export and reimport
//!
//! The pipeline reports `(name, done, total)` triples to a [`ProgressSink`]. For export
//! the name is a document and the units are tables; for reimport the name is a table
//! and the units are row mutations. Totals grow as work is discovered, so `done` may
//! briefly equal `total` before more work is announced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receiver of progress updates
pub trait ProgressSink: Send + Sync {
    /// Called whenever `done` or `total` of `name` changes
    fn update(&self, name: &str, done: u64, total: u64);
}

/// Sink that discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _name: &str, _done: u64, _total: u64) {}
}

/// Kind of row mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Existing rows removed
    Delete,
    /// Snapshot rows added
    Insert,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::Delete => f.write_str("delete"),
            MutationKind::Insert => f.write_str("insert"),
        }
    }
}

/// Callbacks fired around every row mutation batch
pub trait MutationCallbacks: Send + Sync {
    /// The service accepted the batch
    fn issued(&self, kind: MutationKind, rows: usize);
    /// The service reported the batch as applied
    fn completed(&self, kind: MutationKind, rows: usize);
}

struct Counters {
    name: String,
    done: AtomicU64,
    total: AtomicU64,
    sink: Arc<dyn ProgressSink>,
}

/// Done/total counters for one named unit of work. Cheap to clone; clones share
/// the counters.
#[derive(Clone)]
pub struct ProgressHandler {
    counters: Arc<Counters>,
}

impl ProgressHandler {
    /// Start at `0/total` and report it
    pub fn new(name: impl Into<String>, total: u64, sink: Arc<dyn ProgressSink>) -> Self {
        let handler = Self {
            counters: Arc::new(Counters {
                name: name.into(),
                done: AtomicU64::new(0),
                total: AtomicU64::new(total),
                sink,
            }),
        };
        handler.report();
        handler
    }

    /// One more unit finished
    pub fn increment_done(&self) {
        self.counters.done.fetch_add(1, Ordering::SeqCst);
        self.report();
    }

    /// One more unit discovered
    pub fn increment_total(&self) {
        self.counters.total.fetch_add(1, Ordering::SeqCst);
        self.report();
    }

    /// Units finished so far
    pub fn done(&self) -> u64 {
        self.counters.done.load(Ordering::SeqCst)
    }

    /// Units known so far
    pub fn total(&self) -> u64 {
        self.counters.total.load(Ordering::SeqCst)
    }

    fn report(&self) {
        self.counters
            .sink
            .update(&self.counters.name, self.done(), self.total());
    }
}

impl MutationCallbacks for ProgressHandler {
    fn issued(&self, _kind: MutationKind, _rows: usize) {
        self.increment_total();
    }

    fn completed(&self, _kind: MutationKind, _rows: usize) {
        self.increment_done();
    }
}
