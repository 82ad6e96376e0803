//! Record ID generation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generates globally unique, lexicographically sortable record IDs.
pub trait IdGen: Send + Sync {
    fn next_id(&self) -> String;
}

/// UUIDv7 generator: time-ordered, so string order follows creation order.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV7IdGen;

impl IdGen for UuidV7IdGen {
    fn next_id(&self) -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

/// Predictable generator for tests: `rec-000001`, `rec-000002`, ...
#[derive(Debug, Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("rec")
    }
}

impl IdGen for SequentialIdGen {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{:06}", self.prefix, n)
    }
}
