//! Process memory sampling
//!
//! A [`MemoryUsage`] snapshot combines four figures:
//!
//! - `rss`: resident set size of this process, read through `sysinfo`
//! - `heap_used`: live heap bytes counted by [`CountingAllocator`]
//! - `heap_total`: high-water mark of `heap_used`
//! - `external`: bytes held by decoded pixel buffers ([`ExternalMemory`])

use std::sync::{Arc, Mutex, PoisonError};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};
use tracing::debug;

pub mod external;
pub mod heap;

pub use external::*;
pub use heap::{heap_stats, CountingAllocator, HeapStats};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Convert a byte count to megabytes
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// One memory snapshot, all values in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub rss: u64,
    pub heap_total: u64,
    pub heap_used: u64,
    pub external: u64,
}

impl std::fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Memory usage: {} bytes, Heap total: {} bytes, Heap used: {} bytes, external: {} bytes",
            self.rss, self.heap_total, self.heap_used, self.external
        )
    }
}

/// System-wide memory figures, in bytes
#[derive(Debug, Clone, Copy)]
pub struct SystemMemory {
    pub total: u64,
    pub available: u64,
}

/// Samples memory usage of the current process
///
/// Shared between the coordinator and worker threads behind an `Arc`.
pub struct MemoryProbe {
    system: Mutex<System>,
    pid: Pid,
    external: Arc<ExternalMemory>,
}

impl MemoryProbe {
    /// Create a probe with its own external-memory ledger
    pub fn new() -> Self {
        Self::with_external(Arc::new(ExternalMemory::new()))
    }

    /// Create a probe reporting the given ledger as external memory
    pub fn with_external(external: Arc<ExternalMemory>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
            external,
        }
    }

    /// Ledger that pipelines register their pixel buffers with
    pub fn external(&self) -> &Arc<ExternalMemory> {
        &self.external
    }

    /// Take a snapshot of the process
    pub fn sample(&self) -> MemoryUsage {
        let heap = heap_stats();
        MemoryUsage {
            rss: self.resident_set_size(),
            heap_total: heap.total,
            heap_used: heap.used,
            external: self.external.current(),
        }
    }

    /// Total and available memory of the machine
    pub fn system_memory(&self) -> SystemMemory {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        SystemMemory {
            total: system.total_memory(),
            available: system.available_memory(),
        }
    }

    fn resident_set_size(&self) -> u64 {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        if !system.refresh_process(self.pid) {
            debug!("Process {} not visible to sysinfo, reporting rss as 0", self.pid);
            return 0;
        }
        system.process(self.pid).map_or(0, |process| process.memory())
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}
