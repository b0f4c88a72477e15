use crate::MemoryObserver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Passive access profiler. Attach to a machine to count per-address
/// reads, writes and instruction fetches; `hotspots` reports the most
/// frequently touched addresses.
#[derive(Debug, Default)]
pub struct AccessProfiler {
    reads: Mutex<HashMap<u32, u64>>,
    writes: Mutex<HashMap<u32, u64>>,
    read_total: AtomicU64,
    write_total: AtomicU64,
    fetch_total: AtomicU64,
}

impl AccessProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        if let Ok(mut reads) = self.reads.lock() {
            reads.clear();
        }
        if let Ok(mut writes) = self.writes.lock() {
            writes.clear();
        }
        self.read_total.store(0, Ordering::SeqCst);
        self.write_total.store(0, Ordering::SeqCst);
        self.fetch_total.store(0, Ordering::SeqCst);
    }

    pub fn total_reads(&self) -> u64 {
        self.read_total.load(Ordering::SeqCst)
    }

    pub fn total_writes(&self) -> u64 {
        self.write_total.load(Ordering::SeqCst)
    }

    pub fn instructions_fetched(&self) -> u64 {
        self.fetch_total.load(Ordering::SeqCst)
    }

    /// Top `n` addresses by combined read+write count, most active first.
    pub fn hotspots(&self, n: usize) -> Vec<(u32, u64)> {
        let mut combined: HashMap<u32, u64> = HashMap::new();
        if let Ok(reads) = self.reads.lock() {
            for (addr, count) in reads.iter() {
                *combined.entry(*addr).or_insert(0) += count;
            }
        }
        if let Ok(writes) = self.writes.lock() {
            for (addr, count) in writes.iter() {
                *combined.entry(*addr).or_insert(0) += count;
            }
        }
        let mut entries: Vec<(u32, u64)> = combined.into_iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}

impl MemoryObserver for AccessProfiler {
    fn on_read(&self, phys: u32, _size: u8) {
        self.read_total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut reads) = self.reads.lock() {
            *reads.entry(phys).or_insert(0) += 1;
        }
    }

    fn on_write(&self, phys: u32, _size: u8, _value: u16) {
        self.write_total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut writes) = self.writes.lock() {
            *writes.entry(phys).or_insert(0) += 1;
        }
    }

    fn on_execute(&self, _phys: u32) {
        self.fetch_total.fetch_add(1, Ordering::SeqCst);
    }
}
