//! Running counters for the persistence layer.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters updated on every read/write path. Latency sums are in
/// microseconds so averages can be derived without extra bookkeeping.
#[derive(Debug, Default)]
pub struct PersistenceMetrics {
    reads: AtomicU64,
    writes: AtomicU64,
    batch_ops: AtomicU64,
    read_micros: AtomicU64,
    write_micros: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fallbacks: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub batch_ops: u64,
    pub avg_read_micros: u64,
    pub avg_write_micros: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub fallbacks: u64,
    pub failures: u64,
    pub evictions: u64,
}

impl PersistenceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self, elapsed: Duration) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.read_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_write(&self, elapsed: Duration) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.write_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batch_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let reads = self.reads.load(Ordering::Relaxed);
        let writes = self.writes.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        MetricsSnapshot {
            reads,
            writes,
            batch_ops: self.batch_ops.load(Ordering::Relaxed),
            avg_read_micros: if reads > 0 {
                self.read_micros.load(Ordering::Relaxed) / reads
            } else {
                0
            },
            avg_write_micros: if writes > 0 {
                self.write_micros.load(Ordering::Relaxed) / writes
            } else {
                0
            },
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Flat key/value form for the admin control surface.
    pub fn as_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("reads".into(), self.reads.to_string());
        map.insert("writes".into(), self.writes.to_string());
        map.insert("batch_ops".into(), self.batch_ops.to_string());
        map.insert("avg_read_micros".into(), self.avg_read_micros.to_string());
        map.insert("avg_write_micros".into(), self.avg_write_micros.to_string());
        map.insert("cache_hits".into(), self.cache_hits.to_string());
        map.insert("cache_misses".into(), self.cache_misses.to_string());
        map.insert(
            "cache_hit_rate".into(),
            format!("{:.3}", self.cache_hit_rate),
        );
        map.insert("fallbacks".into(), self.fallbacks.to_string());
        map.insert("failures".into(), self.failures.to_string());
        map.insert("evictions".into(), self.evictions.to_string());
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_and_hit_rate() {
        let metrics = PersistenceMetrics::new();
        metrics.record_read(Duration::from_micros(100));
        metrics.record_read(Duration::from_micros(300));
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        let snap = metrics.snapshot();
        assert_eq!(snap.reads, 2);
        assert_eq!(snap.avg_read_micros, 200);
        assert_eq!(snap.cache_hit_rate, 0.75);
    }

    #[test]
    fn empty_metrics_do_not_divide_by_zero() {
        let snap = PersistenceMetrics::new().snapshot();
        assert_eq!(snap.avg_read_micros, 0);
        assert_eq!(snap.cache_hit_rate, 0.0);
    }
}
