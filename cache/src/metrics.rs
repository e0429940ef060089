use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Lookups ---
  pub(crate) lookups: CachePadded<AtomicU64>,
  pub(crate) fresh_hits: CachePadded<AtomicU64>,
  pub(crate) stale_hits: CachePadded<AtomicU64>,
  pub(crate) error_fallbacks: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Producer ---
  pub(crate) producer_calls: CachePadded<AtomicU64>,
  pub(crate) collapsed_calls: CachePadded<AtomicU64>,
  pub(crate) producer_errors: CachePadded<AtomicU64>,
  pub(crate) revalidations: CachePadded<AtomicU64>,
  pub(crate) revalidation_failures: CachePadded<AtomicU64>,
  pub(crate) uncacheable_requests: CachePadded<AtomicU64>,

  // --- Store ---
  pub(crate) entries_stored: CachePadded<AtomicU64>,
  pub(crate) deletes: CachePadded<AtomicU64>,
  pub(crate) store_errors: CachePadded<AtomicU64>,

  created_at: Instant,
}

// Manual implementation of Default to handle the non-default `Instant`.
impl Default for Metrics {
  fn default() -> Self {
    Self {
      lookups: CachePadded::new(AtomicU64::new(0)),
      fresh_hits: CachePadded::new(AtomicU64::new(0)),
      stale_hits: CachePadded::new(AtomicU64::new(0)),
      error_fallbacks: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      producer_calls: CachePadded::new(AtomicU64::new(0)),
      collapsed_calls: CachePadded::new(AtomicU64::new(0)),
      producer_errors: CachePadded::new(AtomicU64::new(0)),
      revalidations: CachePadded::new(AtomicU64::new(0)),
      revalidation_failures: CachePadded::new(AtomicU64::new(0)),
      uncacheable_requests: CachePadded::new(AtomicU64::new(0)),
      entries_stored: CachePadded::new(AtomicU64::new(0)),
      deletes: CachePadded::new(AtomicU64::new(0)),
      store_errors: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  #[inline]
  pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let fresh_hits = self.fresh_hits.load(Ordering::Relaxed);
    let stale_hits = self.stale_hits.load(Ordering::Relaxed);
    let error_fallbacks = self.error_fallbacks.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let served_from_cache = fresh_hits + stale_hits + error_fallbacks;
    let answered = served_from_cache + misses;

    MetricsSnapshot {
      lookups: self.lookups.load(Ordering::Relaxed),
      fresh_hits,
      stale_hits,
      error_fallbacks,
      misses,
      hit_ratio: if answered == 0 {
        0.0
      } else {
        served_from_cache as f64 / answered as f64
      },
      producer_calls: self.producer_calls.load(Ordering::Relaxed),
      collapsed_calls: self.collapsed_calls.load(Ordering::Relaxed),
      producer_errors: self.producer_errors.load(Ordering::Relaxed),
      revalidations: self.revalidations.load(Ordering::Relaxed),
      revalidation_failures: self.revalidation_failures.load(Ordering::Relaxed),
      uncacheable_requests: self.uncacheable_requests.load(Ordering::Relaxed),
      entries_stored: self.entries_stored.load(Ordering::Relaxed),
      deletes: self.deletes.load(Ordering::Relaxed),
      store_errors: self.store_errors.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Store lookups performed for consumer requests.
  pub lookups: u64,
  /// Requests answered with an entry that needed no revalidation.
  pub fresh_hits: u64,
  /// Requests answered with a stale entry while it was revalidated in the
  /// background.
  pub stale_hits: u64,
  /// Requests answered with a stale entry because the producer failed.
  pub error_fallbacks: u64,
  /// Requests that had to wait for the producer.
  pub misses: u64,
  /// The ratio of requests served from the cache to all answered requests.
  pub hit_ratio: f64,
  /// Producer invocations actually started.
  pub producer_calls: u64,
  /// Producer invocations that joined an already pending call.
  pub collapsed_calls: u64,
  /// Producer invocations that failed.
  pub producer_errors: u64,
  /// Background revalidations started.
  pub revalidations: u64,
  /// Background revalidations that failed.
  pub revalidation_failures: u64,
  /// Requests that bypassed the cache entirely.
  pub uncacheable_requests: u64,
  /// Entries handed to the store, supplemental ones included.
  pub entries_stored: u64,
  /// Resource deletions forwarded to the store.
  pub deletes: u64,
  /// Failed store reads and writes.
  pub store_errors: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("lookups", &self.lookups)
      .field("fresh_hits", &self.fresh_hits)
      .field("stale_hits", &self.stale_hits)
      .field("error_fallbacks", &self.error_fallbacks)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("producer_calls", &self.producer_calls)
      .field("collapsed_calls", &self.collapsed_calls)
      .field("producer_errors", &self.producer_errors)
      .field("revalidations", &self.revalidations)
      .field("revalidation_failures", &self.revalidation_failures)
      .field("uncacheable_requests", &self.uncacheable_requests)
      .field("entries_stored", &self.entries_stored)
      .field("deletes", &self.deletes)
      .field("store_errors", &self.store_errors)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
