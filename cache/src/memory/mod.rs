//! An in-process `Store` backed by sharded LRU maps.

mod janitor;
mod shard;

use crate::entry::Entry;
use crate::error::{BuildError, StoreError};
use crate::listener::EvictionListener;
use crate::params::NormalizedParams;
use crate::store::{Store, StoreEntry};

use self::janitor::Janitor;
use self::shard::{Removed, Shard};

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use futures_util::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// How long entries with an unbounded storage horizon are kept.
pub const DEFAULT_FALLBACK_DELETE_AFTER: Duration = Duration::from_secs(3600);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(2);
/// Expired entries removed per shard and janitor tick.
pub const DEFAULT_CLEANUP_BATCH: usize = 20;

/// The state shared between a `MemoryStore` and its janitor thread.
pub(crate) struct StoreShared<C> {
  shards: Box<[CachePadded<Mutex<Shard<C>>>]>,
  hasher: ahash::RandomState,
  fallback_delete_after: Duration,
  listener: Option<Arc<dyn EvictionListener<C>>>,
  closed: AtomicBool,
}

impl<C> StoreShared<C> {
  #[inline]
  fn shard_for(&self, id: &str) -> &Mutex<Shard<C>> {
    // Shard count is a power of two.
    let index = self.hasher.hash_one(id) as usize & (self.shards.len() - 1);
    &self.shards[index]
  }

  fn check_open(&self) -> Result<(), StoreError> {
    if self.closed.load(Ordering::Acquire) {
      Err(StoreError::Closed)
    } else {
      Ok(())
    }
  }

  fn ttl_for(&self, entry: &StoreEntry<C>) -> Duration {
    entry
      .max_store_duration()
      .unwrap_or(self.fallback_delete_after)
  }

  /// Reports removed entries to the listener. Must be called without any
  /// shard lock held.
  fn notify(&self, removed: Removed<C>) {
    for (entry, reason) in removed {
      trace!(id = %entry.id, variant = %entry.variant_key(), %reason, "entry removed from memory store");
      if let Some(listener) = &self.listener {
        listener.on_evict(entry, reason);
      }
    }
  }

  pub(crate) fn sweep_expired(&self, batch: usize) -> usize {
    let now = Instant::now();
    let mut total = 0;
    for shard in self.shards.iter() {
      let mut removed = Vec::new();
      total += shard.lock().sweep_expired(now, batch, &mut removed);
      self.notify(removed);
    }
    total
  }
}

/// An in-memory [`Store`].
///
/// Entries are indexed by resource id and variant key, so a lookup costs one
/// map access per distinct set of vary names stored for the resource. Each
/// entry expires after its storage horizon (or the fallback duration when the
/// horizon is unbounded). Expired entries are removed lazily on lookup and
/// periodically by a janitor thread.
///
/// ```
/// use fibre_resource_cache::MemoryStore;
///
/// let store: MemoryStore<String> = MemoryStore::builder()
///   .num_items_limit(10_000)
///   .build()
///   .unwrap();
/// assert_eq!(store.len(), 0);
/// ```
pub struct MemoryStore<C> {
  shared: Arc<StoreShared<C>>,
  janitor: Mutex<Option<Janitor>>,
}

impl<C> fmt::Debug for MemoryStore<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryStore")
      .field("num_shards", &self.shared.shards.len())
      .field("fallback_delete_after", &self.shared.fallback_delete_after)
      .field("closed", &self.shared.closed.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

impl<C> Drop for MemoryStore<C> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.get_mut().take() {
      janitor.stop();
    }
  }
}

impl<C> MemoryStore<C>
where
  C: Send + Sync + 'static,
{
  pub fn builder() -> MemoryStoreBuilder<C> {
    MemoryStoreBuilder::default()
  }

  /// Number of stored entries, including expired ones not swept yet.
  pub fn len(&self) -> usize {
    self.shared.shards.iter().map(|s| s.lock().len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of resource ids with at least one stored variant.
  pub fn resource_count(&self) -> usize {
    self.shared.shards.iter().map(|s| s.lock().resource_count()).sum()
  }

  /// Removes every expired entry right away instead of waiting for the
  /// janitor. Returns how many were removed.
  pub fn purge_expired(&self) -> usize {
    self.shared.sweep_expired(usize::MAX)
  }

  pub fn is_closed(&self) -> bool {
    self.shared.closed.load(Ordering::Acquire)
  }

  fn lookup(&self, id: &str, params: &NormalizedParams) -> Result<Vec<Arc<Entry<C>>>, StoreError> {
    self.shared.check_open()?;

    let mut removed = Vec::new();
    let found = self
      .shared
      .shard_for(id)
      .lock()
      .get(id, params, Instant::now(), &mut removed);
    self.shared.notify(removed);

    trace!(id, found = found.len(), "memory store lookup");
    Ok(found)
  }

  fn insert_all(&self, entries: Vec<StoreEntry<C>>) -> Result<(), StoreError> {
    self.shared.check_open()?;

    let now = Instant::now();
    let mut removed = Vec::new();
    for item in entries {
      let ttl = self.shared.ttl_for(&item);
      let entry = item.entry;
      trace!(id = %entry.id, ?ttl, "memory store insert");
      self
        .shared
        .shard_for(&entry.id)
        .lock()
        .insert(entry, ttl, now, &mut removed);
    }
    self.shared.notify(removed);
    Ok(())
  }

  fn remove(&self, id: &str) -> Result<(), StoreError> {
    self.shared.check_open()?;

    let mut removed = Vec::new();
    self.shared.shard_for(id).lock().remove_resource(id, &mut removed);
    debug!(id, variants = removed.len(), "deleted resource from memory store");
    self.shared.notify(removed);
    Ok(())
  }

  fn shutdown(&self) {
    if self.shared.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    if let Some(janitor) = self.janitor.lock().take() {
      janitor.stop();
    }
    for shard in self.shared.shards.iter() {
      shard.lock().clear();
    }
    debug!("memory store closed");
  }
}

impl<C> Store<C> for MemoryStore<C>
where
  C: Send + Sync + 'static,
{
  fn get<'a>(
    &'a self,
    id: &'a str,
    params: &'a NormalizedParams,
  ) -> BoxFuture<'a, Result<Vec<Arc<Entry<C>>>, StoreError>> {
    future::ready(self.lookup(id, params)).boxed()
  }

  fn store(&self, entries: Vec<StoreEntry<C>>) -> BoxFuture<'_, Result<(), StoreError>> {
    future::ready(self.insert_all(entries)).boxed()
  }

  fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
    future::ready(self.remove(id)).boxed()
  }

  /// Stops the janitor and drops every entry. Nothing here blocks, so the
  /// timeout is not used.
  fn close(&self, _timeout: Option<Duration>) -> BoxFuture<'_, Result<(), StoreError>> {
    self.shutdown();
    future::ready(Ok(())).boxed()
  }
}

/// Builder for a [`MemoryStore`].
pub struct MemoryStoreBuilder<C> {
  num_items_limit: Option<usize>,
  fallback_delete_after: Duration,
  cleanup_interval: Option<Duration>,
  cleanup_batch: usize,
  shards: usize,
  listener: Option<Arc<dyn EvictionListener<C>>>,
}

impl<C> fmt::Debug for MemoryStoreBuilder<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryStoreBuilder")
      .field("num_items_limit", &self.num_items_limit)
      .field("fallback_delete_after", &self.fallback_delete_after)
      .field("cleanup_interval", &self.cleanup_interval)
      .field("cleanup_batch", &self.cleanup_batch)
      .field("shards", &self.shards)
      .field("listener", &self.listener.is_some())
      .finish()
  }
}

impl<C> Default for MemoryStoreBuilder<C> {
  fn default() -> Self {
    Self {
      num_items_limit: None,
      fallback_delete_after: DEFAULT_FALLBACK_DELETE_AFTER,
      cleanup_interval: Some(DEFAULT_CLEANUP_INTERVAL),
      cleanup_batch: DEFAULT_CLEANUP_BATCH,
      shards: default_shard_count(),
      listener: None,
    }
  }
}

impl<C> MemoryStoreBuilder<C>
where
  C: Send + Sync + 'static,
{
  /// Caps the number of stored entries; least recently used entries are
  /// evicted beyond it. The limit is split evenly across shards (rounding
  /// up), so use a single shard when the bound must be exact.
  pub fn num_items_limit(mut self, limit: usize) -> Self {
    self.num_items_limit = Some(limit);
    self
  }

  /// Storage duration for entries whose horizon is unbounded.
  pub fn fallback_delete_after(mut self, duration: Duration) -> Self {
    self.fallback_delete_after = duration;
    self
  }

  /// How often the janitor sweeps expired entries.
  pub fn cleanup_interval(mut self, interval: Duration) -> Self {
    self.cleanup_interval = Some(interval);
    self
  }

  /// Disables the janitor thread. Expired entries are then only removed on
  /// lookup or through [`MemoryStore::purge_expired`].
  pub fn without_janitor(mut self) -> Self {
    self.cleanup_interval = None;
    self
  }

  pub fn cleanup_batch(mut self, batch: usize) -> Self {
    self.cleanup_batch = batch;
    self
  }

  /// Number of independently locked shards, rounded up to a power of two.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards;
    self
  }

  pub fn eviction_listener(mut self, listener: impl EvictionListener<C> + 'static) -> Self {
    self.listener = Some(Arc::new(listener));
    self
  }

  pub fn build(self) -> Result<MemoryStore<C>, BuildError> {
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    let num_shards = self.shards.next_power_of_two();

    let per_shard_limit = match self.num_items_limit {
      Some(0) => return Err(BuildError::ZeroItemLimit),
      Some(limit) => NonZeroUsize::new(limit.div_ceil(num_shards)),
      None => None,
    };

    let shards = (0..num_shards)
      .map(|_| CachePadded::new(Mutex::new(Shard::new(per_shard_limit))))
      .collect::<Vec<_>>()
      .into_boxed_slice();

    let shared = Arc::new(StoreShared {
      shards,
      hasher: ahash::RandomState::new(),
      fallback_delete_after: self.fallback_delete_after,
      listener: self.listener,
      closed: AtomicBool::new(false),
    });

    let janitor = self
      .cleanup_interval
      .filter(|interval| !interval.is_zero())
      .map(|interval| Janitor::spawn(shared.clone(), interval, self.cleanup_batch.max(1)));

    Ok(MemoryStore {
      shared,
      janitor: Mutex::new(janitor),
    })
  }
}

fn default_shard_count() -> usize {
  (num_cpus::get() * 4).next_power_of_two()
}
