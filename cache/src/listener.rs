use crate::entry::Entry;

use std::fmt;
use std::sync::Arc;

/// Describes the reason an entry was removed from a `MemoryStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
  /// The entry was removed to stay within the store's item limit.
  Capacity,
  /// The entry outlived its storage horizon.
  Expired,
  /// The entry's resource was explicitly deleted.
  Invalidated,
}

impl fmt::Display for EvictionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EvictionReason::Capacity => write!(f, "evicted due to capacity"),
      EvictionReason::Expired => write!(f, "evicted due to expiration"),
      EvictionReason::Invalidated => write!(f, "invalidated"),
    }
  }
}

/// A listener that can be registered with a `MemoryStore` to be told when
/// entries leave it.
///
/// `on_evict` is called after the store's internal locks are released, on the
/// thread that caused the removal (a caller or the janitor).
pub trait EvictionListener<C>: Send + Sync {
  fn on_evict(&self, entry: Arc<Entry<C>>, reason: EvictionReason);
}

impl<C, F> EvictionListener<C> for F
where
  F: Fn(Arc<Entry<C>>, EvictionReason) + Send + Sync,
{
  fn on_evict(&self, entry: Arc<Entry<C>>, reason: EvictionReason) {
    self(entry, reason)
  }
}
