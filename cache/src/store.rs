use crate::directives::Seconds;
use crate::entry::Entry;
use crate::error::StoreError;
use crate::params::NormalizedParams;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

/// An entry handed to a store, together with how long it may be kept.
#[derive(Debug, Clone)]
pub struct StoreEntry<C> {
  pub entry: Arc<Entry<C>>,
  /// Upper bound on how long the store may keep the entry. May be
  /// `f64::INFINITY`, in which case the store applies its own policy.
  pub max_store_for: Seconds,
}

impl<C> StoreEntry<C> {
  pub fn new(entry: Arc<Entry<C>>, max_store_for: Seconds) -> Self {
    Self {
      entry,
      max_store_for,
    }
  }

  /// The storage horizon as a `Duration`, or `None` when it is unbounded or
  /// too large to represent.
  pub fn max_store_duration(&self) -> Option<Duration> {
    Duration::try_from_secs_f64(self.max_store_for.max(0.0)).ok()
  }
}

/// The persistence boundary of the cache.
///
/// A store may evict entries whenever it sees fit, and makes no durability
/// promise. What it must never do is return an entry whose `vary` is not
/// satisfied by the request params (see
/// [`variant_matches_request`](crate::variant::variant_matches_request)).
///
/// Stores that do not care about the last bit of lookup performance can fetch
/// everything stored under an id and filter with `variant_matches_request`;
/// indexed stores can use the vary-keys technique of the `variant` module.
pub trait Store<C>: Send + Sync {
  /// Returns stored entries, fresh or stale, for `id` whose vary is satisfied
  /// by the already-normalized `params`.
  fn get<'a>(
    &'a self,
    id: &'a str,
    params: &'a NormalizedParams,
  ) -> BoxFuture<'a, Result<Vec<Arc<Entry<C>>>, StoreError>>;

  /// Persists entries. On error, some or all of the writes may not have
  /// happened.
  fn store(&self, entries: Vec<StoreEntry<C>>) -> BoxFuture<'_, Result<(), StoreError>>;

  /// Removes every entry stored for `id`, regardless of variant.
  fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;

  /// Releases the resources owned by the store, for a graceful shutdown.
  fn close(&self, timeout: Option<Duration>) -> BoxFuture<'_, Result<(), StoreError>>;
}

impl<C, S> Store<C> for Arc<S>
where
  S: Store<C> + ?Sized,
{
  fn get<'a>(
    &'a self,
    id: &'a str,
    params: &'a NormalizedParams,
  ) -> BoxFuture<'a, Result<Vec<Arc<Entry<C>>>, StoreError>> {
    (**self).get(id, params)
  }

  fn store(&self, entries: Vec<StoreEntry<C>>) -> BoxFuture<'_, Result<(), StoreError>> {
    (**self).store(entries)
  }

  fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
    (**self).delete(id)
  }

  fn close(&self, timeout: Option<Duration>) -> BoxFuture<'_, Result<(), StoreError>> {
    (**self).close(timeout)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::directives::ProducerDirectives;
  use crate::entry::ProducerResultResource;
  use crate::normalize::{normalize_producer_result_resource, IdentityNormalizer};

  fn store_entry(max_store_for: Seconds) -> StoreEntry<()> {
    let resource = ProducerResultResource::new("r", (), ProducerDirectives::fresh_for(1.0));
    let entry = normalize_producer_result_resource(&IdentityNormalizer, resource, None);
    StoreEntry::new(Arc::new(entry), max_store_for)
  }

  #[test]
  fn horizon_converts_to_a_duration() {
    assert_eq!(store_entry(90.0).max_store_duration(), Some(Duration::from_secs(90)));
    assert_eq!(store_entry(-5.0).max_store_duration(), Some(Duration::ZERO));
  }

  #[test]
  fn unrepresentable_horizons_are_unbounded() {
    assert_eq!(store_entry(f64::INFINITY).max_store_duration(), None);
    assert_eq!(store_entry(f64::MAX).max_store_duration(), None);
  }
}
