use crate::classify::{classify, EntryClassification};
use crate::directives::ConsumerDirectives;
use crate::entry::{Entry, NormalizedProducerResult, ProducerResult};
use crate::error::{CacheError, Result, StoreError};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::normalize::{self, Normalizer};
use crate::params::{NormalizedParams, NormalizedVary, Params, Vary};
use crate::request::ConsumerRequest;
use crate::store::{Store, StoreEntry};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// The best stored candidates for a request, one per usable classification.
///
/// Within a classification the youngest entry wins.
#[derive(Debug)]
pub struct Lookup<C> {
  pub usable: Option<Arc<Entry<C>>>,
  pub usable_while_revalidate: Option<Arc<Entry<C>>>,
  pub usable_if_error: Option<Arc<Entry<C>>>,
}

impl<C> Default for Lookup<C> {
  fn default() -> Self {
    Self {
      usable: None,
      usable_while_revalidate: None,
      usable_if_error: None,
    }
  }
}

impl<C> Clone for Lookup<C> {
  fn clone(&self) -> Self {
    Self {
      usable: self.usable.clone(),
      usable_while_revalidate: self.usable_while_revalidate.clone(),
      usable_if_error: self.usable_if_error.clone(),
    }
  }
}

impl<C> Lookup<C> {
  /// True when no stored entry can help answer the request.
  pub fn is_empty(&self) -> bool {
    self.usable.is_none() && self.usable_while_revalidate.is_none() && self.usable_if_error.is_none()
  }

  fn offer(&mut self, entry: Arc<Entry<C>>, class: EntryClassification, at: DateTime<Utc>) {
    let slot = match class {
      EntryClassification::Usable => &mut self.usable,
      EntryClassification::UsableWhileRevalidate => &mut self.usable_while_revalidate,
      EntryClassification::UsableIfError => &mut self.usable_if_error,
      EntryClassification::Unusable => return,
    };
    let younger = slot
      .as_ref()
      .map_or(true, |current| entry.age(at) < current.age(at));
    if younger {
      *slot = Some(entry);
    }
  }
}

/// The cache proper: reads candidates from a [`Store`], classifies them against
/// a request's directives, and writes producer results back with their storage
/// horizon.
///
/// `ResourceCache` never calls a producer itself; see
/// [`CachedProducer`](crate::CachedProducer) for the read-through flow.
///
/// Cloning is cheap and clones share the same store and metrics.
pub struct ResourceCache<C> {
  pub(crate) store: Arc<dyn Store<C>>,
  pub(crate) normalizer: Arc<dyn Normalizer>,
  pub(crate) metrics: Arc<Metrics>,
}

impl<C> Clone for ResourceCache<C> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      normalizer: self.normalizer.clone(),
      metrics: self.metrics.clone(),
    }
  }
}

impl<C> fmt::Debug for ResourceCache<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceCache")
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<C> ResourceCache<C>
where
  C: Send + Sync + 'static,
{
  pub(crate) fn new(store: Arc<dyn Store<C>>, normalizer: Arc<dyn Normalizer>) -> Self {
    Self {
      store,
      normalizer,
      metrics: Arc::new(Metrics::new()),
    }
  }

  /// Finds the stored entries that can answer `request`.
  pub async fn get(&self, request: &ConsumerRequest) -> Result<Lookup<C>> {
    let params = self.normalize_params(&request.params);
    self.lookup(&request.id, &params, &request.directives).await
  }

  pub(crate) async fn lookup(
    &self,
    id: &str,
    params: &NormalizedParams,
    directives: &ConsumerDirectives,
  ) -> Result<Lookup<C>> {
    Metrics::incr(&self.metrics.lookups);

    let candidates = self
      .store
      .get(id, params)
      .await
      .map_err(|e| self.store_failure("get", e))?;

    let now = Utc::now();
    let mut lookup = Lookup::default();
    for entry in candidates {
      let class = classify(&entry, directives, now);
      trace!(id, age = entry.age(now), %class, "classified stored entry");
      lookup.offer(entry, class, now);
    }
    Ok(lookup)
  }

  /// Normalizes and stores producer results, primary and supplemental
  /// resources alike.
  pub async fn store(&self, results: Vec<ProducerResult<C>>, directives: &ConsumerDirectives) -> Result<()> {
    let entries = results
      .into_iter()
      .flat_map(|result| {
        let NormalizedProducerResult {
          entry,
          supplemental_resources,
        } = self.normalize_result(result);
        std::iter::once(entry).chain(supplemental_resources)
      })
      .map(Arc::new)
      .collect();
    self.store_entries(entries, directives).await
  }

  /// Stores already-normalized entries. The storage horizon of each one is
  /// computed from its own directives and the consumer's `store_for`.
  pub async fn store_entries(&self, entries: Vec<Arc<Entry<C>>>, directives: &ConsumerDirectives) -> Result<()> {
    if entries.is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let items: Vec<StoreEntry<C>> = entries
      .into_iter()
      .map(|entry| {
        let max_store_for = entry.max_store_for(directives.store_for, now);
        trace!(id = %entry.id, max_store_for, "storing entry");
        StoreEntry::new(entry, max_store_for)
      })
      .collect();
    let count = items.len() as u64;

    self
      .store
      .store(items)
      .await
      .map_err(|e| self.store_failure("store", e))?;
    Metrics::add(&self.metrics.entries_stored, count);
    Ok(())
  }

  /// Removes every stored variant of a resource.
  pub async fn delete(&self, id: &str) -> Result<()> {
    self
      .store
      .delete(id)
      .await
      .map_err(|e| self.store_failure("delete", e))?;
    Metrics::incr(&self.metrics.deletes);
    debug!(id, "deleted resource");
    Ok(())
  }

  /// Closes the underlying store.
  pub async fn close(&self, timeout: Option<Duration>) -> Result<()> {
    self
      .store
      .close(timeout)
      .await
      .map_err(|e| self.store_failure("close", e))
  }

  pub fn normalize_params(&self, params: &Params) -> NormalizedParams {
    normalize::normalize_params(&*self.normalizer, params)
  }

  pub fn normalize_vary(&self, vary: &Vary) -> NormalizedVary {
    normalize::normalize_vary(&*self.normalizer, vary)
  }

  pub fn normalize_result(&self, result: ProducerResult<C>) -> NormalizedProducerResult<C> {
    normalize::normalize_producer_result(&*self.normalizer, result, None)
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }

  fn store_failure(&self, operation: &'static str, err: StoreError) -> CacheError {
    Metrics::incr(&self.metrics.store_errors);
    debug!(operation, error = %err, "store operation failed");
    CacheError::from(err)
  }
}
