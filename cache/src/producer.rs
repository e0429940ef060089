use crate::cache::ResourceCache;
use crate::collapse::{CollapsedTask, TaskCollapser};
use crate::directives::{ConsumerDirectives, MaxStale};
use crate::entry::{Entry, NormalizedProducerResult, ProducerResult};
use crate::error::{BoxError, CacheError, Result};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::params::{NormalizedParams, ParamValue, Params};
use crate::request::ConsumerRequest;
use crate::runtime::TaskSpawner;

use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{debug, trace, warn};

/// What a producer returns for one call.
pub type ProducerFuture<C> = BoxFuture<'static, std::result::Result<ProducerResult<C>, BoxError>>;

pub(crate) type ProducerFn<C> = dyn Fn(ConsumerRequest) -> ProducerFuture<C> + Send + Sync;
pub(crate) type CacheablePredicate = dyn Fn(&str, &Params) -> bool + Send + Sync;

type ProducedEntry<C> = Result<Arc<Entry<C>>>;

/// A producer wrapped by a [`ResourceCache`]: a drop-in replacement for the
/// producer that answers from the cache whenever the directives allow it.
///
/// For each request:
/// - an entry usable as-is is returned without calling the producer;
/// - an entry usable while revalidating is returned right away, and the
///   producer is called in the background to refresh it;
/// - otherwise the producer is called and awaited. If it fails and an entry
///   usable on error exists, that entry is returned instead of the error.
///
/// Producer calls for the same id, params and directives that overlap in time
/// share one call (see [`collapse`](crate::collapse)). Their results, primary
/// and supplemental resources, are stored before being returned. A started
/// call runs on the spawner until it completes, so its result is stored even
/// when every caller stopped waiting for it.
///
/// Built with [`ResourceCacheBuilder::build_producer`](crate::ResourceCacheBuilder::build_producer).
pub struct CachedProducer<C> {
  cache: ResourceCache<C>,
  producer: Arc<ProducerFn<C>>,
  collapser: Arc<TaskCollapser<String, ProducedEntry<C>>>,
  spawner: Arc<dyn TaskSpawner>,
  is_cacheable: Option<Arc<CacheablePredicate>>,
}

impl<C> Clone for CachedProducer<C> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      producer: self.producer.clone(),
      collapser: self.collapser.clone(),
      spawner: self.spawner.clone(),
      is_cacheable: self.is_cacheable.clone(),
    }
  }
}

impl<C> fmt::Debug for CachedProducer<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CachedProducer")
      .field("cache", &self.cache)
      .field("collapse_window", &self.collapser.window())
      .finish_non_exhaustive()
  }
}

impl<C> CachedProducer<C>
where
  C: Send + Sync + 'static,
{
  pub(crate) fn new(
    cache: ResourceCache<C>,
    producer: Arc<ProducerFn<C>>,
    collapser: TaskCollapser<String, ProducedEntry<C>>,
    spawner: Arc<dyn TaskSpawner>,
    is_cacheable: Option<Arc<CacheablePredicate>>,
  ) -> Self {
    Self {
      cache,
      producer,
      collapser: Arc::new(collapser),
      spawner,
      is_cacheable,
    }
  }

  /// Answers a request, from the cache or the producer.
  pub async fn fetch(&self, request: ConsumerRequest) -> Result<Arc<Entry<C>>> {
    if !self.request_is_cacheable(&request) {
      trace!(id = %request.id, "request is not cacheable, calling producer directly");
      Metrics::incr(&self.cache.metrics.uncacheable_requests);
      let id = request.id.clone();
      let result = call_producer(&self.cache, &self.producer, request).await?;
      let NormalizedProducerResult { entry, .. } = self.cache.normalize_result(with_id(result, id));
      return Ok(Arc::new(entry));
    }

    let params = self.cache.normalize_params(&request.params);
    let lookup = self
      .cache
      .lookup(&request.id, &params, &request.directives)
      .await?;

    if let Some(entry) = lookup.usable {
      Metrics::incr(&self.cache.metrics.fresh_hits);
      return Ok(entry);
    }

    let id = request.id.clone();
    let refresh = self.produce_and_store(request, &params);

    if let Some(stale) = lookup.usable_while_revalidate {
      Metrics::incr(&self.cache.metrics.stale_hits);
      self.revalidate_in_background(id, refresh);
      return Ok(stale);
    }

    match (refresh.await, lookup.usable_if_error) {
      (Ok(entry), _) => {
        Metrics::incr(&self.cache.metrics.misses);
        Ok(entry)
      }
      (Err(err), Some(fallback)) if err.is_producer() => {
        Metrics::incr(&self.cache.metrics.error_fallbacks);
        warn!(
          id = %id,
          error = %err,
          "error calling producer; falling back to a stale entry, as permitted"
        );
        Ok(fallback)
      }
      (Err(err), _) => Err(err),
    }
  }

  /// The cache this producer reads from and writes to.
  pub fn cache(&self) -> &ResourceCache<C> {
    &self.cache
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.cache.metrics()
  }

  fn request_is_cacheable(&self, request: &ConsumerRequest) -> bool {
    self
      .is_cacheable
      .as_ref()
      .map_or(true, |predicate| predicate(&request.id, &request.params))
  }

  /// Calls the producer and stores its result, collapsed with any identical
  /// pending call.
  fn produce_and_store(&self, request: ConsumerRequest, params: &NormalizedParams) -> CollapsedTask<ProducedEntry<C>> {
    let key = collapse_key(&request.id, params, &request.directives);
    let cache = self.cache.clone();
    let producer = self.producer.clone();

    let mut started = false;
    let task = self.collapser.run(key, || {
      started = true;
      async move {
        let id = request.id.clone();
        let directives = request.directives;
        let result = call_producer(&cache, &producer, request).await?;

        let NormalizedProducerResult {
          entry,
          supplemental_resources,
        } = cache.normalize_result(with_id(result, id));
        let entry = Arc::new(entry);

        let mut entries = Vec::with_capacity(1 + supplemental_resources.len());
        entries.push(entry.clone());
        entries.extend(supplemental_resources.into_iter().map(Arc::new));
        cache.store_entries(entries, &directives).await?;

        trace!(id = %entry.id, "stored producer result");
        Ok::<_, CacheError>(entry)
      }
    });

    if started {
      // Drives the call to completion even if every caller stops waiting.
      self.spawner.spawn(Box::pin(task.clone().map(|_| ())));
    } else {
      Metrics::incr(&self.cache.metrics.collapsed_calls);
    }
    task
  }

  fn revalidate_in_background(&self, id: String, refresh: CollapsedTask<ProducedEntry<C>>) {
    Metrics::incr(&self.cache.metrics.revalidations);
    let metrics = self.cache.metrics.clone();
    self.spawner.spawn(Box::pin(async move {
      match refresh.await {
        Ok(_) => trace!(id = %id, "background revalidation finished"),
        Err(err) => {
          Metrics::incr(&metrics.revalidation_failures);
          warn!(
            id = %id,
            error = %err,
            "error asynchronously requesting refreshed content from producer"
          );
        }
      }
    }));
  }
}

async fn call_producer<C>(
  cache: &ResourceCache<C>,
  producer: &Arc<ProducerFn<C>>,
  request: ConsumerRequest,
) -> std::result::Result<ProducerResult<C>, CacheError> {
  let id = request.id.clone();
  Metrics::incr(&cache.metrics.producer_calls);
  trace!(id = %id, "contacting producer");

  match producer(request).await {
    Ok(result) => {
      trace!(id = %id, supplemental = result.supplemental_resources.len(), "got response from producer");
      Ok(result)
    }
    Err(err) => {
      Metrics::incr(&cache.metrics.producer_errors);
      debug!(id = %id, error = %err, "producer failed");
      Err(CacheError::producer(err))
    }
  }
}

/// The primary resource always answers the request it was produced for.
fn with_id<C>(mut result: ProducerResult<C>, id: String) -> ProducerResult<C> {
  result.resource.id = id;
  result
}

/// Identifies a producer call for collapsing: requests only share a call when
/// their id, normalized params and directives are all equal.
fn collapse_key(id: &str, params: &NormalizedParams, directives: &ConsumerDirectives) -> String {
  let params: serde_json::Map<String, Value> = params
    .iter()
    .map(|(name, value)| (name.clone(), param_json(value)))
    .collect();
  let max_stale = directives
    .max_stale
    .map(|raw| MaxStale::normalize(raw).as_array());
  // Directives use `Debug` so that `None` and non-finite limits stay distinct.
  format!(
    "{}|{}|{:?}|{:?}|{:?}",
    Value::from(id),
    Value::Object(params),
    directives.max_age,
    max_stale,
    directives.store_for
  )
}

fn param_json(value: &ParamValue) -> Value {
  match value {
    ParamValue::Bool(b) => Value::from(*b),
    ParamValue::Int(i) => Value::from(*i),
    ParamValue::Str(s) => Value::from(s.as_str()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::params;
  use crate::normalize::{normalize_params, FnNormalizer};

  #[test]
  fn collapse_key_depends_on_normalized_params_and_directives() {
    let n = FnNormalizer::new(
      |name: &str| name.to_ascii_lowercase(),
      |_name: &str, value: ParamValue| value,
    );
    let upper = normalize_params(&n, &params([("Lang", "en")]));
    let lower = normalize_params(&n, &params([("lang", "en")]));
    let none = ConsumerDirectives::default();

    assert_eq!(collapse_key("r", &upper, &none), collapse_key("r", &lower, &none));
    assert_ne!(
      collapse_key("r", &lower, &none),
      collapse_key("r", &lower, &ConsumerDirectives::default().max_age(5.0))
    );
    assert_ne!(collapse_key("r", &lower, &none), collapse_key("s", &lower, &none));
  }

  #[test]
  fn unbounded_directives_differ_from_absent_ones() {
    let p = NormalizedParams::default();
    let none = ConsumerDirectives::default();
    assert_ne!(
      collapse_key("r", &p, &none),
      collapse_key("r", &p, &ConsumerDirectives::default().max_age(f64::INFINITY))
    );
    assert_ne!(
      collapse_key("r", &p, &none),
      collapse_key("r", &p, &ConsumerDirectives::default().store_for(f64::INFINITY))
    );
  }

  #[test]
  fn param_values_of_different_types_differ() {
    let text = NormalizedParams(std::iter::once(("n".to_string(), ParamValue::from("1"))).collect());
    let int = NormalizedParams(std::iter::once(("n".to_string(), ParamValue::from(1i64))).collect());
    let none = ConsumerDirectives::default();
    assert_ne!(collapse_key("r", &text, &none), collapse_key("r", &int, &none));
  }

  #[test]
  fn out_of_order_max_stale_collapses_with_its_normalized_form() {
    let p = NormalizedParams::default();
    assert_eq!(
      collapse_key("r", &p, &ConsumerDirectives::default().max_stale([5.0, 2.0, 9.0])),
      collapse_key("r", &p, &ConsumerDirectives::default().max_stale([5.0, 5.0, 9.0]))
    );
  }
}
