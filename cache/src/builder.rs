use crate::cache::ResourceCache;
use crate::collapse::{TaskCollapser, DEFAULT_COLLAPSE_WINDOW};
use crate::config::CacheConfig;
use crate::entry::ProducerResult;
use crate::error::{BoxError, BuildError};
use crate::normalize::{IdentityNormalizer, Normalizer};
use crate::params::Params;
use crate::producer::{CacheablePredicate, CachedProducer, ProducerFn, ProducerFuture};
use crate::request::ConsumerRequest;
use crate::runtime::TaskSpawner;
use crate::store::Store;

use core::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::FutureExt;

/// A builder for creating `ResourceCache` and `CachedProducer` instances.
///
/// ```
/// use std::time::Duration;
/// use fibre_resource_cache::{MemoryStore, ResourceCacheBuilder};
///
/// let store = MemoryStore::<String>::builder().build().unwrap();
/// let cache = ResourceCacheBuilder::new()
///   .store(store)
///   .collapse_window(Duration::from_millis(500))
///   .build()
///   .unwrap();
/// # let _ = cache;
/// ```
pub struct ResourceCacheBuilder<C> {
  store: Option<Arc<dyn Store<C>>>,
  normalizer: Arc<dyn Normalizer>,
  collapse_window: Duration,
  spawner: Option<Arc<dyn TaskSpawner>>,
  is_cacheable: Option<Arc<CacheablePredicate>>,
}

// Manual Debug implementation for ResourceCacheBuilder.
impl<C> fmt::Debug for ResourceCacheBuilder<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceCacheBuilder")
      .field("has_store", &self.store.is_some())
      .field("collapse_window", &self.collapse_window)
      .field("has_spawner", &self.spawner.is_some())
      .field("has_is_cacheable", &self.is_cacheable.is_some())
      .finish_non_exhaustive()
  }
}

impl<C> Default for ResourceCacheBuilder<C> {
  fn default() -> Self {
    Self {
      store: None,
      normalizer: Arc::new(IdentityNormalizer),
      collapse_window: DEFAULT_COLLAPSE_WINDOW,
      spawner: None,
      is_cacheable: None,
    }
  }
}

impl<C> ResourceCacheBuilder<C>
where
  C: Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self::default()
  }

  /// Applies the cache-level settings of a loaded configuration.
  pub fn config(mut self, config: &CacheConfig) -> Self {
    self.collapse_window = config.collapse_window;
    self
  }

  /// The store entries are read from and written to. Required.
  pub fn store(mut self, store: impl Store<C> + 'static) -> Self {
    self.store = Some(Arc::new(store));
    self
  }

  /// Like [`store`](Self::store), for a store that is already shared.
  pub fn shared_store(mut self, store: Arc<dyn Store<C>>) -> Self {
    self.store = Some(store);
    self
  }

  /// Sets the normalizer for param names and values. Defaults to leaving them
  /// untouched.
  pub fn normalizer(mut self, normalizer: impl Normalizer + 'static) -> Self {
    self.normalizer = Arc::new(normalizer);
    self
  }

  /// How long after a producer call started identical requests may still join
  /// it. Defaults to 3 seconds; zero effectively disables collapsing.
  pub fn collapse_window(mut self, window: Duration) -> Self {
    self.collapse_window = window;
    self
  }

  /// Sets the spawner used for background revalidation. Defaults to the
  /// current Tokio runtime when the `tokio` feature is enabled.
  pub fn spawner(mut self, spawner: impl TaskSpawner) -> Self {
    self.spawner = Some(Arc::new(spawner));
    self
  }

  /// Requests for which `predicate(id, params)` is false bypass the cache: the
  /// producer is always called, its result is neither stored nor shared with
  /// concurrent requests.
  pub fn is_cacheable<F>(mut self, predicate: F) -> Self
  where
    F: Fn(&str, &Params) -> bool + Send + Sync + 'static,
  {
    self.is_cacheable = Some(Arc::new(predicate));
    self
  }

  /// Builds a cache without a producer.
  pub fn build(self) -> Result<ResourceCache<C>, BuildError> {
    let store = self.store.ok_or(BuildError::StoreRequired)?;
    Ok(ResourceCache::new(store, self.normalizer))
  }

  /// Builds a cache and wraps `producer` with it.
  ///
  /// When the `tokio` feature is enabled and no spawner was configured, this
  /// must be called from within a Tokio runtime.
  pub fn build_producer<F, Fut, E>(self, producer: F) -> Result<CachedProducer<C>, BuildError>
  where
    F: Fn(ConsumerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProducerResult<C>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    let spawner = match self.spawner.clone() {
      Some(spawner) => spawner,
      None => default_spawner().ok_or(BuildError::SpawnerRequired)?,
    };
    let collapser = TaskCollapser::new(self.collapse_window);
    let is_cacheable = self.is_cacheable.clone();
    let cache = self.build()?;

    let producer: Arc<ProducerFn<C>> = Arc::new(move |request: ConsumerRequest| -> ProducerFuture<C> {
      producer(request)
        .map(|result| result.map_err(Into::into))
        .boxed()
    });

    Ok(CachedProducer::new(cache, producer, collapser, spawner, is_cacheable))
  }
}

#[cfg(feature = "tokio")]
fn default_spawner() -> Option<Arc<dyn TaskSpawner>> {
  crate::runtime::TokioSpawner::try_current().map(|s| Arc::new(s) as Arc<dyn TaskSpawner>)
}

#[cfg(not(feature = "tokio"))]
fn default_spawner() -> Option<Arc<dyn TaskSpawner>> {
  None
}
