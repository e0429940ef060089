use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// A boxed, thread-safe error produced by a producer or a store backend.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur when building a cache or a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// No `Store` was configured for the cache.
  #[error("a store is required to build a resource cache")]
  StoreRequired,
  /// The memory store was configured with zero shards.
  #[error("shard count cannot be zero")]
  ZeroShards,
  /// The memory store was configured with an item limit of zero. Leave the
  /// limit unset for an unbounded store.
  #[error("item limit cannot be zero")]
  ZeroItemLimit,
  /// A revalidating producer needs to spawn background work, but no
  /// `TaskSpawner` was configured and the default `tokio` feature is not
  /// enabled.
  #[error("background revalidation requires a task spawner or the 'tokio' feature")]
  SpawnerRequired,
}

/// Errors reported by a `Store` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
  /// The store was closed and can no longer serve requests.
  #[error("store is closed")]
  Closed,
  /// The store did not finish the operation in time.
  #[error("store operation timed out after {0:?}")]
  Timeout(Duration),
  /// Any failure of the underlying backend (connection, serialization, ...).
  #[error("store backend failure: {0}")]
  Backend(#[source] BoxError),
}

impl StoreError {
  /// Wraps an arbitrary backend error.
  pub fn backend<E>(err: E) -> Self
  where
    E: Into<BoxError>,
  {
    StoreError::Backend(err.into())
  }
}

/// Errors surfaced by the cache to its consumers.
///
/// Both variants hold their source behind an `Arc` so that the error can be
/// cloned and handed to every caller sharing one collapsed producer call.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
  /// Reading from or writing to the store failed.
  #[error("cache store failure: {0}")]
  Store(#[source] Arc<StoreError>),
  /// The producer failed on a path where its result was mandatory.
  #[error("producer failure: {0}")]
  Producer(#[source] Arc<dyn StdError + Send + Sync + 'static>),
}

impl CacheError {
  pub fn producer<E>(err: E) -> Self
  where
    E: Into<BoxError>,
  {
    CacheError::Producer(Arc::from(err.into()))
  }

  pub fn is_store(&self) -> bool {
    matches!(self, CacheError::Store(_))
  }

  pub fn is_producer(&self) -> bool {
    matches!(self, CacheError::Producer(_))
  }
}

impl From<StoreError> for CacheError {
  fn from(err: StoreError) -> Self {
    CacheError::Store(Arc::new(err))
  }
}

/// Errors raised while loading a `CacheConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read configuration file: {0}")]
  Read(#[from] std::io::Error),

  #[error("failed to parse configuration: {0}")]
  Parse(#[from] serde_yaml::Error),

  #[error("invalid configuration value for '{field}': {message}")]
  InvalidValue { field: String, message: String },
}

/// A specialized `Result` type for cache operations.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;
