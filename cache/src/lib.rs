//! A protocol-agnostic resource cache with HTTP-style freshness semantics.
//!
//! # Features
//! - **Freshness & Staleness**: Producers declare how long results stay fresh
//!   and how stale they may be served, in three tiers: without revalidation,
//!   while revalidating in the background, and only if revalidation fails.
//!   Consumers declare their own tolerance, and the cache reconciles both.
//! - **Content Negotiation**: Results declare which request params they
//!   `vary` on, and are stored as separate variants of the same resource.
//! - **Pluggable Storage**: Any backend implementing [`Store`] can hold
//!   entries. [`MemoryStore`] is a sharded, in-process implementation.
//! - **Request Collapsing**: Overlapping identical producer calls share one
//!   in-flight result.
//! - **Observability**: `tracing` instrumentation and lock-free metrics.
//!
//! ```no_run
//! use fibre_resource_cache::{
//!   ConsumerRequest, MemoryStore, ProducerDirectives, ProducerResult,
//!   ProducerResultResource, ResourceCacheBuilder, BoxError,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let producer = ResourceCacheBuilder::new()
//!   .store(MemoryStore::builder().build()?)
//!   .build_producer(|req: ConsumerRequest| async move {
//!     let body = format!("content of {}", req.id);
//!     Ok::<_, BoxError>(ProducerResult::new(ProducerResultResource::new(
//!       req.id,
//!       body,
//!       ProducerDirectives::fresh_for(60.0).max_stale([0.0, 30.0, 600.0]),
//!     )))
//!   })?;
//!
//! let entry = producer.fetch(ConsumerRequest::new("users/42")).await?;
//! println!("{}", entry.content);
//! # Ok(())
//! # }
//! ```

// Public modules that form the API
pub mod builder;
pub mod cache;
pub mod classify;
pub mod collapse;
pub mod config;
pub mod directives;
pub mod entry;
pub mod error;
pub mod listener;
pub mod memory;
pub mod metrics;
pub mod normalize;
pub mod params;
pub mod producer;
pub mod request;
pub mod runtime;
pub mod store;
pub mod variant;

// Re-export the primary user-facing types for convenience
pub use builder::ResourceCacheBuilder;
pub use cache::{Lookup, ResourceCache};
pub use classify::EntryClassification;
pub use collapse::{collapse, Collapsed, CollapsedTask, TaskCollapser};
pub use config::{CacheConfig, MemoryStoreConfig};
pub use directives::{ConsumerDirectives, EntryDirectives, MaxStale, ProducerDirectives, Seconds};
pub use entry::{Entry, ProducerResult, ProducerResultResource, Validators};
pub use error::{BoxError, BuildError, CacheError, ConfigError, StoreError};
pub use listener::{EvictionListener, EvictionReason};
pub use memory::{MemoryStore, MemoryStoreBuilder};
pub use metrics::MetricsSnapshot;
pub use normalize::{FnNormalizer, IdentityNormalizer, Normalizer};
pub use params::{NormalizedParams, NormalizedVary, ParamValue, Params, Vary};
pub use producer::CachedProducer;
pub use request::ConsumerRequest;
pub use runtime::TaskSpawner;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
pub use store::{Store, StoreEntry};
pub use variant::VariantKey;
