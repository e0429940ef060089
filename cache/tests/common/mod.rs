#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fibre_resource_cache::{
  BoxError, ConsumerDirectives, ConsumerRequest, Entry, MemoryStore, NormalizedParams,
  ProducerDirectives, ProducerResult, ProducerResultResource, ResourceCache, Store, StoreEntry,
  StoreError,
};
use futures_util::future::{BoxFuture, FutureExt};

pub type TestProducerFuture = BoxFuture<'static, Result<ProducerResult<String>, BoxError>>;

/// Counts producer calls and lets a test make the producer fail on demand.
#[derive(Clone, Default)]
pub struct ProducerStub {
  calls: Arc<AtomicUsize>,
  failing: Arc<AtomicBool>,
}

impl ProducerStub {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// A producer answering `"<id>#<call number>"`, after `delay`.
  pub fn producer(
    &self,
    directives: ProducerDirectives,
    delay: Duration,
  ) -> impl Fn(ConsumerRequest) -> TestProducerFuture + Send + Sync + 'static {
    let stub = self.clone();
    move |req: ConsumerRequest| {
      let stub = stub.clone();
      async move {
        let n = stub.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !delay.is_zero() {
          tokio::time::sleep(delay).await;
        }
        if stub.failing.load(Ordering::SeqCst) {
          return Err::<_, BoxError>("producer is down".into());
        }
        Ok(ProducerResult::new(ProducerResultResource::new(
          req.id.clone(),
          format!("{}#{}", req.id, n),
          directives,
        )))
      }
      .boxed()
    }
  }
}

/// An unsharded memory store without a janitor, so tests control expiry.
pub fn memory_store() -> MemoryStore<String> {
  MemoryStore::builder()
    .shards(1)
    .without_janitor()
    .build()
    .unwrap()
}

/// Stores `content` for `id` as if it had been produced `age` seconds ago.
pub async fn seed(
  cache: &ResourceCache<String>,
  id: &str,
  content: &str,
  age: f64,
  directives: ProducerDirectives,
) {
  let resource = ProducerResultResource::new(id, content.to_string(), directives).initial_age(age);
  cache
    .store(vec![ProducerResult::new(resource)], &ConsumerDirectives::default())
    .await
    .unwrap();
}

/// Waits until `condition` holds, or panics after a second.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
  for _ in 0..100 {
    if condition() {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("condition not met in time");
}

/// A store whose reads and/or writes always fail.
#[derive(Default)]
pub struct FailingStore {
  pub fail_reads: bool,
  pub fail_writes: bool,
  inner: Option<MemoryStore<String>>,
}

impl FailingStore {
  pub fn failing_reads() -> Self {
    Self {
      fail_reads: true,
      fail_writes: false,
      inner: None,
    }
  }

  pub fn failing_writes() -> Self {
    Self {
      fail_reads: false,
      fail_writes: true,
      inner: Some(memory_store()),
    }
  }
}

#[derive(Debug)]
struct BackendDown;

impl std::fmt::Display for BackendDown {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "backend down")
  }
}

impl std::error::Error for BackendDown {}

impl Store<String> for FailingStore {
  fn get<'a>(
    &'a self,
    id: &'a str,
    params: &'a NormalizedParams,
  ) -> BoxFuture<'a, Result<Vec<Arc<Entry<String>>>, StoreError>> {
    if self.fail_reads {
      return async { Err(StoreError::backend(BackendDown)) }.boxed();
    }
    match &self.inner {
      Some(inner) => inner.get(id, params),
      None => async { Ok(Vec::new()) }.boxed(),
    }
  }

  fn store(&self, entries: Vec<StoreEntry<String>>) -> BoxFuture<'_, Result<(), StoreError>> {
    if self.fail_writes {
      return async { Err(StoreError::backend(BackendDown)) }.boxed();
    }
    match &self.inner {
      Some(inner) => inner.store(entries),
      None => async { Ok(()) }.boxed(),
    }
  }

  fn delete<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
    async { Ok(()) }.boxed()
  }

  fn close(&self, _timeout: Option<Duration>) -> BoxFuture<'_, Result<(), StoreError>> {
    async { Ok(()) }.boxed()
  }
}
