use std::{future::Future, pin::Pin};

/// A type-erased unit of background work, such as a revalidation.
pub type BackgroundTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A trait for spawning a future onto an asynchronous runtime.
///
/// The cache uses it to revalidate stale entries without making the consumer
/// wait.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: BackgroundTask);
}

impl<F> TaskSpawner for F
where
  F: Fn(BackgroundTask) + Send + Sync + 'static,
{
  fn spawn(&self, future: BackgroundTask) {
    self(future)
  }
}

#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioSpawner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioSpawner {
  /// Creates a spawner that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  /// Like [`TokioSpawner::new`], but returns `None` outside of a Tokio runtime.
  pub fn try_current() -> Option<Self> {
    tokio::runtime::Handle::try_current().ok().map(Self)
  }

  pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
  fn spawn(&self, future: BackgroundTask) {
    self.0.spawn(future);
  }
}
