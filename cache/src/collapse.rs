//! Single-flight deduplication of asynchronous work.
//!
//! A [`TaskCollapser`] remembers the tasks it started, keyed by `K`. A call for
//! a key whose task is still pending, and was started no longer than the
//! collapse window ago, is handed the same pending result instead of starting
//! a new task.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::trace;

const TRACE_TARGET: &str = "fibre_resource_cache::collapse";

/// How long a pending task may be joined by later callers, unless configured
/// otherwise.
pub const DEFAULT_COLLAPSE_WINDOW: Duration = Duration::from_secs(3);

/// A pending result that any number of callers can await. Every clone resolves
/// to a clone of the same output.
pub type CollapsedTask<T> = Shared<BoxFuture<'static, T>>;

struct PendingTask<T: Clone> {
  generation: u64,
  started_at: Instant,
  task: CollapsedTask<T>,
}

type PendingMap<K, T> = Mutex<HashMap<K, PendingTask<T>, ahash::RandomState>>;

/// Shares in-flight tasks among callers using equal keys.
///
/// Tasks are driven by whoever awaits them. An error output (`T` is usually a
/// `Result`) is delivered to every waiter like any other output, and the key is
/// released on completion either way, so failures are never reused.
pub struct TaskCollapser<K, T: Clone> {
  pending: Arc<PendingMap<K, T>>,
  next_generation: AtomicU64,
  window: Duration,
}

impl<K, T: Clone> fmt::Debug for TaskCollapser<K, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskCollapser")
      .field("window", &self.window)
      .field("pending", &self.pending.lock().len())
      .finish()
  }
}

impl<K, T: Clone> TaskCollapser<K, T> {
  pub fn window(&self) -> Duration {
    self.window
  }

  /// Number of keys currently pointing at a pending task.
  pub fn pending_count(&self) -> usize {
    self.pending.lock().len()
  }
}

impl<K, T> TaskCollapser<K, T>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  pub fn new(window: Duration) -> Self {
    Self {
      pending: Arc::new(Mutex::new(HashMap::default())),
      next_generation: AtomicU64::new(0),
      window,
    }
  }

  /// Returns the pending task for `key` if it started within the window, or
  /// calls `start` and records the new task under `key`.
  ///
  /// `start` runs while the pending map is locked and must not call back into
  /// this collapser.
  pub fn run<F, Fut>(&self, key: K, start: F) -> CollapsedTask<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T> + Send + 'static,
  {
    trace!(target: TRACE_TARGET, ?key, "task requested");

    let mut pending = self.pending.lock();
    if let Some(existing) = pending.get(&key) {
      if existing.started_at.elapsed() <= self.window {
        trace!(
          target: TRACE_TARGET,
          ?key,
          generation = existing.generation,
          "joining pending task"
        );
        return existing.task.clone();
      }
      trace!(
        target: TRACE_TARGET,
        ?key,
        generation = existing.generation,
        "pending task is outside the collapse window"
      );
    }

    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
    let task = Self::with_completion_hook(
      start(),
      Arc::downgrade(&self.pending),
      key.clone(),
      generation,
    );

    trace!(target: TRACE_TARGET, ?key, generation, "task started");
    pending.insert(
      key,
      PendingTask {
        generation,
        started_at: Instant::now(),
        task: task.clone(),
      },
    );
    task
  }

  fn with_completion_hook<Fut>(
    future: Fut,
    pending: Weak<PendingMap<K, T>>,
    key: K,
    generation: u64,
  ) -> CollapsedTask<T>
  where
    Fut: Future<Output = T> + Send + 'static,
  {
    async move {
      let output = future.await;
      if let Some(pending) = pending.upgrade() {
        let mut pending = pending.lock();
        // A newer task may have replaced this one; leave it alone.
        if pending.get(&key).map_or(false, |p| p.generation == generation) {
          pending.remove(&key);
        }
      }
      trace!(target: TRACE_TARGET, ?key, generation, "task completed");
      output
    }
    .boxed()
    .shared()
  }
}

/// A task-starting function wrapped so that calls with equal keys collapse.
/// Built by [`collapse`].
pub struct Collapsed<A, K, T: Clone> {
  collapser: TaskCollapser<K, T>,
  task_fn: Box<dyn Fn(A) -> BoxFuture<'static, T> + Send + Sync>,
  key_fn: Box<dyn Fn(&A) -> K + Send + Sync>,
}

impl<A, K, T: Clone> fmt::Debug for Collapsed<A, K, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Collapsed")
      .field("collapser", &self.collapser)
      .finish_non_exhaustive()
  }
}

impl<A, K, T> Collapsed<A, K, T>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  pub fn call(&self, args: A) -> CollapsedTask<T> {
    let key = (self.key_fn)(&args);
    self.collapser.run(key, || (self.task_fn)(args))
  }

  pub fn collapser(&self) -> &TaskCollapser<K, T> {
    &self.collapser
  }
}

/// Wraps `task_fn` so that a call whose key (from `key_fn`) matches a task
/// started less than `window` ago, and still pending, shares that task.
///
/// ```
/// use std::time::Duration;
/// use fibre_resource_cache::collapse::collapse;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let double = collapse(
///   |n: u32| async move { n * 2 },
///   |n: &u32| *n,
///   Duration::from_millis(500),
/// );
/// assert_eq!(double.call(21).await, 42);
/// # }
/// ```
pub fn collapse<A, K, T, F, Fut, KF>(task_fn: F, key_fn: KF, window: Duration) -> Collapsed<A, K, T>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
  F: Fn(A) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = T> + Send + 'static,
  KF: Fn(&A) -> K + Send + Sync + 'static,
{
  Collapsed {
    collapser: TaskCollapser::new(window),
    task_fn: Box::new(move |args| task_fn(args).boxed()),
    key_fn: Box::new(key_fn),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use tokio::sync::oneshot;

  #[tokio::test]
  async fn same_key_within_window_shares_one_task() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let slow = collapse(
      move |key: &'static str| {
        let calls = calls_clone.clone();
        async move {
          let n = calls.fetch_add(1, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(50)).await;
          format!("{}-{}", key, n)
        }
      },
      |key: &&'static str| key.to_string(),
      Duration::from_millis(500),
    );

    let first = slow.call("a");
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = slow.call("a");

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a, "a-0");
    assert_eq!(b, "a-0");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(slow.collapser().pending_count(), 0);

    assert_eq!(slow.call("a").await, "a-1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn different_keys_do_not_collapse() {
    let collapser: TaskCollapser<u32, u32> = TaskCollapser::new(Duration::from_secs(1));
    let one = collapser.run(1, || async { 1 });
    let two = collapser.run(2, || async { 2 });
    assert_eq!(collapser.pending_count(), 2);
    assert_eq!(tokio::join!(one, two), (1, 2));
    assert_eq!(collapser.pending_count(), 0);
  }

  #[tokio::test]
  async fn failures_reach_every_waiter_and_are_not_reused() {
    let collapser: TaskCollapser<&'static str, Result<u32, String>> =
      TaskCollapser::new(Duration::from_secs(1));

    let first = collapser.run("k", || async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Err("boom".to_string())
    });
    let second = collapser.run("k", || async { Ok(0) });

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a, Err("boom".to_string()));
    assert_eq!(b, Err("boom".to_string()));
    assert_eq!(collapser.pending_count(), 0);

    assert_eq!(collapser.run("k", || async { Ok(7) }).await, Ok(7));
  }

  #[tokio::test]
  async fn superseded_task_does_not_remove_its_successor() {
    let collapser: TaskCollapser<&'static str, u32> = TaskCollapser::new(Duration::from_millis(10));
    let (tx1, rx1) = oneshot::channel::<u32>();
    let (tx2, rx2) = oneshot::channel::<u32>();

    let first = collapser.run("k", move || async move { rx1.await.unwrap_or(0) });
    let first_driver = tokio::spawn(first);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = collapser.run("k", move || async move { rx2.await.unwrap_or(0) });
    let second_driver = tokio::spawn(second);

    tx1.send(1).unwrap();
    assert_eq!(first_driver.await.unwrap(), 1);
    assert_eq!(collapser.pending_count(), 1);

    tx2.send(2).unwrap();
    assert_eq!(second_driver.await.unwrap(), 2);
    assert_eq!(collapser.pending_count(), 0);
  }

  #[tokio::test]
  async fn pending_task_outside_window_is_replaced() {
    let collapser: TaskCollapser<&'static str, u32> = TaskCollapser::new(Duration::ZERO);
    let (_tx, rx) = oneshot::channel::<u32>();

    let stuck = collapser.run("k", move || async move { rx.await.unwrap_or(0) });
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(collapser.run("k", || async { 9 }).await, 9);
    drop(stuck);
  }
}
