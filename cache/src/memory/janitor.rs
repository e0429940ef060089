use crate::memory::StoreShared;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::trace;

/// The background thread that sweeps expired entries out of a `MemoryStore`.
pub(crate) struct Janitor {
  handle: JoinHandle<()>,
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  /// Spawns a janitor that, every `tick_interval`, removes up to `batch`
  /// expired entries from each shard.
  pub(crate) fn spawn<C>(shared: Arc<StoreShared<C>>, tick_interval: Duration, batch: usize) -> Self
  where
    C: Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_clone = stop_flag.clone();

    let handle = thread::spawn(move || {
      while !stop_clone.load(Ordering::Relaxed) {
        let tick_start = Instant::now();

        let swept = shared.sweep_expired(batch);
        if swept > 0 {
          trace!(swept, "janitor removed expired entries");
        }

        // `stop` unparks the thread.
        if let Some(remaining) = tick_interval.checked_sub(tick_start.elapsed()) {
          thread::park_timeout(remaining);
        }
      }
    });

    Self { handle, stop_flag }
  }

  /// Signals the janitor thread to stop. Does not wait for it.
  pub(crate) fn stop(self) {
    self.stop_flag.store(true, Ordering::Relaxed);
    self.handle.thread().unpark();
  }
}
