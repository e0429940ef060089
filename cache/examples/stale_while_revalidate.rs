use fibre_resource_cache::{
  BoxError, ConsumerDirectives, ConsumerRequest, MemoryStore, ProducerDirectives, ProducerResult,
  ProducerResultResource, ResourceCacheBuilder,
};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Data {
  version: usize,
  content: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let load_counter = Arc::new(AtomicUsize::new(0));

  // Fresh for 1 second, then servable for 10 more seconds while a background
  // refresh runs, then only as a fallback for another 60 seconds.
  let directives = ProducerDirectives::fresh_for(1.0).max_stale([0.0, 10.0, 70.0]);

  let producer = ResourceCacheBuilder::new()
    .store(MemoryStore::builder().build()?)
    .build_producer({
      let counter = load_counter.clone();
      move |req: ConsumerRequest| {
        let counter = counter.clone();
        async move {
          let version = counter.fetch_add(1, Ordering::SeqCst) + 1;
          println!("[Producer] Loading version {} for '{}'...", version, req.id);
          tokio::time::sleep(Duration::from_millis(500)).await; // Simulate slow load
          let data = Data {
            version,
            content: format!("Content for {} - version {}", req.id, version),
          };
          Ok::<_, BoxError>(ProducerResult::new(ProducerResultResource::new(req.id, data, directives)))
        }
      }
    })?;

  let request = ConsumerRequest::new("my-data");

  println!("--- Step 1: Initial Load ---");
  let value1 = producer.fetch(request.clone()).await?;
  println!("Received: {:?}", value1.content);
  assert_eq!(value1.content.version, 1);

  println!("\n--- Step 2: Cache Hit (Fresh) ---");
  let value2 = producer.fetch(request.clone()).await?;
  println!("Received: {:?}", value2.content);
  assert_eq!(value2.content.version, 1);
  assert_eq!(load_counter.load(Ordering::Relaxed), 1);

  println!("\n--- Step 3: Wait for freshness to run out (2 seconds) ---");
  tokio::time::sleep(Duration::from_secs(2)).await;

  println!("\n--- Step 4: Stale Read ---");
  let value3 = producer.fetch(request.clone()).await?;
  println!("IMMEDIATELY Received (stale): {:?}", value3.content);
  assert_eq!(value3.content.version, 1, "Should return stale version 1 immediately");

  println!("\n--- Step 5: Wait for the background refresh ---");
  tokio::time::sleep(Duration::from_secs(1)).await;
  let value4 = producer.fetch(request.clone()).await?;
  println!("Received (refreshed): {:?}", value4.content);
  assert_eq!(value4.content.version, 2);

  println!("\n--- Step 6: A consumer that refuses stale content ---");
  tokio::time::sleep(Duration::from_secs(2)).await;
  let strict = request.directives(ConsumerDirectives::default().max_stale([0.0, 0.0, 0.0]));
  let value5 = producer.fetch(strict).await?;
  println!("Received (waited for producer): {:?}", value5.content);
  assert_eq!(value5.content.version, 3);

  println!("\nMetrics: {:#?}", producer.metrics());
  Ok(())
}
