use fibre_resource_cache::{CacheConfig, ConfigError, MemoryStore, ResourceCacheBuilder};
use std::time::Duration;

fn write_temp_config(name: &str, contents: &str) -> std::path::PathBuf {
  let path = std::env::temp_dir().join(format!("fibre_resource_cache_{}_{}.yaml", name, std::process::id()));
  std::fs::write(&path, contents).unwrap();
  path
}

#[test]
fn loads_a_yaml_file_and_builds_from_it() {
  let path = write_temp_config(
    "full",
    r#"
collapse_window: 250ms
memory_store:
  num_items_limit: 100
  fallback_delete_after: 10m
  cleanup_interval: 1s
  cleanup_batch: 50
  shards: 3
"#,
  );

  let config = CacheConfig::from_file(&path).unwrap();
  std::fs::remove_file(&path).ok();

  assert_eq!(config.collapse_window, Duration::from_millis(250));
  assert_eq!(config.memory_store.num_items_limit, Some(100));
  assert_eq!(config.memory_store.fallback_delete_after, Duration::from_secs(600));
  assert_eq!(config.memory_store.cleanup_interval, Some(Duration::from_secs(1)));
  assert_eq!(config.memory_store.cleanup_batch, 50);
  assert_eq!(config.memory_store.shards, Some(3));

  let store: MemoryStore<String> = config.memory_store.builder().build().unwrap();
  assert!(store.is_empty());
  let cache = ResourceCacheBuilder::new().config(&config).store(store).build();
  assert!(cache.is_ok());
}

#[test]
fn missing_file_is_a_read_error() {
  let path = std::env::temp_dir().join("fibre_resource_cache_does_not_exist.yaml");
  assert!(matches!(CacheConfig::from_file(&path), Err(ConfigError::Read(_))));
}

#[test]
fn unknown_memory_store_field_is_rejected() {
  let err = CacheConfig::from_yaml_str("memory_store:\n  capacity: 10\n").unwrap_err();
  assert!(matches!(err, ConfigError::Parse(_)));
}
