use crate::collapse::DEFAULT_COLLAPSE_WINDOW;
use crate::config::raw::{CacheConfigRaw, MemoryStoreConfigRaw};
use crate::error::ConfigError;
use crate::memory::{
  MemoryStoreBuilder, DEFAULT_CLEANUP_BATCH, DEFAULT_CLEANUP_INTERVAL, DEFAULT_FALLBACK_DELETE_AFTER,
};

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Validated cache configuration.
///
/// ```
/// use std::time::Duration;
/// use fibre_resource_cache::CacheConfig;
///
/// let config = CacheConfig::from_yaml_str(
///   "collapse_window: 500ms\nmemory_store:\n  num_items_limit: 1000\n",
/// )
/// .unwrap();
/// assert_eq!(config.collapse_window, Duration::from_millis(500));
/// assert_eq!(config.memory_store.num_items_limit, Some(1000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
  pub collapse_window: Duration,
  pub memory_store: MemoryStoreConfig,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      collapse_window: DEFAULT_COLLAPSE_WINDOW,
      memory_store: MemoryStoreConfig::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStoreConfig {
  pub num_items_limit: Option<usize>,
  pub fallback_delete_after: Duration,
  /// `None` disables the janitor thread.
  pub cleanup_interval: Option<Duration>,
  pub cleanup_batch: usize,
  /// `None` picks a default from the number of CPUs.
  pub shards: Option<usize>,
}

impl Default for MemoryStoreConfig {
  fn default() -> Self {
    Self {
      num_items_limit: None,
      fallback_delete_after: DEFAULT_FALLBACK_DELETE_AFTER,
      cleanup_interval: Some(DEFAULT_CLEANUP_INTERVAL),
      cleanup_batch: DEFAULT_CLEANUP_BATCH,
      shards: None,
    }
  }
}

impl CacheConfig {
  pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
    let raw: CacheConfigRaw = serde_yaml::from_str(yaml)?;
    process_raw_config(raw)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let file = File::open(path)?;
    let raw: CacheConfigRaw = serde_yaml::from_reader(io::BufReader::new(file))?;
    process_raw_config(raw)
  }
}

impl MemoryStoreConfig {
  /// A `MemoryStoreBuilder` preloaded with these settings.
  pub fn builder<C>(&self) -> MemoryStoreBuilder<C>
  where
    C: Send + Sync + 'static,
  {
    let mut builder = MemoryStoreBuilder::default()
      .fallback_delete_after(self.fallback_delete_after)
      .cleanup_batch(self.cleanup_batch);
    builder = match self.cleanup_interval {
      Some(interval) => builder.cleanup_interval(interval),
      None => builder.without_janitor(),
    };
    if let Some(limit) = self.num_items_limit {
      builder = builder.num_items_limit(limit);
    }
    if let Some(shards) = self.shards {
      builder = builder.shards(shards);
    }
    builder
  }
}

pub fn process_raw_config(raw: CacheConfigRaw) -> Result<CacheConfig, ConfigError> {
  let defaults = CacheConfig::default();
  Ok(CacheConfig {
    collapse_window: parse_duration_field("collapse_window", raw.collapse_window)?
      .unwrap_or(defaults.collapse_window),
    memory_store: process_memory_store_config(raw.memory_store, defaults.memory_store)?,
  })
}

fn process_memory_store_config(
  raw: MemoryStoreConfigRaw,
  defaults: MemoryStoreConfig,
) -> Result<MemoryStoreConfig, ConfigError> {
  if raw.num_items_limit == Some(0) {
    return Err(invalid(
      "memory_store.num_items_limit",
      "must be greater than zero; omit it for an unbounded store",
    ));
  }
  if raw.shards == Some(0) {
    return Err(invalid("memory_store.shards", "must be greater than zero"));
  }
  if raw.cleanup_batch == Some(0) {
    return Err(invalid("memory_store.cleanup_batch", "must be greater than zero"));
  }

  let cleanup_interval = match parse_duration_field("memory_store.cleanup_interval", raw.cleanup_interval)? {
    Some(interval) if interval.is_zero() => None,
    Some(interval) => Some(interval),
    None => defaults.cleanup_interval,
  };

  Ok(MemoryStoreConfig {
    num_items_limit: raw.num_items_limit,
    fallback_delete_after: parse_duration_field(
      "memory_store.fallback_delete_after",
      raw.fallback_delete_after,
    )?
    .unwrap_or(defaults.fallback_delete_after),
    cleanup_interval,
    cleanup_batch: raw.cleanup_batch.unwrap_or(defaults.cleanup_batch),
    shards: raw.shards,
  })
}

fn parse_duration_field(field: &str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
  value
    .map(|text| humantime::parse_duration(text.trim()).map_err(|e| invalid(field, &e.to_string())))
    .transpose()
}

fn invalid(field: &str, message: &str) -> ConfigError {
  ConfigError::InvalidValue {
    field: field.to_string(),
    message: message.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn empty_document_yields_defaults() {
    let config = CacheConfig::from_yaml_str("{}").unwrap();
    assert_eq!(config, CacheConfig::default());
  }

  #[test]
  fn durations_use_humantime_notation() {
    let yaml = r#"
collapse_window: 750ms
memory_store:
  fallback_delete_after: 2h
  cleanup_interval: 0s
  cleanup_batch: 5
  shards: 4
"#;
    let config = CacheConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(
      config,
      CacheConfig {
        collapse_window: Duration::from_millis(750),
        memory_store: MemoryStoreConfig {
          num_items_limit: None,
          fallback_delete_after: Duration::from_secs(7200),
          cleanup_interval: None,
          cleanup_batch: 5,
          shards: Some(4),
        },
      }
    );
  }

  #[test]
  fn unknown_fields_are_rejected() {
    let err = CacheConfig::from_yaml_str("collapse_windw: 1s").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
  }

  #[test]
  fn bad_values_name_the_field() {
    match CacheConfig::from_yaml_str("collapse_window: soon").unwrap_err() {
      ConfigError::InvalidValue { field, .. } => assert_eq!(field, "collapse_window"),
      other => panic!("unexpected error: {:?}", other),
    }
    match CacheConfig::from_yaml_str("memory_store:\n  shards: 0\n").unwrap_err() {
      ConfigError::InvalidValue { field, .. } => assert_eq!(field, "memory_store.shards"),
      other => panic!("unexpected error: {:?}", other),
    }
  }
}
