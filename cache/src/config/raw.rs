use serde::Deserialize;

// --- Top Level Config ---
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CacheConfigRaw {
  /// A humantime duration, e.g. `"500ms"` or `"3s"`.
  #[serde(default)]
  pub collapse_window: Option<String>,
  #[serde(default)]
  pub memory_store: MemoryStoreConfigRaw,
}

// --- Memory Store ---
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct MemoryStoreConfigRaw {
  #[serde(default)]
  pub num_items_limit: Option<usize>,
  #[serde(default)]
  pub fallback_delete_after: Option<String>,
  /// `"0s"` disables the janitor.
  #[serde(default)]
  pub cleanup_interval: Option<String>,
  #[serde(default)]
  pub cleanup_batch: Option<usize>,
  #[serde(default)]
  pub shards: Option<usize>,
}
