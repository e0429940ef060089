use crate::entry::Entry;
use crate::listener::EvictionReason;
use crate::params::NormalizedParams;
use crate::variant::{request_variant_key_for_vary_keys, vary_keys_of, VariantKey, VaryKeys};

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;

/// The primary key of a stored entry: resource id plus variant key.
pub(crate) type EntryKey = (String, VariantKey);

/// Entries removed as a side effect of an operation, reported to the eviction
/// listener once the shard lock is released.
pub(crate) type Removed<C> = Vec<(Arc<Entry<C>>, EvictionReason)>;

pub(crate) struct StoredEntry<C> {
  entry: Arc<Entry<C>>,
  /// `None` when the horizon does not fit in an `Instant`.
  expires_at: Option<Instant>,
}

impl<C> StoredEntry<C> {
  #[inline]
  fn is_expired(&self, now: Instant) -> bool {
    self.expires_at.map_or(false, |at| now >= at)
  }
}

/// What a shard knows about one resource id.
#[derive(Default)]
struct ResourceIndex {
  /// Every distinct set of param names a stored variant of this resource
  /// varies on. Usually just one.
  vary_keys_sets: Vec<VaryKeys>,
  /// Variant keys currently stored for this resource.
  variant_keys: Vec<VariantKey>,
}

/// One independently locked partition of a `MemoryStore`. All variants of a
/// resource live in the same shard.
pub(crate) struct Shard<C> {
  resources: HashMap<String, ResourceIndex, ahash::RandomState>,
  entries: LruCache<EntryKey, StoredEntry<C>, ahash::RandomState>,
}

impl<C> Shard<C> {
  pub(crate) fn new(item_limit: Option<NonZeroUsize>) -> Self {
    let entries = match item_limit {
      Some(limit) => LruCache::with_hasher(limit, ahash::RandomState::new()),
      None => LruCache::unbounded_with_hasher(ahash::RandomState::new()),
    };
    Self {
      resources: HashMap::default(),
      entries,
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.len()
  }

  pub(crate) fn resource_count(&self) -> usize {
    self.resources.len()
  }

  /// Looks up the variants of `id` compatible with `params`: one direct lookup
  /// per known vary-keys set. Expired variants found on the way are removed.
  pub(crate) fn get(
    &mut self,
    id: &str,
    params: &NormalizedParams,
    now: Instant,
    removed: &mut Removed<C>,
  ) -> Vec<Arc<Entry<C>>> {
    let candidate_keys: Vec<VariantKey> = match self.resources.get(id) {
      Some(index) => index
        .vary_keys_sets
        .iter()
        .map(|vary_keys| request_variant_key_for_vary_keys(params, vary_keys))
        .collect(),
      None => return Vec::new(),
    };

    let mut found = Vec::with_capacity(candidate_keys.len());
    for variant_key in candidate_keys {
      let entry_key = (id.to_owned(), variant_key);
      let expired = match self.entries.get(&entry_key) {
        Some(stored) if !stored.is_expired(now) => {
          found.push(stored.entry.clone());
          false
        }
        Some(_) => true,
        None => false,
      };

      if expired {
        self.remove_entry(&entry_key, EvictionReason::Expired, removed);
      }
    }
    found
  }

  /// Stores `entry`, replacing the variant with the same key if any. May evict
  /// the least recently used entry of the shard when it is full.
  pub(crate) fn insert(
    &mut self,
    entry: Arc<Entry<C>>,
    ttl: Duration,
    now: Instant,
    removed: &mut Removed<C>,
  ) {
    let variant_key = entry.variant_key();
    let vary_keys = vary_keys_of(&entry.vary);

    let index = self.resources.entry(entry.id.clone()).or_default();
    if !index.vary_keys_sets.contains(&vary_keys) {
      index.vary_keys_sets.push(vary_keys);
    }
    if !index.variant_keys.contains(&variant_key) {
      index.variant_keys.push(variant_key.clone());
    }

    let entry_key = (entry.id.clone(), variant_key);
    let stored = StoredEntry {
      entry,
      expires_at: now.checked_add(ttl),
    };

    // `push` hands back either the replaced value for the same key, or the
    // entry evicted to make room.
    if let Some((evicted_key, evicted)) = self.entries.push(entry_key.clone(), stored) {
      if evicted_key != entry_key {
        self.forget_variant(&evicted_key);
        removed.push((evicted.entry, EvictionReason::Capacity));
      }
    }
  }

  /// Removes every variant of `id`.
  pub(crate) fn remove_resource(&mut self, id: &str, removed: &mut Removed<C>) {
    let Some(index) = self.resources.remove(id) else {
      return;
    };
    for variant_key in index.variant_keys {
      if let Some(stored) = self.entries.pop(&(id.to_owned(), variant_key)) {
        removed.push((stored.entry, EvictionReason::Invalidated));
      }
    }
  }

  /// Removes up to `limit` expired entries, least recently used first.
  pub(crate) fn sweep_expired(&mut self, now: Instant, limit: usize, removed: &mut Removed<C>) -> usize {
    let victims: Vec<EntryKey> = self
      .entries
      .iter()
      .rev()
      .filter(|(_, stored)| stored.is_expired(now))
      .take(limit)
      .map(|(key, _)| key.clone())
      .collect();

    for key in &victims {
      self.remove_entry(key, EvictionReason::Expired, removed);
    }
    victims.len()
  }

  pub(crate) fn clear(&mut self) {
    self.entries.clear();
    self.resources.clear();
  }

  fn remove_entry(&mut self, key: &EntryKey, reason: EvictionReason, removed: &mut Removed<C>) {
    if let Some(stored) = self.entries.pop(key) {
      self.forget_variant(key);
      removed.push((stored.entry, reason));
    }
  }

  /// Drops a variant from its resource's index, and the resource itself once
  /// no variant is left.
  fn forget_variant(&mut self, (id, variant_key): &EntryKey) {
    if let Some(index) = self.resources.get_mut(id) {
      index.variant_keys.retain(|k| k != variant_key);
      if index.variant_keys.is_empty() {
        self.resources.remove(id);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::directives::ProducerDirectives;
  use crate::entry::ProducerResultResource;
  use crate::normalize::{normalize_params, normalize_producer_result_resource, IdentityNormalizer};
  use crate::params::{params, vary, ParamValue};

  fn entry(id: &str, lang: Option<&str>) -> Arc<Entry<u32>> {
    let resource = ProducerResultResource::new(id, 1, ProducerDirectives::fresh_for(60.0))
      .vary(vary([("lang", lang.map(ParamValue::from))]));
    Arc::new(normalize_producer_result_resource(&IdentityNormalizer, resource, None))
  }

  fn request(pairs: Vec<(&str, &str)>) -> NormalizedParams {
    normalize_params(&IdentityNormalizer, &params(pairs))
  }

  #[test]
  fn lookup_uses_vary_keys_index() {
    let mut shard = Shard::new(None);
    let mut removed = Vec::new();
    let now = Instant::now();
    shard.insert(entry("r", Some("en")), Duration::from_secs(60), now, &mut removed);
    shard.insert(entry("r", None), Duration::from_secs(60), now, &mut removed);

    assert_eq!(shard.get("r", &request(vec![("lang", "en")]), now, &mut removed).len(), 1);
    assert_eq!(shard.get("r", &request(vec![]), now, &mut removed).len(), 1);
    assert!(shard.get("r", &request(vec![("lang", "fr")]), now, &mut removed).is_empty());
    assert!(removed.is_empty());
  }

  #[test]
  fn expired_entries_are_dropped_with_their_index() {
    let mut shard = Shard::new(None);
    let mut removed = Vec::new();
    let now = Instant::now();
    shard.insert(entry("r", Some("en")), Duration::from_secs(1), now, &mut removed);

    let later = now + Duration::from_secs(2);
    assert!(shard.get("r", &request(vec![("lang", "en")]), later, &mut removed).is_empty());
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].1, EvictionReason::Expired);
    assert_eq!(shard.resource_count(), 0);
  }

  #[test]
  fn replacing_a_variant_is_not_an_eviction() {
    let mut shard = Shard::new(Some(NonZeroUsize::new(1).unwrap()));
    let mut removed = Vec::new();
    let now = Instant::now();
    shard.insert(entry("r", Some("en")), Duration::from_secs(60), now, &mut removed);
    shard.insert(entry("r", Some("en")), Duration::from_secs(60), now, &mut removed);
    assert!(removed.is_empty());
    assert_eq!(shard.len(), 1);

    shard.insert(entry("s", None), Duration::from_secs(60), now, &mut removed);
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].1, EvictionReason::Capacity);
    assert_eq!(shard.resource_count(), 1);
  }

  #[test]
  fn sweep_respects_the_limit() {
    let mut shard = Shard::new(None);
    let mut removed = Vec::new();
    let now = Instant::now();
    for id in ["a", "b", "c"] {
      shard.insert(entry(id, None), Duration::from_millis(10), now, &mut removed);
    }

    let later = now + Duration::from_secs(1);
    assert_eq!(shard.sweep_expired(later, 2, &mut removed), 2);
    assert_eq!(shard.len(), 1);
    assert_eq!(shard.sweep_expired(later, 2, &mut removed), 1);
    assert_eq!(shard.resource_count(), 0);
  }
}
