use crate::directives::{EntryDirectives, ProducerDirectives, Seconds};
use crate::params::{NormalizedVary, Vary};
use crate::variant::{result_variant_key, VariantKey};

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Validation data attached to a result (e.g. an `etag`). Entries carrying
/// validators can be revalidated instead of refetched, so they stay potentially
/// useful for longer.
pub type Validators = BTreeMap<String, String>;

/// A producer's representation, at some point in time, of a single cacheable
/// resource: its id, content and caching metadata.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProducerResultResource<C> {
  pub id: String,
  /// Parameters the content depended on. `None` means "varies on nothing".
  pub vary: Option<Vary>,
  pub content: C,
  /// Age of the content, in seconds, at the moment it was handed over. Non-zero
  /// when the producer is itself a cache, or to account for transfer latency.
  pub initial_age: Option<Seconds>,
  /// When this result was created. Defaults to "now" during normalization.
  pub date: Option<DateTime<Utc>>,
  pub directives: ProducerDirectives,
  pub validators: Option<Validators>,
}

impl<C> ProducerResultResource<C> {
  pub fn new(id: impl Into<String>, content: C, directives: ProducerDirectives) -> Self {
    Self {
      id: id.into(),
      vary: None,
      content,
      initial_age: None,
      date: None,
      directives,
      validators: None,
    }
  }

  pub fn vary(mut self, vary: Vary) -> Self {
    self.vary = Some(vary);
    self
  }

  pub fn initial_age(mut self, seconds: Seconds) -> Self {
    self.initial_age = Some(seconds);
    self
  }

  pub fn date(mut self, date: DateTime<Utc>) -> Self {
    self.date = Some(date);
    self
  }

  pub fn validators(mut self, validators: Validators) -> Self {
    self.validators = Some(validators);
    self
  }
}

/// Everything a producer returns for one invocation: the requested resource,
/// plus any other resources it produced as a byproduct. Supplemental resources
/// are stored like the primary one but are not returned to the caller.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProducerResult<C> {
  pub resource: ProducerResultResource<C>,
  #[cfg_attr(feature = "serde", serde(default))]
  pub supplemental_resources: Vec<ProducerResultResource<C>>,
}

impl<C> ProducerResult<C> {
  pub fn new(resource: ProducerResultResource<C>) -> Self {
    Self {
      resource,
      supplemental_resources: Vec::new(),
    }
  }

  pub fn with_supplemental(mut self, resource: ProducerResultResource<C>) -> Self {
    self.supplemental_resources.push(resource);
    self
  }
}

impl<C> From<ProducerResultResource<C>> for ProducerResult<C> {
  fn from(resource: ProducerResultResource<C>) -> Self {
    ProducerResult::new(resource)
  }
}

/// A normalized producer result resource, colloquially a "cache entry". This
/// is what stores persist and what the cache hands back to consumers.
///
/// Entries are immutable: updating a resource means storing a new entry with
/// the same id.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Entry<C> {
  pub id: String,
  pub vary: NormalizedVary,
  pub content: C,
  pub initial_age: Seconds,
  pub date: DateTime<Utc>,
  pub directives: EntryDirectives,
  pub validators: Validators,
}

impl<C> Entry<C> {
  /// The moment the content was generated *by the origin*. Earlier than `date`
  /// when the entry reached us through another cache.
  /// Saturates at the earliest representable date.
  pub fn birth_date(&self) -> DateTime<Utc> {
    TimeDelta::try_milliseconds((self.initial_age * 1000.0) as i64)
      .and_then(|upstream| self.date.checked_sub_signed(upstream))
      .unwrap_or(DateTime::<Utc>::MIN_UTC)
  }

  /// Seconds between the origin generating the content and `at`.
  pub fn age(&self, at: DateTime<Utc>) -> Seconds {
    (at - self.date).num_milliseconds() as f64 / 1000.0 + self.initial_age
  }

  pub fn is_fresh(&self, at: DateTime<Utc>) -> bool {
    let age = self.age(at);
    age >= 0.0 && age <= self.directives.fresh_until_age
  }

  /// Whether the entry carries data that could be used for revalidation.
  pub fn is_validatable(&self) -> bool {
    !self.validators.is_empty()
  }

  /// How many seconds remain until the entry could not satisfy any request.
  /// Often infinite, because consumers can ask for arbitrarily stale content.
  pub fn potentially_useful_for(&self, at: DateTime<Utc>) -> Seconds {
    match self.directives.max_stale {
      Some(max_stale) if !self.is_validatable() => {
        self.directives.fresh_until_age + max_stale.if_error() - self.age(at)
      }
      _ => Seconds::INFINITY,
    }
  }

  /// The storage horizon handed to the store for this entry: the producer's
  /// `store_for` (capped by the consumer's, if any) minus the time the content
  /// already spent upstream, capped by how long the entry stays useful, and
  /// never negative.
  pub fn max_store_for(&self, consumer_store_for: Option<Seconds>, at: DateTime<Utc>) -> Seconds {
    let store_for = self
      .directives
      .store_for
      .unwrap_or(Seconds::INFINITY)
      .min(consumer_store_for.unwrap_or(Seconds::INFINITY));

    (store_for - self.initial_age)
      .min(self.potentially_useful_for(at))
      .max(0.0)
  }

  /// The canonical secondary key of this entry.
  pub fn variant_key(&self) -> VariantKey {
    result_variant_key(&self.vary)
  }

  /// Turns the entry back into a producer result resource, e.g. for a cache
  /// acting as the producer of another cache.
  pub fn into_resource(self) -> ProducerResultResource<C> {
    ProducerResultResource {
      id: self.id,
      vary: Some(self.vary.to_vary()),
      content: self.content,
      initial_age: Some(self.initial_age),
      date: Some(self.date),
      directives: self.directives.into(),
      validators: Some(self.validators),
    }
  }
}

/// A normalized `ProducerResult`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProducerResult<C> {
  pub entry: Entry<C>,
  pub supplemental_resources: Vec<Entry<C>>,
}

impl<C> NormalizedProducerResult<C> {
  /// Iterates over every entry, the primary one first.
  pub fn entries(&self) -> impl Iterator<Item = &Entry<C>> {
    std::iter::once(&self.entry).chain(self.supplemental_resources.iter())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::directives::MaxStale;

  fn entry(fresh_until_age: Seconds, initial_age: Seconds, date: DateTime<Utc>) -> Entry<()> {
    Entry {
      id: "r".into(),
      vary: NormalizedVary::default(),
      content: (),
      initial_age,
      date,
      directives: EntryDirectives {
        fresh_until_age,
        max_stale: None,
        store_for: None,
      },
      validators: Validators::new(),
    }
  }

  #[test]
  fn age_includes_initial_age() {
    let now = Utc::now();
    let e = entry(60.0, 10.0, now - chrono::Duration::seconds(5));
    assert_eq!(e.age(now), 15.0);
    assert_eq!(e.birth_date(), now - chrono::Duration::seconds(15));
  }

  #[test]
  fn huge_initial_age_does_not_overflow() {
    let now = Utc::now();
    let e = entry(60.0, 1e13, now);
    assert_eq!(e.age(now), 1e13);
    assert!(!e.is_fresh(now));
    assert_eq!(e.birth_date(), DateTime::<Utc>::MIN_UTC);
  }

  #[test]
  fn freshness_boundary_is_inclusive() {
    let now = Utc::now();
    let e = entry(60.0, 0.0, now);
    assert!(e.is_fresh(now + chrono::Duration::seconds(60)));
    assert!(!e.is_fresh(now + chrono::Duration::seconds(61)));
  }

  #[test]
  fn entries_from_the_future_are_not_fresh() {
    let now = Utc::now();
    let e = entry(60.0, 0.0, now + chrono::Duration::seconds(30));
    assert!(!e.is_fresh(now));
  }

  #[test]
  fn storage_horizon_subtracts_initial_age() {
    let now = Utc::now();
    let mut e = entry(60.0, 30.0, now);
    e.directives.store_for = Some(120.0);
    assert_eq!(e.max_store_for(None, now), 90.0);
    assert_eq!(e.max_store_for(Some(50.0), now), 20.0);

    e.initial_age = 200.0;
    assert_eq!(e.max_store_for(None, now), 0.0);
  }

  #[test]
  fn storage_horizon_is_unbounded_without_store_for() {
    let now = Utc::now();
    let e = entry(60.0, 0.0, now);
    assert!(e.max_store_for(None, now).is_infinite());
  }

  #[test]
  fn usefulness_is_limited_by_max_stale_unless_validatable() {
    let now = Utc::now();
    let mut e = entry(60.0, 0.0, now - chrono::Duration::seconds(20));
    e.directives.max_stale = Some(MaxStale::normalize([0.0, 10.0, 30.0]));
    assert_eq!(e.potentially_useful_for(now), 70.0);
    assert_eq!(e.max_store_for(None, now), 70.0);

    e.validators.insert("etag".into(), "\"abc\"".into());
    assert!(e.potentially_useful_for(now).is_infinite());
  }
}
