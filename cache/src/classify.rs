//! Reconciliation of producer and consumer directives for a single entry.

use crate::directives::{ConsumerDirectives, MaxStale};
use crate::entry::Entry;

use std::fmt;

use chrono::{DateTime, Utc};

/// How an entry may be used to answer a request.
///
/// Unusable entries may still carry validators, which could help fetching an
/// updated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryClassification {
  /// Serve as-is, no revalidation.
  Usable,
  /// Serve, but refresh it in the background for future requests.
  UsableWhileRevalidate,
  /// Only serve if a synchronous revalidation fails.
  UsableIfError,
  /// Never serve; the producer must be called.
  Unusable,
}

impl fmt::Display for EntryClassification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EntryClassification::Usable => write!(f, "usable"),
      EntryClassification::UsableWhileRevalidate => write!(f, "usable while revalidating"),
      EntryClassification::UsableIfError => write!(f, "usable if revalidation fails"),
      EntryClassification::Unusable => write!(f, "unusable"),
    }
  }
}

/// Resolves the `maxStale` triple that governs a stale entry, or `None` when
/// neither side provided one (stale entries are then simply unusable).
///
/// | producer | consumer | consumer side | producer side |
/// |----------|----------|---------------|---------------|
/// | `P`      | `C`      | `C`           | `P`           |
/// | `P`      | -        | `[0, Pb, Pc]` | `P`           |
/// | -        | `C`      | `C`           | `[0, Cb, Cc]` |
/// | -        | -        | -             | -             |
///
/// The result is the elementwise minimum of both sides, since serving stale
/// content needs both parties to tolerate it.
pub fn effective_max_stale(
  producer: Option<MaxStale>,
  consumer: Option<MaxStale>,
) -> Option<MaxStale> {
  let (consumer_side, producer_side) = match (producer, consumer) {
    (Some(p), Some(c)) => (c, p),
    (Some(p), None) => (p.without_first_tier(), p),
    (None, Some(c)) => (c, c.without_first_tier()),
    (None, None) => return None,
  };
  Some(consumer_side.min(producer_side))
}

/// Classifies an entry for a request's directives at a given moment.
///
/// The entry's `id` and `vary` are not looked at; it is assumed to be a valid
/// candidate for the request.
pub fn classify<C>(
  entry: &Entry<C>,
  directives: &ConsumerDirectives,
  at: DateTime<Utc>,
) -> EntryClassification {
  let age = entry.age(at);

  // Exceeding the consumer's max_age is final, even if the producer is down.
  if matches!(directives.max_age, Some(max_age) if age > max_age) {
    return EntryClassification::Unusable;
  }

  if entry.is_fresh(at) {
    return EntryClassification::Usable;
  }

  let consumer_max_stale = directives.max_stale.map(MaxStale::normalize);
  let Some(max_stale) = effective_max_stale(entry.directives.max_stale, consumer_max_stale) else {
    return EntryClassification::Unusable;
  };

  let fresh_until_age = entry.directives.fresh_until_age;
  if age <= fresh_until_age + max_stale.without_revalidation() {
    EntryClassification::Usable
  } else if age <= fresh_until_age + max_stale.while_revalidating() {
    EntryClassification::UsableWhileRevalidate
  } else if age <= fresh_until_age + max_stale.if_error() {
    EntryClassification::UsableIfError
  } else {
    EntryClassification::Unusable
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::directives::{EntryDirectives, Seconds};
  use crate::entry::Validators;
  use crate::params::NormalizedVary;

  use chrono::Duration;

  fn entry_with(fresh_until_age: Seconds, max_stale: Option<[Seconds; 3]>) -> (Entry<()>, DateTime<Utc>) {
    let date = Utc::now();
    let entry = Entry {
      id: "r".into(),
      vary: NormalizedVary::default(),
      content: (),
      initial_age: 0.0,
      date,
      directives: EntryDirectives {
        fresh_until_age,
        max_stale: max_stale.map(MaxStale::normalize),
        store_for: None,
      },
      validators: Validators::new(),
    };
    (entry, date)
  }

  fn at(date: DateTime<Utc>, age: i64) -> DateTime<Utc> {
    date + Duration::seconds(age)
  }

  #[test]
  fn freshness_boundary() {
    let (entry, date) = entry_with(60.0, None);
    let none = ConsumerDirectives::default();
    assert_eq!(classify(&entry, &none, at(date, 60)), EntryClassification::Usable);
    assert_eq!(classify(&entry, &none, at(date, 61)), EntryClassification::Unusable);
  }

  #[test]
  fn consumer_max_age_caps_freshness_and_fallbacks() {
    let (entry, date) = entry_with(60.0, Some([0.0, 100.0, 1000.0]));
    let dirs = ConsumerDirectives::default().max_age(30.0);
    assert_eq!(classify(&entry, &dirs, at(date, 30)), EntryClassification::Usable);
    assert_eq!(classify(&entry, &dirs, at(date, 31)), EntryClassification::Unusable);
    assert_eq!(classify(&entry, &dirs, at(date, 90)), EntryClassification::Unusable);
  }

  #[test]
  fn consumer_only_max_stale_still_requires_revalidation() {
    let (entry, date) = entry_with(60.0, None);
    let dirs = ConsumerDirectives::default().max_stale([10.0, 15.0, 45.0]);
    assert_eq!(
      effective_max_stale(None, dirs.max_stale.map(MaxStale::normalize)).map(|m| m.as_array()),
      Some([0.0, 15.0, 45.0])
    );

    assert_eq!(
      classify(&entry, &dirs, at(date, 65)),
      EntryClassification::UsableWhileRevalidate
    );
    assert_eq!(
      classify(&entry, &dirs, at(date, 72)),
      EntryClassification::UsableWhileRevalidate
    );
    assert_eq!(
      classify(&entry, &dirs, at(date, 90)),
      EntryClassification::UsableIfError
    );
    assert_eq!(classify(&entry, &dirs, at(date, 110)), EntryClassification::Unusable);
  }

  #[test]
  fn producer_only_max_stale_requires_revalidation() {
    let (entry, date) = entry_with(60.0, Some([20.0, 30.0, 40.0]));
    let none = ConsumerDirectives::default();

    assert_eq!(
      classify(&entry, &none, at(date, 65)),
      EntryClassification::UsableWhileRevalidate
    );
    assert_eq!(
      classify(&entry, &none, at(date, 95)),
      EntryClassification::UsableIfError
    );
    assert_eq!(classify(&entry, &none, at(date, 101)), EntryClassification::Unusable);
  }

  #[test]
  fn both_sides_take_the_minimum() {
    let (entry, date) = entry_with(0.0, Some([0.0, 10.0, 100.0]));
    let dirs = ConsumerDirectives::default().max_stale([5.0, 50.0, 60.0]);
    assert_eq!(
      effective_max_stale(entry.directives.max_stale, dirs.max_stale.map(MaxStale::normalize))
        .map(|m| m.as_array()),
      Some([0.0, 10.0, 60.0])
    );
    assert_eq!(
      classify(&entry, &dirs, at(date, 3)),
      EntryClassification::UsableWhileRevalidate
    );
    assert_eq!(
      classify(&entry, &dirs, at(date, 59)),
      EntryClassification::UsableIfError
    );
  }

  #[test]
  fn out_of_order_consumer_max_stale_is_clamped() {
    let (entry, date) = entry_with(0.0, None);
    let dirs = ConsumerDirectives::default().max_stale([20.0, 5.0, 10.0]);
    // Normalized to [20, 20, 20]; without producer consent the first tier is 0.
    assert_eq!(
      classify(&entry, &dirs, at(date, 20)),
      EntryClassification::UsableWhileRevalidate
    );
    assert_eq!(classify(&entry, &dirs, at(date, 21)), EntryClassification::Unusable);
  }

  #[test]
  fn no_max_stale_anywhere_means_fresh_only() {
    assert_eq!(effective_max_stale(None, None), None);
  }
}
