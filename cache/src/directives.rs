//! Cache-control directives sent by producers (with their results) and by
//! consumers (with their requests).
//!
//! All durations are expressed in seconds. Directives on both sides are
//! reconciled by the cache so that every party's requirements are satisfied:
//! if the producer allows a stale response to be served for `A` seconds and the
//! consumer would accept it for `B` seconds, it is served for `min(A, B)`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A number of seconds. Fractional values arise from wall-clock arithmetic,
/// and `f64::INFINITY` stands for "no limit".
pub type Seconds = f64;

/// A `maxStale` triple `[a, b, c]` that has been normalized so that
/// `0 <= a <= b <= c`.
///
/// - `a`: how stale a response may be to be served without any revalidation.
/// - `b`: how stale it may be if the cache revalidates it in the background.
/// - `c`: how stale it may be if a synchronous revalidation fails.
///
/// Only obtainable through [`MaxStale::normalize`], which clamps out-of-order
/// input instead of rejecting it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "[Seconds; 3]", into = "[Seconds; 3]"))]
pub struct MaxStale([Seconds; 3]);

impl MaxStale {
  /// The triple that makes stale responses unusable.
  pub const ZERO: MaxStale = MaxStale([0.0; 3]);

  /// Left-to-right scan in which each element becomes the maximum of itself
  /// and the previous normalized element (the first is compared against 0).
  /// Elements are only ever raised, never lowered: `[5, 2, 9]` becomes
  /// `[5, 5, 9]`.
  pub fn normalize(raw: [Seconds; 3]) -> Self {
    let mut out = [0.0; 3];
    let mut prev: Seconds = 0.0;
    for (slot, value) in out.iter_mut().zip(raw) {
      prev = prev.max(value);
      *slot = prev;
    }
    MaxStale(out)
  }

  /// Elementwise minimum of two normalized triples. The result is still
  /// normalized.
  pub fn min(self, other: MaxStale) -> MaxStale {
    MaxStale([
      self.0[0].min(other.0[0]),
      self.0[1].min(other.0[1]),
      self.0[2].min(other.0[2]),
    ])
  }

  /// `[0, b, c]`: keeps the revalidation tiers but refuses to serve stale
  /// content without at least a background revalidation.
  pub fn without_first_tier(self) -> MaxStale {
    MaxStale([0.0, self.0[1], self.0[2]])
  }

  pub fn as_array(&self) -> [Seconds; 3] {
    self.0
  }

  pub fn without_revalidation(&self) -> Seconds {
    self.0[0]
  }

  pub fn while_revalidating(&self) -> Seconds {
    self.0[1]
  }

  pub fn if_error(&self) -> Seconds {
    self.0[2]
  }
}

impl From<[Seconds; 3]> for MaxStale {
  fn from(raw: [Seconds; 3]) -> Self {
    MaxStale::normalize(raw)
  }
}

impl From<MaxStale> for [Seconds; 3] {
  fn from(value: MaxStale) -> Self {
    value.0
  }
}

/// Normalizes a `maxStale` triple. See [`MaxStale::normalize`].
pub fn normalize_max_stale(raw: [Seconds; 3]) -> MaxStale {
  MaxStale::normalize(raw)
}

/// Directives a producer attaches to a result.
///
/// - `fresh_until_age`: how many seconds the result is fresh for (HTTP's
///   response `max-age`).
/// - `max_stale`: same format and meaning as the consumer directive. `[0, 0, 0]`
///   is close to HTTP's `must-revalidate`; `[0, a, b]` is close to
///   `stale-while-revalidate=a, stale-if-error=b`.
/// - `store_for`: the maximum number of seconds *after the content was
///   generated* that it may be stored by any cache.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProducerDirectives {
  pub fresh_until_age: Seconds,
  #[cfg_attr(feature = "serde", serde(default))]
  pub max_stale: Option<[Seconds; 3]>,
  #[cfg_attr(feature = "serde", serde(default))]
  pub store_for: Option<Seconds>,
}

impl ProducerDirectives {
  pub fn fresh_for(fresh_until_age: Seconds) -> Self {
    Self {
      fresh_until_age,
      max_stale: None,
      store_for: None,
    }
  }

  pub fn max_stale(mut self, max_stale: [Seconds; 3]) -> Self {
    self.max_stale = Some(max_stale);
    self
  }

  pub fn store_for(mut self, seconds: Seconds) -> Self {
    self.store_for = Some(seconds);
    self
  }
}

/// Producer directives after normalization, as carried by an `Entry`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntryDirectives {
  pub fresh_until_age: Seconds,
  #[cfg_attr(feature = "serde", serde(default))]
  pub max_stale: Option<MaxStale>,
  #[cfg_attr(feature = "serde", serde(default))]
  pub store_for: Option<Seconds>,
}

impl From<ProducerDirectives> for EntryDirectives {
  fn from(raw: ProducerDirectives) -> Self {
    Self {
      fresh_until_age: raw.fresh_until_age,
      max_stale: raw.max_stale.map(MaxStale::normalize),
      store_for: raw.store_for,
    }
  }
}

impl From<EntryDirectives> for ProducerDirectives {
  fn from(normalized: EntryDirectives) -> Self {
    Self {
      fresh_until_age: normalized.fresh_until_age,
      max_stale: normalized.max_stale.map(|it| it.as_array()),
      store_for: normalized.store_for,
    }
  }
}

/// Directives a consumer attaches to a request. All are optional.
///
/// - `max_age`: the cache never returns a response older than this, not even
///   when the producer is unreachable.
/// - `max_stale`: the consumer's tolerance for staleness, see [`MaxStale`].
///   When omitted the cache synthesizes a default (see `classify`), which by
///   default means only fresh responses are served.
/// - `store_for`: the maximum number of seconds the cache may keep data
///   resulting from this request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConsumerDirectives {
  #[cfg_attr(feature = "serde", serde(default))]
  pub max_age: Option<Seconds>,
  #[cfg_attr(feature = "serde", serde(default))]
  pub max_stale: Option<[Seconds; 3]>,
  #[cfg_attr(feature = "serde", serde(default))]
  pub store_for: Option<Seconds>,
}

impl ConsumerDirectives {
  pub fn max_age(mut self, seconds: Seconds) -> Self {
    self.max_age = Some(seconds);
    self
  }

  pub fn max_stale(mut self, max_stale: [Seconds; 3]) -> Self {
    self.max_stale = Some(max_stale);
    self
  }

  pub fn store_for(mut self, seconds: Seconds) -> Self {
    self.store_for = Some(seconds);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn max_stale_is_clamped_monotonically() {
    assert_eq!(normalize_max_stale([5.0, 2.0, 9.0]).as_array(), [5.0, 5.0, 9.0]);
    assert_eq!(normalize_max_stale([3.0, 7.0, 1.0]).as_array(), [3.0, 7.0, 7.0]);
    assert_eq!(normalize_max_stale([-4.0, 2.0, 1.0]).as_array(), [0.0, 2.0, 2.0]);
  }

  #[test]
  fn max_stale_normalization_is_idempotent() {
    for raw in [[5.0, 2.0, 9.0], [0.0, 0.0, 0.0], [10.0, 15.0, 45.0], [9.0, 1.0, 0.0]] {
      let once = normalize_max_stale(raw);
      let twice = normalize_max_stale(once.as_array());
      assert_eq!(once, twice);
    }
  }

  #[test]
  fn elementwise_min_stays_normalized() {
    let a = normalize_max_stale([10.0, 15.0, 45.0]);
    let b = normalize_max_stale([0.0, 30.0, 30.0]);
    assert_eq!(a.min(b).as_array(), [0.0, 15.0, 30.0]);
  }

  #[test]
  fn entry_directives_normalize_max_stale() {
    let raw = ProducerDirectives::fresh_for(60.0).max_stale([5.0, 2.0, 9.0]);
    let normalized = EntryDirectives::from(raw);
    assert_eq!(normalized.max_stale.map(|m| m.as_array()), Some([5.0, 5.0, 9.0]));
    assert_eq!(normalized.fresh_until_age, 60.0);
  }
}
